use std::{env, path::PathBuf};

use anyhow::Context;
use fs_extra::{copy_items, dir::CopyOptions};

/// Mirrors `assets/` (shaders, models) next to the build output so the
/// `forest` binary finds them when run from the target directory.
fn main() -> anyhow::Result<()> {
    println!("cargo:rerun-if-changed=assets");

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let assets = manifest_dir.join("assets");
    if !assets.exists() {
        return Ok(());
    }

    let out_dir = env::var("OUT_DIR")?;
    let mut options = CopyOptions::new();
    options.overwrite = true;
    copy_items(&[assets], &out_dir, &options)
        .with_context(|| format!("copying assets into {out_dir}"))?;
    Ok(())
}
