/**
 * Loading of meshes, images and shader sources from external files.
 *
 * Loading is the first half of scene setup: [`load_assets`] resolves every file
 * in an [`AssetManifest`] into CPU data. The engine then turns the returned
 * [`LoadedAssets`] into GPU objects in one synchronous step, so nothing is
 * ever rendered half loaded.
 */
pub mod mesh;
pub mod texture;

use std::collections::HashMap;

use futures::future::{join_all, try_join_all};

use crate::{
    data_structures::{MeshId, TextureId, mesh::MeshData, texture::TextureOptions},
    error::{EngineError, EngineResult},
};

#[cfg(target_arch = "wasm32")]
fn format_url(file_name: &str) -> anyhow::Result<reqwest::Url> {
    let window = web_sys::window().ok_or_else(|| anyhow::anyhow!("no window"))?;
    let origin = window
        .location()
        .origin()
        .map_err(|_| anyhow::anyhow!("no origin"))?;
    let base = reqwest::Url::parse(&format!("{origin}/assets/"))?;
    Ok(base.join(file_name)?)
}

pub async fn load_string(file_name: &str) -> anyhow::Result<String> {
    #[cfg(target_arch = "wasm32")]
    let txt = {
        let url = format_url(file_name)?;
        reqwest::get(url).await?.text().await?
    };
    #[cfg(not(target_arch = "wasm32"))]
    let txt = {
        let path = std::path::Path::new("./").join("assets").join(file_name);
        std::fs::read_to_string(path)?
    };

    Ok(txt)
}

pub async fn load_binary(file_name: &str) -> anyhow::Result<Vec<u8>> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(file_name)?;
        reqwest::get(url).await?.bytes().await?.to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = {
        let path = std::path::Path::new("./").join("assets").join(file_name);
        std::fs::read(path)?
    };

    Ok(data)
}

/// Every file a scene needs, by asset path.
#[derive(Clone, Debug, Default)]
pub struct AssetManifest {
    pub shaders: Vec<String>,
    pub meshes: Vec<String>,
    pub textures: Vec<(String, TextureOptions)>,
}

impl AssetManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shader(mut self, path: &str) -> Self {
        self.shaders.push(path.to_string());
        self
    }

    pub fn mesh(mut self, path: &str) -> Self {
        self.meshes.push(path.to_string());
        self
    }

    pub fn texture(mut self, path: &str, options: TextureOptions) -> Self {
        self.textures.push((path.to_string(), options));
        self
    }
}

/// CPU side of a resolved manifest.
#[derive(Debug, Default)]
pub struct LoadedAssets {
    pub shaders: HashMap<String, String>,
    pub meshes: HashMap<String, MeshData>,
    pub images: HashMap<String, (image::DynamicImage, TextureOptions)>,
}

/// Loads everything in `manifest` concurrently. The first failure aborts.
pub async fn load_assets(manifest: &AssetManifest) -> EngineResult<LoadedAssets> {
    let shaders = try_join_all(manifest.shaders.iter().map(|path| async move {
        load_string(path)
            .await
            .map(|source| (path.clone(), source))
            .map_err(|e| EngineError::ShaderLoad {
                path: path.clone(),
                reason: format!("{e:#}"),
            })
    }));
    let meshes = try_join_all(
        manifest
            .meshes
            .iter()
            .map(|path| async move { Ok::<_, EngineError>((path.clone(), mesh::load_obj(path).await?)) }),
    );
    let images = join_all(manifest.textures.iter().map(|(path, options)| async move {
        texture::load_image(path)
            .await
            .map(|image| (path.clone(), (image, *options)))
    }));

    let (shaders, meshes, images) = futures::join!(shaders, meshes, images);
    let images = images.into_iter().collect::<EngineResult<HashMap<_, _>>>()?;
    let loaded = LoadedAssets {
        shaders: shaders?.into_iter().collect(),
        meshes: meshes?.into_iter().collect(),
        images,
    };
    log::info!(
        "loaded {} shaders, {} meshes, {} textures",
        loaded.shaders.len(),
        loaded.meshes.len(),
        loaded.images.len()
    );
    Ok(loaded)
}

/// GPU handles for a [`LoadedAssets`], by the same asset paths.
#[derive(Debug, Default)]
pub struct AssetHandles {
    pub meshes: HashMap<String, MeshId>,
    pub textures: HashMap<String, TextureId>,
    pub shaders: HashMap<String, String>,
}

impl AssetHandles {
    pub fn mesh(&self, path: &str) -> EngineResult<MeshId> {
        self.meshes
            .get(path)
            .copied()
            .ok_or_else(|| EngineError::MissingAsset(path.to_string()))
    }

    pub fn texture(&self, path: &str) -> EngineResult<TextureId> {
        self.textures
            .get(path)
            .copied()
            .ok_or_else(|| EngineError::MissingAsset(path.to_string()))
    }

    pub fn shader(&self, path: &str) -> EngineResult<&str> {
        self.shaders
            .get(path)
            .map(String::as_str)
            .ok_or_else(|| EngineError::MissingAsset(path.to_string()))
    }
}
