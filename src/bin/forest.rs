use grove_ngin::{context::EngineConfig, flow, forest};

fn main() -> anyhow::Result<()> {
    flow::run("grove", EngineConfig::default(), Box::new(forest::setup))
}
