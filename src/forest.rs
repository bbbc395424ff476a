//! The reference scene: a clearing in a procedural forest with a campfire,
//! under the day-night sky.

use std::pin::Pin;

use crate::{
    camera::{Camera, CameraConfig},
    context::Engine,
    data_structures::{
        billboard::{Billboard, FireBillboard, SpriteAnimation},
        instance::Transform,
        material::Material,
        mesh::MeshData,
        node::Node,
        scene::{PointLight, Scene},
        skybox::Skybox,
        terrain::{Terrain, TerrainParams},
    },
    error::{EngineError, EngineResult},
    flow::RenderFn,
    pipelines::ProgramDesc,
    render::FrameStats,
    resources::{AssetManifest, LoadedAssets, load_assets},
    spawner::{LeafConfig, SpawnerConfig, TreeAssets, TreeSpawner},
};

pub const LIT_SHADER: &str = "shaders/lit.wgsl";
pub const FOLIAGE_SHADER: &str = "shaders/foliage.wgsl";
pub const SKY_SHADER: &str = "shaders/sky.wgsl";
pub const BILLBOARD_SHADER: &str = "shaders/billboard.wgsl";
pub const TRUNK_MESH: &str = "models/trunk.obj";

const FIRE_POSITION: [f32; 3] = [0.0, 0.0, 0.0];

pub fn manifest() -> AssetManifest {
    AssetManifest::new()
        .shader(LIT_SHADER)
        .shader(FOLIAGE_SHADER)
        .shader(SKY_SHADER)
        .shader(BILLBOARD_SHADER)
        .mesh(TRUNK_MESH)
}

/// Loads every asset, then builds the scene. Usable as a [`crate::flow::SetupFn`].
pub fn setup(
    engine: Engine,
) -> Pin<Box<dyn Future<Output = EngineResult<(Engine, RenderFn)>>>> {
    Box::pin(async move {
        let assets = load_assets(&manifest()).await?;
        build(engine, assets)
    })
}

/// Synchronous half of [`setup`].
pub fn build(mut engine: Engine, assets: LoadedAssets) -> EngineResult<(Engine, RenderFn)> {
    let handles = engine.upload(assets);
    let lit = engine.add_program(&ProgramDesc::lit(LIT_SHADER), handles.shader(LIT_SHADER)?)?;
    let foliage = engine.add_program(
        &ProgramDesc::foliage(FOLIAGE_SHADER),
        handles.shader(FOLIAGE_SHADER)?,
    )?;
    let sky = engine.add_program(&ProgramDesc::sky(SKY_SHADER), handles.shader(SKY_SHADER)?)?;
    let billboard = engine.add_program(
        &ProgramDesc::billboard(BILLBOARD_SHADER),
        handles.shader(BILLBOARD_SHADER)?,
    )?;

    let terrain = Terrain::new(TerrainParams {
        origin: [FIRE_POSITION[0], FIRE_POSITION[2]],
        ..Default::default()
    });
    let ground = engine.add_mesh(terrain.generate_mesh());
    let quad = engine.add_mesh(MeshData::quad());
    let trunk = handles.mesh(TRUNK_MESH)?;
    let trunk_data = engine
        .resources
        .meshes
        .get(trunk)
        .map(|mesh| mesh.data.clone())
        .ok_or_else(|| EngineError::MissingAsset(TRUNK_MESH.to_string()))?;

    let ground_material = engine.add_material(
        Material::new("ground")
            .with_color([0.32, 0.42, 0.2])
            .with_roughness(0.9)
            .with_tiling(40.0, 40.0),
    );
    let bark = engine.add_material(
        Material::new("bark")
            .with_color([0.36, 0.25, 0.16])
            .with_roughness(0.8),
    );
    let leaf = engine.add_material(
        Material::new("leaf")
            .with_color([0.22, 0.48, 0.16])
            .with_roughness(0.6)
            .with_alpha_cutoff(0.3),
    );

    let eye_z = 14.0;
    let eye_y = terrain.height(0.0, eye_z) + 2.0;
    let camera = Camera::new(
        cgmath::Point3::new(0.0, eye_y, eye_z),
        cgmath::Point3::new(0.0, 1.0, 0.0),
        engine.aspect(),
        CameraConfig::default(),
    );
    let mut scene = Scene::new(camera, lit)
        .with_skybox(Skybox::default().with_renderer(sky, engine.fullscreen_mesh()));
    scene.set_material_program(leaf, foliage);
    scene.set_billboard_renderer(billboard, quad);
    scene.add(Node::new(ground, Some(ground_material), Transform::new()).into_static());

    let mut spawner = TreeSpawner::new(SpawnerConfig {
        fire_position: [FIRE_POSITION[0], FIRE_POSITION[2]],
        ..Default::default()
    });
    spawner.spawn(
        &mut scene,
        &terrain,
        TreeAssets {
            trunk_mesh: trunk,
            trunk_data: &trunk_data,
            trunk_material: Some(bark),
            leaf_mesh: quad,
            leaf_material: Some(leaf),
        },
        &LeafConfig::default(),
    );

    let fire_at = cgmath::Vector3::new(FIRE_POSITION[0], FIRE_POSITION[1] + 0.9, FIRE_POSITION[2]);
    let light = scene.add_light(PointLight::new(fire_at, [1.0, 0.55, 0.2], 3.0));
    scene.add_fire(
        FireBillboard::new(
            Billboard::new(fire_at, [1.2, 1.8])
                .with_color([1.0, 0.62, 0.25])
                .with_sprite(SpriteAnimation::new(4, 4, 12.0)),
            3.0,
        )
        .with_light(light),
    );
    log::info!("forest scene ready: {:?}", scene.stats());

    let day_fog = scene.fog.color;
    let render: RenderFn = Box::new(move |engine, view, dt| {
        engine.update()?;
        scene.update(dt, &mut engine.input);
        scene.camera.set_aspect(engine.aspect());
        if let Some(sky) = &scene.skybox {
            let k = 0.15 + 0.85 * sky.sun_intensity();
            scene.fog.color = day_fog.map(|c| c * k);
        }

        let frame = {
            let mut encoder = engine.begin_frame()?;
            scene.render(&mut encoder);
            encoder.finish()
        };
        let post = engine.present(view);
        Ok(FrameStats {
            draw_calls: frame.draw_calls + post.draw_calls,
            instances: frame.instances + post.instances,
        })
    });
    Ok((engine, render))
}
