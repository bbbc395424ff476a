use grove_ngin::{
    camera::InputState,
    data_structures::{
        billboard::{Billboard, FireBillboard, SpriteAnimation},
        instance::Transform,
        material::{self, Material},
        node::Node,
        scene::{MAX_POINT_LIGHTS, PointLight, Scene},
        skybox::Skybox,
    },
    pipelines::ProgramDesc,
};

use crate::common::test_utils::{RecordingContext, camera, handle};

mod common;

fn light(x: f32) -> PointLight {
    PointLight::new(cgmath::Vector3::new(x, 1.0, 0.0), [1.0, 0.5, 0.25], 2.0)
}

#[test]
fn sixteen_light_slots_never_keep_stale_values() {
    let mut ctx = RecordingContext::new();
    let lit = ctx.add_program(&ProgramDesc::lit("shaders/lit.wgsl"));
    let mut scene = Scene::new(camera(), lit);
    scene.add(Node::new(handle(1), None, Transform::new()));
    let lights: Vec<_> = (0..3).map(|i| scene.add_light(light(i as f32))).collect();

    scene.render(&mut ctx);
    let layout = ctx.layout(lit).clone();
    assert_eq!(
        ctx.draws[0].read(&layout, "uPointLightCount"),
        Some([3.0, 0.0, 0.0, 0.0])
    );
    assert_eq!(
        ctx.draws[0].read(&layout, "uPointLightColors[2]"),
        Some([1.0, 0.5, 0.25, 2.0])
    );

    scene.remove_light(lights[0]);
    scene.remove_light(lights[2]);
    ctx.clear();
    scene.render(&mut ctx);

    let draw = &ctx.draws[0];
    assert_eq!(draw.read(&layout, "uPointLightCount"), Some([1.0, 0.0, 0.0, 0.0]));
    assert_eq!(
        draw.read(&layout, "uPointLightPositions[0]"),
        Some([1.0, 1.0, 0.0, 1.0])
    );
    for i in 1..MAX_POINT_LIGHTS {
        for name in ["uPointLightPositions", "uPointLightColors", "uPointLightAttenuation"] {
            let slot = format!("{name}[{i}]");
            assert_eq!(draw.read(&layout, &slot), Some([0.0; 4]), "{slot}");
        }
    }
}

#[test]
fn every_light_slot_is_written_for_any_light_count() {
    for count in [0usize, 20] {
        let mut ctx = RecordingContext::new();
        let lit = ctx.add_program(&ProgramDesc::lit("shaders/lit.wgsl"));
        let mut scene = Scene::new(camera(), lit);
        scene.add(Node::new(handle(1), None, Transform::new()));
        for i in 0..count {
            scene.add_light(light(i as f32 + 1.0));
        }

        scene.render(&mut ctx);
        let layout = ctx.layout(lit).clone();
        let draw = &ctx.draws[0];
        let expected = count.min(MAX_POINT_LIGHTS);
        assert_eq!(
            draw.read(&layout, "uPointLightCount"),
            Some([expected as f32, 0.0, 0.0, 0.0])
        );
        for i in 0..MAX_POINT_LIGHTS {
            let position = draw.read(&layout, &format!("uPointLightPositions[{i}]"));
            if i < expected {
                assert_eq!(position, Some([i as f32 + 1.0, 1.0, 0.0, 1.0]), "{count} lights, slot {i}");
            } else {
                assert_eq!(position, Some([0.0; 4]), "{count} lights, slot {i}");
            }
        }
    }
}

#[test]
fn attenuation_reaches_the_shader() {
    let mut ctx = RecordingContext::new();
    let lit = ctx.add_program(&ProgramDesc::lit("shaders/lit.wgsl"));
    let mut scene = Scene::new(camera(), lit);
    scene.add(Node::new(handle(1), None, Transform::new()));
    scene.add_light(light(0.0).with_attenuation(1.0, 0.22, 0.2));

    scene.render(&mut ctx);
    let layout = ctx.layout(lit).clone();
    assert_eq!(
        ctx.draws[0].read(&layout, "uPointLightAttenuation[0]"),
        Some([1.0, 0.22, 0.2, 0.0])
    );
}

#[test]
fn fog_and_ambient_are_shared_by_every_program() {
    let mut ctx = RecordingContext::new();
    let lit = ctx.add_program(&ProgramDesc::lit("shaders/lit.wgsl"));
    let foliage = ctx.add_program(&ProgramDesc::foliage("shaders/foliage.wgsl"));
    let leaf = ctx.add_material(Material::new("leaf").with_alpha_cutoff(0.3));
    let mut scene = Scene::new(camera(), lit);
    scene.set_material_program(leaf, foliage);
    scene.fog.color = [0.1, 0.2, 0.3];
    scene.fog.start = 5.0;
    scene.ambient = [0.4, 0.4, 0.4];
    scene.add(Node::new(handle(1), None, Transform::new()));
    scene.add(Node::new(handle(2), Some(leaf), Transform::new()));

    scene.render(&mut ctx);
    assert_eq!(ctx.labels(), vec!["lit", "foliage"]);
    for draw in &ctx.draws {
        let layout = ctx.layout(draw.program);
        assert_eq!(draw.read(layout, "uFogColor"), Some([0.1, 0.2, 0.3, 0.0]));
        assert_eq!(draw.read(layout, "uFogStart"), Some([5.0, 0.0, 0.0, 0.0]));
        assert_eq!(draw.read(layout, "uAmbientColor"), Some([0.4, 0.4, 0.4, 0.0]));
    }
    let foliage_layout = ctx.layout(foliage);
    assert_eq!(
        ctx.draws[1].read(foliage_layout, "uAlphaCutoff"),
        Some([0.3, 0.0, 0.0, 0.0])
    );
}

#[test]
fn sky_then_groups_then_billboards() {
    let mut ctx = RecordingContext::new();
    let lit = ctx.add_program(&ProgramDesc::lit("shaders/lit.wgsl"));
    let sky = ctx.add_program(&ProgramDesc::sky("shaders/sky.wgsl"));
    let sprites = ctx.add_program(&ProgramDesc::billboard("shaders/billboard.wgsl"));
    let (fullscreen, quad) = (handle(20), handle(21));

    let mut scene = Scene::new(camera(), lit).with_skybox(Skybox::default().with_renderer(sky, fullscreen));
    scene.set_billboard_renderer(sprites, quad);
    let fire_light = scene.add_light(light(0.0));
    scene.add_fire(
        FireBillboard::new(Billboard::new(cgmath::Vector3::new(0.0, 0.5, 0.0), [1.0, 1.5]), 2.0)
            .with_light(fire_light),
    );
    scene.add_billboard(
        Billboard::new(cgmath::Vector3::new(3.0, 1.0, 0.0), [0.5, 0.5])
            .with_texture(handle(9))
            .with_sprite(SpriteAnimation::new(4, 4, 12.0)),
    );
    scene.add(Node::new(handle(1), None, Transform::new()));
    scene.add(Node::new(handle(2), None, Transform::new()));

    let summary = scene.render(&mut ctx);
    assert!(summary.sky);
    assert_eq!(summary.billboards, 2);
    assert_eq!(ctx.labels(), vec!["sky", "lit", "lit", "billboard", "billboard"]);
    assert_eq!(ctx.draws[0].mesh, fullscreen);
    // plain billboards come before fires
    assert_eq!(
        ctx.draws[3].textures.get(material::ALBEDO_MAP),
        Some(&handle(9))
    );
    assert!(ctx.draws[4].textures.is_empty());
}

#[test]
fn sky_drives_the_main_light() {
    let mut ctx = RecordingContext::new();
    let lit = ctx.add_program(&ProgramDesc::lit("shaders/lit.wgsl"));
    let mut sky = Skybox::default();
    sky.set_cycle_time(0.5);
    let mut scene = Scene::new(camera(), lit).with_skybox(sky);
    scene.add(Node::new(handle(1), None, Transform::new()));

    scene.render(&mut ctx);
    let layout = ctx.layout(lit).clone();
    let noon = ctx.draws[0].read(&layout, "uLightDirection").unwrap_or_default();
    assert!(noon[1] > 0.99, "{noon:?}");

    if let Some(sky) = &mut scene.skybox {
        sky.set_cycle_time(0.0);
    }
    ctx.clear();
    scene.render(&mut ctx);
    let midnight = ctx.draws[0].read(&layout, "uLightDirection").unwrap_or_default();
    // the moon never drops below its minimum height
    assert!(midnight[1] >= 0.2 - 1e-4, "{midnight:?}");
}

#[test]
fn fire_flicker_shows_up_in_the_light_slot() {
    let mut ctx = RecordingContext::new();
    let lit = ctx.add_program(&ProgramDesc::lit("shaders/lit.wgsl"));
    let mut scene = Scene::new(camera(), lit);
    scene.add(Node::new(handle(1), None, Transform::new()));
    let id = scene.add_light(light(0.0));
    let fire = FireBillboard::new(Billboard::new(cgmath::Vector3::new(0.0, 0.5, 0.0), [1.0, 1.5]), 3.0)
        .with_light(id);
    let expected = fire.intensity_at(0.25);
    scene.add_fire(fire);

    scene.update(0.25, &mut InputState::default());
    scene.render(&mut ctx);
    let layout = ctx.layout(lit).clone();
    let color = ctx.draws[0].read(&layout, "uPointLightColors[0]").unwrap_or_default();
    assert!((color[3] - expected).abs() < 1e-5);
    assert!(
        ctx.draws[0].read(&layout, "uTime").map(|t| t[0]) == Some(0.25),
        "scene time is uploaded"
    );
}
