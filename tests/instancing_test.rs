use grove_ngin::{
    camera::InputState,
    data_structures::{
        instance::Transform,
        instance_group::{DrawPath, GroupKey},
        material::Material,
        node::Node,
        scene::Scene,
    },
    pipelines::ProgramDesc,
};

use crate::common::test_utils::{RecordingContext, camera, handle};

mod common;

fn at(x: f32, z: f32) -> Transform {
    Transform::from(cgmath::Vector3::new(x, 0.0, z))
}

#[test]
fn fifty_nodes_become_one_instanced_draw() {
    let mut ctx = RecordingContext::new();
    let lit = ctx.add_program(&ProgramDesc::lit("shaders/lit.wgsl"));
    let bark = ctx.add_material(Material::new("bark").with_roughness(0.8));
    let mesh = handle(3);

    let mut scene = Scene::new(camera(), lit);
    for i in 0..50 {
        scene.add(Node::new(mesh, Some(bark), at(i as f32, -(i as f32))));
    }
    assert_eq!(scene.groups().len(), 1);

    let summary = scene.render(&mut ctx);
    assert_eq!(summary.groups, vec![DrawPath::Instanced]);
    assert_eq!(ctx.draws.len(), 1);
    assert_eq!(ctx.draws[0].instances, Some(50));
    assert_eq!(ctx.draws[0].mesh, mesh);

    let layout = ctx.layout(lit).clone();
    assert_eq!(
        ctx.draws[0].read(&layout, "uRoughness"),
        Some([0.8, 0.0, 0.0, 0.0])
    );
}

#[test]
fn instance_data_is_uploaded_only_when_it_changes() {
    let mut ctx = RecordingContext::new();
    let lit = ctx.add_program(&ProgramDesc::lit("shaders/lit.wgsl"));
    let mut scene = Scene::new(camera(), lit);
    let ids: Vec<_> = (0..4)
        .map(|i| scene.add(Node::new(handle(1), None, at(i as f32, 0.0))))
        .collect();

    scene.render(&mut ctx);
    scene.render(&mut ctx);
    assert_eq!(ctx.uploads, 1);

    assert!(scene.set_transform(ids[2], at(9.0, 9.0)));
    scene.render(&mut ctx);
    assert_eq!(ctx.uploads, 2);
}

#[test]
fn groups_split_by_handle_not_by_contents() {
    let mut ctx = RecordingContext::new();
    let lit = ctx.add_program(&ProgramDesc::lit("shaders/lit.wgsl"));
    let a = ctx.add_material(Material::new("same"));
    let b = ctx.add_material(Material::new("same"));
    let mut scene = Scene::new(camera(), lit);
    for i in 0..3 {
        scene.add(Node::new(handle(1), Some(a), at(i as f32, 0.0)));
        scene.add(Node::new(handle(1), Some(b), at(i as f32, 2.0)));
    }

    scene.render(&mut ctx);
    let counts: Vec<_> = ctx.draws.iter().map(|d| d.instances).collect();
    assert_eq!(counts, vec![Some(3), Some(3)]);
}

#[test]
fn removing_every_node_drops_the_group() {
    let mut ctx = RecordingContext::new();
    let lit = ctx.add_program(&ProgramDesc::lit("shaders/lit.wgsl"));
    let mut scene = Scene::new(camera(), lit);
    let keep = scene.add(Node::new(handle(7), None, at(0.0, 0.0)));
    let added: Vec<_> = (0..10)
        .map(|i| scene.add(Node::new(handle(1), None, at(i as f32, 0.0))))
        .collect();
    assert_eq!(scene.instance_count(), 11);

    for id in added {
        assert!(scene.remove(id).is_some());
    }
    assert_eq!(scene.instance_count(), 1);
    assert!(scene.group(GroupKey { mesh: handle(1), material: None }).is_none());
    assert!(scene.node(keep).is_some());

    scene.render(&mut ctx);
    assert_eq!(ctx.draws.len(), 1);
    assert_eq!(ctx.draws[0].mesh, handle(7));
}

#[test]
fn programs_without_instance_inputs_draw_per_node() {
    let mut ctx = RecordingContext::new();
    let single = ctx.add_program(&ProgramDesc::lit_single("shaders/lit_single.wgsl"));
    let mut scene = Scene::new(camera(), single);
    for i in 0..5 {
        scene.add(Node::new(handle(1), None, at(i as f32, 0.0)));
    }

    let summary = scene.render(&mut ctx);
    assert_eq!(summary.groups, vec![DrawPath::PerNode(5)]);
    assert_eq!(ctx.draws.len(), 5);
    assert!(ctx.draws.iter().all(|d| d.instances.is_none()));

    // each draw carries its own model matrix, translation sits in column 3
    let layout = ctx.layout(single).clone();
    let slot = layout.slot("uModel").map(|s| s.offset).unwrap_or_default();
    for (i, draw) in ctx.draws.iter().enumerate() {
        let bytes = &draw.uniforms.bytes()[slot + 48..slot + 64];
        let column: [f32; 4] = bytemuck::pod_read_unaligned(bytes);
        assert_eq!(column, [i as f32, 0.0, 0.0, 1.0]);
    }

    // the warning is once per group, drawing continues every frame
    ctx.clear();
    assert_eq!(scene.render(&mut ctx).groups, vec![DrawPath::PerNode(5)]);
}

#[test]
fn unknown_program_skips_the_group() {
    let mut ctx = RecordingContext::new();
    let mut scene = Scene::new(camera(), handle(40));
    scene.add(Node::new(handle(1), None, at(0.0, 0.0)));
    let summary = scene.render(&mut ctx);
    assert_eq!(summary.groups, vec![DrawPath::Skipped]);
    assert!(ctx.draws.is_empty());
}

#[test]
fn moving_nodes_are_integrated_before_drawing() {
    let mut ctx = RecordingContext::new();
    let single = ctx.add_program(&ProgramDesc::lit_single("shaders/lit_single.wgsl"));
    let mut scene = Scene::new(camera(), single);
    let id = scene.add(
        Node::new(handle(1), None, at(0.0, 0.0)).with_velocity(cgmath::Vector3::new(2.0, 0.0, 0.0)),
    );
    scene.update(0.5, &mut InputState::default());

    let position = scene.node(id).map(|n| n.transform.position.x);
    assert_eq!(position, Some(1.0));

    scene.render(&mut ctx);
    let model = scene.node(id).map(|n| n.to_raw().model).expect("node is alive");
    let layout = ctx.layout(single).clone();
    let offset = layout.slot("uModel").map(|s| s.offset).unwrap_or_default();
    let recorded: [[f32; 4]; 4] =
        bytemuck::pod_read_unaligned(&ctx.draws[0].uniforms.bytes()[offset..offset + 64]);
    assert_eq!(recorded, model);
}
