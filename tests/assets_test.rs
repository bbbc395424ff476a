use futures::executor::block_on;
use grove_ngin::{
    EngineError, forest,
    resources::{load_assets, mesh::parse_obj, texture::decode_image},
};

const TRIANGLE: &str = "\
v 0 0 0
v 1 0 0
v 0 1 0
vt 0 0
vt 1 0
vt 0 1
f 1/1 2/2 3/3
";

#[test]
fn obj_without_normals_gets_face_normals() {
    let mesh = block_on(parse_obj("triangle.obj", TRIANGLE)).expect("valid obj");
    assert_eq!(mesh.vertex_count(), 3);
    assert_eq!(mesh.indices.len(), 3);
    for v in &mesh.vertices {
        assert_eq!(v.normal, [0.0, 0.0, 1.0]);
    }
    // V is flipped for wgpu's top-left texture origin
    assert_eq!(mesh.vertices[2].tex_coords, [0.0, 0.0]);
    assert_eq!(mesh.vertices[0].tex_coords, [0.0, 1.0]);
}

#[test]
fn quads_are_triangulated() {
    let quad = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";
    let mesh = block_on(parse_obj("quad.obj", quad)).expect("valid obj");
    assert_eq!(mesh.indices.len(), 6);
}

#[test]
fn empty_obj_is_an_error() {
    let err = block_on(parse_obj("empty.obj", "# nothing here\n")).unwrap_err();
    match err {
        EngineError::MeshLoad { path, .. } => assert_eq!(path, "empty.obj"),
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn bundled_trunk_has_leaf_anchors() {
    let text = std::fs::read_to_string("assets/models/trunk.obj").expect("bundled trunk");
    let mesh = block_on(parse_obj(forest::TRUNK_MESH, &text)).expect("trunk parses");
    assert_eq!(mesh.vertex_count(), 144);
    assert_eq!(mesh.indices.len(), 192 * 3);
    assert!(mesh.positions().filter(|p| p.y >= 1.5).count() > 50);
    assert!(mesh.positions().all(|p| p.y >= 0.0));
}

#[test]
fn png_round_trips_through_decode() {
    let image = image::RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255]));
    let mut bytes = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("encode");
    let decoded = decode_image("tiny.png", bytes.get_ref()).expect("decode");
    assert_eq!((decoded.width(), decoded.height()), (4, 2));
    assert_eq!(decoded.to_rgba8().get_pixel(3, 1), &image::Rgba([10, 20, 30, 255]));
}

#[test]
fn garbage_bytes_are_a_texture_error() {
    let err = decode_image("noise.png", &[1, 2, 3, 4]).unwrap_err();
    assert!(matches!(err, EngineError::TextureLoad { .. }));
}

#[test]
fn forest_manifest_resolves() {
    let loaded = block_on(load_assets(&forest::manifest())).expect("bundled assets load");
    assert_eq!(loaded.shaders.len(), 4);
    for source in loaded.shaders.values() {
        assert!(source.contains("fn vs_main"));
        assert!(source.contains("fn fs_main"));
    }
    assert!(loaded.meshes.contains_key(forest::TRUNK_MESH));
}

#[test]
fn missing_files_fail_the_whole_load() {
    let manifest = forest::manifest().shader("shaders/does_not_exist.wgsl");
    let err = block_on(load_assets(&manifest)).unwrap_err();
    assert!(matches!(err, EngineError::ShaderLoad { ref path, .. } if path.ends_with("does_not_exist.wgsl")));
}
