//! Minimal end-to-end export: one textured triangle to `triangle.egg`.
//!
//! Run with `cargo run --example export_triangle` and open the output
//! with Panda3D's `pview`.

use egg_core::scene::{
    MaterialRecord, MemoryScene, MeshData, ObjectData, Polygon, SceneObject, TextureRecord,
    UvLayer,
};
use egg_core::{write_out, ExportConfig};
use egg_math::Vec3;

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let mesh = MeshData {
        vertices: vec![
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.5),
        ],
        vertex_normals: vec![Vec3::new(0.0, -1.0, 0.0); 3],
        polygons: vec![Polygon {
            vertices: vec![0, 1, 2],
            material_index: 0,
            use_smooth: false,
            normal: Vec3::new(0.0, -1.0, 0.0),
        }],
        uv_layers: vec![UvLayer {
            name: "UVMap".to_string(),
            active: true,
            uvs: vec![[0.0, 0.0], [1.0, 0.0], [0.5, 1.0]],
            tangents: None,
        }],
        material_slots: vec![Some("Paint".to_string())],
        ..Default::default()
    };

    let mut scene = MemoryScene::new(vec![SceneObject::new(
        "Triangle",
        ObjectData::Mesh(mesh),
    )]);
    scene.materials = vec![MaterialRecord {
        name: "Paint".to_string(),
        base_color: [0.8, 0.2, 0.1, 1.0],
        shaded: true,
        textures: vec!["paint_diffuse".to_string()],
        ..Default::default()
    }];
    scene.textures = vec![TextureRecord {
        name: "paint_diffuse".to_string(),
        path: "textures/paint.png".to_string(),
        scalars: vec![("format".to_string(), "rgba".to_string())],
        transform: Vec::new(),
    }];

    let config = ExportConfig {
        path: "triangle.egg".into(),
        ..Default::default()
    };

    let tags = write_out(&mut scene, &config);
    if tags.is_empty() {
        log::info!("wrote {}", config.path.display());
    } else {
        for tag in &tags {
            log::error!("export error: {}", tag.as_str());
        }
        std::process::exit(1);
    }
}
