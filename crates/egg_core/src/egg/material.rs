//! `<Material>` and `<Texture>` emission.
//!
//! Only materials and textures a face actually references make it into
//! the header; the scan preserves first-use order so repeated exports
//! of the same scene produce identical files.

use crate::egg::format::{fnum, panda_path, safe_name};
use crate::egg::hierarchy::{Hierarchy, NodeData};
use crate::scene::SceneSource;

/// Material names referenced by any face, in first-use order.
pub fn used_materials(hierarchy: &Hierarchy) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for_each_geometry(hierarchy, |geometry| {
        for face in &geometry.faces {
            if let Some(mref) = &face.mref {
                if !names.contains(mref) {
                    names.push(mref.clone());
                }
            }
        }
    });
    names
}

/// Texture names referenced by any face, in first-use order.
pub fn used_textures(hierarchy: &Hierarchy) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for_each_geometry(hierarchy, |geometry| {
        for face in &geometry.faces {
            for tref in &face.trefs {
                if !names.contains(tref) {
                    names.push(tref.clone());
                }
            }
        }
    });
    names
}

fn for_each_geometry(hierarchy: &Hierarchy, mut f: impl FnMut(&crate::egg::topology::MeshGeometry)) {
    for node in &hierarchy.nodes {
        match &node.data {
            NodeData::Mesh { geometry } | NodeData::Actor { geometry, .. } => f(geometry),
            _ => {}
        }
    }
}

/// `<Material>` blocks for the given names, skipping names the scene
/// cannot resolve.
pub fn material_blocks(source: &dyn SceneSource, names: &[String]) -> String {
    let mut out = String::new();
    for name in names {
        let Some(record) = source.material(name) else {
            continue;
        };
        let [r, g, b, a] = record.base_color;
        out.push_str(&format!("<Material> {} {{\n", safe_name(&record.name)));
        out.push_str(&format!("  <Scalar> baser {{ {} }}\n", fnum(r)));
        out.push_str(&format!("  <Scalar> baseg {{ {} }}\n", fnum(g)));
        out.push_str(&format!("  <Scalar> baseb {{ {} }}\n", fnum(b)));
        // Alpha only carries meaning for node-shader materials.
        if record.shaded {
            out.push_str(&format!("  <Scalar> basea {{ {} }}\n", fnum(a)));
        }
        out.push_str(&format!(
            "  <Scalar> roughness {{ {} }}\n",
            fnum(record.roughness)
        ));
        out.push_str(&format!(
            "  <Scalar> metallic {{ {} }}\n",
            fnum(record.metallic)
        ));
        out.push_str(&format!("  <Scalar> local {{ {} }}\n", fnum(0.0)));
        out.push_str("}\n");
    }
    out
}

/// `<Texture>` blocks for the given names.
pub fn texture_blocks(source: &dyn SceneSource, names: &[String]) -> String {
    let mut out = String::new();
    for name in names {
        let Some(record) = source.textures().iter().find(|t| &t.name == name) else {
            continue;
        };
        out.push_str(&format!("<Texture> {} {{\n", safe_name(&record.name)));
        out.push_str(&format!("  \"{}\"\n", panda_path(&record.path)));
        for (key, value) in &record.scalars {
            out.push_str(&format!("  <Scalar> {} {{ {} }}\n", key, value));
        }
        if !record.transform.is_empty() {
            out.push_str("  <Transform> {\n");
            for (kind, values) in &record.transform {
                let cells: Vec<String> = values.iter().map(|v| fnum(*v)).collect();
                out.push_str(&format!("    <{}> {{ {} }}\n", kind, cells.join(" ")));
            }
            out.push_str("  }\n");
        }
        out.push_str("}\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportConfig;
    use crate::scene::{
        MaterialRecord, MemoryScene, MeshData, ObjectData, Polygon, SceneObject, TextureRecord,
    };
    use egg_math::Vec3;

    fn textured_scene() -> MemoryScene {
        let mesh = MeshData {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vertex_normals: vec![Vec3::Z; 3],
            polygons: vec![
                Polygon {
                    vertices: vec![0, 1, 2],
                    material_index: 1,
                    use_smooth: false,
                    normal: Vec3::Z,
                },
                Polygon {
                    vertices: vec![2, 1, 0],
                    material_index: 0,
                    use_smooth: false,
                    normal: -Vec3::Z,
                },
            ],
            material_slots: vec![Some("Stone".to_string()), Some("Wood".to_string())],
            ..Default::default()
        };
        let obj = SceneObject::new("Crate", ObjectData::Mesh(mesh));
        let mut scene = MemoryScene::new(vec![obj]);
        scene.materials = vec![
            MaterialRecord {
                name: "Stone".to_string(),
                ..Default::default()
            },
            MaterialRecord {
                name: "Wood".to_string(),
                shaded: true,
                textures: vec!["wood_diffuse".to_string()],
                ..Default::default()
            },
        ];
        scene.textures = vec![TextureRecord {
            name: "wood_diffuse".to_string(),
            path: "C:\\tex\\wood.png".to_string(),
            scalars: vec![("format".to_string(), "rgba".to_string())],
            transform: vec![("Scale".to_string(), vec![2.0, 2.0])],
        }];
        scene
    }

    #[test]
    fn test_first_use_order() {
        let scene = textured_scene();
        let h = Hierarchy::build(&scene, &ExportConfig::default()).unwrap();
        // Face 0 uses slot 1 (Wood), face 1 uses slot 0 (Stone).
        assert_eq!(used_materials(&h), vec!["Wood", "Stone"]);
        assert_eq!(used_textures(&h), vec!["wood_diffuse"]);
    }

    #[test]
    fn test_material_block_scalars() {
        let scene = textured_scene();
        let block = material_blocks(&scene, &["Stone".to_string(), "Wood".to_string()]);

        assert!(block.contains("<Material> Stone {"));
        assert!(block.contains("  <Scalar> baser { 0.500000 }"));
        assert!(block.contains("  <Scalar> roughness { 0.500000 }"));
        assert!(block.contains("  <Scalar> metallic { 0.000000 }"));
        assert!(block.contains("  <Scalar> local { 0.000000 }"));

        // Alpha appears only on the node-shader material.
        let stone = &block[..block.find("<Material> Wood").unwrap()];
        assert!(!stone.contains("basea"));
        assert!(block.contains("<Material> Wood {"));
        assert!(block[block.find("<Material> Wood").unwrap()..].contains("basea"));
    }

    #[test]
    fn test_texture_block_path_and_transform() {
        let scene = textured_scene();
        let block = texture_blocks(&scene, &["wood_diffuse".to_string()]);

        assert!(block.contains("<Texture> wood_diffuse {"));
        assert!(block.contains("  \"/c/tex/wood.png\"\n"));
        assert!(block.contains("  <Scalar> format { rgba }"));
        assert!(block.contains("    <Scale> { 2.000000 2.000000 }"));
    }

    #[test]
    fn test_unresolvable_names_are_skipped() {
        let scene = textured_scene();
        let block = material_blocks(&scene, &["Ghost".to_string()]);
        assert!(block.is_empty());
    }
}
