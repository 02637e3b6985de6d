//! Shared-vertex to per-corner topology conversion.
//!
//! Hosts store meshes with vertices shared between faces; the egg format
//! wants one vertex row per (face, vertex-in-face) pair so UVs and
//! shading split correctly at seams. This module fans the shared data
//! out into that corner stream and produces the face index tables that
//! reference it. The corner index assigned here is the one and only
//! index space used downstream - polygons, UV lookups, and skinning
//! references all speak corner indices, never shared-vertex ids.

use std::collections::HashSet;

use egg_math::{Aabb, Mat4Ext, Vec3};
use thiserror::Error;

use crate::config::ExportConfig;
use crate::egg::format::{fnum, fvec3, safe_name, transform_block};
use crate::scene::{MaterialRecord, MeshData, SceneObject, SceneSource};

/// Errors raised while converting one mesh. Any of these aborts the
/// node's construction and, with it, the whole export.
#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("polygon {face} references vertex {vertex}, mesh has {count} vertices")]
    VertexOutOfRange { face: usize, vertex: u32, count: usize },

    #[error("mesh has {got} vertex normals for {expected} vertices")]
    NormalCountMismatch { got: usize, expected: usize },

    #[error("UV layer '{layer}' has {got} corners, mesh has {expected}")]
    UvLayerMismatch { layer: String, got: usize, expected: usize },

    #[error("color layer has {got} corners, mesh has {expected}")]
    ColorLayerMismatch { got: usize, expected: usize },

    #[error("mesh has {got} loop normals for {expected} corners")]
    LoopNormalsMismatch { got: usize, expected: usize },

    #[error("shape key '{key}' has {got} positions, mesh has {expected} vertices")]
    ShapeKeyMismatch { key: String, got: usize, expected: usize },

    #[error("vertex {vertex} references vertex group {group}, mesh has {count} groups")]
    UnknownVertexGroup { vertex: u32, group: u32, count: usize },
}

/// One UV sample on a corner.
#[derive(Debug, Clone)]
pub struct CornerUv {
    /// Channel name; empty means the default (active) layer.
    pub name: String,
    pub uv: [f32; 2],
    pub tangent: Option<(Vec3, Vec3)>,
}

/// One row of the expanded vertex stream.
#[derive(Debug, Clone)]
pub struct VertexCorner {
    /// World-space position.
    pub position: Vec3,

    /// Smooth normal; absent for corners shaded flat.
    pub normal: Option<Vec3>,

    pub color: Option<[f32; 4]>,
    pub uvs: Vec<CornerUv>,

    /// Named morph-target offsets, world-oriented.
    pub morphs: Vec<(String, Vec3)>,
}

/// One face of the emitted polygon table.
#[derive(Debug, Clone)]
pub struct FaceRecord {
    /// Corner indices, in face order.
    pub corners: Vec<u32>,

    /// Texture references, in material use order.
    pub trefs: Vec<String>,

    /// Resolved material name, if the slot resolved.
    pub mref: Option<String>,

    /// World-oriented face normal, always emitted.
    pub normal: Vec3,

    /// Emit a `<BFace>` override (material does not cull backfaces).
    pub bface: bool,
}

/// Fully converted geometry for one mesh object.
#[derive(Debug, Clone)]
pub struct MeshGeometry {
    /// Vertex pool name (the object name).
    pub pool_name: String,
    pub corners: Vec<VertexCorner>,
    pub faces: Vec<FaceRecord>,
}

/// How a face's material slot resolved.
enum SlotResolve<'a> {
    /// Material index outside the slot table.
    OutOfRange,
    /// Slot exists but holds no material.
    Empty,
    Material(&'a MaterialRecord),
}

fn resolve_slot<'a>(
    mesh: &'a MeshData,
    source: &'a dyn SceneSource,
    material_index: usize,
) -> SlotResolve<'a> {
    match mesh.material_slots.get(material_index) {
        None => SlotResolve::OutOfRange,
        Some(None) => SlotResolve::Empty,
        Some(Some(name)) => match source.material(name) {
            Some(record) => SlotResolve::Material(record),
            None => SlotResolve::Empty,
        },
    }
}

/// Convert one mesh into its corner stream and face table.
pub fn convert(
    obj: &SceneObject,
    mesh: &MeshData,
    source: &dyn SceneSource,
    config: &ExportConfig,
) -> Result<MeshGeometry, GeometryError> {
    let vertex_count = mesh.vertices.len();
    let corner_count = mesh.corner_count();

    for (face_index, poly) in mesh.polygons.iter().enumerate() {
        for &v in &poly.vertices {
            if v as usize >= vertex_count {
                return Err(GeometryError::VertexOutOfRange {
                    face: face_index,
                    vertex: v,
                    count: vertex_count,
                });
            }
        }
    }
    if mesh.vertex_normals.len() != vertex_count {
        return Err(GeometryError::NormalCountMismatch {
            got: mesh.vertex_normals.len(),
            expected: vertex_count,
        });
    }
    for layer in &mesh.uv_layers {
        if layer.uvs.len() != corner_count {
            return Err(GeometryError::UvLayerMismatch {
                layer: layer.name.clone(),
                got: layer.uvs.len(),
                expected: corner_count,
            });
        }
    }
    if let Some(colors) = &mesh.colors {
        if colors.len() != corner_count {
            return Err(GeometryError::ColorLayerMismatch {
                got: colors.len(),
                expected: corner_count,
            });
        }
    }
    if let Some(loops) = &mesh.loop_normals {
        if loops.len() != corner_count {
            return Err(GeometryError::LoopNormalsMismatch {
                got: loops.len(),
                expected: corner_count,
            });
        }
    }
    for key in &mesh.shape_keys {
        if key.positions.len() != vertex_count {
            return Err(GeometryError::ShapeKeyMismatch {
                key: key.name.clone(),
                got: key.positions.len(),
                expected: vertex_count,
            });
        }
    }

    // First corner index of each face.
    let mut face_starts = Vec::with_capacity(mesh.polygons.len());
    let mut next = 0u32;
    for poly in &mesh.polygons {
        face_starts.push(next);
        next += poly.vertices.len() as u32;
    }

    let smooth_corners = smooth_corner_set(mesh, &face_starts);

    // Shaded materials keep explicit UV channel names; only then does
    // the active layer collapse to the default (unnamed) channel.
    let uses_nodes = mesh.polygons.iter().any(|poly| {
        matches!(
            resolve_slot(mesh, source, poly.material_index),
            SlotResolve::Material(record) if record.shaded
        )
    });
    let active_uv: Option<&str> = if uses_nodes {
        None
    } else {
        mesh.uv_layers
            .iter()
            .find(|l| l.active)
            .map(|l| l.name.as_str())
    };

    // Any shaded slot material forces white vertex colors when the mesh
    // has no color layer at all. Not symmetric with the material-less
    // fallback; see DESIGN.md.
    let shaded_slot_material = mesh
        .material_slots
        .iter()
        .flatten()
        .filter_map(|name| source.material(name))
        .any(|record| record.shaded);

    let orco = if config.export_orco {
        Some(orco_layer(mesh))
    } else {
        None
    };

    let world = obj.matrix_world;
    let mut corners = Vec::with_capacity(corner_count);
    let mut faces = Vec::with_capacity(mesh.polygons.len());
    let mut corner_index = 0u32;

    for poly in &mesh.polygons {
        let slot = resolve_slot(mesh, source, poly.material_index);

        for &v in &poly.vertices {
            let vi = v as usize;
            let position = world.transform_point3(mesh.vertices[vi]);

            let mut morphs = Vec::new();
            for key in mesh.shape_keys.iter().skip(1) {
                let delta = world.transform_vector3(key.positions[vi] - mesh.vertices[vi]);
                if delta.length() > 1e-6 {
                    morphs.push((key.name.clone(), delta));
                }
            }

            let normal = if smooth_corners.contains(&corner_index) {
                let object_normal = match (&mesh.loop_normals, config.use_loop_normals) {
                    (Some(loops), true) => loops[corner_index as usize],
                    _ => mesh.vertex_normals[vi],
                };
                Some(world.rotate_vector3(object_normal))
            } else {
                None
            };

            let color = corner_color(
                mesh,
                &slot,
                shaded_slot_material,
                corner_index,
                config.force_export_vertex_colors,
            );

            let mut uvs = Vec::with_capacity(mesh.uv_layers.len() + 1);
            for layer in &mesh.uv_layers {
                let name = if active_uv == Some(layer.name.as_str()) {
                    String::new()
                } else {
                    layer.name.clone()
                };
                let tangent = if config.calc_tangents {
                    layer
                        .tangents
                        .as_ref()
                        .map(|t| t[corner_index as usize])
                } else {
                    None
                };
                uvs.push(CornerUv {
                    name,
                    uv: layer.uvs[corner_index as usize],
                    tangent,
                });
            }
            if let Some(orco) = &orco {
                let o = orco[vi];
                uvs.push(CornerUv {
                    name: "ORCO".to_string(),
                    uv: [o.x, o.y],
                    tangent: None,
                });
            }

            corners.push(VertexCorner {
                position,
                normal,
                color,
                uvs,
                morphs,
            });
            corner_index += 1;
        }

        let (mref, trefs, bface) = match &slot {
            SlotResolve::Material(record) => {
                let trefs = record
                    .textures
                    .iter()
                    .filter(|t| source.textures().iter().any(|rec| &rec.name == *t))
                    .cloned()
                    .collect();
                (
                    Some(record.name.clone()),
                    trefs,
                    !record.use_backface_culling,
                )
            }
            _ => (None, Vec::new(), false),
        };

        let start = face_starts[faces.len()];
        faces.push(FaceRecord {
            corners: (start..start + poly.vertices.len() as u32).collect(),
            trefs,
            mref,
            normal: world.rotate_vector3(poly.normal),
            bface,
        });
    }

    log::debug!(
        "converted mesh '{}': {} corners, {} faces",
        obj.name,
        corners.len(),
        faces.len()
    );

    Ok(MeshGeometry {
        pool_name: obj.name.clone(),
        corners,
        faces,
    })
}

/// Corners that take a vertex normal.
///
/// A corner is smooth when its face is marked smooth. With sharp-edge
/// data present, corners touching an explicitly sharp edge drop back to
/// flat shading.
fn smooth_corner_set(mesh: &MeshData, face_starts: &[u32]) -> HashSet<u32> {
    let mut smooth = HashSet::new();
    for (face_index, poly) in mesh.polygons.iter().enumerate() {
        if poly.use_smooth {
            let start = face_starts[face_index];
            for offset in 0..poly.vertices.len() as u32 {
                smooth.insert(start + offset);
            }
        }
    }

    if mesh.auto_smooth && !mesh.sharp_edges.is_empty() {
        let sharp: HashSet<(u32, u32)> = mesh.sharp_edges.iter().copied().collect();
        for (face_index, poly) in mesh.polygons.iter().enumerate() {
            let n = poly.vertices.len();
            for i in 0..n {
                let a = poly.vertices[i];
                let b = poly.vertices[(i + 1) % n];
                let edge = (a.min(b), a.max(b));
                if !sharp.contains(&edge) {
                    continue;
                }
                for endpoint in [a, b] {
                    if let Some(pos) = poly.vertices.iter().position(|&v| v == endpoint) {
                        smooth.remove(&(face_starts[face_index] + pos as u32));
                    }
                }
            }
        }
    }
    smooth
}

fn corner_color(
    mesh: &MeshData,
    slot: &SlotResolve,
    shaded_slot_material: bool,
    corner_index: u32,
    force: bool,
) -> Option<[f32; 4]> {
    match &mesh.colors {
        Some(colors) => match slot {
            // Material resolution failed outright: emit unconditionally.
            SlotResolve::OutOfRange => Some(colors[corner_index as usize]),
            SlotResolve::Material(_) => Some(colors[corner_index as usize]),
            SlotResolve::Empty => {
                if force {
                    Some(colors[corner_index as usize])
                } else {
                    None
                }
            }
        },
        // No color layer: a node-shader material still expects a vertex
        // color column, so feed it white.
        None => {
            if shaded_slot_material {
                Some([1.0, 1.0, 1.0, 1.0])
            } else {
                None
            }
        }
    }
}

/// Object-relative normalized coordinates, one per shared vertex.
fn orco_layer(mesh: &MeshData) -> Vec<Vec3> {
    let bounds = Aabb::from_point_cloud(&mesh.vertices);
    if bounds.is_empty() {
        return Vec::new();
    }
    let inv = bounds.inverse_extent();
    mesh.vertices
        .iter()
        .map(|&p| (p - bounds.min) * inv)
        .collect()
}

impl MeshGeometry {
    /// `<VertexPool>` block with one `<Vertex>` per corner.
    pub fn vertex_pool_block(&self) -> String {
        let mut out = format!("<VertexPool> {} {{\n", safe_name(&self.pool_name));
        for (idx, corner) in self.corners.iter().enumerate() {
            out.push_str(&format!("  <Vertex> {} {{\n", idx));
            out.push_str(&format!("    {}\n", fvec3(corner.position)));
            for (key, delta) in &corner.morphs {
                out.push_str(&format!(
                    "    <Dxyz> {} {{ {} }}\n",
                    safe_name(key),
                    fvec3(*delta)
                ));
            }
            if let Some(normal) = corner.normal {
                out.push_str(&format!("    <Normal> {{ {} }}\n", fvec3(normal)));
            }
            if let Some([r, g, b, a]) = corner.color {
                out.push_str(&format!(
                    "    <RGBA> {{ {} {} {} {} }}\n",
                    fnum(r),
                    fnum(g),
                    fnum(b),
                    fnum(a)
                ));
            }
            for uv in &corner.uvs {
                if uv.name.is_empty() {
                    out.push_str("    <UV> {\n");
                } else {
                    out.push_str(&format!("    <UV> {} {{\n", safe_name(&uv.name)));
                }
                out.push_str(&format!(
                    "      {} {}\n",
                    fnum(uv.uv[0]),
                    fnum(uv.uv[1])
                ));
                if let Some((tangent, binormal)) = uv.tangent {
                    out.push_str(&format!("      <Tangent> {{ {} }}\n", fvec3(tangent)));
                    out.push_str(&format!("      <Binormal> {{ {} }}\n", fvec3(binormal)));
                }
                out.push_str("    }\n");
            }
            out.push_str("  }\n");
        }
        out.push_str("}\n");
        out
    }

    /// `<Polygon>` blocks for every face.
    pub fn polygons_block(&self) -> String {
        let mut out = String::new();
        for face in &self.faces {
            out.push_str("<Polygon> {\n");
            for tref in &face.trefs {
                out.push_str(&format!("  <TRef> {{ {} }}\n", safe_name(tref)));
            }
            if let Some(mref) = &face.mref {
                out.push_str(&format!("  <MRef> {{ {} }}\n", safe_name(mref)));
            }
            out.push_str(&format!("  <Normal> {{ {} }}\n", fvec3(face.normal)));
            if face.bface {
                out.push_str("  <BFace> { 1 }\n");
            }
            let refs: Vec<String> = face.corners.iter().map(|c| c.to_string()).collect();
            out.push_str(&format!(
                "  <VertexRef> {{ {} <Ref> {{ {} }} }}\n",
                refs.join(" "),
                safe_name(&self.pool_name)
            ));
            out.push_str("}\n");
        }
        out
    }

    /// Transform, vertex pool, and polygon table, in document order.
    pub fn full_block(&self, obj: &SceneObject) -> String {
        let mut out = transform_block(&obj.export_matrix());
        out.push_str(&self.vertex_pool_block());
        out.push_str(&self.polygons_block());
        out
    }
}
