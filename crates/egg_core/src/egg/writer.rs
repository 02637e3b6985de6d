//! Export orchestration and file emission.
//!
//! `write_out` is the crate's entry point: it assembles the scene tree,
//! serializes it block by block, samples the requested animations, and
//! writes the output files. The tree is built in full before any file
//! is created, so a failing scene never leaves a truncated egg behind.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::ExportConfig;
use crate::egg::anim::{self, AnimError, AnimationClip};
use crate::egg::format::{fknot, fnum, indented, safe_name, transform_block};
use crate::egg::hierarchy::{Hierarchy, HierarchyError, NodeData, NodeId, SceneNode, ROOT};
use crate::egg::material;
use crate::scene::{CurveData, ObjectData, SceneObject, SceneSource, SplineKind};

pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    #[error(transparent)]
    Anim(#[from] AnimError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse failure category reported to the caller.
///
/// Hosts surface these as-is in their UI, so the strings are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTag {
    MkHierarchy,
    MkObj,
    Unexpected,
}

impl ErrorTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorTag::MkHierarchy => "ERR_MK_HIERARCHY",
            ErrorTag::MkObj => "ERR_MK_OBJ",
            ErrorTag::Unexpected => "ERR_UNEXPECTED",
        }
    }
}

impl ExportError {
    fn tag(&self) -> ErrorTag {
        match self {
            ExportError::Hierarchy(HierarchyError::NodeCreate { .. }) => ErrorTag::MkObj,
            ExportError::Hierarchy(_) => ErrorTag::MkHierarchy,
            _ => ErrorTag::Unexpected,
        }
    }
}

/// Holds the scene's working copy open for the duration of an export;
/// `release` runs on every exit path.
struct SceneGuard<'a> {
    source: &'a mut dyn SceneSource,
}

impl<'a> SceneGuard<'a> {
    fn new(source: &'a mut dyn SceneSource) -> Self {
        source.acquire();
        Self { source }
    }
}

impl Drop for SceneGuard<'_> {
    fn drop(&mut self) {
        self.source.release();
    }
}

/// Run a full export. Returns the list of failure tags; an empty list
/// means every requested file was written.
pub fn write_out(source: &mut dyn SceneSource, config: &ExportConfig) -> Vec<ErrorTag> {
    match export(source, config) {
        Ok(()) => Vec::new(),
        Err(err) => {
            log::error!("export failed: {err}");
            vec![err.tag()]
        }
    }
}

fn export(source: &mut dyn SceneSource, config: &ExportConfig) -> ExportResult<()> {
    let guard = SceneGuard::new(source);

    // Geometry conversion happens inside the build, so a bad object
    // aborts here, before any output exists.
    let hierarchy = Hierarchy::build(&*guard.source, config)?;

    let mut clips: Vec<AnimationClip> = Vec::new();
    for range in &config.animations {
        clips.push(anim::sample(&mut *guard.source, range)?);
    }

    let texture_names = material::used_textures(&hierarchy);
    let material_names = material::used_materials(&hierarchy);

    let mut scene_body = String::new();
    scene_body.push_str(&material::material_blocks(&*guard.source, &material_names));
    scene_body.push_str(&material::texture_blocks(&*guard.source, &texture_names));
    for &child in &hierarchy.nodes[ROOT].children {
        let block = node_block(&hierarchy, guard.source.objects(), child);
        scene_body.push_str(&indented(&block, 1));
    }

    // Standalone animation files want per-object bundle names so every
    // file binds to its skeleton regardless of the clip name.
    let object_bundles = config.separate_anim_files || config.anim_only;

    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    if config.separate_anim_files {
        for clip in &clips {
            if clip.is_empty() {
                continue;
            }
            let path = anim_file_path(&config.path, &clip.name);
            let mut content = String::from("<CoordinateSystem> { Z-up }\n");
            content.push_str(&clip.table_block(object_bundles));
            fs::write(&path, content)?;
            log::info!("wrote animation '{}' to {}", clip.name, path.display());
        }
        if config.anim_only {
            return Ok(());
        }
    }

    let mut content = String::from("<CoordinateSystem> { Z-up }\n");
    if !config.anim_only {
        content.push_str(&scene_body);
    }
    if !config.separate_anim_files {
        for clip in &clips {
            content.push_str(&clip.table_block(object_bundles));
        }
    }
    fs::write(&config.path, content)?;
    log::info!(
        "wrote {} ({} materials, {} textures, {} animations)",
        config.path.display(),
        material_names.len(),
        texture_names.len(),
        clips.len()
    );
    Ok(())
}

/// Serialize one node and its subtree. The returned text is unindented;
/// the caller places it at its level.
fn node_block(hierarchy: &Hierarchy, objects: &[SceneObject], id: NodeId) -> String {
    let node = &hierarchy.nodes[id];
    let mut out = String::new();
    match &node.data {
        NodeData::Root => {}
        NodeData::Group => {
            out.push_str(&format!("<Group> {} {{\n", safe_name(&node.name)));
            if let Some(obj) = node.object.map(|i| &objects[i]) {
                out.push_str(&indented(&transform_block(&obj.export_matrix()), 1));
            }
            push_children(hierarchy, objects, node, &mut out);
            out.push_str("}\n");
        }
        NodeData::Armature => {
            out.push_str(&format!("<Group> {} {{\n", safe_name(&node.name)));
            out.push_str("  <Dart> { 1 }\n");
            push_children(hierarchy, objects, node, &mut out);
            out.push_str("}\n");
        }
        NodeData::Mesh { geometry } | NodeData::Actor { geometry, .. } => {
            out.push_str(&format!("<Group> {} {{\n", safe_name(&node.name)));
            let obj = node.object.map(|i| &objects[i]);
            let morphs = obj
                .and_then(|o| o.as_mesh())
                .map(|m| m.has_morphs())
                .unwrap_or(false);
            if morphs {
                out.push_str("  <Dart> { 1 }\n");
            }
            if let Some(obj) = obj {
                out.push_str(&indented(&geometry.full_block(obj), 1));
            }
            push_children(hierarchy, objects, node, &mut out);
            out.push_str("}\n");
        }
        NodeData::Curve => {
            out.push_str(&format!("<Group> {} {{\n", safe_name(&node.name)));
            if let Some(obj) = node.object.map(|i| &objects[i]) {
                out.push_str(&indented(&transform_block(&obj.export_matrix()), 1));
                if let ObjectData::Curve(curve) = &obj.data {
                    out.push_str(&indented(&curve_blocks(obj, curve), 1));
                }
            }
            push_children(hierarchy, objects, node, &mut out);
            out.push_str("}\n");
        }
        NodeData::Joint { transform, vrefs } => {
            out.push_str(&format!("<Joint> {} {{\n", safe_name(&node.name)));
            out.push_str(&indented(&transform_block(transform), 1));
            for (pool, weights) in vrefs {
                out.push_str(&weights.vertex_ref_blocks(pool, 1));
            }
            push_children(hierarchy, objects, node, &mut out);
            out.push_str("}\n");
        }
    }
    out
}

fn push_children(
    hierarchy: &Hierarchy,
    objects: &[SceneObject],
    node: &SceneNode,
    out: &mut String,
) {
    for &child in &node.children {
        out.push_str(&indented(&node_block(hierarchy, objects, child), 1));
    }
}

/// One shared `<VertexPool>` holding every spline's control points in
/// world space, followed by one `<NURBSCurve>` per NURBS spline. The
/// pool index advances over every spline so references stay aligned
/// when NURBS and other spline types mix.
fn curve_blocks(obj: &SceneObject, curve: &CurveData) -> String {
    let total: usize = curve.splines.iter().map(|s| s.points.len()).sum();
    if total == 0 {
        return String::new();
    }

    let mut out = format!("<VertexPool> {} {{\n", safe_name(&obj.name));
    let mut index = 0usize;
    for spline in &curve.splines {
        for p in &spline.points {
            // Control points go out weighted: xyz premultiplied by w.
            let co = obj.matrix_world * *p;
            out.push_str(&format!(
                "  <Vertex> {} {{\n    {} {} {} {}\n  }}\n",
                index,
                fnum(co.x * co.w),
                fnum(co.y * co.w),
                fnum(co.z * co.w),
                fnum(co.w)
            ));
            index += 1;
        }
    }
    out.push_str("}\n");

    let mut start = 0usize;
    for spline in &curve.splines {
        let points = spline.points.len();
        if spline.kind != SplineKind::Nurbs || points == 0 {
            start += points;
            continue;
        }
        let order = spline.order as usize;
        let subdiv = spline.resolution as usize * points.saturating_sub(1);
        let knots: Vec<String> = knot_vector(points, order, spline.use_endpoint)
            .iter()
            .map(|k| fknot(*k))
            .collect();
        let refs: Vec<String> = (start..start + points).map(|i| i.to_string()).collect();

        out.push_str("<NURBSCurve> {\n");
        out.push_str(&format!("  <Scalar> subdiv {{ {} }}\n", subdiv));
        out.push_str(&format!("  <Order> {{ {} }}\n", spline.order));
        out.push_str(&format!("  <Knots> {{ {} }}\n", knots.join(" ")));
        out.push_str(&format!(
            "  <VertexRef> {{ {} <Ref> {{ {} }} }}\n",
            refs.join(" "),
            safe_name(&obj.name)
        ));
        out.push_str("}\n");
        start += points;
    }
    out
}

/// Normalized knot vector for `points + order` knots. Endpoint-clamped
/// vectors repeat the boundary knot `order` times on each side.
fn knot_vector(points: usize, order: usize, clamped: bool) -> Vec<f32> {
    let count = points + order;
    if !clamped || points <= order {
        let last = (count - 1).max(1) as f32;
        return (0..count).map(|i| i as f32 / last).collect();
    }
    let segments = (points - order + 1) as f32;
    let mut knots = Vec::with_capacity(count);
    knots.extend(std::iter::repeat(0.0).take(order));
    for i in 1..(points - order + 1) {
        knots.push(i as f32 / segments);
    }
    knots.extend(std::iter::repeat(1.0).take(order));
    knots
}

/// Output path for one clip's standalone file: `scene.egg` plus `walk`
/// becomes `scene-walk.egg`. A path without the extension keeps its
/// full name and the suffix is appended.
fn anim_file_path(path: &Path, anim: &str) -> PathBuf {
    let s = path.to_string_lossy();
    if s.len() >= 4
        && s.is_char_boundary(s.len() - 4)
        && s[s.len() - 4..].eq_ignore_ascii_case(".egg")
    {
        // The extension keeps whatever case the caller used.
        PathBuf::from(format!(
            "{}-{}{}",
            &s[..s.len() - 4],
            anim,
            &s[s.len() - 4..]
        ))
    } else {
        PathBuf::from(format!("{}-{}.egg", s, anim))
    }
}
