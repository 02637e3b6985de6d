//! Scene graph types for the egg exporter.
//!
//! This module defines the host-facing scene representation: a flat list
//! of objects (meshes, curves, armatures, plain transforms) plus the
//! capability trait the exporter uses to sample animation frames. The
//! types map closely to what a DCC application hands over while staying
//! independent of any particular host API.

use std::collections::HashMap;

use egg_math::{Mat4, Vec3, Vec4};

/// How an object's declared parent is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParentMode {
    /// Plain object-to-object parenting.
    #[default]
    Object,
    /// The object follows a named bone of its parent armature.
    Bone,
}

/// One object of the working set, with an explicit type discriminant.
///
/// The exporter dispatches on `data` via `match`; there is no open-ended
/// polymorphism, so serialization coverage is checkable at compile time.
#[derive(Debug, Clone)]
pub struct SceneObject {
    /// Stable name; also the vertex pool name for meshes.
    pub name: String,

    /// Type-specific payload.
    pub data: ObjectData,

    /// Declared parent object name, if any.
    pub parent: Option<String>,

    /// Parent interpretation (object vs. bone).
    pub parent_mode: ParentMode,

    /// Name of the parent bone when bone-parented. May be set even in
    /// object mode; the hierarchy builder accounts for that.
    pub parent_bone: Option<String>,

    /// Transform relative to the declared parent.
    pub matrix_local: Mat4,

    /// World-space transform.
    pub matrix_world: Mat4,
}

impl SceneObject {
    /// Create an object with identity transforms and no parent.
    pub fn new(name: impl Into<String>, data: ObjectData) -> Self {
        Self {
            name: name.into(),
            data,
            parent: None,
            parent_mode: ParentMode::Object,
            parent_bone: None,
            matrix_local: Mat4::IDENTITY,
            matrix_world: Mat4::IDENTITY,
        }
    }

    /// The transform the exporter emits for this object: local space when
    /// a parent is declared, world space otherwise.
    pub fn export_matrix(&self) -> Mat4 {
        if self.parent.is_some() {
            self.matrix_local
        } else {
            self.matrix_world
        }
    }

    pub fn is_armature(&self) -> bool {
        matches!(self.data, ObjectData::Armature(_))
    }

    pub fn as_mesh(&self) -> Option<&MeshData> {
        match &self.data {
            ObjectData::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub fn as_armature(&self) -> Option<&ArmatureData> {
        match &self.data {
            ObjectData::Armature(arm) => Some(arm),
            _ => None,
        }
    }
}

/// Closed set of object kinds the exporter understands.
#[derive(Debug, Clone)]
pub enum ObjectData {
    Mesh(MeshData),
    Curve(CurveData),
    Armature(ArmatureData),
    /// Anything else: exported as a plain transform group.
    Generic,
}

/// Shared-vertex mesh data, one entry per object.
///
/// Geometry is stored the way hosts store it (positions shared between
/// faces, per-corner attribute layers); the topology converter fans it
/// out into per-corner vertices for emission.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    /// Shared vertex positions in object space.
    pub vertices: Vec<Vec3>,

    /// Per-vertex normals in object space.
    pub vertex_normals: Vec<Vec3>,

    /// Faces in stored order; may be n-gons.
    pub polygons: Vec<Polygon>,

    /// Edges explicitly marked sharp, as sorted shared-vertex id pairs.
    pub sharp_edges: Vec<(u32, u32)>,

    /// Whether sharp-edge data participates in smoothing.
    pub auto_smooth: bool,

    /// UV layers, one set of coordinates per face corner.
    pub uv_layers: Vec<UvLayer>,

    /// Active color layer, one RGBA per face corner.
    pub colors: Option<Vec<[f32; 4]>>,

    /// Custom per-corner normals, when the host provides them.
    pub loop_normals: Option<Vec<Vec3>>,

    /// Material slot table; a slot may be empty.
    pub material_slots: Vec<Option<String>>,

    /// Shape keys; the first entry is the basis.
    pub shape_keys: Vec<ShapeKey>,

    /// Vertex group (bone) names.
    pub group_names: Vec<String>,

    /// Per shared vertex, the (group index, weight) memberships.
    pub vertex_weights: Vec<Vec<(u32, f32)>>,

    /// Name of the armature object deforming this mesh, if any.
    pub armature: Option<String>,
}

impl MeshData {
    /// Total corner count: sum of face vertex counts.
    pub fn corner_count(&self) -> usize {
        self.polygons.iter().map(|p| p.vertices.len()).sum()
    }

    /// A mesh with an armature modifier is exported as an actor.
    pub fn is_actor(&self) -> bool {
        self.armature.is_some()
    }

    /// More than one shape key means the basis has morph targets.
    pub fn has_morphs(&self) -> bool {
        self.shape_keys.len() > 1
    }
}

/// One face of a mesh.
#[derive(Debug, Clone)]
pub struct Polygon {
    /// Shared-vertex indices in stored order; three or more.
    pub vertices: Vec<u32>,

    /// Index into the mesh's material slot table. May be out of range;
    /// resolution failure has defined fallbacks.
    pub material_index: usize,

    /// Smooth-shaded face: its corners take vertex normals.
    pub use_smooth: bool,

    /// Face normal in object space.
    pub normal: Vec3,
}

/// One UV layer with per-corner coordinates.
#[derive(Debug, Clone)]
pub struct UvLayer {
    pub name: String,

    /// The host's currently-active layer is emitted as the default
    /// (unnamed) channel.
    pub active: bool,

    /// One (u, v) pair per face corner.
    pub uvs: Vec<[f32; 2]>,

    /// Optional per-corner (tangent, binormal) pairs for this layer.
    pub tangents: Option<Vec<(Vec3, Vec3)>>,
}

/// One shape key (morph target).
#[derive(Debug, Clone)]
pub struct ShapeKey {
    pub name: String,
    /// One position per shared vertex.
    pub positions: Vec<Vec3>,
}

/// Skeleton data owned by an armature object.
#[derive(Debug, Clone, Default)]
pub struct ArmatureData {
    /// Bones in stored order.
    pub bones: Vec<Bone>,
}

impl ArmatureData {
    pub fn bone(&self, name: &str) -> Option<&Bone> {
        self.bones.iter().find(|b| b.name == name)
    }
}

/// One bone of an armature.
#[derive(Debug, Clone)]
pub struct Bone {
    pub name: String,

    /// Parent bone name within the same armature.
    pub parent: Option<String>,

    /// Rest transform in armature space.
    pub matrix_local: Mat4,
}

/// Curve object data (NURBS splines).
#[derive(Debug, Clone, Default)]
pub struct CurveData {
    pub splines: Vec<Spline>,
}

/// One spline of a curve object.
#[derive(Debug, Clone)]
pub struct Spline {
    pub kind: SplineKind,

    /// Control points as homogeneous coordinates (x, y, z, w).
    pub points: Vec<Vec4>,

    /// NURBS order.
    pub order: u32,

    /// Host subdivision resolution per segment.
    pub resolution: u32,

    /// Clamp the knot vector to the endpoints.
    pub use_endpoint: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplineKind {
    Nurbs,
    /// Bezier/poly splines are skipped by the curve emitter.
    Other,
}

/// A material as resolved by the host-side material inspector.
#[derive(Debug, Clone)]
pub struct MaterialRecord {
    pub name: String,

    /// Base color RGBA.
    pub base_color: [f32; 4],

    pub roughness: f32,
    pub metallic: f32,

    /// Whether backfaces are culled; faces of non-culling materials get
    /// a `<BFace>` override.
    pub use_backface_culling: bool,

    /// True for node-shader materials. Shaded materials keep explicit UV
    /// channel names and force white vertex colors on color-less meshes.
    pub shaded: bool,

    /// Names of texture records referenced by this material, in use order.
    pub textures: Vec<String>,
}

impl Default for MaterialRecord {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_color: [0.5, 0.5, 0.5, 1.0],
            roughness: 0.5,
            metallic: 0.0,
            use_backface_culling: true,
            shaded: false,
            textures: Vec::new(),
        }
    }
}

/// A texture entry produced by the host-side texture extraction.
#[derive(Debug, Clone)]
pub struct TextureRecord {
    pub name: String,

    /// Filesystem path as the host reported it.
    pub path: String,

    /// Named scalar parameters, e.g. ("format", "rgba").
    pub scalars: Vec<(String, String)>,

    /// Transform entries as (kind, values), e.g. ("Scale", [2.0, 2.0]).
    pub transform: Vec<(String, Vec<f32>)>,
}

/// Capability interface the exporter consumes.
///
/// Frame advance and pose evaluation go through this trait so the
/// animation sampler can run against a deterministic in-memory provider
/// in tests instead of a live host scene. Sampling mutates shared scene
/// state, which is why `set_frame` takes `&mut self` and frames are
/// sampled strictly in sequence.
pub trait SceneSource {
    /// The working object set for this export.
    fn objects(&self) -> &[SceneObject];

    /// Look up a material record by name.
    fn material(&self, name: &str) -> Option<&MaterialRecord>;

    /// Texture records used by the exported objects.
    fn textures(&self) -> &[TextureRecord];

    /// Scene playback rate, frames per second. The sampler reads this
    /// for animation ranges that do not set their own rate.
    fn fps(&self) -> f32;

    fn current_frame(&self) -> i32;

    /// Advance the scene to the given frame and re-evaluate poses.
    fn set_frame(&mut self, frame: i32);

    /// Evaluated pose-space matrix of a bone at the current frame.
    fn pose_matrix(&self, armature: &str, bone: &str) -> Option<Mat4>;

    /// Evaluated shape-key weight at the current frame.
    fn shape_key_value(&self, object: &str, key: &str) -> Option<f32>;

    /// Duplicate whatever scene state the export works on. Paired with
    /// [`SceneSource::release`], which always runs, on success and on
    /// failure.
    fn acquire(&mut self) {}

    /// Tear down the working copy created by `acquire`.
    fn release(&mut self) {}
}

/// In-memory [`SceneSource`] backed by plain vectors.
///
/// Poses and shape-key weights are keyed tracks sampled per frame, which
/// makes exports fully deterministic - the provider used throughout the
/// test suite and the examples.
#[derive(Default)]
pub struct MemoryScene {
    pub objects: Vec<SceneObject>,
    pub materials: Vec<MaterialRecord>,
    pub textures: Vec<TextureRecord>,
    pub fps: f32,
    frame: i32,

    /// (armature, bone) -> frame -> pose matrix. Frames without an entry
    /// fall back to the bone's rest matrix.
    pose_tracks: HashMap<(String, String), HashMap<i32, Mat4>>,

    /// (object, shape key) -> frame -> weight. Missing frames read 0.
    shape_tracks: HashMap<(String, String), HashMap<i32, f32>>,
}

impl MemoryScene {
    pub fn new(objects: Vec<SceneObject>) -> Self {
        Self {
            objects,
            fps: 24.0,
            ..Default::default()
        }
    }

    /// Record a pose matrix for one bone at one frame.
    pub fn set_pose(&mut self, armature: &str, bone: &str, frame: i32, matrix: Mat4) {
        self.pose_tracks
            .entry((armature.to_string(), bone.to_string()))
            .or_default()
            .insert(frame, matrix);
    }

    /// Record a shape-key weight at one frame.
    pub fn set_shape_value(&mut self, object: &str, key: &str, frame: i32, value: f32) {
        self.shape_tracks
            .entry((object.to_string(), key.to_string()))
            .or_default()
            .insert(frame, value);
    }

    fn rest_matrix(&self, armature: &str, bone: &str) -> Option<Mat4> {
        let arm = self
            .objects
            .iter()
            .find(|o| o.name == armature)?
            .as_armature()?;
        arm.bone(bone).map(|b| b.matrix_local)
    }
}

impl SceneSource for MemoryScene {
    fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    fn material(&self, name: &str) -> Option<&MaterialRecord> {
        self.materials.iter().find(|m| m.name == name)
    }

    fn textures(&self) -> &[TextureRecord] {
        &self.textures
    }

    fn fps(&self) -> f32 {
        self.fps
    }

    fn current_frame(&self) -> i32 {
        self.frame
    }

    fn set_frame(&mut self, frame: i32) {
        self.frame = frame;
    }

    fn pose_matrix(&self, armature: &str, bone: &str) -> Option<Mat4> {
        let key = (armature.to_string(), bone.to_string());
        if let Some(track) = self.pose_tracks.get(&key) {
            if let Some(matrix) = track.get(&self.frame) {
                return Some(*matrix);
            }
        }
        self.rest_matrix(armature, bone)
    }

    fn shape_key_value(&self, object: &str, key: &str) -> Option<f32> {
        let key = (object.to_string(), key.to_string());
        self.shape_tracks
            .get(&key)
            .map(|track| track.get(&self.frame).copied().unwrap_or(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_matrix_selection() {
        let mut obj = SceneObject::new("Cube", ObjectData::Generic);
        obj.matrix_local = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
        obj.matrix_world = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));

        // Unparented objects are emitted in world space.
        assert_eq!(obj.export_matrix(), obj.matrix_world);

        obj.parent = Some("Root".to_string());
        assert_eq!(obj.export_matrix(), obj.matrix_local);
    }

    #[test]
    fn test_corner_count() {
        let mesh = MeshData {
            vertices: vec![Vec3::ZERO; 5],
            polygons: vec![
                Polygon {
                    vertices: vec![0, 1, 2],
                    material_index: 0,
                    use_smooth: false,
                    normal: Vec3::Z,
                },
                Polygon {
                    vertices: vec![1, 2, 3, 4],
                    material_index: 0,
                    use_smooth: false,
                    normal: Vec3::Z,
                },
            ],
            ..Default::default()
        };
        assert_eq!(mesh.corner_count(), 7);
    }

    #[test]
    fn test_memory_scene_pose_fallback() {
        let arm = SceneObject::new(
            "Armature",
            ObjectData::Armature(ArmatureData {
                bones: vec![Bone {
                    name: "Bone".to_string(),
                    parent: None,
                    matrix_local: Mat4::from_translation(Vec3::Y),
                }],
            }),
        );
        let mut scene = MemoryScene::new(vec![arm]);

        // No track recorded: the rest matrix is returned.
        let rest = scene.pose_matrix("Armature", "Bone").unwrap();
        assert_eq!(rest, Mat4::from_translation(Vec3::Y));

        scene.set_pose("Armature", "Bone", 3, Mat4::from_translation(Vec3::X));
        scene.set_frame(3);
        let posed = scene.pose_matrix("Armature", "Bone").unwrap();
        assert_eq!(posed, Mat4::from_translation(Vec3::X));
    }
}
