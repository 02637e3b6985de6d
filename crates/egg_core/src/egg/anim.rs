//! Frame-sequential animation sampling.
//!
//! Animation is captured by stepping the scene through its frames and
//! reading evaluated pose matrices and shape-key weights back, one row
//! per frame. There is no curve access; whatever drives the scene
//! (keyframes, constraints, drivers) ends up baked into the rows.

use egg_math::{EulerRot, Mat4};
use thiserror::Error;

use crate::config::AnimationRange;
use crate::egg::format::{fnum, indented, safe_name};
use crate::scene::{SceneObject, SceneSource};

#[derive(Error, Debug)]
pub enum AnimError {
    #[error("no pose for bone '{bone}' of '{armature}' at frame {frame}")]
    MissingPose {
        armature: String,
        bone: String,
        frame: i32,
    },
}

/// Sampled transform rows of one joint, with its child joints nested.
#[derive(Debug)]
pub struct JointAnim {
    pub name: String,
    /// One row per frame: scale x y z, rotation p r h in degrees,
    /// translation x y z.
    pub rows: Vec<[f32; 9]>,
    pub children: Vec<JointAnim>,
}

/// Everything sampled for one object across the clip.
#[derive(Debug)]
pub struct ObjectAnim {
    pub object: String,
    /// Joint trees for armatures; empty otherwise.
    pub skeleton: Vec<JointAnim>,
    /// (shape key, one weight per frame) tracks for morphing meshes.
    pub morph: Vec<(String, Vec<f32>)>,
}

/// One named clip, sampled and ready to serialize.
#[derive(Debug)]
pub struct AnimationClip {
    pub name: String,
    pub fps: f32,
    pub bundles: Vec<ObjectAnim>,
}

/// Sample one clip from the scene.
///
/// The scene's current frame is saved up front and restored after the
/// last sample, error or not. A zero-length range still yields one
/// frame.
pub fn sample(
    source: &mut dyn SceneSource,
    range: &AnimationRange,
) -> Result<AnimationClip, AnimError> {
    let from = range.from_frame;
    let to = if range.to_frame == from {
        from + 1
    } else {
        range.to_frame
    };

    let objects: Vec<SceneObject> = source.objects().to_vec();
    let mut bundles: Vec<ObjectAnim> = Vec::new();
    for obj in &objects {
        let skeleton = match obj.as_armature() {
            Some(arm) => joint_skeleton(&arm.bones, None),
            None => Vec::new(),
        };
        let morph: Vec<(String, Vec<f32>)> = match obj.as_mesh() {
            Some(mesh) if mesh.has_morphs() => mesh
                .shape_keys
                .iter()
                .skip(1)
                .map(|k| (k.name.clone(), Vec::new()))
                .collect(),
            _ => Vec::new(),
        };
        if skeleton.is_empty() && morph.is_empty() {
            continue;
        }
        bundles.push(ObjectAnim {
            object: obj.name.clone(),
            skeleton,
            morph,
        });
    }

    let saved_frame = source.current_frame();
    let result = sample_frames(source, &objects, &mut bundles, from, to);
    source.set_frame(saved_frame);
    result?;

    Ok(AnimationClip {
        name: range.name.clone(),
        fps: range.fps.unwrap_or_else(|| source.fps()),
        bundles,
    })
}

fn sample_frames(
    source: &mut dyn SceneSource,
    objects: &[SceneObject],
    bundles: &mut [ObjectAnim],
    from: i32,
    to: i32,
) -> Result<(), AnimError> {
    for frame in from..to {
        source.set_frame(frame);
        for bundle in bundles.iter_mut() {
            let Some(obj) = objects.iter().find(|o| o.name == bundle.object) else {
                continue;
            };
            if let Some(arm) = obj.as_armature() {
                for joint in &mut bundle.skeleton {
                    sample_joint(source, obj, arm, joint, frame)?;
                }
            }
            for (key, values) in &mut bundle.morph {
                let value = source.shape_key_value(&obj.name, key).unwrap_or(0.0);
                values.push(value);
            }
        }
    }
    Ok(())
}

/// Build the empty joint tree mirroring the bone hierarchy.
fn joint_skeleton(bones: &[crate::scene::Bone], parent: Option<&str>) -> Vec<JointAnim> {
    bones
        .iter()
        .filter(|b| b.parent.as_deref() == parent)
        .map(|b| JointAnim {
            name: b.name.clone(),
            rows: Vec::new(),
            children: joint_skeleton(bones, Some(&b.name)),
        })
        .collect()
}

fn sample_joint(
    source: &dyn SceneSource,
    arm_obj: &SceneObject,
    arm: &crate::scene::ArmatureData,
    joint: &mut JointAnim,
    frame: i32,
) -> Result<(), AnimError> {
    let pose = source
        .pose_matrix(&arm_obj.name, &joint.name)
        .ok_or_else(|| AnimError::MissingPose {
            armature: arm_obj.name.clone(),
            bone: joint.name.clone(),
            frame,
        })?;

    let bone_parent = arm.bone(&joint.name).and_then(|b| b.parent.clone());
    let local = match bone_parent {
        Some(parent_name) => {
            let parent_pose = source
                .pose_matrix(&arm_obj.name, &parent_name)
                .ok_or_else(|| AnimError::MissingPose {
                    armature: arm_obj.name.clone(),
                    bone: parent_name.clone(),
                    frame,
                })?;
            parent_pose.inverse() * pose
        }
        None => arm_obj.matrix_world * pose,
    };
    joint.rows.push(transform_row(&local));

    for child in &mut joint.children {
        sample_joint(source, arm_obj, arm, child, frame)?;
    }
    Ok(())
}

/// Decompose one local matrix into an `ijkprhxyz` row.
fn transform_row(matrix: &Mat4) -> [f32; 9] {
    let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
    let (rx, ry, rz) = rotation.to_euler(EulerRot::XYZ);
    [
        scale.x,
        scale.y,
        scale.z,
        rx.to_degrees(),
        ry.to_degrees(),
        rz.to_degrees(),
        translation.x,
        translation.y,
        translation.z,
    ]
}

fn format_fps(fps: f32) -> String {
    if fps.fract().abs() < 1e-6 {
        format!("{}", fps as i64)
    } else {
        fnum(fps)
    }
}

impl AnimationClip {
    /// No object produced any track worth writing.
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// The `<Table>`/`<Bundle>` section for this clip.
    ///
    /// `use_object_names` switches the bundle names from the clip name
    /// to the per-object names, which is what standalone animation
    /// files want.
    pub fn table_block(&self, use_object_names: bool) -> String {
        if self.bundles.is_empty() {
            return String::new();
        }
        let mut out = String::from("<Table> {\n");
        for bundle in &self.bundles {
            let bundle_name = if use_object_names {
                &bundle.object
            } else {
                &self.name
            };
            out.push_str(&format!("  <Bundle> {} {{\n", safe_name(bundle_name)));
            if !bundle.skeleton.is_empty() {
                out.push_str("    <Table> \"<skeleton>\" {\n");
                for joint in &bundle.skeleton {
                    out.push_str(&indented(&joint.table_block(self.fps), 3));
                }
                out.push_str("    }\n");
            }
            if !bundle.morph.is_empty() {
                out.push_str("    <Table> morph {\n");
                for (key, values) in &bundle.morph {
                    out.push_str(&format!("      <S$Anim> {} {{\n", safe_name(key)));
                    out.push_str(&format!("        <Scalar> fps {{ {} }}\n", format_fps(self.fps)));
                    let row: Vec<String> = values.iter().map(|v| fnum(*v)).collect();
                    out.push_str(&format!("        <V> {{ {} }}\n", row.join(" ")));
                    out.push_str("      }\n");
                }
                out.push_str("    }\n");
            }
            out.push_str("  }\n");
        }
        out.push_str("}\n");
        out
    }
}

impl JointAnim {
    fn table_block(&self, fps: f32) -> String {
        let mut out = format!("<Table> {} {{\n", safe_name(&self.name));
        out.push_str("  <Xfm$Anim> xform {\n");
        out.push_str("    <Scalar> order { sprht }\n");
        out.push_str(&format!("    <Scalar> fps {{ {} }}\n", format_fps(fps)));
        out.push_str("    <Scalar> contents { ijkprhxyz }\n");
        out.push_str("    <V> {\n");
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|v| fnum(*v)).collect();
            out.push_str(&format!("      {}\n", cells.join(" ")));
        }
        out.push_str("    }\n");
        out.push_str("  }\n");
        for child in &self.children {
            out.push_str(&indented(&child.table_block(fps), 1));
        }
        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{ArmatureData, Bone, MemoryScene, MeshData, ObjectData, Polygon, ShapeKey};
    use egg_math::Vec3;

    fn armature_scene() -> MemoryScene {
        let arm = SceneObject::new(
            "Armature",
            ObjectData::Armature(ArmatureData {
                bones: vec![
                    Bone {
                        name: "Root".to_string(),
                        parent: None,
                        matrix_local: Mat4::IDENTITY,
                    },
                    Bone {
                        name: "Tip".to_string(),
                        parent: Some("Root".to_string()),
                        matrix_local: Mat4::from_translation(Vec3::Y),
                    },
                ],
            }),
        );
        MemoryScene::new(vec![arm])
    }

    fn range(name: &str, from: i32, to: i32) -> AnimationRange {
        AnimationRange {
            name: name.to_string(),
            from_frame: from,
            to_frame: to,
            fps: Some(24.0),
        }
    }

    #[test]
    fn test_zero_length_range_samples_one_frame() {
        let mut scene = armature_scene();
        let clip = sample(&mut scene, &range("pose", 5, 5)).unwrap();
        assert_eq!(clip.bundles.len(), 1);
        assert_eq!(clip.bundles[0].skeleton[0].rows.len(), 1);
    }

    #[test]
    fn test_two_joint_bundle_rows() {
        let mut scene = armature_scene();
        scene.set_pose("Armature", "Root", 2, Mat4::from_translation(Vec3::X));

        let clip = sample(&mut scene, &range("walk", 0, 4)).unwrap();
        let root = &clip.bundles[0].skeleton[0];
        assert_eq!(root.name, "Root");
        assert_eq!(root.rows.len(), 4);
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].rows.len(), 4);

        // Frame 2 carries the posed translation; others hold the rest pose.
        assert!((root.rows[2][6] - 1.0).abs() < 1e-5);
        assert!(root.rows[0][6].abs() < 1e-5);
        // Scale channels stay one throughout.
        for row in &root.rows {
            assert!((row[0] - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_current_frame_restored_after_sampling() {
        let mut scene = armature_scene();
        scene.set_frame(42);
        sample(&mut scene, &range("walk", 0, 10)).unwrap();
        assert_eq!(scene.current_frame(), 42);
    }

    #[test]
    fn test_morph_track_sampling() {
        let mesh = MeshData {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vertex_normals: vec![Vec3::Z; 3],
            polygons: vec![Polygon {
                vertices: vec![0, 1, 2],
                material_index: 0,
                use_smooth: false,
                normal: Vec3::Z,
            }],
            shape_keys: vec![
                ShapeKey {
                    name: "Basis".to_string(),
                    positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                },
                ShapeKey {
                    name: "Open".to_string(),
                    positions: vec![Vec3::ZERO, Vec3::X, Vec3::new(0.0, 1.0, 1.0)],
                },
            ],
            ..Default::default()
        };
        let obj = SceneObject::new("Face", ObjectData::Mesh(mesh));
        let mut scene = MemoryScene::new(vec![obj]);
        scene.set_shape_value("Face", "Open", 1, 0.75);

        let clip = sample(&mut scene, &range("blink", 0, 3)).unwrap();
        assert_eq!(clip.bundles.len(), 1);
        let (key, values) = &clip.bundles[0].morph[0];
        assert_eq!(key, "Open");
        assert_eq!(values.len(), 3);
        assert!((values[1] - 0.75).abs() < 1e-6);
        assert!(values[0].abs() < 1e-6);
    }

    #[test]
    fn test_table_block_names_and_layout() {
        let mut scene = armature_scene();
        let clip = sample(&mut scene, &range("walk", 0, 2)).unwrap();

        let by_clip = clip.table_block(false);
        assert!(by_clip.contains("<Bundle> walk {"));
        assert!(by_clip.contains("<Table> \"<skeleton>\" {"));
        assert!(by_clip.contains("<Scalar> order { sprht }"));
        assert!(by_clip.contains("<Scalar> contents { ijkprhxyz }"));
        assert!(by_clip.contains("<Scalar> fps { 24 }"));

        let by_object = clip.table_block(true);
        assert!(by_object.contains("<Bundle> Armature {"));
    }

    #[test]
    fn test_unset_rate_falls_back_to_scene_fps() {
        let mut scene = armature_scene();
        scene.fps = 30.0;
        let mut r = range("walk", 0, 2);
        r.fps = None;

        let clip = sample(&mut scene, &r).unwrap();
        assert_eq!(clip.fps, 30.0);
        assert!(clip.table_block(false).contains("<Scalar> fps { 30 }"));
    }

    #[test]
    fn test_static_scene_has_no_bundles() {
        let obj = SceneObject::new("Cube", ObjectData::Generic);
        let mut scene = MemoryScene::new(vec![obj]);
        let clip = sample(&mut scene, &range("idle", 0, 5)).unwrap();
        assert!(clip.is_empty());
    }
}
