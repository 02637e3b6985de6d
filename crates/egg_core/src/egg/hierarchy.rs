//! Scene tree assembly.
//!
//! The host hands over a flat working set of objects; this module turns
//! it into the tree the writer walks. Armatures expand into one entry
//! per bone, so bones participate in parent resolution exactly like
//! objects do and a mesh can hang off a joint mid-skeleton.
//!
//! Parent resolution applies at most one rule per entry, tried in a
//! fixed order. An entry whose declared parent is not part of the
//! working set is promoted to a root child; an entry whose parent is
//! exported but matches no rule stays detached and never reaches the
//! output document.

use egg_math::Mat4;
use thiserror::Error;

use crate::config::ExportConfig;
use crate::egg::skinning::{JointWeights, SkinTable};
use crate::egg::topology::{self, GeometryError, MeshGeometry};
use crate::scene::{ObjectData, ParentMode, SceneObject, SceneSource};

pub type NodeId = usize;

#[derive(Error, Debug)]
pub enum HierarchyError {
    /// Converting one object's data failed; carries the object name so
    /// the report can point at it.
    #[error("failed to build node for '{name}': {source}")]
    NodeCreate {
        name: String,
        #[source]
        source: GeometryError,
    },

    /// The working set is internally inconsistent.
    #[error("{0}")]
    Build(String),
}

/// One entry of the expanded working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    /// Index into the source object list.
    Object(usize),
    /// A bone of the armature at `armature`, at index `bone` within its
    /// bone table.
    Bone { armature: usize, bone: usize },
}

/// Where one entry attaches in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// Child of the synthetic root.
    Root,
    /// Child of another working-set entry.
    Under(Entry),
    /// Declared parent is exported but no rule relates the two; the
    /// entry is left out of the tree.
    Detached,
}

/// Node payload, dispatched on by the writer.
#[derive(Debug)]
pub enum NodeData {
    /// Synthetic tree root; emits no group of its own.
    Root,

    /// Plain transform group.
    Group,

    /// Armature object: a `<Dart>` group holding the joint tree.
    Armature,

    /// Static mesh.
    Mesh { geometry: MeshGeometry },

    /// Mesh deformed by an armature.
    Actor {
        geometry: MeshGeometry,
        skin: SkinTable,
    },

    /// NURBS curve object.
    Curve,

    /// One bone. `vrefs` is filled by a second pass once every actor's
    /// skin table exists.
    Joint {
        /// Rest transform relative to the parent joint (armature-world
        /// space for skeleton roots).
        transform: Mat4,
        vrefs: Vec<(String, JointWeights)>,
    },
}

#[derive(Debug)]
pub struct SceneNode {
    pub name: String,
    /// Index into the source object list for object-backed nodes.
    pub object: Option<usize>,
    pub data: NodeData,
    pub children: Vec<NodeId>,
}

/// The assembled tree. `nodes[0]` is always the synthetic root.
#[derive(Debug)]
pub struct Hierarchy {
    pub nodes: Vec<SceneNode>,
}

pub const ROOT: NodeId = 0;

impl Hierarchy {
    /// Expand, classify, and link the working set into a tree.
    pub fn build(
        source: &dyn SceneSource,
        config: &ExportConfig,
    ) -> Result<Self, HierarchyError> {
        let objects = source.objects();

        // Expand the working set: every armature contributes its bones.
        let mut entries: Vec<Entry> = Vec::new();
        for (index, obj) in objects.iter().enumerate() {
            entries.push(Entry::Object(index));
            if let Some(arm) = obj.as_armature() {
                for bone_index in 0..arm.bones.len() {
                    entries.push(Entry::Bone {
                        armature: index,
                        bone: bone_index,
                    });
                }
            }
        }

        let mut nodes = vec![SceneNode {
            name: String::new(),
            object: None,
            data: NodeData::Root,
            children: Vec::new(),
        }];
        let mut entry_nodes: Vec<NodeId> = Vec::with_capacity(entries.len());
        for entry in &entries {
            let node = make_node(objects, *entry, source, config)?;
            entry_nodes.push(nodes.len());
            nodes.push(node);
        }

        // Link children in working-set order. Detached entries keep
        // their node but no parent ever lists it.
        for (position, entry) in entries.iter().enumerate() {
            let parent_node = match resolve_parent(objects, &entries, *entry)? {
                Placement::Under(parent_entry) => {
                    let parent_pos = entries
                        .iter()
                        .position(|e| *e == parent_entry)
                        .ok_or_else(|| {
                            HierarchyError::Build("resolved parent left the working set".into())
                        })?;
                    entry_nodes[parent_pos]
                }
                Placement::Root => ROOT,
                Placement::Detached => continue,
            };
            let child_node = entry_nodes[position];
            nodes[parent_node].children.push(child_node);
        }

        let mut hierarchy = Self { nodes };
        hierarchy.update_joint_data(objects, &entries, &entry_nodes);
        Ok(hierarchy)
    }

    /// Second pass: hand every joint the vertex references it owns in
    /// each actor deformed by its armature.
    fn update_joint_data(
        &mut self,
        objects: &[SceneObject],
        entries: &[Entry],
        entry_nodes: &[NodeId],
    ) {
        // Collect (armature name, joint name, pool, weights) first to
        // keep the borrow on `self.nodes` short.
        let mut assignments: Vec<(NodeId, String, JointWeights)> = Vec::new();
        for node in &self.nodes {
            let NodeData::Actor { skin, .. } = &node.data else {
                continue;
            };
            let Some(object) = node.object else { continue };
            let Some(armature_name) = objects[object]
                .as_mesh()
                .and_then(|m| m.armature.as_deref())
            else {
                continue;
            };
            for (position, entry) in entries.iter().enumerate() {
                let Entry::Bone { armature, bone } = entry else {
                    continue;
                };
                if objects[*armature].name != armature_name {
                    continue;
                }
                let Some(arm) = objects[*armature].as_armature() else {
                    continue;
                };
                if let Some(weights) = skin.joint(&arm.bones[*bone].name) {
                    assignments.push((
                        entry_nodes[position],
                        skin.pool.clone(),
                        weights.clone(),
                    ));
                }
            }
        }
        for (node, pool, weights) in assignments {
            if let NodeData::Joint { vrefs, .. } = &mut self.nodes[node].data {
                vrefs.push((pool, weights));
            }
        }
    }

    pub fn root(&self) -> &SceneNode {
        &self.nodes[ROOT]
    }
}

/// Place the entry within the working set. Rules are tried in order;
/// the first match wins.
fn resolve_parent(
    objects: &[SceneObject],
    entries: &[Entry],
    entry: Entry,
) -> Result<Placement, HierarchyError> {
    match entry {
        Entry::Bone { armature, bone } => {
            let arm = objects[armature].as_armature().ok_or_else(|| {
                HierarchyError::Build(format!(
                    "bone entry references non-armature object '{}'",
                    objects[armature].name
                ))
            })?;
            match &arm.bones[bone].parent {
                // Skeleton root: child of the armature node itself.
                None => Ok(Placement::Under(Entry::Object(armature))),
                Some(parent_name) => {
                    let parent = entries.iter().copied().find(|e| {
                        matches!(e, Entry::Bone { armature: a, bone: b }
                            if *a == armature && arm.bones[*b].name == *parent_name)
                    });
                    // A missing parent bone degrades to the armature.
                    Ok(Placement::Under(parent.unwrap_or(Entry::Object(armature))))
                }
            }
        }
        Entry::Object(index) => {
            let obj = &objects[index];
            let Some(parent_name) = &obj.parent else {
                return Ok(Placement::Root);
            };

            // Bone parenting: hang the object off the named joint.
            if obj.parent_mode == ParentMode::Bone {
                if let Some(bone_name) = &obj.parent_bone {
                    let joint = entries.iter().copied().find(|e| {
                        matches!(e, Entry::Bone { armature, bone }
                            if objects[*armature].name == *parent_name
                                && objects[*armature]
                                    .as_armature()
                                    .map(|a| a.bones[*bone].name == *bone_name)
                                    .unwrap_or(false))
                    });
                    return Ok(match joint {
                        Some(joint) => Placement::Under(joint),
                        None => unmatched_parent(objects, entries, parent_name),
                    });
                }
            }

            // Object parenting, unless a parent-bone name redirects the
            // object away from the armature object itself.
            let parent = entries.iter().copied().find(|e| {
                matches!(e, Entry::Object(p)
                    if objects[*p].name == *parent_name
                        && !(objects[*p].is_armature() && obj.parent_bone.is_some()))
            });
            Ok(match parent {
                Some(parent) => Placement::Under(parent),
                None => unmatched_parent(objects, entries, parent_name),
            })
        }
    }
}

/// No rule fired. A declared parent that is not exported at all promotes
/// the entry to a root child; an exported parent with no matching rule
/// leaves the entry detached.
fn unmatched_parent(objects: &[SceneObject], entries: &[Entry], parent_name: &str) -> Placement {
    let exported = entries
        .iter()
        .any(|e| matches!(e, Entry::Object(p) if objects[*p].name == parent_name));
    if exported {
        Placement::Detached
    } else {
        Placement::Root
    }
}

/// Build the node payload for one entry. Geometry conversion happens
/// here, before any output file exists.
fn make_node(
    objects: &[SceneObject],
    entry: Entry,
    source: &dyn SceneSource,
    config: &ExportConfig,
) -> Result<SceneNode, HierarchyError> {
    match entry {
        Entry::Object(index) => {
            let obj = &objects[index];
            let data = match &obj.data {
                ObjectData::Mesh(mesh) => {
                    let geometry = topology::convert(obj, mesh, source, config).map_err(
                        |source| HierarchyError::NodeCreate {
                            name: obj.name.clone(),
                            source,
                        },
                    )?;
                    if mesh.is_actor() {
                        let skin = SkinTable::build(&obj.name, mesh).map_err(|source| {
                            HierarchyError::NodeCreate {
                                name: obj.name.clone(),
                                source,
                            }
                        })?;
                        NodeData::Actor { geometry, skin }
                    } else {
                        NodeData::Mesh { geometry }
                    }
                }
                ObjectData::Curve(_) => NodeData::Curve,
                ObjectData::Armature(_) => NodeData::Armature,
                ObjectData::Generic => NodeData::Group,
            };
            Ok(SceneNode {
                name: obj.name.clone(),
                object: Some(index),
                data,
                children: Vec::new(),
            })
        }
        Entry::Bone { armature, bone } => {
            let arm_obj = &objects[armature];
            let arm = arm_obj.as_armature().ok_or_else(|| {
                HierarchyError::Build(format!(
                    "bone entry references non-armature object '{}'",
                    arm_obj.name
                ))
            })?;
            let b = &arm.bones[bone];
            let transform = match &b.parent {
                None => arm_obj.matrix_world * b.matrix_local,
                Some(parent_name) => match arm.bone(parent_name) {
                    Some(parent) => parent.matrix_local.inverse() * b.matrix_local,
                    None => arm_obj.matrix_world * b.matrix_local,
                },
            };
            Ok(SceneNode {
                name: b.name.clone(),
                object: None,
                data: NodeData::Joint {
                    transform,
                    vrefs: Vec::new(),
                },
                children: Vec::new(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{ArmatureData, Bone, MemoryScene, MeshData, Polygon};
    use egg_math::Vec3;

    fn triangle() -> MeshData {
        MeshData {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vertex_normals: vec![Vec3::Z; 3],
            polygons: vec![Polygon {
                vertices: vec![0, 1, 2],
                material_index: 0,
                use_smooth: false,
                normal: Vec3::Z,
            }],
            ..Default::default()
        }
    }

    fn two_bone_armature() -> SceneObject {
        SceneObject::new(
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
        )
    }

    fn node_named<'a>(h: &'a Hierarchy, name: &str) -> &'a SceneNode {
        h.nodes.iter().find(|n| n.name == name).unwrap()
    }

    fn child_names(h: &Hierarchy, node: &SceneNode) -> Vec<String> {
        node.children
            .iter()
            .map(|&c| h.nodes[c].name.clone())
            .collect()
    }

    #[test]
    fn test_object_parent_chain() {
        let a = SceneObject::new("A", ObjectData::Generic);
        let mut b = SceneObject::new("B", ObjectData::Generic);
        b.parent = Some("A".to_string());
        let scene = MemoryScene::new(vec![a, b]);

        let h = Hierarchy::build(&scene, &ExportConfig::default()).unwrap();
        assert_eq!(child_names(&h, h.root()), vec!["A"]);
        assert_eq!(child_names(&h, node_named(&h, "A")), vec!["B"]);
    }

    #[test]
    fn test_missing_parent_promotes_to_root() {
        let mut b = SceneObject::new("B", ObjectData::Generic);
        b.parent = Some("NotExported".to_string());
        let scene = MemoryScene::new(vec![b]);

        let h = Hierarchy::build(&scene, &ExportConfig::default()).unwrap();
        assert_eq!(child_names(&h, h.root()), vec!["B"]);
    }

    #[test]
    fn test_armature_expands_into_joint_chain() {
        let scene = MemoryScene::new(vec![two_bone_armature()]);

        let h = Hierarchy::build(&scene, &ExportConfig::default()).unwrap();
        let arm = node_named(&h, "Armature");
        assert!(matches!(arm.data, NodeData::Armature));
        assert_eq!(child_names(&h, arm), vec!["Root"]);
        assert_eq!(child_names(&h, node_named(&h, "Root")), vec!["Tip"]);

        // Child joint transform is relative to its parent joint.
        let NodeData::Joint { transform, .. } = &node_named(&h, "Tip").data else {
            panic!("Tip is not a joint");
        };
        assert_eq!(*transform, Mat4::from_translation(Vec3::Y));
    }

    #[test]
    fn test_bone_parented_object_hangs_off_joint() {
        let mut sword = SceneObject::new("Sword", ObjectData::Generic);
        sword.parent = Some("Armature".to_string());
        sword.parent_mode = ParentMode::Bone;
        sword.parent_bone = Some("Tip".to_string());
        let scene = MemoryScene::new(vec![two_bone_armature(), sword]);

        let h = Hierarchy::build(&scene, &ExportConfig::default()).unwrap();
        assert_eq!(child_names(&h, node_named(&h, "Tip")), vec!["Sword"]);
    }

    fn attached_names(h: &Hierarchy) -> Vec<String> {
        h.nodes
            .iter()
            .flat_map(|n| n.children.iter())
            .map(|&c| h.nodes[c].name.clone())
            .collect()
    }

    #[test]
    fn test_parent_bone_without_bone_mode_stays_detached() {
        // parent_bone set but object-mode parenting: the armature is
        // exported yet neither the object rule nor the bone rule
        // applies, so the object never attaches anywhere.
        let mut obj = SceneObject::new("Odd", ObjectData::Generic);
        obj.parent = Some("Armature".to_string());
        obj.parent_bone = Some("Tip".to_string());
        let scene = MemoryScene::new(vec![two_bone_armature(), obj]);

        let h = Hierarchy::build(&scene, &ExportConfig::default()).unwrap();
        assert!(!attached_names(&h).contains(&"Odd".to_string()));
    }

    #[test]
    fn test_bone_parent_to_missing_bone_stays_detached() {
        let mut obj = SceneObject::new("Sword", ObjectData::Generic);
        obj.parent = Some("Armature".to_string());
        obj.parent_mode = ParentMode::Bone;
        obj.parent_bone = Some("NoSuchBone".to_string());
        let scene = MemoryScene::new(vec![two_bone_armature(), obj]);

        let h = Hierarchy::build(&scene, &ExportConfig::default()).unwrap();
        assert!(!attached_names(&h).contains(&"Sword".to_string()));
    }

    #[test]
    fn test_bone_parent_to_unexported_armature_promotes_to_root() {
        let mut obj = SceneObject::new("Sword", ObjectData::Generic);
        obj.parent = Some("Ghost".to_string());
        obj.parent_mode = ParentMode::Bone;
        obj.parent_bone = Some("Tip".to_string());
        let scene = MemoryScene::new(vec![obj]);

        let h = Hierarchy::build(&scene, &ExportConfig::default()).unwrap();
        assert_eq!(child_names(&h, h.root()), vec!["Sword"]);
    }

    #[test]
    fn test_actor_feeds_joint_vertex_refs() {
        let mut mesh = triangle();
        mesh.armature = Some("Armature".to_string());
        mesh.group_names = vec!["Root".to_string()];
        mesh.vertex_weights = vec![vec![(0, 1.0)]; 3];
        let body = SceneObject::new("Body", ObjectData::Mesh(mesh));
        let scene = MemoryScene::new(vec![two_bone_armature(), body]);

        let h = Hierarchy::build(&scene, &ExportConfig::default()).unwrap();
        let NodeData::Joint { vrefs, .. } = &node_named(&h, "Root").data else {
            panic!("Root is not a joint");
        };
        assert_eq!(vrefs.len(), 1);
        assert_eq!(vrefs[0].0, "Body");
        assert_eq!(vrefs[0].1.entries.len(), 3);

        // The unweighted joint stays empty.
        let NodeData::Joint { vrefs, .. } = &node_named(&h, "Tip").data else {
            panic!("Tip is not a joint");
        };
        assert!(vrefs.is_empty());
    }

    #[test]
    fn test_broken_mesh_fails_node_creation() {
        let mut mesh = triangle();
        mesh.polygons[0].vertices = vec![0, 1, 99];
        let obj = SceneObject::new("Broken", ObjectData::Mesh(mesh));
        let scene = MemoryScene::new(vec![obj]);

        let err = Hierarchy::build(&scene, &ExportConfig::default()).unwrap_err();
        match err {
            HierarchyError::NodeCreate { name, .. } => assert_eq!(name, "Broken"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
