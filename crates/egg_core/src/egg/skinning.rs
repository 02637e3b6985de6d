//! Per-joint vertex membership tables.
//!
//! An actor's joints reference corners of the actor's vertex pool with a
//! membership weight. The table is built in the same face-order corner
//! walk as the topology converter, so indices recorded here line up with
//! the emitted `<VertexPool>` one to one.

use crate::egg::format::{fnum, indented, safe_name};
use crate::egg::topology::GeometryError;
use crate::scene::MeshData;

/// Corner memberships of one vertex group (bone).
#[derive(Debug, Clone)]
pub struct JointWeights {
    pub joint: String,
    /// (corner index, raw weight) pairs in corner order.
    pub entries: Vec<(u32, f32)>,
}

/// Corners sharing one formatted weight value.
#[derive(Debug, Clone)]
pub struct WeightGroup {
    /// Weight, already formatted for emission. Grouping happens on this
    /// string so corners that only differ past the emitted precision
    /// land in one `<VertexRef>`.
    pub value: String,
    pub corners: Vec<u32>,
}

/// All joint memberships of one mesh, keyed to its vertex pool.
#[derive(Debug, Clone)]
pub struct SkinTable {
    /// Vertex pool the corner indices refer to.
    pub pool: String,
    /// Groups in first-use order.
    pub joints: Vec<JointWeights>,
}

impl SkinTable {
    /// Walk the mesh corner stream and record every group membership.
    ///
    /// Weights are stored per shared vertex on the host side; fanning
    /// them out here duplicates a vertex's memberships onto each of its
    /// corners, matching the pool the references point into.
    pub fn build(pool: &str, mesh: &MeshData) -> Result<Self, GeometryError> {
        let group_count = mesh.group_names.len();
        let mut joints: Vec<JointWeights> = mesh
            .group_names
            .iter()
            .map(|name| JointWeights {
                joint: name.clone(),
                entries: Vec::new(),
            })
            .collect();

        let mut corner_index = 0u32;
        for poly in &mesh.polygons {
            for &v in &poly.vertices {
                if let Some(memberships) = mesh.vertex_weights.get(v as usize) {
                    for &(group, weight) in memberships {
                        let slot = joints.get_mut(group as usize).ok_or(
                            GeometryError::UnknownVertexGroup {
                                vertex: v,
                                group,
                                count: group_count,
                            },
                        )?;
                        slot.entries.push((corner_index, weight));
                    }
                }
                corner_index += 1;
            }
        }

        joints.retain(|j| !j.entries.is_empty());
        Ok(Self {
            pool: pool.to_string(),
            joints,
        })
    }

    pub fn joint(&self, name: &str) -> Option<&JointWeights> {
        self.joints.iter().find(|j| j.joint == name)
    }
}

impl JointWeights {
    /// Compact the entries into groups of equal emitted weight,
    /// preserving the order each weight value first appears.
    pub fn weight_groups(&self) -> Vec<WeightGroup> {
        let mut groups: Vec<WeightGroup> = Vec::new();
        for &(corner, weight) in &self.entries {
            let value = fnum(weight);
            match groups.iter_mut().find(|g| g.value == value) {
                Some(group) => group.corners.push(corner),
                None => groups.push(WeightGroup {
                    value,
                    corners: vec![corner],
                }),
            }
        }
        groups
    }

    /// `<VertexRef>` blocks for this joint against the given pool.
    pub fn vertex_ref_blocks(&self, pool: &str, level: usize) -> String {
        let mut out = String::new();
        for group in self.weight_groups() {
            let indices: Vec<String> = group.corners.iter().map(|c| c.to_string()).collect();
            let block = format!(
                "<VertexRef> {{\n  {}\n  <Scalar> membership {{ {} }}\n  <Ref> {{ {} }}\n}}\n",
                indices.join(" "),
                group.value,
                safe_name(pool)
            );
            out.push_str(&indented(&block, level));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Polygon;
    use egg_math::Vec3;

    fn skinned_triangle() -> MeshData {
        MeshData {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vertex_normals: vec![Vec3::Z; 3],
            polygons: vec![Polygon {
                vertices: vec![0, 1, 2],
                material_index: 0,
                use_smooth: false,
                normal: Vec3::Z,
            }],
            group_names: vec!["Bone".to_string(), "Bone.001".to_string()],
            vertex_weights: vec![
                vec![(0, 1.0)],
                vec![(0, 0.5), (1, 0.5)],
                vec![(1, 1.0)],
            ],
            armature: Some("Armature".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_memberships_fan_out_to_corners() {
        let table = SkinTable::build("Tri", &skinned_triangle()).unwrap();
        assert_eq!(table.joints.len(), 2);

        let bone = table.joint("Bone").unwrap();
        assert_eq!(bone.entries, vec![(0, 1.0), (1, 0.5)]);
        let second = table.joint("Bone.001").unwrap();
        assert_eq!(second.entries, vec![(1, 0.5), (2, 1.0)]);
    }

    #[test]
    fn test_weight_groups_compact_on_formatted_value() {
        let joint = JointWeights {
            joint: "Bone".to_string(),
            // 0.5 and 0.5000004 format identically at six decimals.
            entries: vec![(0, 0.5), (1, 0.5000004), (2, 1.0), (3, 0.5)],
        };
        let groups = joint.weight_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].value, "0.500000");
        assert_eq!(groups[0].corners, vec![0, 1, 3]);
        assert_eq!(groups[1].value, "1.000000");
        assert_eq!(groups[1].corners, vec![2]);
    }

    #[test]
    fn test_unknown_group_is_an_error() {
        let mut mesh = skinned_triangle();
        mesh.vertex_weights[0] = vec![(7, 1.0)];
        let err = SkinTable::build("Tri", &mesh).unwrap_err();
        assert!(matches!(err, GeometryError::UnknownVertexGroup { group: 7, .. }));
    }

    #[test]
    fn test_vertex_ref_block_shape() {
        let table = SkinTable::build("Tri", &skinned_triangle()).unwrap();
        let block = table.joint("Bone").unwrap().vertex_ref_blocks("Tri", 0);
        assert!(block.starts_with("<VertexRef> {\n"));
        assert!(block.contains("  0\n  <Scalar> membership { 1.000000 }\n  <Ref> { Tri }"));
        assert!(block.contains("  1\n  <Scalar> membership { 0.500000 }\n  <Ref> { Tri }"));
    }
}
