use crate::Vec3;

/// Axis-aligned bounding box.
///
/// Used for object-relative (ORCO) texture coordinate generation, where
/// vertex positions are normalized against the local bounds of the mesh.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create an empty AABB (contains nothing).
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    /// Create an AABB from two corner points.
    pub fn from_points(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Compute the bounds of a point set. Empty input yields an empty AABB.
    pub fn from_point_cloud(points: &[Vec3]) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.grow(*p);
        }
        aabb
    }

    /// Expand the bounds to contain a point.
    pub fn grow(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// True if no point has been added.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    /// Extent along each axis.
    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Per-axis reciprocal of the extent.
    ///
    /// Degenerate (zero-extent) axes map to a zero inverse scale instead
    /// of dividing by zero, so normalized coordinates stay finite.
    pub fn inverse_extent(&self) -> Vec3 {
        let e = self.extent();
        Vec3::new(
            if e.x > 0.0 { 1.0 / e.x } else { 0.0 },
            if e.y > 0.0 { 1.0 / e.y } else { 0.0 },
            if e.z > 0.0 { 1.0 / e.z } else { 0.0 },
        )
    }

    /// Center of the bounding box.
    pub fn centroid(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}
