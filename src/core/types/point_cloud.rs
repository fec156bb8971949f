//! Oriented 3D point cloud storage.

use serde::{Deserialize, Serialize};

use crate::core::math::{self, EPS};

/// A collection of 3D points with optional unit normals.
///
/// Coordinates are stored single-precision; numeric kernels promote to
/// `f64` while they work. Normals, when present, run parallel to the
/// position vector (same length, same ordering).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PointCloud {
    /// Point positions.
    pub points: Vec<[f32; 3]>,
    /// Optional unit normals, one per point.
    pub normals: Option<Vec<[f32; 3]>>,
}

impl PointCloud {
    /// Create an empty cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
            normals: None,
        }
    }

    /// Build a cloud from parallel position and normal vectors.
    pub fn from_parts(points: Vec<[f32; 3]>, normals: Option<Vec<[f32; 3]>>) -> Self {
        if let Some(ref n) = normals {
            debug_assert_eq!(points.len(), n.len());
        }
        Self { points, normals }
    }

    /// Add a point without a normal.
    ///
    /// If earlier points carried normals, a zero normal is appended to keep
    /// the vectors parallel.
    #[inline]
    pub fn push(&mut self, point: [f32; 3]) {
        self.points.push(point);
        if let Some(ref mut normals) = self.normals {
            normals.push([0.0; 3]);
        }
    }

    /// Add a point with its normal, backfilling zero normals for any points
    /// added before the first oriented one.
    #[inline]
    pub fn push_with_normal(&mut self, point: [f32; 3], normal: [f32; 3]) {
        let previous = self.points.len();
        self.points.push(point);
        match self.normals {
            Some(ref mut normals) => normals.push(normal),
            None => {
                let mut normals = vec![[0.0f32; 3]; previous];
                normals.push(normal);
                self.normals = Some(normals);
            }
        }
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the cloud holds no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether normals are stored.
    #[inline]
    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    /// Normal at `index`, if normals are present.
    #[inline]
    pub fn normal(&self, index: usize) -> Option<[f32; 3]> {
        self.normals.as_ref().map(|n| n[index])
    }

    /// Iterate over `(position, optional normal)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = ([f32; 3], Option<[f32; 3]>)> + '_ {
        self.points
            .iter()
            .enumerate()
            .map(move |(i, p)| (*p, self.normal(i)))
    }

    /// Axis-aligned bounding box, or `None` for an empty cloud.
    pub fn bounds(&self) -> Option<([f32; 3], [f32; 3])> {
        let first = *self.points.first()?;
        let mut min = first;
        let mut max = first;
        for p in &self.points[1..] {
            for k in 0..3 {
                min[k] = min[k].min(p[k]);
                max[k] = max[k].max(p[k]);
            }
        }
        Some((min, max))
    }

    /// Diagonal length of the bounding box. Empty clouds report 0.
    pub fn diameter(&self) -> f64 {
        match self.bounds() {
            Some((min, max)) => {
                let dx = (max[0] - min[0]) as f64;
                let dy = (max[1] - min[1]) as f64;
                let dz = (max[2] - min[2]) as f64;
                (dx * dx + dy * dy + dz * dz).sqrt()
            }
            None => 0.0,
        }
    }

    /// Apply a rigid 4x4 transform, returning the moved cloud.
    ///
    /// Positions go through the full homogeneous product with perspective
    /// divide; normals see only the rotation and are renormalized.
    pub fn transform(&self, pose: &[f64; 16]) -> PointCloud {
        let (r, _) = math::pose_to_rt(pose);

        let points = self
            .points
            .iter()
            .map(|p| {
                let moved = math::transform_point(pose, &[p[0] as f64, p[1] as f64, p[2] as f64]);
                [moved[0] as f32, moved[1] as f32, moved[2] as f32]
            })
            .collect();

        let normals = self.normals.as_ref().map(|normals| {
            normals
                .iter()
                .map(|n| {
                    let mut rotated =
                        math::mat_mul331(&r, &[n[0] as f64, n[1] as f64, n[2] as f64]);
                    let norm = math::norm3(&rotated);
                    if norm > EPS {
                        rotated = [rotated[0] / norm, rotated[1] / norm, rotated[2] / norm];
                    }
                    [rotated[0] as f32, rotated[1] as f32, rotated[2] as f32]
                })
                .collect()
        });

        PointCloud { points, normals }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::math::{axis_angle_to_rotation, rt_to_pose};
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_push_and_len() {
        let mut cloud = PointCloud::new();
        assert!(cloud.is_empty());
        cloud.push([1.0, 2.0, 3.0]);
        cloud.push([4.0, 5.0, 6.0]);
        assert_eq!(cloud.len(), 2);
        assert!(!cloud.has_normals());
    }

    #[test]
    fn test_push_with_normal_backfills() {
        let mut cloud = PointCloud::new();
        cloud.push([0.0; 3]);
        cloud.push_with_normal([1.0, 0.0, 0.0], [0.0, 0.0, 1.0]);
        assert!(cloud.has_normals());
        assert_eq!(cloud.normal(0), Some([0.0; 3]));
        assert_eq!(cloud.normal(1), Some([0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_bounds_and_diameter() {
        let mut cloud = PointCloud::new();
        cloud.push([-1.0, 0.0, 2.0]);
        cloud.push([3.0, -2.0, 0.0]);
        cloud.push([0.0, 1.0, 1.0]);
        let (min, max) = cloud.bounds().unwrap();
        assert_eq!(min, [-1.0, -2.0, 0.0]);
        assert_eq!(max, [3.0, 1.0, 2.0]);
        assert_relative_eq!(cloud.diameter(), (16.0f64 + 9.0 + 4.0).sqrt());
    }

    #[test]
    fn test_empty_cloud_bounds() {
        let cloud = PointCloud::new();
        assert!(cloud.bounds().is_none());
        assert_eq!(cloud.diameter(), 0.0);
    }

    #[test]
    fn test_transform_moves_points_and_rotates_normals() {
        let mut cloud = PointCloud::new();
        cloud.push_with_normal([1.0, 0.0, 0.0], [1.0, 0.0, 0.0]);

        let r = axis_angle_to_rotation(&[0.0, 0.0, 1.0], FRAC_PI_2);
        let pose = rt_to_pose(&r, &[0.0, 0.0, 5.0]);
        let moved = cloud.transform(&pose);

        assert_relative_eq!(moved.points[0][0] as f64, 0.0, epsilon = 1e-6);
        assert_relative_eq!(moved.points[0][1] as f64, 1.0, epsilon = 1e-6);
        assert_relative_eq!(moved.points[0][2] as f64, 5.0, epsilon = 1e-6);

        let n = moved.normals.as_ref().unwrap()[0];
        assert_relative_eq!(n[0] as f64, 0.0, epsilon = 1e-6);
        assert_relative_eq!(n[1] as f64, 1.0, epsilon = 1e-6);
        // Translation must not leak into normals.
        assert_relative_eq!(n[2] as f64, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_transform_identity_roundtrip() {
        let mut cloud = PointCloud::new();
        for i in 0..10 {
            let v = i as f32 * 0.3;
            cloud.push_with_normal([v, -v, v * 2.0], [0.0, 1.0, 0.0]);
        }
        let moved = cloud.transform(&crate::core::math::IDENTITY_POSE);
        assert_eq!(moved, cloud);
    }
}
