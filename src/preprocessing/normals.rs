//! Surface normal estimation from local covariance.
//!
//! For each point the k nearest neighbours form a scatter matrix whose
//! lowest-eigenvalue eigenvector is the surface normal. Sign is arbitrary
//! unless a viewpoint is supplied, in which case normals are flipped to
//! face it.

use crate::core::math::eigen_symmetric3_lowest;
use crate::core::types::PointCloud;
use crate::preprocessing::kdtree::CloudIndex;

/// Estimate a normal per point and return the oriented cloud.
///
/// `k` is the neighbourhood size (the point itself counts as its own
/// nearest neighbour). When `viewpoint` is given, each normal `n` at point
/// `p` is flipped so that `n . (viewpoint - p) >= 0`.
pub fn compute_normals(
    cloud: &PointCloud,
    k: usize,
    viewpoint: Option<[f32; 3]>,
) -> PointCloud {
    if cloud.is_empty() {
        return PointCloud::new();
    }
    let k = k.clamp(1, cloud.len());
    let index = CloudIndex::build(cloud);

    let mut out = PointCloud::with_capacity(cloud.len());
    for p in &cloud.points {
        let neighbours = index.nearest_n(p, k);
        let cov = local_covariance(cloud, &neighbours);
        let mut n = eigen_symmetric3_lowest(&cov);

        if let Some(vp) = viewpoint {
            let to_view = [
                vp[0] as f64 - p[0] as f64,
                vp[1] as f64 - p[1] as f64,
                vp[2] as f64 - p[2] as f64,
            ];
            if crate::core::math::dot3(&n, &to_view) < 0.0 {
                n = [-n[0], -n[1], -n[2]];
            }
        }

        out.push_with_normal(*p, [n[0] as f32, n[1] as f32, n[2] as f32]);
    }
    out
}

/// Scatter matrix of a neighbourhood: `E[x x^T] - mu mu^T`.
fn local_covariance(cloud: &PointCloud, neighbours: &[(usize, f32)]) -> [[f64; 3]; 3] {
    let count = neighbours.len() as f64;
    let mut acc = [0.0f64; 9];
    for &(i, _) in neighbours {
        let p = cloud.points[i];
        let (x, y, z) = (p[0] as f64, p[1] as f64, p[2] as f64);
        acc[0] += x * x;
        acc[1] += x * y;
        acc[2] += x * z;
        acc[3] += y * y;
        acc[4] += y * z;
        acc[5] += z * z;
        acc[6] += x;
        acc[7] += y;
        acc[8] += z;
    }
    for v in &mut acc {
        *v /= count;
    }
    let (mx, my, mz) = (acc[6], acc[7], acc[8]);
    [
        [acc[0] - mx * mx, acc[1] - mx * my, acc[2] - mx * mz],
        [acc[1] - mx * my, acc[3] - my * my, acc[4] - my * mz],
        [acc[2] - mx * mz, acc[4] - my * mz, acc[5] - mz * mz],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plane_cloud() -> PointCloud {
        // Grid in the z = 2 plane.
        let mut cloud = PointCloud::new();
        for x in 0..6 {
            for y in 0..6 {
                cloud.push([x as f32 * 0.1, y as f32 * 0.1, 2.0]);
            }
        }
        cloud
    }

    #[test]
    fn test_plane_normals_are_z() {
        let oriented = compute_normals(&plane_cloud(), 8, None);
        assert!(oriented.has_normals());
        for n in oriented.normals.as_ref().unwrap() {
            assert_relative_eq!(n[2].abs() as f64, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_viewpoint_flip() {
        // Viewpoint above the plane: all normals face +z.
        let oriented = compute_normals(&plane_cloud(), 8, Some([0.0, 0.0, 10.0]));
        for n in oriented.normals.as_ref().unwrap() {
            assert!(n[2] > 0.9);
        }

        // Viewpoint below: all face -z.
        let oriented = compute_normals(&plane_cloud(), 8, Some([0.0, 0.0, -10.0]));
        for n in oriented.normals.as_ref().unwrap() {
            assert!(n[2] < -0.9);
        }
    }

    #[test]
    fn test_tilted_plane() {
        // Points spanning x + z = 0: normal is (1, 0, 1) / sqrt(2).
        let mut cloud = PointCloud::new();
        for i in 0..8 {
            for j in 0..8 {
                let u = i as f32 * 0.1;
                let v = j as f32 * 0.1;
                cloud.push([u, v, -u]);
            }
        }
        let oriented = compute_normals(&cloud, 10, Some([10.0, 0.0, 10.0]));
        let inv_sqrt2 = std::f64::consts::FRAC_1_SQRT_2;
        for n in oriented.normals.as_ref().unwrap() {
            assert_relative_eq!(n[0] as f64, inv_sqrt2, epsilon = 1e-5);
            assert_relative_eq!(n[1] as f64, 0.0, epsilon = 1e-5);
            assert_relative_eq!(n[2] as f64, inv_sqrt2, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_empty_cloud() {
        let oriented = compute_normals(&PointCloud::new(), 5, None);
        assert!(oriented.is_empty());
    }

    #[test]
    fn test_positions_preserved() {
        let cloud = plane_cloud();
        let oriented = compute_normals(&cloud, 8, None);
        assert_eq!(oriented.points, cloud.points);
    }
}
