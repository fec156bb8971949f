//! Voxel-grid downsampling by coordinate quantization.
//!
//! Points are binned into a cubic grid spanning the bounding box and each
//! occupied cell collapses to the mean of its members. Cells come out in
//! the order they were first occupied, so the result is deterministic for
//! a fixed input ordering.

use crate::core::math::EPS;
use crate::core::types::PointCloud;

use std::collections::HashMap;

/// Downsample with the grid derived from the cloud's own bounding box.
///
/// See [`downsample_with_bounds`] for the parameters.
pub fn downsample(cloud: &PointCloud, relative_step: f64, weight_by_center: bool) -> PointCloud {
    match cloud.bounds() {
        Some(bounds) => downsample_with_bounds(cloud, bounds, relative_step, weight_by_center),
        None => PointCloud::new(),
    }
}

/// Downsample onto a quantized grid over the given bounding box.
///
/// The grid has `ceil(1 / relative_step)` cells per axis. Each occupied
/// cell emits one point: the arithmetic mean of its members, or the
/// inverse-distance-to-cell-centre weighted mean when `weight_by_center`
/// is set. Normals are averaged the same way and renormalized. An empty
/// cloud yields an empty result.
pub fn downsample_with_bounds(
    cloud: &PointCloud,
    bounds: ([f32; 3], [f32; 3]),
    relative_step: f64,
    weight_by_center: bool,
) -> PointCloud {
    if cloud.is_empty() {
        return PointCloud::new();
    }

    let (min, max) = bounds;
    let dim = (1.0 / relative_step).ceil().max(1.0) as usize;
    let range = [
        (max[0] - min[0]) as f64,
        (max[1] - min[1]) as f64,
        (max[2] - min[2]) as f64,
    ];

    let cell_of = |p: &[f32; 3]| -> usize {
        let mut cell = [0usize; 3];
        for k in 0..3 {
            if range[k] > 0.0 {
                let frac = (p[k] - min[k]) as f64 / range[k];
                cell[k] = ((dim as f64 * frac) as usize).min(dim - 1);
            }
        }
        cell[0] * dim * dim + cell[1] * dim + cell[2]
    };

    // Gather member indices per occupied cell, first-occupancy order.
    let mut slot_of_cell: HashMap<usize, usize> = HashMap::new();
    let mut cells: Vec<(usize, Vec<usize>)> = Vec::new();
    for (i, p) in cloud.points.iter().enumerate() {
        let cell = cell_of(p);
        match slot_of_cell.get(&cell) {
            Some(&slot) => cells[slot].1.push(i),
            None => {
                slot_of_cell.insert(cell, cells.len());
                cells.push((cell, vec![i]));
            }
        }
    }

    let centre_of = |cell: usize| -> [f64; 3] {
        let zc = cell % dim;
        let yc = (cell / dim) % dim;
        let xc = cell / (dim * dim);
        [
            (xc as f64 + 0.5) * range[0] / dim as f64 + min[0] as f64,
            (yc as f64 + 0.5) * range[1] / dim as f64 + min[1] as f64,
            (zc as f64 + 0.5) * range[2] / dim as f64 + min[2] as f64,
        ]
    };

    let mut out = PointCloud::with_capacity(cells.len());
    for (cell, members) in &cells {
        let mut p_acc = [0.0f64; 3];
        let mut n_acc = [0.0f64; 3];
        let mut w_sum = 0.0f64;

        if weight_by_center {
            let centre = centre_of(*cell);
            for &i in members {
                let p = cloud.points[i];
                let dx = p[0] as f64 - centre[0];
                let dy = p[1] as f64 - centre[1];
                let dz = p[2] as f64 - centre[2];
                let d = (dx * dx + dy * dy + dz * dz).sqrt();
                if d <= EPS {
                    continue;
                }
                let w = 1.0 / d;
                accumulate(&mut p_acc, &mut n_acc, cloud, i, w);
                w_sum += w;
            }
        }

        if w_sum <= EPS {
            // Arithmetic path, also the fallback when every member sits on
            // the cell centre and the weights degenerate.
            p_acc = [0.0; 3];
            n_acc = [0.0; 3];
            for &i in members {
                accumulate(&mut p_acc, &mut n_acc, cloud, i, 1.0);
            }
            w_sum = members.len() as f64;
        }

        let p = [
            (p_acc[0] / w_sum) as f32,
            (p_acc[1] / w_sum) as f32,
            (p_acc[2] / w_sum) as f32,
        ];

        if cloud.has_normals() {
            let mut n = [n_acc[0] / w_sum, n_acc[1] / w_sum, n_acc[2] / w_sum];
            let norm = crate::core::math::norm3(&n);
            if norm > EPS {
                n = [n[0] / norm, n[1] / norm, n[2] / norm];
            }
            out.push_with_normal(p, [n[0] as f32, n[1] as f32, n[2] as f32]);
        } else {
            out.push(p);
        }
    }
    out
}

#[inline]
fn accumulate(p_acc: &mut [f64; 3], n_acc: &mut [f64; 3], cloud: &PointCloud, i: usize, w: f64) {
    let p = cloud.points[i];
    p_acc[0] += w * p[0] as f64;
    p_acc[1] += w * p[1] as f64;
    p_acc[2] += w * p[2] as f64;
    if let Some(n) = cloud.normal(i) {
        n_acc[0] += w * n[0] as f64;
        n_acc[1] += w * n[1] as f64;
        n_acc[2] += w * n[2] as f64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn corner_cloud() -> PointCloud {
        // Two tight clumps in opposite corners of the unit cube.
        let mut cloud = PointCloud::new();
        for d in 0..3 {
            let off = d as f32 * 0.01;
            cloud.push_with_normal([off, off, off], [0.0, 0.0, 1.0]);
            cloud.push_with_normal([1.0 - off, 1.0 - off, 1.0 - off], [0.0, 1.0, 0.0]);
        }
        cloud
    }

    #[test]
    fn test_clumps_collapse() {
        let cloud = corner_cloud();
        let sampled = downsample(&cloud, 0.25, false);
        assert_eq!(sampled.len(), 2);

        // First-occupancy order: the origin clump was pushed first.
        assert!(sampled.points[0][0] < 0.5);
        assert!(sampled.points[1][0] > 0.5);
        assert_relative_eq!(sampled.points[0][0], 0.01, epsilon = 1e-6);

        // Normals stay unit.
        let n = sampled.normals.as_ref().unwrap()[0];
        let norm = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_empty_input() {
        let sampled = downsample(&PointCloud::new(), 0.1, false);
        assert!(sampled.is_empty());
    }

    #[test]
    fn test_sparse_cloud_unchanged() {
        // Points farther apart than a cell each survive on their own.
        let mut cloud = PointCloud::new();
        cloud.push([0.0, 0.0, 0.0]);
        cloud.push([1.0, 0.0, 0.0]);
        cloud.push([0.0, 1.0, 0.0]);
        let sampled = downsample(&cloud, 0.2, false);
        assert_eq!(sampled.len(), 3);
        for (a, b) in cloud.points.iter().zip(sampled.points.iter()) {
            for k in 0..3 {
                assert_relative_eq!(a[k], b[k], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_idempotent_under_fixed_bounds() {
        let cloud = corner_cloud();
        let bounds = cloud.bounds().unwrap();
        let once = downsample_with_bounds(&cloud, bounds, 0.25, false);
        let twice = downsample_with_bounds(&once, bounds, 0.25, false);
        assert_eq!(once.len(), twice.len());
        for i in 0..once.len() {
            for k in 0..3 {
                assert_relative_eq!(once.points[i][k], twice.points[i][k], epsilon = 1e-6);
                let na = once.normals.as_ref().unwrap()[i][k];
                let nb = twice.normals.as_ref().unwrap()[i][k];
                assert_relative_eq!(na, nb, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_weighted_matches_arithmetic_for_singletons() {
        // One point per cell: the 1/d weight cancels and both paths agree.
        let mut cloud = PointCloud::new();
        cloud.push([0.1, 0.2, 0.3]);
        cloud.push([0.9, 0.8, 0.7]);
        let plain = downsample(&cloud, 0.25, false);
        let weighted = downsample(&cloud, 0.25, true);
        assert_eq!(plain.len(), weighted.len());
        for i in 0..plain.len() {
            for k in 0..3 {
                assert_relative_eq!(plain.points[i][k], weighted.points[i][k], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_weighted_centre_fallback() {
        // All members exactly on a cell centre: weights degenerate and the
        // arithmetic fallback must kick in rather than dividing by zero.
        let mut cloud = PointCloud::new();
        // Unit cube spanned by helper points in distinct far cells.
        cloud.push([0.0, 0.0, 0.0]);
        cloud.push([1.0, 1.0, 1.0]);
        // Centre of cell (0.5 .. 0.75)^3 at step 0.25 is 0.625.
        cloud.push([0.625, 0.625, 0.625]);
        let sampled = downsample(&cloud, 0.25, true);
        assert_eq!(sampled.len(), 3);
        assert!(sampled.points.iter().all(|p| p.iter().all(|v| v.is_finite())));
    }

    #[test]
    fn test_flat_cloud_zero_range_axis() {
        // A planar cloud has zero z range; the z cell index collapses to 0.
        let mut cloud = PointCloud::new();
        cloud.push([0.0, 0.0, 0.5]);
        cloud.push([1.0, 1.0, 0.5]);
        let sampled = downsample(&cloud, 0.5, false);
        assert_eq!(sampled.len(), 2);
    }
}
