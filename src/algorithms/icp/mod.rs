//! Multi-resolution point-to-plane ICP refinement.
//!
//! # Algorithm
//!
//! ```text
//! Input: model cloud M, scene cloud S (with normals), initial pose T0
//!
//! For level L = coarsest .. finest:
//!   sample M at row stride 2^L
//!   repeat:
//!     a. transform the sampled cloud by the running estimate
//!     b. nearest scene neighbour per point, plane residual
//!        r = n . (T m - s)
//!     c. reject correspondences straying from the residual mean by more
//!        than rejection_scale sigma ("picky" rejection)
//!     d. solve the linearized 6x6 point-to-plane system, compose the
//!        increment onto T
//!   until the mean |r| stops moving by more than `tolerance`
//! ```
//!
//! A singular system abandons the current level with the pose unchanged;
//! an empty correspondence set after rejection counts as convergence.

mod solver;

pub use solver::NormalEquations;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::core::math::{self, IDENTITY_POSE};
use crate::core::types::{PointCloud, Pose3D};
use crate::error::{MatchError, Result};
use crate::preprocessing::CloudIndex;

/// Model sampling strategy across pyramid levels.
///
/// Uniform row sampling is the only supported mode; the variant set keeps
/// the parameter surface of the original interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SampleType {
    /// Take every k-th row of the model cloud.
    #[default]
    Uniform,
}

/// Configuration for the ICP refiner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IcpConfig {
    /// Iteration budget per pyramid level.
    pub max_iterations: u32,

    /// Convergence threshold on the change of the mean absolute residual.
    pub tolerance: f64,

    /// Sigma multiplier for statistical outlier rejection.
    pub rejection_scale: f64,

    /// Number of pyramid levels; level L samples the model at stride 2^L.
    pub num_levels: usize,

    /// Sampling mode. Only [`SampleType::Uniform`] is supported.
    pub sample_type: SampleType,

    /// Correspondences considered per model point. Only 1 (picky ICP) is
    /// supported; the field is accepted for interface compatibility.
    pub num_neighbors_corr: usize,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            max_iterations: 250,
            tolerance: 0.005,
            rejection_scale: 2.5,
            num_levels: 6,
            sample_type: SampleType::Uniform,
            num_neighbors_corr: 1,
        }
    }
}

/// Point-to-plane ICP refiner over a coarse-to-fine model pyramid.
#[derive(Debug, Clone)]
pub struct Icp {
    config: IcpConfig,
}

impl Icp {
    /// Create a refiner with the given configuration.
    pub fn new(config: IcpConfig) -> Self {
        Self { config }
    }

    /// Current configuration.
    pub fn config(&self) -> &IcpConfig {
        &self.config
    }

    /// Register a model onto a scene starting from the identity.
    ///
    /// Returns the refined pose and the mean absolute residual at the
    /// finest level. The scene must carry normals.
    pub fn register(&self, model: &PointCloud, scene: &PointCloud) -> Result<(Pose3D, f64)> {
        let scene_index = self.check_and_index(model, scene)?;
        let (matrix, residual) = self.align(model, scene, &scene_index, &IDENTITY_POSE);
        let mut pose = Pose3D::new();
        pose.update_from_matrix(&matrix);
        pose.residual = residual;
        Ok((pose, residual))
    }

    /// Refine a batch of detector poses in place.
    ///
    /// Each pose seeds its own ICP run; the increment is composed onto the
    /// pose and the residual field is updated.
    pub fn refine(
        &self,
        model: &PointCloud,
        scene: &PointCloud,
        poses: &mut [Pose3D],
    ) -> Result<()> {
        let scene_index = self.check_and_index(model, scene)?;
        for pose in poses.iter_mut() {
            let moved = model.transform(&pose.pose);
            let (delta, residual) = self.align(&moved, scene, &scene_index, &IDENTITY_POSE);
            pose.append_incremental(&delta);
            pose.residual = residual;
        }
        Ok(())
    }

    fn check_and_index(&self, model: &PointCloud, scene: &PointCloud) -> Result<CloudIndex> {
        if scene.normals.is_none() {
            return Err(MatchError::InvalidLayout { found: 3 });
        }
        if model.is_empty() || scene.is_empty() {
            return Err(MatchError::EmptyCloud);
        }
        Ok(CloudIndex::build(scene))
    }

    /// Run the pyramid starting from `initial`, returning the increment
    /// and the final mean absolute residual.
    fn align(
        &self,
        model: &PointCloud,
        scene: &PointCloud,
        scene_index: &CloudIndex,
        initial: &[f64; 16],
    ) -> ([f64; 16], f64) {
        let mut pose = *initial;
        let mut residual = f64::MAX;

        for level in (0..self.config.num_levels).rev() {
            let stride = 1usize << level;
            let sampled = sample_rows(model, stride);
            if sampled.is_empty() {
                continue;
            }

            let mut prev_mean = f64::MAX;
            for iteration in 0..self.config.max_iterations {
                let transformed = sampled.transform(&pose);
                let correspondences = self.correspond(&transformed, scene, scene_index);
                if correspondences.is_empty() {
                    break;
                }

                let retained = self.reject_outliers(correspondences);
                if retained.is_empty() {
                    // Nothing left to pull on: converged by definition.
                    break;
                }

                let mean_abs = retained.iter().map(|c| c.residual.abs()).sum::<f64>()
                    / retained.len() as f64;
                residual = mean_abs;

                let mut system = NormalEquations::new();
                for c in &retained {
                    system.accumulate(&c.point, &c.normal, c.residual);
                }
                let x = match system.solve() {
                    Ok(x) => x,
                    Err(MatchError::IllConditioned) => {
                        warn!(
                            "icp level {level}: normal equations singular after \
                             {iteration} iterations, keeping pose"
                        );
                        break;
                    }
                    Err(_) => unreachable!("solver returns only IllConditioned"),
                };

                let increment = increment_from_twist(&x);
                let mut composed = [0.0f64; 16];
                math::mat_mul44(&increment, &pose, &mut composed);
                pose = composed;

                if (mean_abs - prev_mean).abs() < self.config.tolerance {
                    debug!(
                        "icp level {level}: converged after {} iterations, mean |r| = {:.6}",
                        iteration + 1,
                        mean_abs
                    );
                    break;
                }
                prev_mean = mean_abs;
            }
        }

        if residual == f64::MAX {
            residual = 0.0;
        }
        (pose, residual)
    }

    /// Nearest-neighbour correspondences with point-to-plane residuals.
    fn correspond(
        &self,
        transformed: &PointCloud,
        scene: &PointCloud,
        scene_index: &CloudIndex,
    ) -> Vec<Correspondence> {
        let mut out = Vec::with_capacity(transformed.len());
        for p in &transformed.points {
            let Some((nearest, _)) = scene_index.nearest(p) else {
                continue;
            };
            let s = scene.points[nearest];
            let n = scene.normal(nearest).unwrap_or_default();
            let point = [p[0] as f64, p[1] as f64, p[2] as f64];
            let normal = [n[0] as f64, n[1] as f64, n[2] as f64];
            let diff = [
                point[0] - s[0] as f64,
                point[1] - s[1] as f64,
                point[2] - s[2] as f64,
            ];
            out.push(Correspondence {
                point,
                normal,
                residual: math::dot3(&normal, &diff),
            });
        }
        out
    }

    /// Drop correspondences whose |residual| strays from the mean by more
    /// than `rejection_scale` standard deviations.
    fn reject_outliers(&self, correspondences: Vec<Correspondence>) -> Vec<Correspondence> {
        let n = correspondences.len() as f64;
        let mean = correspondences.iter().map(|c| c.residual.abs()).sum::<f64>() / n;
        let variance = correspondences
            .iter()
            .map(|c| (c.residual.abs() - mean).powi(2))
            .sum::<f64>()
            / n;
        let threshold = self.config.rejection_scale * variance.sqrt();
        correspondences
            .into_iter()
            .filter(|c| (c.residual.abs() - mean).abs() <= threshold)
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct Correspondence {
    point: [f64; 3],
    normal: [f64; 3],
    residual: f64,
}

/// Rigid increment from a twist `[dtheta, dt]`.
fn increment_from_twist(x: &[f64; 6]) -> [f64; 16] {
    let dtheta = [x[0], x[1], x[2]];
    let angle = math::norm3(&dtheta);
    let r = if angle > 1e-15 {
        math::axis_angle_to_rotation(
            &[dtheta[0] / angle, dtheta[1] / angle, dtheta[2] / angle],
            angle,
        )
    } else {
        [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]
    };
    math::rt_to_pose(&r, &[x[3], x[4], x[5]])
}

/// Every k-th row of a cloud, positions only.
fn sample_rows(cloud: &PointCloud, stride: usize) -> PointCloud {
    let mut out = PointCloud::with_capacity(cloud.len() / stride.max(1) + 1);
    for i in (0..cloud.len()).step_by(stride.max(1)) {
        out.push(cloud.points[i]);
    }
    out
}
