//! Point pair feature detector: hash-model training and Hough-style
//! pose voting.
//!
//! # Algorithm
//!
//! ```text
//! Training:  model cloud -> downsample -> for every ordered pair (i, j):
//!            PPF -> quantize -> hash -> table[hash] += { i, row }
//!            row stores the feature and the model-frame alpha angle
//!
//! Matching:  scene cloud -> downsample -> for every reference point r:
//!            vote over (model point, alpha bin) for each scene pair
//!            (r, j), take the accumulator maximum, reconstruct the pose
//!            T = Tsg^-1 . Rx(alpha) . Tmg
//! ```
//!
//! Candidate poses are clustered by proximity and returned ranked by vote
//! mass. Matching reads the trained model immutably and fans out over
//! reference points; each iteration owns its accumulator.

mod ppf;

pub use ppf::{alpha_in_glyph, compute_alpha, compute_ppf, hash_ppf, PPF_LENGTH};

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::algorithms::clustering::cluster_poses;
use crate::core::hash_table::HashTable;
use crate::core::math;
use crate::core::types::{PointCloud, Pose3D};
use crate::error::{MatchError, Result};
use crate::preprocessing::downsample;

/// Training-time parameters of the detector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Model sampling step relative to the model diameter.
    pub sampling_step_relative: f64,

    /// Accepted for interface compatibility; the trained distance step is
    /// derived from `sampling_step_relative` and the model diameter.
    pub distance_step_relative: f64,

    /// Number of angle quantization bins over a full turn.
    pub num_angles: u32,

    /// Keep pairs whose in-plane angle degenerates to NaN, inserting them
    /// with alpha = 0 instead of skipping them.
    pub keep_degenerate_pairs: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sampling_step_relative: 0.05,
            distance_step_relative: 0.05,
            num_angles: 30,
            keep_degenerate_pairs: false,
        }
    }
}

/// Clustering and ranking parameters applied after voting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SearchParams {
    /// Number of ranked poses to return (the top-K handed to refinement).
    pub num_poses: usize,

    /// Translation distance under which two poses share a cluster.
    /// Defaults to the trained distance step.
    pub position_threshold: Option<f64>,

    /// Rotation angle difference (radians) under which two poses share a
    /// cluster. Defaults to the trained angle step.
    pub rotation_threshold: Option<f64>,

    /// Reserved minimum score; accepted for API compatibility but not
    /// consulted when ranking (candidates are ordered by votes alone).
    pub min_match_score: f64,

    /// Use vote-weighted averaging when collapsing a cluster.
    pub use_weighted_clustering: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            num_poses: 5,
            position_threshold: None,
            rotation_threshold: None,
            min_match_score: 0.5,
            use_weighted_clustering: false,
        }
    }
}

/// One trained hash entry: which model reference produced the pair and
/// where its feature row lives.
#[derive(Debug, Clone, Copy)]
struct PairNode {
    model_index: u32,
    ppf_row: u32,
}

/// Everything produced by training, immutable afterwards.
///
/// The feature table and the hash nodes are contiguous, indexed by
/// `i * M + j`, and shared read-only across matching workers.
#[derive(Debug, Clone)]
struct ModelContext {
    sampled: PointCloud,
    ppf: Vec<[f32; PPF_LENGTH]>,
    table: HashTable<PairNode>,
    angle_step: f64,
    distance_step: f64,
    num_angles: usize,
    num_ref_points: usize,
}

/// PPF detector: train on a model cloud, then propose poses in scenes.
#[derive(Debug, Clone)]
pub struct PpfDetector {
    config: DetectorConfig,
    search: SearchParams,
    model: Option<ModelContext>,
}

impl PpfDetector {
    /// Create an untrained detector.
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            search: SearchParams::default(),
            model: None,
        }
    }

    /// Create an untrained detector with explicit search parameters.
    pub fn with_search_params(config: DetectorConfig, search: SearchParams) -> Self {
        Self {
            config,
            search,
            model: None,
        }
    }

    /// Replace the search parameters.
    pub fn set_search_params(&mut self, search: SearchParams) {
        self.search = search;
    }

    /// Current configuration.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Whether `train` has completed.
    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    /// Angle quantization step in radians.
    pub fn angle_step(&self) -> f64 {
        std::f64::consts::TAU / self.config.num_angles as f64
    }

    /// Distance quantization step of the trained model, if trained.
    pub fn distance_step(&self) -> Option<f64> {
        self.model.as_ref().map(|m| m.distance_step)
    }

    /// Build the hash model from an oriented model cloud.
    ///
    /// The cloud must carry normals. Training is sequential; the resulting
    /// model is bit-identical for identical input and parameters.
    pub fn train(&mut self, model: &PointCloud) -> Result<()> {
        if model.normals.is_none() {
            return Err(MatchError::InvalidLayout { found: 3 });
        }

        let diameter = model.diameter();
        let distance_step = diameter * self.config.sampling_step_relative;
        let angle_step = self.angle_step();

        let sampled = downsample(model, self.config.sampling_step_relative, false);
        let m = sampled.len();
        if m == 0 {
            return Err(MatchError::EmptyCloud);
        }

        let mut ppf = vec![[0.0f32; PPF_LENGTH]; m * m];
        let mut table: HashTable<PairNode> = HashTable::with_capacity(m * m);

        for i in 0..m {
            let p1 = promote(&sampled.points[i]);
            let n1 = promote(&sampled.normal(i).unwrap_or_default());
            for j in 0..m {
                if i == j {
                    continue;
                }
                let p2 = promote(&sampled.points[j]);
                let n2 = promote(&sampled.normal(j).unwrap_or_default());

                let Some(f) = compute_ppf(&p1, &n1, &p2, &n2) else {
                    continue;
                };
                let alpha = match compute_alpha(&p1, &n1, &p2) {
                    Some(alpha) => alpha,
                    None if self.config.keep_degenerate_pairs => 0.0,
                    None => continue,
                };

                let key = hash_ppf(&f, angle_step, distance_step);
                let row = i * m + j;
                ppf[row] = [f[0] as f32, f[1] as f32, f[2] as f32, f[3] as f32, alpha as f32];
                table.insert_prehashed(
                    key,
                    PairNode {
                        model_index: i as u32,
                        ppf_row: row as u32,
                    },
                );
            }
        }

        info!(
            "trained ppf model: {} reference points, {} pairs, {} buckets",
            m,
            table.len(),
            table.bucket_count()
        );

        self.model = Some(ModelContext {
            sampled,
            ppf,
            table,
            angle_step,
            distance_step,
            num_angles: self.config.num_angles as usize,
            num_ref_points: m,
        });
        Ok(())
    }

    /// Match a scene against the trained model.
    ///
    /// `relative_scene_sample_step` selects every k-th sampled scene point
    /// as a reference (k = round(1 / step)); `relative_scene_distance` is
    /// the scene downsampling step. Returns clustered poses ranked by
    /// votes, truncated to `num_poses`.
    pub fn match_scene(
        &self,
        scene: &PointCloud,
        relative_scene_sample_step: f64,
        relative_scene_distance: f64,
    ) -> Result<Vec<Pose3D>> {
        let model = self.model.as_ref().ok_or(MatchError::NotTrained)?;
        if scene.normals.is_none() {
            return Err(MatchError::InvalidLayout { found: 3 });
        }

        let sampled = downsample(scene, relative_scene_distance, true);
        if sampled.is_empty() {
            return Err(MatchError::EmptyCloud);
        }

        let scene_step = (1.0 / relative_scene_sample_step).round().max(1.0) as usize;
        let references: Vec<usize> = (0..sampled.len()).step_by(scene_step).collect();
        debug!(
            "matching {} scene references against {} model points",
            references.len(),
            model.num_ref_points
        );

        let candidates: Vec<Pose3D> = references
            .par_iter()
            .map(|&r| vote_for_reference(model, &sampled, r))
            .collect();

        let position_threshold = self
            .search
            .position_threshold
            .unwrap_or(model.distance_step);
        let rotation_threshold = self.search.rotation_threshold.unwrap_or(model.angle_step);

        let mut results = cluster_poses(
            candidates,
            position_threshold,
            rotation_threshold,
            self.search.use_weighted_clustering,
        );
        results.truncate(self.search.num_poses);
        Ok(results)
    }
}

/// Cast one reference point's votes and extract its best pose.
fn vote_for_reference(model: &ModelContext, sampled: &PointCloud, r: usize) -> Pose3D {
    let num_angles = model.num_angles;
    let m = model.num_ref_points;

    let p1 = promote(&sampled.points[r]);
    let n1 = promote(&sampled.normal(r).unwrap_or_default());
    let (r_sg, t_sg) = math::glyph_transform(&p1, &n1);

    // Fresh accumulator per reference: no state crosses iterations.
    let mut accumulator = vec![0u32; m * num_angles];

    for j in 0..sampled.len() {
        if j == r {
            continue;
        }
        let p2 = promote(&sampled.points[j]);
        let n2 = promote(&sampled.normal(j).unwrap_or_default());

        let Some(f) = compute_ppf(&p1, &n1, &p2, &n2) else {
            continue;
        };
        let key = hash_ppf(&f, model.angle_step, model.distance_step);

        let Some(alpha_scene) = alpha_in_glyph(&r_sg, &t_sg, &p2) else {
            continue;
        };

        for (node_key, node) in model.table.bucket_prehashed(key) {
            if node_key != key {
                continue;
            }
            let alpha_model = model.ppf[node.ppf_row as usize][PPF_LENGTH - 1] as f64;
            let alpha = alpha_model - alpha_scene;
            // alpha lives in [-2pi, 2pi]; spread it across the bins.
            let bin = ((num_angles as f64 * (alpha + std::f64::consts::TAU)
                / (2.0 * std::f64::consts::TAU)) as usize)
                .min(num_angles - 1);
            accumulator[node.model_index as usize * num_angles + bin] += 1;
        }
    }

    // Accumulator maximum.
    let mut best_ref = 0usize;
    let mut best_bin = 0usize;
    let mut best_votes = 0u32;
    for k in 0..m {
        for b in 0..num_angles {
            let votes = accumulator[k * num_angles + b];
            if votes > best_votes {
                best_votes = votes;
                best_ref = k;
                best_bin = b;
            }
        }
    }

    // Reconstruct the candidate pose from the winning bin.
    let alpha = best_bin as f64 * 2.0 * std::f64::consts::TAU / num_angles as f64
        - std::f64::consts::TAU;

    let p_model = promote(&model.sampled.points[best_ref]);
    let n_model = promote(&model.sampled.normal(best_ref).unwrap_or_default());
    let (r_mg, t_mg) = math::glyph_transform(&p_model, &n_model);

    let t_sg_inv = math::invert_rigid(&math::rt_to_pose(&r_sg, &t_sg));
    let t_alpha = math::unit_x_rotation_44(alpha);
    let t_mg = math::rt_to_pose(&r_mg, &t_mg);

    let mut tmp = [0.0f64; 16];
    math::mat_mul44(&t_alpha, &t_mg, &mut tmp);
    let mut pose = [0.0f64; 16];
    math::mat_mul44(&t_sg_inv, &tmp, &mut pose);

    let mut candidate = Pose3D::with_vote(alpha, best_ref, best_votes);
    candidate.update_from_matrix(&pose);
    candidate
}

#[inline]
fn promote(v: &[f32; 3]) -> [f64; 3] {
    [v[0] as f64, v[1] as f64, v[2] as f64]
}
