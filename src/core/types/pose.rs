//! Rigid pose hypotheses and their clusters.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::math::{self, EPS, IDENTITY_POSE};

/// A rigid 6-DoF pose hypothesis.
///
/// The same rotation is held three ways - 4x4 matrix, unit quaternion
/// `(w, x, y, z)`, and rotation angle magnitude - and every mutator
/// re-derives the other views so the three never drift apart. `angle`
/// stays in `[0, pi]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose3D {
    /// Row-major 4x4 pose matrix, translation in slots 3, 7, 11.
    pub pose: [f64; 16],
    /// Unit quaternion, w first.
    pub q: [f64; 4],
    /// Translation.
    pub t: [f64; 3],
    /// Rotation angle magnitude in `[0, pi]`.
    pub angle: f64,
    /// Accumulated votes from the matching stage.
    pub num_votes: u32,
    /// Index of the model reference point that produced this hypothesis.
    pub model_index: usize,
    /// Registration residual, filled in by ICP refinement.
    pub residual: f64,
    /// In-plane rotation angle from the voting stage.
    pub alpha: f64,
}

impl Pose3D {
    /// Identity pose with no votes.
    pub fn new() -> Self {
        Self::with_vote(0.0, 0, 0)
    }

    /// Identity pose tagged with its voting provenance.
    pub fn with_vote(alpha: f64, model_index: usize, num_votes: u32) -> Self {
        Self {
            pose: IDENTITY_POSE,
            q: [1.0, 0.0, 0.0, 0.0],
            t: [0.0; 3],
            angle: 0.0,
            num_votes,
            model_index,
            residual: 0.0,
            alpha,
        }
    }

    /// Rotation angle magnitude from a rotation matrix trace, clamped to 0
    /// at trace ~ 3 and pi at trace ~ -1.
    fn trace_angle(r: &[f64; 9]) -> f64 {
        let trace = r[0] + r[4] + r[8];
        if (trace - 3.0).abs() <= EPS {
            0.0
        } else if (trace + 1.0).abs() <= EPS {
            std::f64::consts::PI
        } else {
            (((trace - 1.0) / 2.0).clamp(-1.0, 1.0)).acos()
        }
    }

    /// Replace the pose with a full 4x4 matrix.
    pub fn update_from_matrix(&mut self, pose: &[f64; 16]) {
        self.pose = *pose;
        let (r, t) = math::pose_to_rt(pose);
        self.t = t;
        self.angle = Self::trace_angle(&r);
        self.q = math::rotation_to_quaternion(&r);
    }

    /// Replace the pose with a rotation matrix and translation.
    pub fn update_from_rt(&mut self, r: &[f64; 9], t: &[f64; 3]) {
        self.pose = math::rt_to_pose(r, t);
        self.t = *t;
        self.angle = Self::trace_angle(r);
        self.q = math::rotation_to_quaternion(r);
    }

    /// Replace the pose with a quaternion and translation.
    ///
    /// The quaternion is normalized first, so cluster averages (which come
    /// in unnormalized) may be written back directly.
    pub fn update_from_quat_t(&mut self, q: &[f64; 4], t: &[f64; 3]) {
        let mut q = *q;
        math::normalize_quaternion(&mut q);
        let r = math::quaternion_to_rotation(&q);
        self.pose = math::rt_to_pose(&r, t);
        self.q = q;
        self.t = *t;
        self.angle = Self::trace_angle(&r);
    }

    /// Left-multiply an incremental transform onto the current pose.
    pub fn append_incremental(&mut self, incremental: &[f64; 16]) {
        let mut composed = [0.0f64; 16];
        math::mat_mul44(incremental, &self.pose, &mut composed);
        self.update_from_matrix(&composed);
    }
}

impl Default for Pose3D {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Pose3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "pose to model index {}: votes = {}, residual = {:.6}",
            self.model_index, self.num_votes, self.residual
        )?;
        for row in 0..4 {
            writeln!(
                f,
                "  {:10.6} {:10.6} {:10.6} {:10.6}",
                self.pose[row * 4],
                self.pose[row * 4 + 1],
                self.pose[row * 4 + 2],
                self.pose[row * 4 + 3]
            )?;
        }
        Ok(())
    }
}

/// An ordered group of nearby pose hypotheses.
///
/// The first pose added acts as the cluster centroid for the proximity
/// test; `num_votes` accumulates monotonically as members join.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoseCluster3D {
    /// Member poses, in joining order. The first is the highest-voted.
    pub poses: Vec<Pose3D>,
    /// Sum of member votes.
    pub num_votes: u32,
    /// Caller-assigned cluster id, carried through serialization.
    pub id: i32,
}

impl PoseCluster3D {
    /// Start a cluster from its first (centroid) pose.
    pub fn from_pose(pose: Pose3D) -> Self {
        let num_votes = pose.num_votes;
        Self {
            poses: vec![pose],
            num_votes,
            id: 0,
        }
    }

    /// Append a pose and accumulate its votes.
    pub fn add(&mut self, pose: Pose3D) {
        self.num_votes += pose.num_votes;
        self.poses.push(pose);
    }

    /// Number of member poses.
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    /// Whether the cluster has no members.
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }
}
