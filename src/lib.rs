//! MudraPose - rigid 6-DoF pose estimation from 3D point clouds.
//!
//! Finds a model inside a scene in two coupled stages: a point pair
//! feature (PPF) detector votes for coarse pose hypotheses, and a
//! multi-resolution point-to-plane ICP sharpens the survivors.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      io/                            │  ← PLY, pose records
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                  algorithms/                        │  ← detector, clustering, icp
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                preprocessing/                       │  ← downsample, normals, kd-tree
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← math, types, hash table
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use mudra_pose::{DetectorConfig, Icp, IcpConfig, PpfDetector};
//!
//! # fn main() -> mudra_pose::Result<()> {
//! let model = mudra_pose::io::read_ply("model.ply")?;
//! let scene = mudra_pose::io::read_ply("scene.ply")?;
//!
//! let mut detector = PpfDetector::new(DetectorConfig::default());
//! detector.train(&model)?;
//!
//! let mut poses = detector.match_scene(&scene, 1.0 / 5.0, 0.03)?;
//!
//! let icp = Icp::new(IcpConfig::default());
//! icp.refine(&model, &scene, &mut poses)?;
//!
//! if let Some(best) = poses.first() {
//!     println!("{best}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Training reads the model once and is sequential; matching fans out over
//! scene reference points against the immutable trained model. Clustering
//! and refinement run per pose.

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Cloud preprocessing (depends on core)
// ============================================================================
pub mod preprocessing;

// ============================================================================
// Layer 3: Algorithms (depends on core, preprocessing)
// ============================================================================
pub mod algorithms;

// ============================================================================
// Layer 4: File I/O (depends on core)
// ============================================================================
pub mod io;

mod error;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

pub use crate::core::hash_table::HashTable;
pub use crate::core::types::{PointCloud, Pose3D, PoseCluster3D};
pub use algorithms::clustering::{average_cluster, cluster_poses, group_poses};
pub use algorithms::detector::{DetectorConfig, PpfDetector, SearchParams};
pub use algorithms::icp::{Icp, IcpConfig, SampleType};
pub use error::{MatchError, Result};
pub use preprocessing::{compute_normals, downsample, CloudIndex};
