//! Storage types shared by every stage of the pipeline.

mod point_cloud;
mod pose;

pub use point_cloud::PointCloud;
pub use pose::{Pose3D, PoseCluster3D};
