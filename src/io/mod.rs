//! File formats: ASCII PLY clouds and binary pose records.

pub mod ply;
pub mod pose_format;

pub use ply::{read_ply, write_ply};
pub use pose_format::{
    load_cluster, load_pose, read_cluster, read_pose, save_cluster, save_pose, write_cluster,
    write_pose,
};
