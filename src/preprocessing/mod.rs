//! Point cloud conditioning: downsampling, normals, neighbour queries.

mod downsample;
mod kdtree;
mod normals;

pub use downsample::{downsample, downsample_with_bounds};
pub use kdtree::CloudIndex;
pub use normals::compute_normals;
