//! Nearest-neighbour index over point cloud positions.

use kiddo::{KdTree, SquaredEuclidean};

use crate::core::types::PointCloud;

/// k-d tree over the positions of a cloud.
///
/// Neighbour queries report squared euclidean distances. The index borrows
/// nothing from the cloud it was built on; it stores point indices and is
/// safe to keep after the cloud moves, as long as the caller resolves the
/// indices against the same data.
#[derive(Debug)]
pub struct CloudIndex {
    tree: KdTree<f32, 3>,
    len: usize,
}

impl CloudIndex {
    /// Build an index from a cloud's positions.
    pub fn build(cloud: &PointCloud) -> Self {
        let mut tree: KdTree<f32, 3> = KdTree::new();
        for (i, point) in cloud.points.iter().enumerate() {
            tree.add(point, i as u64);
        }
        Self {
            tree,
            len: cloud.len(),
        }
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Index and squared distance of the nearest point to `query`.
    ///
    /// Returns `None` on an empty index.
    pub fn nearest(&self, query: &[f32; 3]) -> Option<(usize, f32)> {
        if self.len == 0 {
            return None;
        }
        let hit = self.tree.nearest_one::<SquaredEuclidean>(query);
        Some((hit.item as usize, hit.distance))
    }

    /// The `k` nearest points to `query`, closest first.
    ///
    /// Fewer than `k` entries come back when the index is smaller than `k`.
    pub fn nearest_n(&self, query: &[f32; 3], k: usize) -> Vec<(usize, f32)> {
        self.tree
            .nearest_n::<SquaredEuclidean>(query, k)
            .into_iter()
            .map(|hit| (hit.item as usize, hit.distance))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid_cloud() -> PointCloud {
        let mut cloud = PointCloud::new();
        for x in 0..4 {
            for y in 0..4 {
                cloud.push([x as f32, y as f32, 0.0]);
            }
        }
        cloud
    }

    #[test]
    fn test_nearest_exact_hit() {
        let cloud = grid_cloud();
        let index = CloudIndex::build(&cloud);
        let (i, d) = index.nearest(&[2.0, 3.0, 0.0]).unwrap();
        assert_eq!(cloud.points[i], [2.0, 3.0, 0.0]);
        assert_relative_eq!(d, 0.0);
    }

    #[test]
    fn test_nearest_off_grid() {
        let cloud = grid_cloud();
        let index = CloudIndex::build(&cloud);
        let (i, d) = index.nearest(&[1.1, 0.9, 0.2]).unwrap();
        assert_eq!(cloud.points[i], [1.0, 1.0, 0.0]);
        assert_relative_eq!(d, 0.01 + 0.01 + 0.04, epsilon = 1e-6);
    }

    #[test]
    fn test_nearest_n_sorted() {
        let cloud = grid_cloud();
        let index = CloudIndex::build(&cloud);
        let hits = index.nearest_n(&[0.0, 0.0, 0.0], 4);
        assert_eq!(hits.len(), 4);
        assert_eq!(hits[0].0, 0);
        for pair in hits.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[test]
    fn test_empty_index() {
        let index = CloudIndex::build(&PointCloud::new());
        assert!(index.is_empty());
        assert!(index.nearest(&[0.0; 3]).is_none());
    }
}
