//! Grouping and averaging of candidate poses.
//!
//! Raw voting output contains one hypothesis per scene reference point;
//! hypotheses that agree on the object pose land close together. Clustering
//! groups them greedily by proximity to cluster centroids, then collapses
//! each group into a single averaged pose carrying the group's vote mass.
//!
//! Quaternions are averaged componentwise and renormalized. That is only
//! sound within a cluster, where members already sit inside the rotation
//! threshold of each other; no double-cover handling is attempted.

use crate::core::types::{Pose3D, PoseCluster3D};

/// Whether two poses are close enough to share a cluster.
fn poses_match(
    a: &Pose3D,
    b: &Pose3D,
    position_threshold: f64,
    rotation_threshold: f64,
) -> bool {
    let dt = [b.t[0] - a.t[0], b.t[1] - a.t[1], b.t[2] - a.t[2]];
    let distance = (dt[0] * dt[0] + dt[1] * dt[1] + dt[2] * dt[2]).sqrt();
    let angle_diff = (a.angle - b.angle).abs();
    angle_diff < rotation_threshold && distance < position_threshold
}

/// Group candidate poses by proximity.
///
/// Candidates are sorted by descending votes (stable, so ties keep their
/// arrival order), then each joins the first existing cluster whose
/// centroid - the cluster's first, highest-voted pose - lies within both
/// thresholds, or starts a new cluster. The returned clusters are sorted
/// by total votes, descending.
pub fn group_poses(
    poses: Vec<Pose3D>,
    position_threshold: f64,
    rotation_threshold: f64,
) -> Vec<PoseCluster3D> {
    let mut sorted = poses;
    sorted.sort_by(|a, b| b.num_votes.cmp(&a.num_votes));

    let mut clusters: Vec<PoseCluster3D> = Vec::new();
    for pose in sorted {
        let slot = clusters.iter().position(|cluster| {
            poses_match(
                &pose,
                &cluster.poses[0],
                position_threshold,
                rotation_threshold,
            )
        });
        match slot {
            Some(i) => clusters[i].add(pose),
            None => clusters.push(PoseCluster3D::from_pose(pose)),
        }
    }

    clusters.sort_by(|a, b| b.num_votes.cmp(&a.num_votes));
    for (i, cluster) in clusters.iter_mut().enumerate() {
        cluster.id = i as i32;
    }
    clusters
}

/// Collapse a cluster into one averaged pose.
///
/// In weighted mode each member contributes proportionally to its votes;
/// otherwise all members weigh equally. The average is written back
/// through the quaternion entry point, which renormalizes.
pub fn average_cluster(cluster: &PoseCluster3D, weighted: bool) -> Pose3D {
    let mut q_avg = [0.0f64; 4];
    let mut t_avg = [0.0f64; 3];

    if weighted {
        let total: u32 = cluster.poses.iter().map(|p| p.num_votes).sum();
        let total = total.max(1) as f64;
        for pose in &cluster.poses {
            let w = pose.num_votes as f64 / total;
            for k in 0..4 {
                q_avg[k] += w * pose.q[k];
            }
            for k in 0..3 {
                t_avg[k] += w * pose.t[k];
            }
        }
    } else {
        let n = cluster.poses.len() as f64;
        for pose in &cluster.poses {
            for k in 0..4 {
                q_avg[k] += pose.q[k] / n;
            }
            for k in 0..3 {
                t_avg[k] += pose.t[k] / n;
            }
        }
    }

    let mut averaged = cluster.poses[0].clone();
    averaged.update_from_quat_t(&q_avg, &t_avg);
    averaged.num_votes = cluster.num_votes;
    averaged
}

/// Cluster candidates and return one ranked, averaged pose per cluster.
pub fn cluster_poses(
    poses: Vec<Pose3D>,
    position_threshold: f64,
    rotation_threshold: f64,
    weighted: bool,
) -> Vec<Pose3D> {
    group_poses(poses, position_threshold, rotation_threshold)
        .iter()
        .map(|cluster| average_cluster(cluster, weighted))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::math::{axis_angle_to_rotation, rt_to_pose};
    use approx::assert_relative_eq;

    fn pose_at(angle: f64, t: [f64; 3], votes: u32) -> Pose3D {
        let r = axis_angle_to_rotation(&[0.0, 0.0, 1.0], angle);
        let mut pose = Pose3D::with_vote(0.0, 0, votes);
        pose.update_from_matrix(&rt_to_pose(&r, &t));
        pose
    }

    #[test]
    fn test_distinct_poses_stay_apart() {
        let poses = vec![
            pose_at(0.0, [0.0; 3], 10),
            pose_at(1.5, [5.0, 0.0, 0.0], 8),
        ];
        let clusters = group_poses(poses, 0.1, 0.1);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn test_nearby_poses_merge() {
        let poses = vec![
            pose_at(0.50, [1.0, 0.0, 0.0], 10),
            pose_at(0.51, [1.01, 0.0, 0.0], 4),
            pose_at(0.49, [0.99, 0.01, 0.0], 2),
        ];
        let clusters = group_poses(poses, 0.1, 0.1);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].num_votes, 16);
        assert_eq!(clusters[0].len(), 3);
        // Highest-voted member is the centroid.
        assert_eq!(clusters[0].poses[0].num_votes, 10);
    }

    #[test]
    fn test_clusters_ranked_by_votes() {
        let poses = vec![
            pose_at(0.0, [0.0; 3], 3),
            pose_at(1.5, [5.0, 0.0, 0.0], 10),
            pose_at(1.51, [5.0, 0.01, 0.0], 10),
        ];
        let clusters = group_poses(poses, 0.1, 0.1);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].num_votes, 20);
        assert_eq!(clusters[1].num_votes, 3);
        assert_eq!(clusters[0].id, 0);
        assert_eq!(clusters[1].id, 1);
    }

    #[test]
    fn test_average_carries_cluster_votes() {
        let poses = vec![
            pose_at(0.3, [1.0, 2.0, 3.0], 7),
            pose_at(0.3, [1.0, 2.0, 3.0], 5),
        ];
        let results = cluster_poses(poses, 0.1, 0.1, false);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].num_votes, 12);
        assert_relative_eq!(results[0].angle, 0.3, epsilon = 1e-10);
    }

    #[test]
    fn test_averaged_quaternion_is_unit() {
        let poses = vec![
            pose_at(0.30, [0.0; 3], 3),
            pose_at(0.32, [0.0; 3], 3),
            pose_at(0.34, [0.01, 0.0, 0.0], 3),
        ];
        let results = cluster_poses(poses, 0.1, 0.1, true);
        assert_eq!(results.len(), 1);
        let norm: f64 = results[0].q.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-12);
        // Average of rotations about one axis lands between the extremes.
        assert!(results[0].angle > 0.30 && results[0].angle < 0.34);
    }

    #[test]
    fn test_weighted_average_tracks_dominant_pose() {
        // S5: one member holds 100 votes against four with 10 each. The
        // weighted average must hug the dominant pose far tighter than the
        // unweighted one.
        let rotation_threshold = 0.2;
        let dominant_angle = 0.5;
        let make = || {
            vec![
                pose_at(dominant_angle, [1.0, 0.0, 0.0], 100),
                pose_at(dominant_angle + 0.012, [1.005, 0.0, 0.0], 10),
                pose_at(dominant_angle + 0.010, [1.004, 0.0, 0.0], 10),
                pose_at(dominant_angle + 0.014, [1.006, 0.0, 0.0], 10),
                pose_at(dominant_angle + 0.011, [1.005, 0.0, 0.0], 10),
            ]
        };

        let weighted = cluster_poses(make(), 0.5, rotation_threshold, true);
        assert_eq!(weighted.len(), 1);
        assert!(
            (weighted[0].angle - dominant_angle).abs() < 0.1 * rotation_threshold,
            "weighted average drifted: {}",
            weighted[0].angle
        );

        let unweighted = cluster_poses(make(), 0.5, rotation_threshold, false);
        assert_eq!(unweighted.len(), 1);
        assert!(
            (unweighted[0].angle - dominant_angle).abs() < 0.5 * rotation_threshold,
            "unweighted average drifted: {}",
            unweighted[0].angle
        );
        // And the weighted one sits strictly closer to the dominant pose.
        assert!(
            (weighted[0].angle - dominant_angle).abs()
                < (unweighted[0].angle - dominant_angle).abs()
        );
    }

    #[test]
    fn test_empty_input() {
        let results = cluster_poses(Vec::new(), 0.1, 0.1, false);
        assert!(results.is_empty());
    }

    #[test]
    fn test_stable_tie_order() {
        // Equal-vote clusters keep their arrival order after ranking.
        let first = pose_at(0.0, [0.0; 3], 5);
        let second = pose_at(1.5, [5.0, 0.0, 0.0], 5);
        let clusters = group_poses(vec![first, second], 0.1, 0.1);
        assert_eq!(clusters.len(), 2);
        assert_relative_eq!(clusters[0].poses[0].angle, 0.0, epsilon = 1e-12);
    }
}
