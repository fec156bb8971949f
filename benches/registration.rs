//! Benchmarks for training, matching, and refinement.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mudra_pose::{DetectorConfig, Icp, IcpConfig, PointCloud, PpfDetector};

/// Deterministic shell of points with outward normals.
fn shell_cloud(rings: usize) -> PointCloud {
    let mut cloud = PointCloud::new();
    for i in 0..rings {
        for j in 0..rings {
            let theta = 0.2 + i as f64 * 2.5 / rings as f64;
            let phi = 0.1 + j as f64 * 5.8 / rings as f64;
            let n = [
                theta.sin() * phi.cos(),
                theta.sin() * phi.sin(),
                theta.cos(),
            ];
            cloud.push_with_normal(
                [n[0] as f32, n[1] as f32, n[2] as f32],
                [n[0] as f32, n[1] as f32, n[2] as f32],
            );
        }
    }
    cloud
}

fn bench_train(c: &mut Criterion) {
    let cloud = shell_cloud(16);
    c.bench_function("train_256pts", |b| {
        b.iter(|| {
            let mut detector = PpfDetector::new(DetectorConfig::default());
            detector.train(black_box(&cloud)).unwrap();
            detector
        })
    });
}

fn bench_match(c: &mut Criterion) {
    let cloud = shell_cloud(16);
    let mut detector = PpfDetector::new(DetectorConfig::default());
    detector.train(&cloud).unwrap();

    c.bench_function("match_256pts", |b| {
        b.iter(|| detector.match_scene(black_box(&cloud), 0.2, 0.05).unwrap())
    });
}

fn bench_icp(c: &mut Criterion) {
    let cloud = shell_cloud(16);
    let icp = Icp::new(IcpConfig::default());

    c.bench_function("icp_register_256pts", |b| {
        b.iter(|| icp.register(black_box(&cloud), black_box(&cloud)).unwrap())
    });
}

criterion_group!(benches, bench_train, bench_match, bench_icp);
criterion_main!(benches);
