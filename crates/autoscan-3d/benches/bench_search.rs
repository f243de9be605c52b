use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

use autoscan_3d::{linalg, pointcloud::PointCloud, search::KdTree};

fn random_points(num_points: usize) -> Vec<[f64; 3]> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..num_points)
        .map(|_| [rng.random::<f64>(), rng.random::<f64>(), rng.random::<f64>()])
        .collect()
}

fn bench_kdtree(c: &mut Criterion) {
    let mut group = c.benchmark_group("kdtree");

    for num_points in [1000, 10000, 100000].iter() {
        group.throughput(criterion::Throughput::Elements(*num_points as u64));
        let parameter_string = format!("{}", num_points);
        let points = random_points(*num_points);

        group.bench_with_input(
            BenchmarkId::new("build", &parameter_string),
            &points,
            |b, points| {
                b.iter(|| black_box(KdTree::new(points).unwrap()));
            },
        );

        let tree = KdTree::new(&points).unwrap();
        group.bench_with_input(
            BenchmarkId::new("nearest_n", &parameter_string),
            &points,
            |b, points| {
                b.iter(|| {
                    for p in points.iter().take(1000) {
                        black_box(tree.nearest_n(p, 10));
                    }
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("within_radius", &parameter_string),
            &points,
            |b, points| {
                b.iter(|| {
                    for p in points.iter().take(1000) {
                        black_box(tree.within_radius(p, 0.05));
                    }
                });
            },
        );
    }
}

fn bench_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform");
    let rotation = [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
    let translation = [0.1, 0.2, 0.3];

    for num_points in [1000, 100000].iter() {
        let points = random_points(*num_points);
        let cloud = PointCloud::from_points(points.clone());
        let mut dst = vec![[0.0; 3]; points.len()];

        group.bench_function(BenchmarkId::new("transform_points3d", num_points), |b| {
            b.iter(|| {
                linalg::transform_points3d(&points, &rotation, &translation, &mut dst).unwrap();
                black_box(());
            });
        });

        group.bench_function(BenchmarkId::new("pointcloud_transformed", num_points), |b| {
            b.iter(|| black_box(cloud.transformed(&rotation, &translation).unwrap()));
        });
    }
}

criterion_group!(benches, bench_kdtree, bench_transform);
criterion_main!(benches);
