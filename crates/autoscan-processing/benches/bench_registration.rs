use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

use autoscan_3d::{pointcloud::PointCloud, transforms::axis_angle_to_rotation_matrix};
use autoscan_processing::{
    filter::{CloudFilter, VoxelGrid, VoxelGridParams},
    registration::{CloudRegistration, Icp},
    rigid::fit_rigid,
};

fn random_cloud(num_points: usize) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(42);
    PointCloud::from_points(
        (0..num_points)
            .map(|_| [rng.random::<f64>(), rng.random::<f64>(), rng.random::<f64>()])
            .collect(),
    )
}

fn bench_icp(c: &mut Criterion) {
    let mut group = c.benchmark_group("icp");
    let rotation = axis_angle_to_rotation_matrix(&[0.0, 0.0, 1.0], 1f64.to_radians()).unwrap();

    for num_points in [500, 2000, 10000].iter() {
        group.throughput(criterion::Throughput::Elements(*num_points as u64));
        let source = random_cloud(*num_points);
        let target = source.transformed(&rotation, &[0.01, 0.0, 0.0]).unwrap();
        let icp = Icp::default();

        group.bench_with_input(
            BenchmarkId::new("icp", num_points),
            &(&source, &target),
            |b, (source, target)| {
                b.iter(|| black_box(icp.process(source, target).unwrap()));
            },
        );

        group.bench_with_input(
            BenchmarkId::new("fit_rigid", num_points),
            &(&source, &target),
            |b, (source, target)| {
                b.iter(|| black_box(fit_rigid(source.points(), target.points()).unwrap()));
            },
        );
    }
}

fn bench_voxel_grid(c: &mut Criterion) {
    let mut group = c.benchmark_group("voxel_grid");
    let filter = VoxelGrid::new(VoxelGridParams {
        leaf_size: [0.05; 3],
        min_points_per_voxel: 1,
    })
    .unwrap();

    for num_points in [10000, 100000].iter() {
        let cloud = random_cloud(*num_points);
        group.bench_with_input(BenchmarkId::new("process", num_points), &cloud, |b, cloud| {
            b.iter(|| black_box(filter.process(cloud).unwrap()));
        });
    }
}

criterion_group!(benches, bench_icp, bench_voxel_grid);
criterion_main!(benches);
