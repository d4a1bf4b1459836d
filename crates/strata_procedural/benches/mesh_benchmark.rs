//! Benchmark for terrain meshing and normal patching.
//!
//! Run with: cargo bench --package strata_procedural --bench mesh_benchmark

use std::collections::HashSet;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strata_core::Vec2;
use strata_procedural::{HeightMapBuilder, HeightMapSettings, MeshBuilder, MeshSettings};

fn benchmark_build_per_lod(c: &mut Criterion) {
    let settings = MeshSettings::default();
    let map = HeightMapBuilder::build(settings.verts_per_line(), &HeightMapSettings::default(), Vec2::ZERO);

    let mut group = c.benchmark_group("mesh_build");
    for lod in [0u8, 1, 2, 4] {
        group.bench_with_input(BenchmarkId::from_parameter(lod), &lod, |b, &lod| {
            b.iter(|| black_box(MeshBuilder::build(map.values(), &settings, lod).seal()));
        });
    }
    group.finish();
}

fn benchmark_partial_normals(c: &mut Criterion) {
    let settings = MeshSettings::default();
    let map = HeightMapBuilder::build(settings.verts_per_line(), &HeightMapSettings::default(), Vec2::ZERO);
    let mut mesh = MeshBuilder::build(map.values(), &settings, 0).seal();

    // A brush-sized patch in the middle of the chunk.
    let verts = settings.verts_per_line() as u32;
    let dirty: HashSet<u32> = (60..80)
        .flat_map(|row| (60..80).map(move |column| row * verts + column))
        .collect();

    c.bench_function("recalculate_normals_400_dirty", |b| {
        b.iter(|| black_box(mesh.recalculate_normals_for(&dirty)));
    });

    c.bench_function("recalculate_normals_full", |b| {
        b.iter(|| mesh.recalculate_normals());
    });
}

criterion_group!(benches, benchmark_build_per_lod, benchmark_partial_normals);
criterion_main!(benches);
