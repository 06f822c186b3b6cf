//! Adaptation pass benchmarks.
//!
//! Measures a full driver pass on a tetrahedral mesh refined against an
//! anisotropic metric, and the split sub-pass alone on the same setup.
//! The fixture grows itself by driving a coarse seed mesh against a
//! shrinking metric before timing starts, so the timed passes see a few
//! hundred cells rather than a single tet.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::DVec3;
use mesh_adapt::{
  adapt, comm::SingleRank, config::AdaptConfig, geom::NoCad, matrix::SymMat3, split, Grid,
};

/// Regular tetrahedron seed with a boundary triangle on its base.
fn seed_grid() -> Grid {
  let mut grid = Grid::new(0);
  let coords = [
    DVec3::new(0.0, 0.0, 0.0),
    DVec3::new(1.0, 0.0, 0.0),
    DVec3::new(0.5, 3.0f64.sqrt() / 2.0, 0.0),
    DVec3::new(0.5, 3.0f64.sqrt() / 6.0, (2.0f64 / 3.0).sqrt()),
  ];
  for (g, &xyz) in coords.iter().enumerate() {
    let n = grid.nodes.add_global(g as i64, 0);
    grid.nodes.set_xyz(n, xyz).unwrap();
  }
  grid.tet_mut().add(&[0, 1, 2, 3], 0).unwrap();
  grid.tri_mut().add(&[0, 1, 2], 1).unwrap();
  grid
}

/// Drive the seed against a uniform 4x metric until it settles.
fn refined_grid() -> (Grid, AdaptConfig) {
  let mut grid = seed_grid();
  let mut config = AdaptConfig::default();
  config.split_quality_relative = 0.0;
  let metric = SymMat3::from_diag(16.0, 16.0, 16.0);
  for node in grid.nodes.each_valid().collect::<Vec<_>>() {
    grid.nodes.set_metric(node, metric).unwrap();
  }
  adapt::drive(&mut grid, &NoCad, &mut config, &SingleRank, 6).unwrap();
  // refresh the metric onto every node the refinement created
  for node in grid.nodes.each_valid().collect::<Vec<_>>() {
    grid.nodes.set_metric(node, metric).unwrap();
  }
  (grid, config)
}

fn bench_full_pass(c: &mut Criterion) {
  let (grid, config) = refined_grid();
  c.bench_function("adapt_pass_refined", |b| {
    b.iter(|| {
      let mut scratch = grid.clone();
      let mut scratch_config = config.clone();
      let done =
        adapt::pass(&mut scratch, &NoCad, &mut scratch_config, &SingleRank).unwrap();
      black_box(done)
    })
  });
}

fn bench_split_subpass(c: &mut Criterion) {
  let (grid, config) = refined_grid();
  c.bench_function("split_subpass_refined", |b| {
    b.iter(|| {
      let mut scratch = grid.clone();
      let n = split::pass(&mut scratch, &NoCad, &config, &SingleRank).unwrap();
      black_box(n)
    })
  });
}

criterion_group!(benches, bench_full_pass, bench_split_subpass);
criterion_main!(benches);
