use glam::DVec3;

use super::*;
use crate::comm::{Collective, LocalComm};
use crate::geom::GeomType;

/// Two ranks, one tet each, sharing the face-opposite edge nodes with
/// globals 0 and 1. Rank 0 owns the shared pair.
fn shared_edge_grid(rank: i32) -> Grid {
  let mut grid = Grid::new(rank);
  for g in 0..2 {
    let n = grid.nodes.add_global(g, 0);
    grid.nodes.set_xyz(n, DVec3::new(g as f64, 0.0, 0.0)).unwrap();
  }
  if rank == 0 {
    for g in 2..4 {
      let n = grid.nodes.add_global(g, 0);
      grid.nodes.set_xyz(n, DVec3::new(0.0, g as f64, 0.0)).unwrap();
    }
    grid.tet_mut().add(&[0, 1, 2, 3], 0).unwrap();
  } else {
    for g in 4..6 {
      let n = grid.nodes.add_global(g, 1);
      grid.nodes.set_xyz(n, DVec3::new(0.0, 0.0, g as f64)).unwrap();
    }
    grid.tet_mut().add(&[0, 1, 2, 3], 0).unwrap();
  }
  grid
}

#[test]
fn ghost_slots_mirror_owner_bit_for_bit() {
  let handles: Vec<_> = LocalComm::mesh(2)
    .into_iter()
    .map(|comm| {
      std::thread::spawn(move || {
        let rank = comm.rank() as i32;
        let mut grid = shared_edge_grid(rank);

        // rank 0 moves its owned node and tags it with a CAD record
        let moved = DVec3::new(0.125, 0.25, 0.5);
        if rank == 0 {
          grid.nodes.set_xyz(0, moved).unwrap();
          grid
            .nodes
            .set_metric(0, crate::matrix::SymMat3::from_diag(2.0, 3.0, 4.0))
            .unwrap();
          let geom = grid.geom.add(0, GeomType::Face, 2, [0.3, 0.7]);
          grid.geom.set_jump(geom, 5).unwrap();
        }

        ghost_sync(&mut grid, &comm).unwrap();

        // both ranks now hold identical state for global 0
        let local = grid.nodes.local(0).unwrap();
        assert_eq!(grid.nodes.xyz(local), moved);
        assert_eq!(
          grid.nodes.metric(local),
          crate::matrix::SymMat3::from_diag(2.0, 3.0, 4.0)
        );
        let geom = grid.geom.find(local, GeomType::Face, 2).unwrap();
        let record = grid.geom.record(geom).unwrap();
        assert_eq!(record.param, [0.3, 0.7]);
        assert_eq!(record.jump, 5);
      })
    })
    .collect();
  for h in handles {
    h.join().unwrap();
  }
}

#[test]
fn ghost_sync_is_idempotent() {
  let handles: Vec<_> = LocalComm::mesh(2)
    .into_iter()
    .map(|comm| {
      std::thread::spawn(move || {
        let rank = comm.rank() as i32;
        let mut grid = shared_edge_grid(rank);
        if rank == 0 {
          grid.nodes.set_xyz(1, DVec3::new(9.0, 9.0, 9.0)).unwrap();
        }
        ghost_sync(&mut grid, &comm).unwrap();
        let first: Vec<DVec3> = grid.nodes.each_valid().map(|n| grid.nodes.xyz(n)).collect();
        ghost_sync(&mut grid, &comm).unwrap();
        let second: Vec<DVec3> = grid.nodes.each_valid().map(|n| grid.nodes.xyz(n)).collect();
        assert_eq!(first, second);
      })
    })
    .collect();
  for h in handles {
    h.join().unwrap();
  }
}

#[test]
fn single_rank_sync_is_a_no_op() {
  let mut grid = shared_edge_grid(0);
  let before = grid.nodes.xyz(0);
  ghost_sync(&mut grid, &crate::comm::SingleRank).unwrap();
  assert_eq!(grid.nodes.xyz(0), before);
}
