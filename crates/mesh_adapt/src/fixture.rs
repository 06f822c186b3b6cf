//! Canonical small meshes for the test suite.

use glam::DVec3;

use crate::error::{MeshError, Result};
use crate::geom::{CadCurvature, CadEval, CadInverse, CadOracle, GeomType};
use crate::grid::Grid;
use crate::matrix::SymMat3;

fn add_node(grid: &mut Grid, global: i64, xyz: DVec3) -> usize {
  let node = grid.nodes.add_global(global, grid.rank);
  grid.nodes.set_xyz(node, xyz).unwrap();
  node
}

/// Right-angle unit tetrahedron with one boundary triangle on its base.
pub fn tet_grid() -> Grid {
  let mut grid = Grid::new(0);
  add_node(&mut grid, 0, DVec3::new(0.0, 0.0, 0.0));
  add_node(&mut grid, 1, DVec3::new(1.0, 0.0, 0.0));
  add_node(&mut grid, 2, DVec3::new(0.0, 1.0, 0.0));
  add_node(&mut grid, 3, DVec3::new(0.0, 0.0, 1.0));
  grid.tet_mut().add(&[0, 1, 2, 3], 0).unwrap();
  grid.tri_mut().add(&[0, 1, 2], 1).unwrap();
  grid
}

/// Regular (equilateral) tetrahedron with one boundary triangle.
pub fn regular_tet_grid() -> Grid {
  let mut grid = Grid::new(0);
  add_node(&mut grid, 0, DVec3::new(0.0, 0.0, 0.0));
  add_node(&mut grid, 1, DVec3::new(1.0, 0.0, 0.0));
  add_node(&mut grid, 2, DVec3::new(0.5, 3.0f64.sqrt() / 2.0, 0.0));
  add_node(
    &mut grid,
    3,
    DVec3::new(0.5, 3.0f64.sqrt() / 6.0, (2.0f64 / 3.0).sqrt()),
  );
  grid.tet_mut().add(&[0, 1, 2, 3], 0).unwrap();
  grid.tri_mut().add(&[0, 1, 2], 1).unwrap();
  grid
}

/// Regular tetrahedron subdivided 1→4 around its centroid; the center
/// node is interior and, by symmetry, already optimally placed.
pub fn centroid_split_tet_grid() -> (Grid, usize) {
  let mut grid = regular_tet_grid();
  let centroid = (grid.nodes.xyz(0) + grid.nodes.xyz(1) + grid.nodes.xyz(2) + grid.nodes.xyz(3))
    / 4.0;
  let center = add_node(&mut grid, 4, centroid);
  let outer = grid.tet().each_valid().next().unwrap();
  grid.tet_mut().remove(outer).unwrap();
  grid.tet_mut().add(&[0, 1, 2, center], 0).unwrap();
  grid.tet_mut().add(&[0, 3, 1, center], 0).unwrap();
  grid.tet_mut().add(&[1, 3, 2, center], 0).unwrap();
  grid.tet_mut().add(&[0, 2, 3, center], 0).unwrap();
  (grid, center)
}

/// One prism column in the two-layer representation: floor triangle at
/// y = 0, its copy at y = 1, caps as boundary triangles, all three side
/// quads. The metric is hot (16× in z) along the (0, 2) column.
pub fn prism_column_grid() -> Grid {
  let mut grid = Grid::new(0);
  grid.twod = true;
  add_node(&mut grid, 0, DVec3::new(0.0, 0.0, 0.0));
  add_node(&mut grid, 1, DVec3::new(1.0, 0.0, 0.0));
  add_node(&mut grid, 2, DVec3::new(0.0, 0.0, 1.0));
  add_node(&mut grid, 3, DVec3::new(0.0, 1.0, 0.0));
  add_node(&mut grid, 4, DVec3::new(1.0, 1.0, 0.0));
  add_node(&mut grid, 5, DVec3::new(0.0, 1.0, 1.0));
  let hot = SymMat3::from_diag(1.0, 1.0, 16.0);
  for node in [0, 2, 3, 5] {
    grid.nodes.set_metric(node, hot).unwrap();
  }
  grid.pri_mut().add(&[0, 1, 2, 3, 4, 5], 0).unwrap();
  grid.tri_mut().add(&[0, 1, 2], 1).unwrap();
  grid.tri_mut().add(&[3, 5, 4], 2).unwrap();
  grid.qua_mut().add(&[0, 3, 4, 1], 3).unwrap();
  grid.qua_mut().add(&[1, 4, 5, 2], 4).unwrap();
  grid.qua_mut().add(&[0, 2, 5, 3], 5).unwrap();
  grid
}

/// Planar surface patch on CAD face 1: a unit square fanned around an
/// off-center interior node, with uv records equal to the xy
/// coordinates. Pairs with [`FlatPlateCad`].
pub fn surface_fan_grid() -> (Grid, usize) {
  let mut grid = Grid::new(0);
  grid.surf = true;
  let corners = [
    DVec3::new(0.0, 0.0, 0.0),
    DVec3::new(1.0, 0.0, 0.0),
    DVec3::new(1.0, 1.0, 0.0),
    DVec3::new(0.0, 1.0, 0.0),
  ];
  for (g, &xyz) in corners.iter().enumerate() {
    let node = add_node(&mut grid, g as i64, xyz);
    grid.geom.add(node, GeomType::Face, 1, [xyz.x, xyz.y]);
  }
  let center = add_node(&mut grid, 4, DVec3::new(0.3, 0.2, 0.0));
  grid.geom.add(center, GeomType::Face, 1, [0.3, 0.2]);
  for (a, b) in [(0, 1), (1, 2), (2, 3), (3, 0)] {
    grid.tri_mut().add(&[a, b, center], 1).unwrap();
  }
  (grid, center)
}

/// Analytic flat-plate oracle: face 1 maps (u, v) → (u, v, 0); edge 1
/// runs along x at y = z = 0.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlatPlateCad;

const PLATE_RANGE: f64 = 1.0e3;

impl CadOracle for FlatPlateCad {
  fn loaded(&self) -> bool {
    true
  }
  fn nedge(&self) -> i32 {
    1
  }
  fn nface(&self) -> i32 {
    1
  }

  fn eval(&self, ty: GeomType, id: i32, param: [f64; 2]) -> Result<CadEval> {
    self.check_id(ty, id)?;
    Ok(match ty {
      GeomType::Edge => CadEval {
        xyz: DVec3::new(param[0], 0.0, 0.0),
        deriv: [DVec3::X, DVec3::ZERO],
      },
      GeomType::Face => CadEval {
        xyz: DVec3::new(param[0], param[1], 0.0),
        deriv: [DVec3::X, DVec3::Y],
      },
      GeomType::Node => CadEval {
        xyz: DVec3::ZERO,
        deriv: [DVec3::ZERO, DVec3::ZERO],
      },
    })
  }

  fn inverse_eval(&self, ty: GeomType, id: i32, xyz: DVec3, _guess: [f64; 2]) -> Result<CadInverse> {
    self.check_id(ty, id)?;
    let param = match ty {
      GeomType::Edge => [xyz.x, 0.0],
      _ => [xyz.x, xyz.y],
    };
    Ok(CadInverse {
      param,
      inside: param[0].abs() <= PLATE_RANGE && param[1].abs() <= PLATE_RANGE,
    })
  }

  fn curvature(&self, ty: GeomType, id: i32, _param: [f64; 2]) -> Result<CadCurvature> {
    self.check_id(ty, id)?;
    Ok(CadCurvature {
      k: [0.0, 0.0],
      dir: [DVec3::X, DVec3::Y],
    })
  }

  fn edge_range(&self, id: i32) -> Result<[f64; 2]> {
    self.check_id(GeomType::Edge, id)?;
    Ok([-PLATE_RANGE, PLATE_RANGE])
  }

  fn face_range(&self, id: i32) -> Result<[[f64; 2]; 2]> {
    self.check_id(GeomType::Face, id)?;
    Ok([[-PLATE_RANGE, PLATE_RANGE], [-PLATE_RANGE, PLATE_RANGE]])
  }

  fn tolerance(&self, _ty: GeomType, _id: i32) -> Result<f64> {
    Ok(1.0e-8)
  }

  fn bounding_box(&self, _ty: GeomType, _id: i32) -> Result<[DVec3; 2]> {
    Ok([
      DVec3::new(-PLATE_RANGE, -PLATE_RANGE, 0.0),
      DVec3::new(PLATE_RANGE, PLATE_RANGE, 0.0),
    ])
  }
}

impl FlatPlateCad {
  fn check_id(&self, ty: GeomType, id: i32) -> Result<()> {
    let max = match ty {
      GeomType::Edge => self.nedge(),
      GeomType::Face => self.nface(),
      GeomType::Node => 1,
    };
    if id < 1 || id > max {
      return Err(MeshError::OutOfRange {
        what: "cad entity id",
        value: id as i64,
        min: 1,
        max: max as i64,
      });
    }
    Ok(())
  }
}
