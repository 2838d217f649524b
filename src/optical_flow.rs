// Pyramidal Lucas-Kanade tracker based on:
// <http://robots.stanford.edu/cs223b04/algo_tracking.pdf>
// “Pyramidal Implementation of the Lucas Kanade Feature Tracker
//   Description of the algorithm” by Jean-Yves Bouguet

use crate::all::*;

type Range = [[i16; 2]; 2];

// Iterations stop once the update step is shorter than this, in pixels.
const LK_TERM: f64 = 0.01;

#[allow(non_snake_case)]
pub struct OpticalFlow {
  lk_iters: usize,
  lk_levels: usize,
  lk_win_size: usize,
  lk_min_eigenvalue: f64,
  Ix: Matrixd,
  Iy: Matrixd,
  It: Matrixd,
  // Workspace.
  grid0: Matrixd,
}

impl OpticalFlow {
  pub fn new(p: &TrackerParameters) -> Result<OpticalFlow> {
    if p.lk_win_size % 2 != 1 {
      bail!("Lucas-Kanade window size must be odd number.");
    }
    if p.lk_win_size < 3 {
      bail!("Lucas-Kanade window size must be at least 3.");
    }
    Ok(OpticalFlow {
      lk_iters: p.lk_iters,
      lk_levels: p.lk_levels,
      lk_win_size: p.lk_win_size,
      lk_min_eigenvalue: p.lk_min_eigenvalue,
      Ix: DMatrix::zeros(p.lk_win_size, p.lk_win_size),
      Iy: DMatrix::zeros(p.lk_win_size, p.lk_win_size),
      It: DMatrix::zeros(p.lk_win_size, p.lk_win_size),
      grid0: DMatrix::zeros(p.lk_win_size, p.lk_win_size),
    })
  }

  pub fn process(
    &mut self,
    pyramid0: &Pyramid,
    pyramid1: &Pyramid,
    features0: &[Vector2d],
    features1: &mut Vec<Vector2d>,
    statuses: &mut Vec<bool>,
  ) {
    features1.clear();
    statuses.clear();
    for feature0 in features0 {
      if let Some(feature1) = self.process_feature(pyramid0, pyramid1, *feature0) {
        features1.push(feature1);
        statuses.push(true);
      }
      else {
        features1.push(*feature0);
        statuses.push(false);
      }
    }
  }

  pub fn min_eigenvalue_threshold(&self) -> f64 {
    self.lk_min_eigenvalue
  }

  // Smallest eigenvalue of the gradient matrix in the window around `point`,
  // divided by the window area. Large in both-direction texture (corners),
  // near zero on flat areas and straight edges.
  #[allow(non_snake_case)]
  pub fn min_eigenvalue(&mut self, level: &Image, point: Vector2d) -> Option<f64> {
    let r = (self.lk_win_size - 1) / 2;
    let range = integration_range(level, point, r, 1)?;
    scharr(level, point, range, &mut self.Ix, &mut self.Iy, &mut self.grid0);
    let G = gradient_matrix(&self.Ix, &self.Iy);
    Some(smallest_eigenvalue(&G) / (self.Ix.nrows() * self.Ix.ncols()) as f64)
  }

  #[allow(non_snake_case)]
  fn process_feature(
    &mut self,
    pyramid0: &Pyramid,
    pyramid1: &Pyramid,
    feature0: Vector2d,
  ) -> Option<Vector2d> {
    let r = (self.lk_win_size - 1) / 2;
    let levels = self.lk_levels.min(pyramid0.depth()).min(pyramid1.depth());
    let mut g = Vector2d::zeros();
    let mut d = Vector2d::zeros();
    for L in (0..levels + 1).rev() {
      let level0 = pyramid0.level(L);
      let level1 = pyramid1.level(L);
      let u = feature0 / u32::pow(2, L as u32) as f64;
      // Coarse levels that cannot be used (borders, flat texture) only lose
      // their refinement. The finest level decides the outcome.
      d = match self.level_flow(level0, level1, u, g, r) {
        Some(d) => d,
        None if L > 0 => Vector2d::zeros(),
        None => return None,
      };
      if L > 0 { g = 2. * (g + d) }
    }
    Some(feature0 + g + d)
  }

  #[allow(non_snake_case)]
  fn level_flow(
    &mut self,
    level0: &Image,
    level1: &Image,
    u: Vector2d,
    g: Vector2d,
    r: usize,
  ) -> Option<Vector2d> {
    let range = integration_range(level0, u, r, 1)?;
    scharr(level0, u, range, &mut self.Ix, &mut self.Iy, &mut self.grid0);
    let G = gradient_matrix(&self.Ix, &self.Iy);
    let area = (self.Ix.nrows() * self.Ix.ncols()) as f64;
    if smallest_eigenvalue(&G) / area < self.lk_min_eigenvalue {
      return None;
    }
    let mut nu = Vector2d::zeros();
    for _ in 0..self.lk_iters {
      temporal_difference(range, r, &self.grid0, &mut self.It, level1, u + g + nu)?;
      let step = flow_step(&G, &self.Ix, &self.Iy, &self.It)?;
      nu += step;
      if step.norm() < LK_TERM { break }
    }
    Some(nu)
  }
}

// Fills `It` with I0 - I1 over the window moved to `center` in `level`. Fails
// when the moved window is clipped differently than the source one.
#[allow(non_snake_case)]
fn temporal_difference(
  source_range: Range,
  r: usize,
  I0: &Matrixd,
  It: &mut Matrixd,
  level: &Image,
  center: Vector2d,
) -> Option<()> {
  let range = integration_range(level, center, r, 0)?;
  if range != source_range {
    return None;
  }
  fill_grid(level, range, center, It);
  *It *= -1.;
  *It += I0.slice((1, 1), (It.nrows(), It.ncols()));
  Some(())
}

// Solves G step = b with b = sum of It * [Ix, Iy] over the window.
#[allow(non_snake_case)]
fn flow_step(G: &Matrix2d, Ix: &Matrixd, Iy: &Matrixd, It: &Matrixd) -> Option<Vector2d> {
  let b = Vector2d::new(It.dot(Ix), It.dot(Iy));
  G.try_inverse().map(|inverse| inverse * b)
}

// Structure tensor of the window.
#[allow(non_snake_case)]
fn gradient_matrix(Ix: &Matrixd, Iy: &Matrixd) -> Matrix2d {
  let xy = Ix.dot(Iy);
  Matrix2d::new(Ix.norm_squared(), xy, xy, Iy.norm_squared())
}

#[allow(non_snake_case)]
fn smallest_eigenvalue(G: &Matrix2d) -> f64 {
  let (a, b, c) = (G[(0, 0)], G[(0, 1)], G[(1, 1)]);
  0.5 * (a + c) - (0.25 * (a - c) * (a - c) + b * b).sqrt()
}

// Integer steps `[low, high]` per axis around `center`, at most `r` each way
// and shrunk so the window plus `padding` pixels stays inside the level.
// None when `center` itself is outside.
fn integration_range(level: &Image, center: Vector2d, r: usize, padding: i16) -> Option<Range> {
  let r = r as i16;
  let axis = |i: usize| {
    let size = level.size(i);
    if !(0. ..=size as f64 - 1.).contains(&center[i]) {
      return None;
    }
    let n = center[i] as i16;
    let low = (-r).max(padding - n);
    let high = r.min(size as i16 - n - padding - 2);
    (low <= high).then(|| [low, high])
  };
  Some([axis(0)?, axis(1)?])
}

// Samples `level` at `center` plus every integer step of `range`, rows along y.
fn fill_grid(level: &Image, range: Range, center: Vector2d, grid: &mut Matrixd) {
  let [[x0, x1], [y0, y1]] = range;
  *grid = Matrixd::from_fn((y1 - y0 + 1) as usize, (x1 - x0 + 1) as usize, |row, col| {
    let step = Vector2d::new((x0 + col as i16) as f64, (y0 + row as i16) as f64);
    bilinear(level, center + step)
  });
}

// Smoothing weights of the 3x3 Scharr kernel, normalized by 32.
const SCHARR: [f64; 3] = [3., 10., 3.];

// Window gradients. `grid` keeps the samples with a one pixel border, its
// interior is the intensity window that `temporal_difference` compares with.
fn scharr(
  level: &Image,
  center: Vector2d,
  range: Range,
  out_x: &mut Matrixd,
  out_y: &mut Matrixd,
  grid: &mut Matrixd,
) {
  let padded = [[range[0][0] - 1, range[0][1] + 1], [range[1][0] - 1, range[1][1] + 1]];
  fill_grid(level, padded, center, grid);
  let g = &*grid;
  let (rows, cols) = (g.nrows() - 2, g.ncols() - 2);
  *out_x = Matrixd::from_fn(rows, cols, |y, x| {
    (0..3).map(|k| SCHARR[k] * (g[(y + k, x + 2)] - g[(y + k, x)])).sum::<f64>() / 32.
  });
  *out_y = Matrixd::from_fn(rows, cols, |y, x| {
    (0..3).map(|k| SCHARR[k] * (g[(y + 2, x + k)] - g[(y, x + k)])).sum::<f64>() / 32.
  });
}

// Integer coordinates on the last row or column are read without the right
// or bottom neighbour, so windows may touch those edges.
fn bilinear(level: &Image, u: Vector2d) -> f64 {
  debug_assert!(u[0] >= 0. && u[0] <= level.width as f64 - 1.);
  debug_assert!(u[1] >= 0. && u[1] <= level.height as f64 - 1.);
  const EPS: f64 = 1e-5;
  let (x0, y0) = (u[0] as usize, u[1] as usize);
  let (xa, ya) = (u[0].fract(), u[1].fract());
  let x1 = if xa < EPS { x0 } else { x0 + 1 };
  let y1 = if ya < EPS { y0 } else { y0 + 1 };
  let value = |x, y| level.value(x, y) as f64;
  let top = (1. - xa) * value(x0, y0) + xa * value(x1, y0);
  let bottom = (1. - xa) * value(x0, y1) + xa * value(x1, y1);
  (1. - ya) * top + ya * bottom
}
