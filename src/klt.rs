use crate::all::*;

// Tracks the ROI by following textured points inside it with pyramidal
// Lucas-Kanade and moving the box by their median displacement.
pub struct PointTracker {
  flow: OpticalFlow,
  lk_levels: usize,
  grid_step: usize,
  max_points: usize,
  state: Option<PointState>,
  // Workspace.
  features1: Vec<Vector2d>,
  statuses: Vec<bool>,
}

struct PointState {
  roi: Roi,
  pyramid: Pyramid,
  features: Vec<Vector2d>,
}

impl PointTracker {
  pub fn new(p: &TrackerParameters) -> Result<PointTracker> {
    Ok(PointTracker {
      flow: OpticalFlow::new(p)?,
      lk_levels: p.lk_levels,
      grid_step: p.lk_grid_step,
      max_points: p.lk_max_points,
      state: None,
      features1: vec![],
      statuses: vec![],
    })
  }

  // Grid points of the ROI ranked by texture strength, weak ones dropped.
  fn select_features(&mut self, image: &Image, roi: &Roi) -> Vec<Vector2d> {
    let mut scored = vec![];
    let threshold = self.flow.min_eigenvalue_threshold();
    let step = self.grid_step as i32;
    let mut y = roi.y;
    while y < roi.y + roi.height as i32 {
      let mut x = roi.x;
      while x < roi.x + roi.width as i32 {
        let point = Vector2d::new(x as f64, y as f64);
        if let Some(score) = self.flow.min_eigenvalue(image, point) {
          if score >= threshold {
            scored.push((score, point));
          }
        }
        x += step;
      }
      y += step;
    }
    // Stable sort keeps grid order among equal scores.
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(self.max_points);
    scored.into_iter().map(|(_, p)| p).collect()
  }
}

fn median(values: &mut [f64]) -> f64 {
  values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
  let n = values.len();
  if n % 2 == 1 { values[n / 2] } else { 0.5 * (values[n / 2 - 1] + values[n / 2]) }
}

impl VisualTracker for PointTracker {
  fn init(&mut self, frame: &RgbImage, roi: Roi) -> Result<()> {
    let (width, height) = frame.dimensions();
    if !roi.fits(width, height) {
      bail!(Error::InvalidRoi { roi, width, height });
    }
    let pyramid = Pyramid::new(Image::from_rgb(frame), self.lk_levels);
    let features = self.select_features(pyramid.level(0), &roi);
    if features.is_empty() {
      warn!("No textured points inside ROI {}, every update will fail.", roi);
    }
    self.state = Some(PointState { roi, pyramid, features });
    Ok(())
  }

  fn update(&mut self, frame: &RgbImage) -> Option<Roi> {
    let pyramid1 = Pyramid::new(Image::from_rgb(frame), self.lk_levels);
    let state = self.state.as_ref()?;
    if state.features.is_empty() { return None }
    self.flow.process(&state.pyramid, &pyramid1, &state.features, &mut self.features1, &mut self.statuses);

    let mut dx = vec![];
    let mut dy = vec![];
    for ((f0, f1), ok) in state.features.iter().zip(&self.features1).zip(&self.statuses) {
      if !ok { continue }
      dx.push(f1[0] - f0[0]);
      dy.push(f1[1] - f0[1]);
    }
    if 2 * dx.len() < state.features.len() {
      debug!("Only {} of {} points tracked.", dx.len(), state.features.len());
      return None;
    }

    let shift = Vector2d::new(median(&mut dx), median(&mut dy));
    let shift = from_f64(&shift);
    let roi = state.roi.translated(shift[0], shift[1]);
    let (width, height) = frame.dimensions();
    if !roi.fits(width, height) { return None }

    let features = self.select_features(pyramid1.level(0), &roi);
    if features.is_empty() { return None }
    self.state = Some(PointState { roi, pyramid: pyramid1, features });
    Some(roi)
  }
}
