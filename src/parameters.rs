use crate::all::*;

// Every numeric constant of the pipeline. Defaults reproduce the values the
// calibration and tracking runs were tuned with; a JSON file passed with
// `--parameters` may override any subset of them.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ParameterSet {
  pub calibration: CalibrationParameters,
  pub tracker: TrackerParameters,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CalibrationParameters {
  // Gaussian blur kernel side length, odd.
  pub blur_kernel_size: usize,
  // Blur standard deviation, 0 derives it from the kernel size.
  pub blur_sigma: f64,
  // Inverse binary threshold: values above `threshold` become 0, the rest
  // `threshold_max_value`. Applied per channel.
  pub threshold: u8,
  pub threshold_max_value: u8,
  // Edge detector hysteresis thresholds on the L1 Sobel magnitude.
  pub canny_low: f32,
  pub canny_high: f32,
  // Hough accumulator votes a line needs.
  pub hough_vote_threshold: u32,
  pub hough_suppression_radius: u32,
  // Radians. Lines whose normal differs from pi/2 by more than this count as
  // vertical (x axis), the rest as horizontal (y axis).
  pub axis_angle_tolerance: f64,
  // Physical distance between adjacent calibration lines, meters.
  pub calibration_distance: f64,
  // Channel copied into the line overlay image. 0 = red.
  pub overlay_channel: usize,
}

impl Default for CalibrationParameters {
  fn default() -> CalibrationParameters {
    CalibrationParameters {
      blur_kernel_size: 5,
      blur_sigma: 0.,
      threshold: 20,
      threshold_max_value: 45,
      canny_low: 50.,
      canny_high: 150.,
      hough_vote_threshold: 130,
      hough_suppression_radius: 1,
      axis_angle_tolerance: 0.5,
      calibration_distance: 1e-6,
      overlay_channel: 0,
    }
  }
}

impl CalibrationParameters {
  pub fn validate(&self) -> Result<()> {
    if self.blur_kernel_size % 2 != 1 {
      bail!("Blur kernel size must be odd number.");
    }
    if self.blur_sigma < 0. {
      bail!("Blur sigma must not be negative.");
    }
    if self.canny_low > self.canny_high {
      bail!("Low edge threshold must not exceed the high threshold.");
    }
    if self.overlay_channel > 2 {
      bail!("Overlay channel must be 0, 1 or 2.");
    }
    if !(self.calibration_distance > 0.) {
      bail!("Calibration distance must be positive.");
    }
    Ok(())
  }

  // Same rule OpenCV uses for `GaussianBlur` with sigma 0.
  pub fn effective_blur_sigma(&self) -> f32 {
    if self.blur_sigma > 0. {
      self.blur_sigma as f32
    }
    else {
      (0.3 * ((self.blur_kernel_size as f64 - 1.) * 0.5 - 1.) + 0.8) as f32
    }
  }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackerParameters {
  // Correlation tracker.
  // Context margin around the ROI, relative to its larger side.
  pub csrt_padding: f64,
  // Search radius relative to the ROI's larger side, and its floor in pixels.
  pub csrt_search_scale: f64,
  pub csrt_min_search_radius: usize,
  pub csrt_learning_rate: f64,
  // Combined correlation peak below which an update counts as failed.
  pub csrt_min_response: f64,
  pub csrt_histogram_bins: usize,
  // Spatial reliability given to the context margin.
  pub csrt_context_weight: f64,

  // Pyramidal Lucas-Kanade point tracker.
  pub lk_levels: usize,
  pub lk_iters: usize,
  pub lk_win_size: usize,
  // Per-pixel minimum eigenvalue of the gradient matrix a point needs.
  pub lk_min_eigenvalue: f64,
  pub lk_grid_step: usize,
  pub lk_max_points: usize,
}

impl Default for TrackerParameters {
  fn default() -> TrackerParameters {
    TrackerParameters {
      csrt_padding: 0.25,
      csrt_search_scale: 0.5,
      csrt_min_search_radius: 4,
      csrt_learning_rate: 0.02,
      csrt_min_response: 0.4,
      csrt_histogram_bins: 16,
      csrt_context_weight: 0.25,
      lk_levels: 3,
      lk_iters: 10,
      lk_win_size: 7,
      lk_min_eigenvalue: 1.,
      lk_grid_step: 2,
      lk_max_points: 25,
    }
  }
}

impl TrackerParameters {
  pub fn validate(&self) -> Result<()> {
    if self.lk_win_size % 2 != 1 {
      bail!("Lucas-Kanade window size must be odd number.");
    }
    if self.lk_win_size < 3 {
      bail!("Lucas-Kanade window size must be at least 3.");
    }
    if self.lk_grid_step == 0 {
      bail!("Lucas-Kanade grid step must be positive.");
    }
    if !(0. ..=1.).contains(&self.csrt_learning_rate) {
      bail!("Correlation learning rate must be within [0, 1].");
    }
    if self.csrt_histogram_bins == 0 || 256 % self.csrt_histogram_bins != 0 {
      bail!("Histogram bin count must divide 256.");
    }
    Ok(())
  }
}

impl ParameterSet {
  pub fn load(path: Option<&Path>) -> Result<ParameterSet> {
    let parameters = match path {
      Some(path) => {
        let file = File::open(path)
          .context(format!("Failed to open parameter file {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
          .context(format!("Failed to parse parameter file {}", path.display()))?
      },
      None => ParameterSet::default(),
    };
    parameters.calibration.validate()?;
    parameters.tracker.validate()?;
    Ok(parameters)
  }
}
