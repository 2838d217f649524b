// Pixel-to-metric calibration from images of a regular line grid.
//
// Lines are found with a Hough transform over the edge map of a blurred and
// thresholded image. Lines of the requested orientation are sorted by their
// signed distance from the origin, and every gap between neighbouring lines
// turns into one scaling factor `calibration_distance / gap`. Each gap keeps
// its own factor; averaging is left to whoever consumes the table.

use crate::all::*;

use std::f64::consts::FRAC_PI_2;

use imageproc::filter::gaussian_blur_f32;
use imageproc::hough::{detect_lines as hough_lines, LineDetectionOptions};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
  X,
  Y,
}

impl FromStr for Axis {
  type Err = Error;

  fn from_str(s: &str) -> std::result::Result<Axis, Error> {
    match s {
      "x" => Ok(Axis::X),
      "y" => Ok(Axis::Y),
      _ => Err(Error::InvalidAxis(s.to_string())),
    }
  }
}

impl Axis {
  // Calibration images are named `x...` or `y...`, case-sensitive.
  pub fn from_file_name(name: &str) -> std::result::Result<Axis, Error> {
    match name.chars().next() {
      Some('x') => Ok(Axis::X),
      Some('y') => Ok(Axis::Y),
      _ => Err(Error::InvalidAxis(name.to_string())),
    }
  }
}

impl fmt::Display for Axis {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", match self { Axis::X => "x", Axis::Y => "y" })
  }
}

// Line in Hesse normal form: `x cos(angle) + y sin(angle) = radius`.
// Angle in radians within [0, pi), radius in pixels, signed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectedLine {
  pub radius: f64,
  pub angle: f64,
}

pub struct Preprocessed {
  pub blurred: RgbImage,
  pub thresholded: RgbImage,
  pub edges: GrayImage,
  // Single channel of the input as grey RGB, for drawing lines on.
  pub overlay: RgbImage,
}

pub fn preprocess(image: &RgbImage, p: &CalibrationParameters) -> Preprocessed {
  let blurred = gaussian_blur_f32(image, p.effective_blur_sigma());

  let mut thresholded = blurred.clone();
  for pixel in thresholded.pixels_mut() {
    for v in pixel.0.iter_mut() {
      *v = if *v > p.threshold { 0 } else { p.threshold_max_value };
    }
  }

  let edges = canny(&thresholded, p.canny_low, p.canny_high);

  let channel = p.overlay_channel.min(2);
  let overlay = RgbImage::from_fn(image.width(), image.height(), |x, y| {
    let v = image.get_pixel(x, y)[channel];
    Rgb([v, v, v])
  });

  Preprocessed { blurred, thresholded, edges, overlay }
}

// Hough transform with 1 degree and 1 pixel bins. A line needs strictly more
// votes than the threshold, an empty result is not an error.
pub fn detect_lines(edges: &GrayImage, p: &CalibrationParameters) -> Vec<DetectedLine> {
  let options = LineDetectionOptions {
    // imageproc keeps lines with at least `vote_threshold` votes.
    vote_threshold: p.hough_vote_threshold + 1,
    suppression_radius: p.hough_suppression_radius,
  };
  hough_lines(edges, options).into_iter()
    .map(|line| DetectedLine {
      radius: line.r as f64,
      angle: (line.angle_in_degrees as f64).to_radians(),
    })
    .collect()
}

// Pixel distances between neighbouring lines of one orientation, ascending
// radius order. Lines with `|angle - pi/2| > tolerance` belong to the x axis
// (vertical lines), the strictly closer ones to the y axis.
pub fn line_gaps(lines: &[DetectedLine], axis: Axis, tolerance: f64) -> Vec<f64> {
  let mut radii: Vec<f64> = lines.iter()
    .filter(|line| {
      let deviation = (line.angle - FRAC_PI_2).abs();
      match axis {
        Axis::X => deviation > tolerance,
        Axis::Y => deviation < tolerance,
      }
    })
    .map(|line| line.radius)
    .collect();
  radii.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
  radii.windows(2).map(|w| (w[1] - w[0]).abs()).collect()
}

// One scaling factor per gap, `calibration_distance / gap`. Fewer than two
// lines of the axis' orientation give an empty vector. Two lines at the same
// radius give an infinite factor.
pub fn compute_spacing(lines: &[DetectedLine], axis: Axis, p: &CalibrationParameters) -> Vec<f64> {
  line_gaps(lines, axis, p.axis_angle_tolerance).into_iter()
    .map(|gap| p.calibration_distance / gap)
    .collect()
}

pub struct CalibrationResult {
  pub name: String,
  pub axis: Axis,
  pub preprocessed: Preprocessed,
  pub lines: Vec<DetectedLine>,
  pub gaps: Vec<f64>,
  pub scale_factors: Vec<f64>,
}

impl CalibrationResult {
  // Fewer than two usable lines, no factor could be measured.
  pub fn is_degenerate(&self) -> bool {
    self.scale_factors.is_empty()
  }
}

pub fn calibrate_image(name: &str, image: &RgbImage, p: &CalibrationParameters) -> Result<CalibrationResult> {
  let axis = Axis::from_file_name(name)?;
  let preprocessed = preprocess(image, p);
  let lines = detect_lines(&preprocessed.edges, p);
  let gaps = line_gaps(&lines, axis, p.axis_angle_tolerance);
  let scale_factors = compute_spacing(&lines, axis, p);
  debug!("{}: axis {}, {} lines, gaps {:?}", name, axis, lines.len(), gaps);
  Ok(CalibrationResult {
    name: name.to_string(),
    axis,
    preprocessed,
    lines,
    gaps,
    scale_factors,
  })
}

// Scaling factors per image name, sorted by name.
pub type ScalingTable = BTreeMap<String, Vec<f64>>;

// Receives every calibrated image, e.g. for plotting the detected lines.
pub trait CalibrationObserver {
  fn observe(&mut self, image: &RgbImage, result: &CalibrationResult) -> Result<()>;
}

impl CalibrationObserver for NoObserver {
  fn observe(&mut self, _: &RgbImage, _: &CalibrationResult) -> Result<()> {
    Ok(())
  }
}

// Forwards only the named images to `inner`.
pub struct SelectedImages<'a> {
  names: BTreeSet<String>,
  inner: &'a mut dyn CalibrationObserver,
}

impl<'a> SelectedImages<'a> {
  pub fn new(names: &[String], inner: &'a mut dyn CalibrationObserver) -> SelectedImages<'a> {
    SelectedImages {
      names: names.iter().cloned().collect(),
      inner,
    }
  }
}

impl CalibrationObserver for SelectedImages<'_> {
  fn observe(&mut self, image: &RgbImage, result: &CalibrationResult) -> Result<()> {
    if self.names.contains(&result.name) {
      self.inner.observe(image, result)?;
    }
    Ok(())
  }
}

pub fn calibrate_folder(
  folder: &FrameFolder,
  p: &CalibrationParameters,
  observer: &mut dyn CalibrationObserver,
) -> Result<ScalingTable> {
  let mut table = ScalingTable::new();
  for (name, image) in folder.frames() {
    let image = match image {
      Ok(image) => image,
      Err(err) => {
        warn!("Skipping {}: {:#}", name, err);
        continue;
      },
    };
    let result = match calibrate_image(&name, &image, p) {
      Ok(result) => result,
      Err(err) => {
        warn!("Skipping {}: {}", name, err);
        continue;
      },
    };
    if result.is_degenerate() {
      warn!("{}: fewer than two {} calibration lines found ({} lines in total), no scaling factor.",
        name, result.axis, result.lines.len());
    }
    observer.observe(&image, &result)?;
    table.insert(name, result.scale_factors);
  }
  info!("Calibrated {} of {} images in {}.", table.len(), folder.len(), folder.path.display());
  Ok(table)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn line(radius: f64, degrees: f64) -> DetectedLine {
    DetectedLine { radius, angle: degrees.to_radians() }
  }

  #[test]
  fn test_axis_parse() {
    assert_eq!("x".parse::<Axis>().unwrap(), Axis::X);
    assert_eq!("y".parse::<Axis>().unwrap(), Axis::Y);
    for text in ["", "X", "Y", "z", "xy", " x"] {
      assert!(matches!(text.parse::<Axis>(), Err(Error::InvalidAxis(t)) if t == text));
    }
    assert_eq!(Axis::from_file_name("x_grid_01.png").unwrap(), Axis::X);
    assert_eq!(Axis::from_file_name("y1.tif").unwrap(), Axis::Y);
    assert!(Axis::from_file_name("X1.tif").is_err());
  }

  #[test]
  fn test_spacing_matches_inverse_gaps() {
    let p = CalibrationParameters::default();
    let lines = [line(35., 0.), line(10., 0.), line(20., 1.), line(50., 90.)];
    let factors = compute_spacing(&lines, Axis::X, &p);
    assert_eq!(factors, vec![1e-6 / 10., 1e-6 / 15.]);
  }

  #[test]
  fn test_orientation_filter() {
    let p = CalibrationParameters::default();
    let lines = [line(5., 0.), line(40., 90.), line(70., 88.), line(100., 92.), line(9., 179.)];
    assert_eq!(line_gaps(&lines, Axis::Y, p.axis_angle_tolerance), vec![30., 30.]);
    // Both near-vertical normals count for x, with their signed radii.
    assert_eq!(line_gaps(&lines, Axis::X, p.axis_angle_tolerance), vec![4.]);
  }

  #[test]
  fn test_degenerate_spacing() {
    let p = CalibrationParameters::default();
    assert!(compute_spacing(&[], Axis::X, &p).is_empty());
    assert!(compute_spacing(&[line(10., 0.)], Axis::X, &p).is_empty());
    assert!(compute_spacing(&[line(10., 90.), line(30., 90.)], Axis::X, &p).is_empty());
    let factors = compute_spacing(&[line(10., 0.), line(10., 0.)], Axis::X, &p);
    assert!(factors[0].is_infinite());
  }

  #[test]
  fn test_detect_vertical_lines() {
    let mut edges = GrayImage::new(100, 200);
    for x in [20, 45, 80] {
      for y in 0..200 {
        edges.put_pixel(x, y, Luma([255]));
      }
    }
    let mut lines = detect_lines(&edges, &CalibrationParameters::default());
    lines.sort_by(|a, b| a.radius.partial_cmp(&b.radius).unwrap());
    assert_eq!(lines, vec![line(20., 0.), line(45., 0.), line(80., 0.)]);
  }

  #[test]
  fn test_detect_lines_below_threshold() {
    let mut edges = GrayImage::new(100, 100);
    for y in 0..100 {
      edges.put_pixel(30, y, Luma([255]));
    }
    assert!(detect_lines(&edges, &CalibrationParameters::default()).is_empty());
  }

  #[test]
  fn test_vote_threshold_is_strict() {
    let p = CalibrationParameters::default();
    let column = |length: u32| {
      let mut edges = GrayImage::new(60, length);
      for y in 0..length {
        edges.put_pixel(30, y, Luma([255]));
      }
      edges
    };
    assert!(detect_lines(&column(p.hough_vote_threshold), &p).is_empty());
    assert_eq!(detect_lines(&column(p.hough_vote_threshold + 1), &p), vec![line(30., 0.)]);
  }

  // Dark bands on a bright background, like the calibration grid images.
  fn grid_image(bands: &[u32], vertical: bool) -> RgbImage {
    RgbImage::from_fn(240, 240, |x, y| {
      let t = if vertical { x } else { y };
      if bands.iter().any(|b| t >= *b && t < b + 10) { Rgb([5, 5, 5]) } else { Rgb([200, 200, 200]) }
    })
  }

  #[test]
  fn test_preprocess_outputs() {
    let p = CalibrationParameters::default();
    let image = grid_image(&[60, 120], true);
    let pre = preprocess(&image, &p);
    assert_eq!(pre.blurred.dimensions(), (240, 240));
    assert!(pre.thresholded.pixels().all(|px| px.0.iter().all(|v| *v == 0 || *v == 45)));
    assert_eq!(pre.thresholded.get_pixel(64, 100)[0], 45);
    assert_eq!(pre.thresholded.get_pixel(30, 100)[0], 0);
    assert!(pre.edges.pixels().any(|px| px[0] == 255));
    assert_eq!(pre.overlay.get_pixel(30, 100), &Rgb([200, 200, 200]));
  }

  #[test]
  fn test_calibrate_grid_image() {
    let p = CalibrationParameters::default();
    let image = grid_image(&[40, 100, 160], true);
    let result = calibrate_image("x_grid.png", &image, &p).unwrap();
    assert_eq!(result.axis, Axis::X);
    assert!(!result.is_degenerate());
    // Each band has two edges, the gaps alternate between the band width and
    // the band spacing minus it, give or take a pixel of blur.
    assert_eq!(result.gaps.len(), 5, "{:?}", result.lines);
    assert!(result.gaps.iter().all(|g| *g > 4. && *g < 60.), "{:?}", result.gaps);
    let total: f64 = result.gaps.iter().sum();
    assert!((total - 128.).abs() <= 4., "{:?}", result.gaps);
    for (gap, factor) in result.gaps.iter().zip(&result.scale_factors) {
      assert_eq!(*factor, 1e-6 / gap);
    }

    let horizontal = calibrate_image("y_grid.png", &grid_image(&[40, 100, 160], false), &p).unwrap();
    assert_eq!(horizontal.axis, Axis::Y);
    assert!(!horizontal.is_degenerate());
    let vertical_only = calibrate_image("y_grid.png", &image, &p).unwrap();
    assert!(vertical_only.is_degenerate());
  }

  struct Names(Vec<String>);

  impl CalibrationObserver for Names {
    fn observe(&mut self, _: &RgbImage, result: &CalibrationResult) -> Result<()> {
      self.0.push(result.name.clone());
      Ok(())
    }
  }

  #[test]
  fn test_selected_images() {
    let dir = std::env::temp_dir().join(format!("tweezer_track_selected_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    for name in ["x_1.png", "x_2.png", "y_1.png"] {
      RgbImage::from_pixel(40, 40, Rgb([200, 200, 200])).save(dir.join(name)).unwrap();
    }
    let folder = FrameFolder::open(&dir).unwrap();
    let mut names = Names(vec![]);
    let wanted = vec!["y_1.png".to_string(), "x_1.png".to_string(), "x_9.png".to_string()];
    let table = calibrate_folder(&folder, &CalibrationParameters::default(), &mut SelectedImages::new(&wanted, &mut names)).unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(names.0, vec!["x_1.png", "y_1.png"]);
    assert!(folder.contains("x_2.png"));
    assert!(!folder.contains("x_9.png"));
    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn test_calibrate_folder() {
    let dir = std::env::temp_dir().join(format!("tweezer_track_calibration_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    grid_image(&[40, 100, 160], true).save(dir.join("x_1.png")).unwrap();
    grid_image(&[40, 100, 160], false).save(dir.join("y_1.png")).unwrap();
    RgbImage::from_pixel(240, 240, Rgb([200, 200, 200])).save(dir.join("y_2.png")).unwrap();
    grid_image(&[40, 100, 160], true).save(dir.join("grid.png")).unwrap();
    std::fs::write(dir.join("x_broken.png"), b"not an image").unwrap();

    let folder = FrameFolder::open(&dir).unwrap();
    let mut names = Names(vec![]);
    let table = calibrate_folder(&folder, &CalibrationParameters::default(), &mut names).unwrap();
    assert_eq!(table.keys().collect::<Vec<_>>(), vec!["x_1.png", "y_1.png", "y_2.png"]);
    assert_eq!(table["x_1.png"].len(), 5);
    assert_eq!(table["y_1.png"].len(), 5);
    assert!(table["y_2.png"].is_empty());
    assert_eq!(names.0, vec!["x_1.png", "y_1.png", "y_2.png"]);
    std::fs::remove_dir_all(&dir).unwrap();
  }
}
