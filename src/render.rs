// Drawing of calibration lines, tracking state and MSD curves. Everything here
// consumes finished results; nothing feeds back into the computations.

use crate::all::*;

use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
pub const BLUE: Rgb<u8> = Rgb([0, 0, 255]);
pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

const LINE_THICKNESS: i32 = 3;
const BOX_THICKNESS: i32 = 2;
const CENTER_RADIUS: i32 = 5;

// Lines extend past the image on both sides and get clipped.
pub fn draw_lines(image: &mut RgbImage, lines: &[DetectedLine], color: Rgb<u8>) {
  let length = (image.width() + image.height()) as f32;
  for line in lines {
    let (b, a) = (line.angle as f32).sin_cos();
    let (x0, y0) = (a * line.radius as f32, b * line.radius as f32);
    for k in 0..LINE_THICKNESS {
      let offset = (k - LINE_THICKNESS / 2) as f32;
      let (x, y) = (x0 + offset * a, y0 + offset * b);
      draw_line_segment_mut(image, (x - length * b, y + length * a), (x + length * b, y - length * a), color);
    }
  }
}

// Blurred input, thresholded image and detected lines, side by side.
pub fn calibration_panel(pre: &Preprocessed, lines: &[DetectedLine]) -> RgbImage {
  let (w, h) = pre.blurred.dimensions();
  let mut panel = RgbImage::new(3 * w, h);
  let mut overlay = pre.overlay.clone();
  draw_lines(&mut overlay, lines, RED);
  let thresholded = stretch(&pre.thresholded);
  for (i, image) in [&pre.blurred, &thresholded, &overlay].into_iter().enumerate() {
    copy_into(&mut panel, image, i as u32 * w, 0);
  }
  panel
}

// Scales so that the brightest value becomes white.
fn stretch(image: &RgbImage) -> RgbImage {
  let max = image.pixels().flat_map(|p| p.0).max().unwrap_or(0);
  if max == 0 { return image.clone() }
  let mut out = image.clone();
  for p in out.pixels_mut() {
    for v in p.0.iter_mut() {
      *v = (*v as u32 * 255 / max as u32) as u8;
    }
  }
  out
}

fn copy_into(target: &mut RgbImage, image: &RgbImage, ax: u32, ay: u32) {
  for (x, y, p) in image.enumerate_pixels() {
    if x + ax >= target.width() || y + ay >= target.height() { continue }
    target.put_pixel(x + ax, y + ay, *p);
  }
}

// Box and center of a tracked frame, a red border when tracking failed.
pub fn draw_tracking(frame: &mut RgbImage, sample: &PositionSample, roi: Option<Roi>) {
  match (sample.center, roi) {
    (Some(center), Some(roi)) => {
      for k in 0..BOX_THICKNESS {
        let (w, h) = (roi.width as i32 - 2 * k, roi.height as i32 - 2 * k);
        if w <= 0 || h <= 0 { break }
        draw_hollow_rect_mut(frame, Rect::at(roi.x + k, roi.y + k).of_size(w as u32, h as u32), GREEN);
      }
      draw_filled_circle_mut(frame, (center[0], center[1]), CENTER_RADIUS, BLUE);
    },
    _ => {
      let (w, h) = frame.dimensions();
      for k in 0..BOX_THICKNESS as u32 {
        if w <= 2 * k || h <= 2 * k { break }
        draw_hollow_rect_mut(frame, Rect::at(k as i32, k as i32).of_size(w - 2 * k, h - 2 * k), RED);
      }
    },
  }
}

// Two line plots, x and y MSD against the lag, each with its mean as a dashed
// horizontal line. No text; the x plot is on the left.
pub fn msd_chart(series: &MsdSeries, width: u32, height: u32) -> RgbImage {
  let mut chart = RgbImage::from_pixel(width, height, WHITE);
  let (mean_x, mean_y) = series.mean();
  let half = width / 2;
  draw_plot(&mut chart, &series.x, mean_x, 0, half);
  draw_plot(&mut chart, &series.y, mean_y, half, width - half);
  chart
}

const MARGIN: f32 = 20.;
const DASH: f32 = 8.;

fn draw_plot(chart: &mut RgbImage, values: &[f64], mean: f64, left: u32, width: u32) {
  let height = chart.height() as f32;
  let (x0, x1) = (left as f32 + MARGIN, (left + width) as f32 - MARGIN);
  let (y0, y1) = (height - MARGIN, MARGIN);
  if x1 <= x0 || y0 <= y1 { return }
  draw_line_segment_mut(chart, (x0, y0), (x1, y0), BLACK);
  draw_line_segment_mut(chart, (x0, y0), (x0, y1), BLACK);

  let max = values.iter().cloned().filter(|v| v.is_finite()).fold(0., f64::max);
  let scale_y = if max > 0. { (y0 - y1) / max as f32 } else { 0. };
  let scale_x = if values.len() > 1 { (x1 - x0) / (values.len() - 1) as f32 } else { 0. };
  let point = |i: usize, v: f64| (x0 + i as f32 * scale_x, y0 - v as f32 * scale_y);
  for i in 1..values.len() {
    draw_line_segment_mut(chart, point(i - 1, values[i - 1]), point(i, values[i]), BLUE);
  }

  let y = y0 - mean as f32 * scale_y;
  let mut x = x0;
  while x < x1 {
    draw_line_segment_mut(chart, (x, y), ((x + DASH).min(x1), y), RED);
    x += 2. * DASH;
  }
}

// Packs pixels as 0RGB words, the layout softbuffer expects.
pub fn to_buffer(image: &RgbImage, buffer: &mut Vec<u32>) {
  buffer.clear();
  buffer.extend(image.pixels().map(|p| ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32));
}

// Saves every tracked frame with the tracking state drawn on it, under the
// frame's own file name.
pub struct FrameWriter {
  dir: PathBuf,
}

impl FrameWriter {
  pub fn new(dir: &Path) -> Result<FrameWriter> {
    std::fs::create_dir_all(dir)
      .context(format!("Failed to create output directory {}", dir.display()))?;
    Ok(FrameWriter { dir: dir.to_path_buf() })
  }
}

impl TrackingObserver for FrameWriter {
  fn observe(&mut self, frame: &RgbImage, sample: &PositionSample, roi: Option<Roi>) -> Result<()> {
    let mut annotated = frame.clone();
    draw_tracking(&mut annotated, sample, roi);
    let path = self.dir.join(&sample.frame);
    annotated.save(&path)
      .context(format!("Failed to save annotated frame {}", path.display()))?;
    Ok(())
  }
}

// Saves the calibration panel of every image as `<stem>_lines.png`.
pub struct PanelWriter {
  dir: PathBuf,
}

impl PanelWriter {
  pub fn new(dir: &Path) -> Result<PanelWriter> {
    std::fs::create_dir_all(dir)
      .context(format!("Failed to create output directory {}", dir.display()))?;
    Ok(PanelWriter { dir: dir.to_path_buf() })
  }
}

impl CalibrationObserver for PanelWriter {
  fn observe(&mut self, _: &RgbImage, result: &CalibrationResult) -> Result<()> {
    let stem = Path::new(&result.name).file_stem()
      .map(|stem| stem.to_string_lossy().into_owned())
      .unwrap_or_else(|| result.name.clone());
    let path = self.dir.join(format!("{}_lines.png", stem));
    calibration_panel(&result.preprocessed, &result.lines).save(&path)
      .context(format!("Failed to save calibration panel {}", path.display()))?;
    Ok(())
  }
}
