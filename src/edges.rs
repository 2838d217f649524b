use crate::all::*;

use imageproc::gradients::{horizontal_sobel, vertical_sobel};

// Canny edge detector on an already smoothed colour image. 3x3 Sobel per
// channel, the channel with the largest L1 magnitude wins at each pixel, then
// non-maximum suppression along the quantized gradient direction and
// hysteresis between `low` and `high`. No extra blur is applied here.
// Returns 255 on edge pixels, 0 elsewhere.
pub fn canny(image: &RgbImage, low: f32, high: f32) -> GrayImage {
  let (width, height) = image.dimensions();
  let (w, h) = (width as usize, height as usize);
  let mut gx = vec![0f32; w * h];
  let mut gy = vec![0f32; w * h];
  let mut magnitude = vec![0f32; w * h];

  for c in 0..3 {
    let channel = GrayImage::from_fn(width, height, |x, y| Luma([image.get_pixel(x, y)[c]]));
    let sx = horizontal_sobel(&channel);
    let sy = vertical_sobel(&channel);
    for (i, (px, py)) in sx.pixels().zip(sy.pixels()).enumerate() {
      let (dx, dy) = (px[0] as f32, py[0] as f32);
      let m = dx.abs() + dy.abs();
      if m > magnitude[i] {
        magnitude[i] = m;
        gx[i] = dx;
        gy[i] = dy;
      }
    }
  }

  let thin = suppress_non_maximum(&magnitude, &gx, &gy, w, h);
  hysteresis(&thin, w, h, low, high)
}

// tan(22.5°) and tan(67.5°) split the four directions.
const TAN_22_5: f32 = 0.414_213_56;
const TAN_67_5: f32 = 2.414_213_6;

fn suppress_non_maximum(magnitude: &[f32], gx: &[f32], gy: &[f32], w: usize, h: usize) -> Vec<f32> {
  let mut out = vec![0f32; w * h];
  if w < 3 || h < 3 { return out }
  for y in 1..(h - 1) {
    for x in 1..(w - 1) {
      let i = y * w + x;
      let m = magnitude[i];
      if m == 0. { continue }
      let (ax, ay) = (gx[i].abs(), gy[i].abs());
      // Neighbours across the edge, i.e. along the gradient.
      let (a, b) = if ay <= ax * TAN_22_5 {
        (magnitude[i - 1], magnitude[i + 1])
      }
      else if ay >= ax * TAN_67_5 {
        (magnitude[i - w], magnitude[i + w])
      }
      else if (gx[i] > 0.) == (gy[i] > 0.) {
        (magnitude[i - w - 1], magnitude[i + w + 1])
      }
      else {
        (magnitude[i - w + 1], magnitude[i + w - 1])
      };
      // Ties break towards the first pixel of a plateau.
      if m > a && m >= b {
        out[i] = m;
      }
    }
  }
  out
}

fn hysteresis(thin: &[f32], w: usize, h: usize, low: f32, high: f32) -> GrayImage {
  let mut edges = GrayImage::new(w as u32, h as u32);
  let mut stack = vec![];
  for i in 0..thin.len() {
    if thin[i] > high && edges.as_raw()[i] == 0 {
      stack.push(i);
      mark(&mut edges, i, w);
      while let Some(j) = stack.pop() {
        let (x, y) = ((j % w) as i64, (j / w) as i64);
        for dy in -1..=1 {
          for dx in -1..=1 {
            let (nx, ny) = (x + dx, y + dy);
            if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 { continue }
            let k = ny as usize * w + nx as usize;
            if thin[k] > low && edges.as_raw()[k] == 0 {
              mark(&mut edges, k, w);
              stack.push(k);
            }
          }
        }
      }
    }
  }
  edges
}

fn mark(edges: &mut GrayImage, i: usize, w: usize) {
  edges.put_pixel((i % w) as u32, (i / w) as u32, Luma([255]));
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_flat_image_has_no_edges() {
    let image = RgbImage::from_pixel(20, 20, Rgb([45, 45, 45]));
    assert!(canny(&image, 50., 150.).pixels().all(|p| p[0] == 0));
  }

  #[test]
  fn test_vertical_step() {
    // Step of 45 gives a Sobel magnitude of 180 on both sides of the step.
    let image = RgbImage::from_fn(20, 30, |x, _| if x < 10 { Rgb([0, 0, 0]) } else { Rgb([45, 45, 45]) });
    let edges = canny(&image, 50., 150.);
    for y in 1..29 {
      let row: Vec<u32> = (0..20).filter(|x| edges.get_pixel(*x, y)[0] == 255).collect();
      assert_eq!(row, vec![9], "row {}", y);
    }
  }

  #[test]
  fn test_weak_step_below_high_threshold() {
    let image = RgbImage::from_fn(20, 20, |x, _| if x < 10 { Rgb([0, 0, 0]) } else { Rgb([30, 30, 30]) });
    assert!(canny(&image, 50., 150.).pixels().all(|p| p[0] == 0));
  }
}
