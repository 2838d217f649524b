use crate::all::*;

// Row-major single channel image storage.
// Trackers work on these planes rather than on `image` buffers so the inner
// loops index flat slices.
#[derive(Clone, PartialEq)]
pub struct Image {
  pub data: Vec<u8>,
  pub width: usize,
  pub height: usize,
}

impl Image {
  pub fn new(width: usize, height: usize) -> Image {
    Image {
      data: vec![0; width * height],
      width,
      height,
    }
  }

  // One colour channel of an RGB frame.
  pub fn from_channel(frame: &RgbImage, channel: usize) -> Image {
    let (width, height) = frame.dimensions();
    Image {
      data: frame.pixels().map(|p| p[channel]).collect(),
      width: width as usize,
      height: height as usize,
    }
  }

  // Luma with the usual Rec. 601 weights.
  pub fn from_rgb(frame: &RgbImage) -> Image {
    let (width, height) = frame.dimensions();
    Image {
      data: frame.pixels()
        .map(|p| ((299 * p[0] as u32 + 587 * p[1] as u32 + 114 * p[2] as u32 + 500) / 1000) as u8)
        .collect(),
      width: width as usize,
      height: height as usize,
    }
  }

  pub fn size(&self, dim: usize) -> usize {
    if dim == 0 { self.width } else { self.height }
  }

  #[inline(always)]
  pub fn value(&self, x: usize, y: usize) -> u8 {
    self.data[y * self.width + x]
  }

  #[inline(always)]
  pub fn set_value(&mut self, x: usize, y: usize, value: u8) {
    self.data[y * self.width + x] = value;
  }

  pub fn get_sub_image(
    &self,
    ax: usize,
    ay: usize,
    width: usize,
    height: usize,
  ) -> Image {
    let mut image = Image::new(width, height);
    for y in 0..height {
      image.data[y * width .. (y + 1) * width]
        .copy_from_slice(&self[ay + y][ax .. ax + width]);
    }
    image
  }
}

// Element access in the manner of `image[y][x]`.
impl Index<usize> for Image {
  type Output = [u8];
  fn index(&self, y: usize) -> &Self::Output {
    &self.data[y * self.width .. (y + 1) * self.width]
  }
}

impl fmt::Display for Image {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut s = String::new();
    for y in 0..self.height {
      for x in 0..self.width {
        s += &format!("{:>3},", self.value(x, y));
      }
      s += "\n";
    }
    write!(f, "{}", s)
  }
}

impl fmt::Debug for Image {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Image {}x{}\n{}", self.width, self.height, self)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_channels() {
    let frame = RgbImage::from_fn(3, 2, |x, y| Rgb([x as u8, y as u8, 200]));
    let red = Image::from_channel(&frame, 0);
    assert_eq!(red.data, vec![0, 1, 2, 0, 1, 2]);
    assert_eq!(red[1][2], 2);
    let blue = Image::from_channel(&frame, 2);
    assert!(blue.data.iter().all(|v| *v == 200));
    let luma = Image::from_rgb(&RgbImage::from_pixel(2, 2, Rgb([255, 255, 255])));
    assert_eq!(luma.data, vec![255; 4]);
  }

  #[test]
  fn test_sub_image() {
    let mut image = Image::new(4, 4);
    for y in 0..4 {
      for x in 0..4 {
        image.set_value(x, y, (y * 4 + x) as u8);
      }
    }
    let sub = image.get_sub_image(1, 2, 2, 2);
    assert_eq!(sub.data, vec![9, 10, 13, 14]);
  }
}
