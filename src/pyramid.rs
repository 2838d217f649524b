use crate::all::*;

// Level 0 is the full resolution image, each following level halves both
// dimensions by 2x2 averaging.
pub struct Pyramid {
  pub levels: Vec<Image>,
}

impl Pyramid {
  pub fn new(image: Image, level_count: usize) -> Pyramid {
    let mut levels = vec![image];
    for level_ind in 1..(level_count + 1) {
      let parent = &levels[level_ind - 1];
      if parent.width < 2 || parent.height < 2 { break }
      let child = downscale(parent);
      levels.push(child);
    }
    Pyramid { levels }
  }

  // Deepest level that exists, may be less than requested for tiny images.
  pub fn depth(&self) -> usize {
    self.levels.len() - 1
  }

  pub fn level(&self, level: usize) -> &Image {
    &self.levels[level.min(self.depth())]
  }
}

fn downscale(parent: &Image) -> Image {
  let mut child = Image::new(parent.width / 2, parent.height / 2);
  for y in 0..child.height {
    for x in 0..child.width {
      let sum = parent.value(2 * x, 2 * y) as u16
        + parent.value(2 * x + 1, 2 * y) as u16
        + parent.value(2 * x, 2 * y + 1) as u16
        + parent.value(2 * x + 1, 2 * y + 1) as u16;
      child.set_value(x, y, ((sum + 2) / 4) as u8);
    }
  }
  child
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_levels() {
    let mut image = Image::new(9, 8);
    for y in 0..8 {
      for x in 0..9 {
        image.set_value(x, y, if x < 4 { 0 } else { 200 });
      }
    }
    let pyramid = Pyramid::new(image, 3);
    assert_eq!(pyramid.depth(), 3);
    assert_eq!((pyramid.level(1).width, pyramid.level(1).height), (4, 4));
    assert_eq!((pyramid.level(3).width, pyramid.level(3).height), (1, 1));
    assert_eq!(pyramid.level(1)[0], [0, 0, 200, 200]);
    // Requests past the deepest level clamp.
    assert_eq!(pyramid.level(7).width, 1);
  }
}
