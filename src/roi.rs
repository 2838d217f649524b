use crate::all::*;

// Axis-aligned rectangle in pixel coordinates, top-left corner plus size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
  pub x: i32,
  pub y: i32,
  pub width: u32,
  pub height: u32,
}

impl Roi {
  pub fn new(x: i32, y: i32, width: u32, height: u32) -> Roi {
    Roi { x, y, width, height }
  }

  // Integer center, `x + w / 2` rounding down like the position tables expect.
  pub fn center(&self) -> Pixel {
    Pixel::new(self.x + (self.width / 2) as i32, self.y + (self.height / 2) as i32)
  }

  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }

  pub fn fits(&self, width: u32, height: u32) -> bool {
    !self.is_empty()
      && self.x >= 0
      && self.y >= 0
      && self.x as i64 + self.width as i64 <= width as i64
      && self.y as i64 + self.height as i64 <= height as i64
  }

  pub fn translated(&self, dx: i32, dy: i32) -> Roi {
    Roi { x: self.x + dx, y: self.y + dy, ..*self }
  }

  // Rectangle spanned by two corner points, in any order.
  pub fn from_corners(a: Pixel, b: Pixel) -> Roi {
    let x = a[0].min(b[0]);
    let y = a[1].min(b[1]);
    Roi::new(x, y, (a[0] - b[0]).unsigned_abs(), (a[1] - b[1]).unsigned_abs())
  }

  pub fn contains(&self, x: i32, y: i32) -> bool {
    x >= self.x && y >= self.y
      && x < self.x + self.width as i32
      && y < self.y + self.height as i32
  }
}

impl fmt::Display for Roi {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "({}, {}, {}, {})", self.x, self.y, self.width, self.height)
  }
}

impl FromStr for Roi {
  type Err = Error;

  fn from_str(s: &str) -> std::result::Result<Roi, Error> {
    let invalid = || Error::InvalidRoiText(s.to_string());
    let parts: Vec<&str> = s.split(',').map(|p| p.trim()).collect();
    if parts.len() != 4 { return Err(invalid()) }
    let x = parts[0].parse::<i32>().map_err(|_| invalid())?;
    let y = parts[1].parse::<i32>().map_err(|_| invalid())?;
    let width = parts[2].parse::<u32>().map_err(|_| invalid())?;
    let height = parts[3].parse::<u32>().map_err(|_| invalid())?;
    Ok(Roi::new(x, y, width, height))
  }
}

// Where the initial ROI of a tracking session comes from. The tracker only
// sees this trait, interactive selection lives in `viewer`.
pub trait RoiSource {
  fn roi(&mut self, first_frame: &RgbImage) -> Result<Roi>;
}

pub struct FixedRoi(pub Roi);

impl RoiSource for FixedRoi {
  fn roi(&mut self, _first_frame: &RgbImage) -> Result<Roi> {
    Ok(self.0)
  }
}
