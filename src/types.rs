// Eigen-like aliases.
pub type Vector2d = nalgebra::Vector2::<f64>;
pub type Matrix2d = nalgebra::Matrix2::<f64>;
pub type Matrixd = nalgebra::DMatrix::<f64>;
pub type Pixel = nalgebra::Vector2::<i32>;

pub fn from_f64(p: &Vector2d) -> Pixel {
  Pixel::new(p[0].round() as i32, p[1].round() as i32)
}
