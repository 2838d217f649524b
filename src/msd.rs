use crate::all::*;

// Mean squared displacement for every lag `tau` in `0..n`:
// `msd[tau] = mean over i of (values[i + tau] - values[i])^2`.
// Quadratic in the series length; the last lags average few pairs and are
// noisy, but they are kept.
pub fn compute_msd(values: &[f64]) -> Vec<f64> {
  let n = values.len();
  let mut msd = Vec::with_capacity(n);
  for tau in 0..n {
    let pairs = n - tau;
    let mut sum = 0.;
    for i in 0..pairs {
      let d = values[i + tau] - values[i];
      sum += d * d;
    }
    msd.push(sum / pairs as f64);
  }
  msd
}

// Per-axis MSD curves of one tracked trajectory, in pixels squared.
#[derive(Clone, Debug, PartialEq)]
pub struct MsdSeries {
  pub x: Vec<f64>,
  pub y: Vec<f64>,
}

impl MsdSeries {
  // Failure markers have no position to fill in. Callers that accept gaps in
  // the trajectory remove them first with `drop_failed`.
  pub fn from_samples(samples: &[PositionSample]) -> Result<MsdSeries> {
    let mut xs = Vec::with_capacity(samples.len());
    let mut ys = Vec::with_capacity(samples.len());
    for sample in samples {
      let center = sample.center
        .ok_or_else(|| Error::FailedSample(sample.frame.clone()))?;
      xs.push(center[0] as f64);
      ys.push(center[1] as f64);
    }
    if samples.len() < 2 {
      warn!("MSD of {} positions has no nonzero lag.", samples.len());
    }
    Ok(MsdSeries {
      x: compute_msd(&xs),
      y: compute_msd(&ys),
    })
  }

  pub fn len(&self) -> usize {
    self.x.len()
  }

  pub fn is_empty(&self) -> bool {
    self.x.is_empty()
  }

  // Mean of each curve over all lags, 0 for an empty series.
  pub fn mean(&self) -> (f64, f64) {
    (mean(&self.x), mean(&self.y))
  }
}

fn mean(values: &[f64]) -> f64 {
  if values.is_empty() { return 0. }
  values.iter().sum::<f64>() / values.len() as f64
}

pub fn drop_failed(samples: Vec<PositionSample>) -> Vec<PositionSample> {
  let total = samples.len();
  let kept: Vec<PositionSample> = samples.into_iter().filter(|s| s.center.is_some()).collect();
  if kept.len() < total {
    info!("Dropped {} failed of {} positions.", total - kept.len(), total);
  }
  kept
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::{Rng, SeedableRng};
  use rand_xoshiro::Xoshiro256PlusPlus;

  fn sample(frame: &str, center: Option<(i32, i32)>) -> PositionSample {
    PositionSample {
      frame: frame.to_string(),
      center: center.map(|(x, y)| Pixel::new(x, y)),
    }
  }

  #[test]
  fn test_basic_properties() {
    let values = [3., 1., 4., 1., 5., 9., 2., 6.];
    let msd = compute_msd(&values);
    assert_eq!(msd.len(), values.len());
    assert_eq!(msd[0], 0.);
    assert!(msd.iter().all(|v| *v >= 0.));
    // Single pair at the largest lag.
    assert_eq!(msd[7], 9.);
    assert_eq!(msd[1], (4. + 9. + 9. + 16. + 16. + 49. + 16.) / 7.);
    assert!(compute_msd(&[]).is_empty());
    assert_eq!(compute_msd(&[2.5]), vec![0.]);
  }

  #[test]
  fn test_constant_series() {
    assert!(compute_msd(&[7.; 12]).iter().all(|v| *v == 0.));
  }

  #[test]
  fn test_periodic_series() {
    let period = 20;
    let values: Vec<f64> = (0..200)
      .map(|i| (2. * std::f64::consts::PI * i as f64 / period as f64).sin())
      .collect();
    let msd = compute_msd(&values);
    assert!(msd[period] < 1e-12);
    assert!(msd[2 * period] < 1e-12);
    // Half a period apart: (sin(a + pi) - sin(a))^2 = 4 sin^2(a), mean 2.
    assert!((msd[period / 2] - 2.).abs() < 1e-9);
    assert!(msd[period / 2] > msd[period / 4]);
  }

  #[test]
  fn test_random_walk_grows_linearly() {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
    let mut position = 0.;
    let mut values = vec![];
    for _ in 0..2000 {
      values.push(position);
      position += if rng.gen_bool(0.5) { 1. } else { -1. };
    }
    let msd = compute_msd(&values);
    assert_eq!(msd[1], 1.);
    assert!(msd[10] > 5. && msd[10] < 15., "{}", msd[10]);
    assert!(msd[10] > msd[2]);
  }

  #[test]
  fn test_series_from_samples() {
    let samples = vec![
      sample("a", Some((10, 0))),
      sample("b", Some((12, 1))),
      sample("c", Some((11, 3))),
    ];
    let series = MsdSeries::from_samples(&samples).unwrap();
    assert_eq!(series.len(), 3);
    assert_eq!(series.x, vec![0., 2.5, 1.]);
    assert_eq!(series.y, vec![0., 2.5, 9.]);
    let (mx, my) = series.mean();
    assert!((mx - 3.5 / 3.).abs() < 1e-12);
    assert!((my - 11.5 / 3.).abs() < 1e-12);
    assert_eq!(MsdSeries::from_samples(&[]).unwrap().mean(), (0., 0.));
  }

  #[test]
  fn test_failed_samples() {
    let samples = vec![
      sample("a", Some((10, 0))),
      sample("b", None),
      sample("c", Some((11, 3))),
    ];
    let err = MsdSeries::from_samples(&samples).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::FailedSample(f)) if f == "b"));

    let kept = drop_failed(samples);
    assert_eq!(kept.iter().map(|s| s.frame.as_str()).collect::<Vec<_>>(), vec!["a", "c"]);
    let series = MsdSeries::from_samples(&kept).unwrap();
    assert_eq!(series.x, vec![0., 1.]);
    assert_eq!(series.y, vec![0., 9.]);
  }
}
