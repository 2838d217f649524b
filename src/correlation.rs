// Discriminative correlation tracker with channel and spatial reliability.
//
// The appearance model is a per-channel template of the ROI plus a context
// margin. A spatial reliability mask, built from foreground/background colour
// histograms, weights template pixels by how likely they belong to the object.
// Each update scans a search window around the last position with masked
// normalized cross-correlation per channel and combines the channel responses
// with reliability weights measured on the first frame (how much the true peak
// stands out from the best distractor). The template follows slow appearance
// changes by blending in the matched patch.

use crate::all::*;

// Variance per unit of mask weight below which a patch counts as flat.
const MIN_VARIANCE: f64 = 1e-6;

pub struct CorrelationTracker {
  padding: f64,
  search_scale: f64,
  min_search_radius: usize,
  learning_rate: f64,
  min_response: f64,
  histogram_bins: usize,
  context_weight: f64,
  model: Option<Model>,
}

struct Model {
  roi: Roi,
  // Template window in frame coordinates. The ROI keeps a fixed offset inside.
  origin: [i32; 2],
  width: usize,
  height: usize,
  templates: Vec<Vec<f64>>,
  mask: Vec<f64>,
  mask_sum: f64,
  channel_weights: [f64; 3],
}

// Template with the weighted mean removed, ready for correlation.
struct Centered {
  values: Vec<f64>,
  variance: f64,
}

impl CorrelationTracker {
  pub fn new(p: &TrackerParameters) -> CorrelationTracker {
    CorrelationTracker {
      padding: p.csrt_padding,
      search_scale: p.csrt_search_scale,
      min_search_radius: p.csrt_min_search_radius,
      learning_rate: p.csrt_learning_rate,
      min_response: p.csrt_min_response,
      histogram_bins: p.csrt_histogram_bins,
      context_weight: p.csrt_context_weight,
      model: None,
    }
  }

  pub fn channel_weights(&self) -> Option<[f64; 3]> {
    self.model.as_ref().map(|m| m.channel_weights)
  }

  fn search_radius(&self, roi: &Roi) -> usize {
    let side = roi.width.max(roi.height) as f64;
    usize::max(self.min_search_radius, (self.search_scale * side).ceil() as usize)
  }

  fn spatial_mask(&self, planes: &[Image], roi: &Roi, origin: [i32; 2], width: usize, height: usize) -> Vec<f64> {
    let bins = self.histogram_bins;
    let step = 256 / bins;
    let bin = |x: usize, y: usize| -> usize {
      let r = planes[0].value(x, y) as usize / step;
      let g = planes[1].value(x, y) as usize / step;
      let b = planes[2].value(x, y) as usize / step;
      (r * bins + g) * bins + b
    };

    let mut foreground = vec![0usize; bins * bins * bins];
    let mut background = vec![0usize; bins * bins * bins];
    for y in 0..height {
      for x in 0..width {
        let (fx, fy) = (origin[0] as usize + x, origin[1] as usize + y);
        if roi.contains(fx as i32, fy as i32) {
          foreground[bin(fx, fy)] += 1;
        }
        else {
          background[bin(fx, fy)] += 1;
        }
      }
    }
    let nf = foreground.iter().sum::<usize>().max(1) as f64;
    let nb = background.iter().sum::<usize>() as f64;

    let mut mask = vec![self.context_weight; width * height];
    for y in 0..height {
      for x in 0..width {
        let (fx, fy) = (origin[0] as usize + x, origin[1] as usize + y);
        if !roi.contains(fx as i32, fy as i32) { continue }
        let i = bin(fx, fy);
        let pf = foreground[i] as f64 / nf;
        let pb = if nb > 0. { background[i] as f64 / nb } else { 0. };
        mask[y * width + x] = 0.5 + 0.5 * pf / (pf + pb);
      }
    }
    mask
  }

  // Combined response for every candidate window origin within `radius` of
  // the model origin, zero shift first.
  fn scan(&self, model: &Model, planes: &[Image], radius: usize) -> Vec<([i32; 2], [f64; 3])> {
    let frame_width = planes[0].width as i32;
    let frame_height = planes[0].height as i32;
    let max_x = frame_width - model.width as i32;
    let max_y = frame_height - model.height as i32;
    if max_x < 0 || max_y < 0 { return vec![] }

    let centered: Vec<Centered> = model.templates.iter()
      .map(|t| center(t, &model.mask, model.mask_sum))
      .collect();

    let r = radius as i32;
    let mut candidates = vec![];
    if model.origin[0] <= max_x && model.origin[1] <= max_y {
      candidates.push(model.origin);
    }
    for oy in i32::max(0, model.origin[1] - r) ..= i32::min(max_y, model.origin[1] + r) {
      for ox in i32::max(0, model.origin[0] - r) ..= i32::min(max_x, model.origin[0] + r) {
        if [ox, oy] == model.origin { continue }
        candidates.push([ox, oy]);
      }
    }

    candidates.into_iter().map(|origin| {
      let mut responses = [0.; 3];
      for c in 0..3 {
        responses[c] = correlate(&centered[c], model, &planes[c], origin);
      }
      (origin, responses)
    }).collect()
  }
}

fn center(template: &[f64], mask: &[f64], mask_sum: f64) -> Centered {
  let mean = template.iter().zip(mask).map(|(t, w)| t * w).sum::<f64>() / mask_sum;
  let values: Vec<f64> = template.iter().map(|t| t - mean).collect();
  let variance = values.iter().zip(mask).map(|(t, w)| w * t * t).sum::<f64>();
  Centered { values, variance }
}

// Masked normalized cross-correlation of the template against the frame patch
// whose top-left corner is `origin`. Flat template or patch gives 0.
fn correlate(template: &Centered, model: &Model, plane: &Image, origin: [i32; 2]) -> f64 {
  if template.variance < MIN_VARIANCE * model.mask_sum { return 0. }
  let (ox, oy) = (origin[0] as usize, origin[1] as usize);
  let mut sp = 0.;
  let mut sp2 = 0.;
  let mut stp = 0.;
  for y in 0..model.height {
    let row = &plane[oy + y][ox .. ox + model.width];
    let i0 = y * model.width;
    for (x, p) in row.iter().enumerate() {
      let p = *p as f64;
      let w = model.mask[i0 + x];
      sp += w * p;
      sp2 += w * p * p;
      stp += w * template.values[i0 + x] * p;
    }
  }
  let variance = sp2 - sp * sp / model.mask_sum;
  if variance < MIN_VARIANCE * model.mask_sum { return 0. }
  (stp / (template.variance * variance).sqrt()).clamp(-1., 1.)
}

fn planes(frame: &RgbImage) -> Vec<Image> {
  (0..3).map(|c| Image::from_channel(frame, c)).collect()
}

impl VisualTracker for CorrelationTracker {
  fn init(&mut self, frame: &RgbImage, roi: Roi) -> Result<()> {
    let (frame_width, frame_height) = frame.dimensions();
    if !roi.fits(frame_width, frame_height) {
      bail!(Error::InvalidRoi { roi, width: frame_width, height: frame_height });
    }
    let planes = planes(frame);

    let pad = i32::max(2, (self.padding * roi.width.max(roi.height) as f64).round() as i32);
    let x0 = i32::max(0, roi.x - pad);
    let y0 = i32::max(0, roi.y - pad);
    let x1 = i32::min(frame_width as i32, roi.x + roi.width as i32 + pad);
    let y1 = i32::min(frame_height as i32, roi.y + roi.height as i32 + pad);
    let origin = [x0, y0];
    let width = (x1 - x0) as usize;
    let height = (y1 - y0) as usize;

    let templates: Vec<Vec<f64>> = planes.iter()
      .map(|plane| {
        plane.get_sub_image(x0 as usize, y0 as usize, width, height)
          .data.iter().map(|v| *v as f64).collect()
      })
      .collect();
    let mask = self.spatial_mask(&planes, &roi, origin, width, height);
    let mask_sum = mask.iter().sum();

    let mut model = Model {
      roi,
      origin,
      width,
      height,
      templates,
      mask,
      mask_sum,
      channel_weights: [1. / 3.; 3],
    };

    // Channel reliability: how far the true peak stands above the strongest
    // response away from it.
    let exclusion = i32::max(1, (roi.width.min(roi.height) / 4) as i32);
    let responses = self.scan(&model, &planes, self.search_radius(&roi));
    let mut reliability = [0.; 3];
    for c in 0..3 {
      let peak = responses.first().map(|(_, r)| r[c]).unwrap_or(0.);
      let distractor = responses.iter()
        .filter(|(o, _)| (o[0] - origin[0]).abs() > exclusion || (o[1] - origin[1]).abs() > exclusion)
        .map(|(_, r)| r[c])
        .fold(0., f64::max);
      reliability[c] = if peak > 0. { f64::max(0., 1. - distractor / peak) } else { 0. };
    }
    let total: f64 = reliability.iter().sum();
    if total > 0. {
      for c in 0..3 {
        model.channel_weights[c] = reliability[c] / total;
      }
    }
    else {
      warn!("No colour channel separates the target from its surroundings, weighting channels equally.");
    }
    debug!("Correlation tracker channel weights {:?}", model.channel_weights);

    self.model = Some(model);
    Ok(())
  }

  fn update(&mut self, frame: &RgbImage) -> Option<Roi> {
    let planes = planes(frame);
    let model = self.model.as_ref()?;
    let radius = self.search_radius(&model.roi);
    let mut best: Option<([i32; 2], f64)> = None;
    for (origin, responses) in self.scan(model, &planes, radius) {
      let response: f64 = (0..3).map(|c| model.channel_weights[c] * responses[c]).sum();
      if best.map_or(true, |(_, b)| response > b) {
        best = Some((origin, response));
      }
    }
    let (origin, response) = best?;
    if response < self.min_response {
      debug!("Correlation peak {:.3} below {:.3}.", response, self.min_response);
      return None;
    }

    let learning_rate = self.learning_rate;
    let model = self.model.as_mut()?;
    let (dx, dy) = (origin[0] - model.origin[0], origin[1] - model.origin[1]);
    for (template, plane) in model.templates.iter_mut().zip(&planes) {
      for y in 0..model.height {
        let row = &plane[origin[1] as usize + y][origin[0] as usize .. origin[0] as usize + model.width];
        for (x, p) in row.iter().enumerate() {
          let t = &mut template[y * model.width + x];
          *t = (1. - learning_rate) * *t + learning_rate * *p as f64;
        }
      }
    }
    model.origin = origin;
    model.roi = model.roi.translated(dx, dy);
    Some(model.roi)
  }
}
