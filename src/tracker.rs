use crate::all::*;

// One interchangeable short-term tracking algorithm.
pub trait VisualTracker {
  fn init(&mut self, frame: &RgbImage, roi: Roi) -> Result<()>;
  // `None` when the target was not found in this frame. The model is left as
  // it was so the next frame is tried against the last good state.
  fn update(&mut self, frame: &RgbImage) -> Option<Roi>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerKind {
  // Correlation tracker with channel and spatial reliability.
  Csrt,
  // Pyramidal Lucas-Kanade points.
  Klt,
}

impl FromStr for TrackerKind {
  type Err = Error;

  fn from_str(s: &str) -> std::result::Result<TrackerKind, Error> {
    match s {
      "CSRT" => Ok(TrackerKind::Csrt),
      "KLT" => Ok(TrackerKind::Klt),
      _ => Err(Error::UnsupportedTrackerType(s.to_string())),
    }
  }
}

impl TrackerKind {
  pub fn build(&self, p: &TrackerParameters) -> Result<Box<dyn VisualTracker>> {
    Ok(match self {
      TrackerKind::Csrt => Box::new(CorrelationTracker::new(p)),
      TrackerKind::Klt => Box::new(PointTracker::new(p)?),
    })
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PositionSample {
  pub frame: String,
  // `None` marks a frame where tracking failed.
  pub center: Option<Pixel>,
}

impl PositionSample {
  pub fn failed(frame: &str) -> PositionSample {
    PositionSample { frame: frame.to_string(), center: None }
  }
}

// Receives every tracked frame, e.g. for live display or annotated output.
pub trait TrackingObserver {
  fn observe(&mut self, frame: &RgbImage, sample: &PositionSample, roi: Option<Roi>) -> Result<()>;
}

pub struct NoObserver;

impl TrackingObserver for NoObserver {
  fn observe(&mut self, _: &RgbImage, _: &PositionSample, _: Option<Roi>) -> Result<()> {
    Ok(())
  }
}

// Forwards every frame to each observer in turn.
pub struct Observers<'a>(pub Vec<&'a mut dyn TrackingObserver>);

impl TrackingObserver for Observers<'_> {
  fn observe(&mut self, frame: &RgbImage, sample: &PositionSample, roi: Option<Roi>) -> Result<()> {
    for observer in self.0.iter_mut() {
      observer.observe(frame, sample, roi)?;
    }
    Ok(())
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TrackerState {
  Uninitialized,
  Tracking { roi: Roi },
}

// A single tracking session. Initialized exactly once, then updated once per
// frame. A new sequence needs a new instance.
pub struct ObjectTracker {
  kind: TrackerKind,
  algorithm: Box<dyn VisualTracker>,
  state: TrackerState,
  initial_roi: Option<Roi>,
}

impl ObjectTracker {
  pub fn new(kind: &str, p: &TrackerParameters) -> Result<ObjectTracker> {
    let kind: TrackerKind = kind.parse()?;
    ObjectTracker::with_kind(kind, p)
  }

  pub fn with_kind(kind: TrackerKind, p: &TrackerParameters) -> Result<ObjectTracker> {
    Ok(ObjectTracker {
      kind,
      algorithm: kind.build(p)?,
      state: TrackerState::Uninitialized,
      initial_roi: None,
    })
  }

  pub fn kind(&self) -> TrackerKind {
    self.kind
  }

  pub fn set_roi(&mut self, roi: Roi) {
    self.initial_roi = Some(roi);
  }

  pub fn select_roi(&mut self, source: &mut dyn RoiSource, first_frame: &RgbImage) -> Result<Roi> {
    let roi = source.roi(first_frame)?;
    info!("Selected ROI {}.", roi);
    self.initial_roi = Some(roi);
    Ok(roi)
  }

  pub fn roi(&self) -> Option<Roi> {
    match self.state {
      TrackerState::Tracking { roi } => Some(roi),
      TrackerState::Uninitialized => self.initial_roi,
    }
  }

  pub fn is_initialized(&self) -> bool {
    self.state != TrackerState::Uninitialized
  }

  pub fn initialize(&mut self, first_frame: &RgbImage, roi: Roi) -> Result<()> {
    if self.is_initialized() {
      bail!(Error::AlreadyInitialized);
    }
    let (width, height) = first_frame.dimensions();
    if !roi.fits(width, height) {
      bail!(Error::InvalidRoi { roi, width, height });
    }
    self.algorithm.init(first_frame, roi)?;
    self.initial_roi = Some(roi);
    self.state = TrackerState::Tracking { roi };
    Ok(())
  }

  // `Ok(None)` is a per-frame tracking failure, the session goes on.
  pub fn update(&mut self, frame: &RgbImage) -> Result<Option<Roi>> {
    if !self.is_initialized() {
      bail!(Error::NotInitialized);
    }
    let found = self.algorithm.update(frame);
    if let Some(roi) = found {
      self.state = TrackerState::Tracking { roi };
    }
    Ok(found)
  }

  // One sample per input item, in order. Unreadable frames and failed updates
  // become failure samples, neither stops the sequence. An empty
  // sequence is an error.
  pub fn track_sequence<I>(
    &mut self,
    frames: I,
    observer: &mut dyn TrackingObserver,
  ) -> Result<Vec<PositionSample>>
  where
    I: IntoIterator<Item = (String, Result<RgbImage>)>,
  {
    if !self.is_initialized() {
      bail!(Error::NotInitialized);
    }
    let mut samples = vec![];
    let mut failures = 0;
    for (id, frame) in frames {
      let frame = match frame {
        Ok(frame) => frame,
        Err(err) => {
          warn!("Skipping frame {}: {:#}", id, err);
          failures += 1;
          samples.push(PositionSample::failed(&id));
          continue;
        },
      };
      let found = self.update(&frame)?;
      let sample = PositionSample {
        frame: id,
        center: found.map(|roi| roi.center()),
      };
      if sample.center.is_none() {
        debug!("Tracking failed on frame {}.", sample.frame);
        failures += 1;
      }
      observer.observe(&frame, &sample, found)?;
      samples.push(sample);
    }
    if samples.is_empty() {
      bail!(Error::EmptySequence);
    }
    if failures > 0 {
      warn!("Tracking failed on {} of {} frames.", failures, samples.len());
    }
    Ok(samples)
  }

  // Whole session over a frame folder: the first frame initializes the model
  // with the ROI set earlier, then every frame, the first included, is tracked.
  pub fn track_folder(
    &mut self,
    folder: &FrameFolder,
    observer: &mut dyn TrackingObserver,
  ) -> Result<Vec<PositionSample>> {
    let roi = self.initial_roi.ok_or(Error::RoiNotSet)?;
    let first_frame = folder.first_frame()?;
    self.initialize(&first_frame, roi)?;
    info!("Tracking {} frames from {} with {:?}.", folder.len(), folder.path.display(), self.kind);
    self.track_sequence(folder.frames(), observer)
  }
}
