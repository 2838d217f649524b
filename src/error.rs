use std::path::PathBuf;

use thiserror::Error;

use crate::roi::Roi;

// Failures callers may want to tell apart. Everything else travels as
// `anyhow::Error` with context attached; these survive `downcast_ref`.
#[derive(Debug, Error)]
pub enum Error {
  #[error("Axis must be 'x' or 'y', got '{0}'.")]
  InvalidAxis(String),

  #[error("Unsupported tracker type: {0}")]
  UnsupportedTrackerType(String),

  #[error("ROI not set. Supply one with `set_roi` or select it from the first frame.")]
  RoiNotSet,

  #[error("ROI {roi} does not fit inside the {width}x{height} frame.")]
  InvalidRoi { roi: Roi, width: u32, height: u32 },

  #[error("Cannot parse ROI from '{0}', expected `x,y,width,height`.")]
  InvalidRoiText(String),

  #[error("Tracker must be initialized before it can be updated.")]
  NotInitialized,

  #[error("Tracker is already initialized, start a new session instead.")]
  AlreadyInitialized,

  #[error("{0} is not a valid directory.")]
  NotADirectory(PathBuf),

  #[error("No images found in {0}.")]
  NoFramesFound(PathBuf),

  #[error("No frames to track.")]
  EmptySequence,

  #[error("Error loading image {path}")]
  FrameLoad {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },

  #[error("ROI selection was cancelled.")]
  RoiSelectionCancelled,

  #[error("Frame {0} has no position (tracking failed), remove failed rows before computing MSD.")]
  FailedSample(String),

  #[error("Malformed table {path}, line {line}: {message}")]
  MalformedTable { path: PathBuf, line: usize, message: String },
}
