// Calibration, single-object tracking and mean squared displacement analysis
// for optical-tweezer microscopy frame sequences.

mod all;

pub mod calibration;
pub mod correlation;
pub mod edges;
pub mod error;
pub mod frame_folder;
pub mod image;
pub mod klt;
pub mod msd;
pub mod optical_flow;
pub mod parameters;
pub mod pyramid;
pub mod render;
pub mod roi;
pub mod table;
pub mod tracker;
pub mod types;
pub mod util;
pub mod viewer;

pub use crate::{
  calibration::{
    calibrate_folder, calibrate_image, compute_spacing, detect_lines, line_gaps, preprocess, Axis,
    CalibrationObserver, CalibrationResult, DetectedLine, ScalingTable, SelectedImages,
  },
  error::Error,
  frame_folder::FrameFolder,
  msd::{compute_msd, drop_failed, MsdSeries},
  parameters::ParameterSet,
  render::{msd_chart, FrameWriter, PanelWriter},
  roi::{FixedRoi, Roi, RoiSource},
  table::{read_positions, save_msd, save_positions, save_scaling_factors},
  tracker::{NoObserver, ObjectTracker, Observers, PositionSample, TrackerKind, TrackingObserver},
  util::init_logging,
  viewer::Viewer,
};
