use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image::RgbImage;
use log::{info, warn};

use tweezer_track::{
  calibrate_folder, drop_failed, init_logging, msd_chart, read_positions, save_msd,
  save_positions, save_scaling_factors, CalibrationObserver, CalibrationResult, FixedRoi, FrameWriter,
  FrameFolder, MsdSeries, ObjectTracker, Observers, PanelWriter, ParameterSet, Roi, SelectedImages, Viewer,
};

#[derive(Parser)]
struct Args {
  // JSON file overriding any subset of the default parameters.
  #[clap(long)]
  parameters: Option<String>,
  #[clap(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Pixel-to-meter scaling factors from calibration line images named x* or y*.
  Calibrate {
    #[clap(short)]
    input_folder: String,
    #[clap(short)]
    output: String,
    /// Show the detected lines of the named images, e.g. `--plot x_1.png y_3.png`.
    #[clap(long, multiple_values = true)]
    plot: Vec<String>,
    /// Save the detected lines of every image as PNG into this folder.
    #[clap(long)]
    plot_dir: Option<String>,
  },
  /// Track one object through a folder of frames.
  Track {
    #[clap(short)]
    input_folder: String,
    #[clap(short)]
    output: String,
    /// Initial ROI as `x,y,width,height`. Selected in a window when missing.
    #[clap(long)]
    roi: Option<String>,
    #[clap(long, default_value = "CSRT")]
    tracker: String,
    /// Show tracking live.
    #[clap(long)]
    show: bool,
    /// Save every frame with the tracked box drawn on it into this folder.
    #[clap(long)]
    annotated_dir: Option<String>,
  },
  /// Mean squared displacement of a tracked position table.
  Msd {
    #[clap(short)]
    input: String,
    #[clap(short)]
    output: String,
    /// Remove failed frames instead of rejecting the table.
    #[clap(long)]
    drop_failed: bool,
    /// Show the MSD curves.
    #[clap(long)]
    plot: bool,
    /// Save the MSD curves as PNG.
    #[clap(long)]
    plot_file: Option<String>,
  },
}

const CHART_WIDTH: u32 = 1200;
const CHART_HEIGHT: u32 = 400;

fn handle_error(err: &anyhow::Error) {
  for (i, e) in err.chain().enumerate() {
    println!("  {}: {}", i + 1, e);
  }
}

fn main() {
  init_logging();
  if let Err(err) = run() {
    handle_error(&err);
    std::process::exit(1);
  }
}

fn run() -> Result<()> {
  let args = Args::parse();
  let parameters = ParameterSet::load(args.parameters.as_deref().map(Path::new))?;
  match args.command {
    Command::Calibrate { input_folder, output, plot, plot_dir } => {
      calibrate(&parameters, &input_folder, &output, &plot, plot_dir.as_deref())
    },
    Command::Track { input_folder, output, roi, tracker, show, annotated_dir } => {
      track(&parameters, &input_folder, &output, roi.as_deref(), &tracker, show, annotated_dir.as_deref())
    },
    Command::Msd { input, output, drop_failed, plot, plot_file } => {
      msd(&input, &output, drop_failed, plot, plot_file.as_deref())
    },
  }
}

struct CalibrationObservers<'a>(Vec<&'a mut dyn CalibrationObserver>);

impl CalibrationObserver for CalibrationObservers<'_> {
  fn observe(&mut self, image: &RgbImage, result: &CalibrationResult) -> Result<()> {
    for observer in self.0.iter_mut() {
      observer.observe(image, result)?;
    }
    Ok(())
  }
}

fn calibrate(
  parameters: &ParameterSet,
  input_folder: &str,
  output: &str,
  plot: &[String],
  plot_dir: Option<&str>,
) -> Result<()> {
  let folder = FrameFolder::open(Path::new(input_folder))?;
  for name in plot {
    if !folder.contains(name) {
      warn!("Image '{}' not found in {}.", name, input_folder);
    }
  }
  let mut panel_writer = plot_dir.map(|dir| PanelWriter::new(Path::new(dir))).transpose()?;
  // The window starts at the panel size of the first named image that loads.
  let mut viewer = match folder.first_named_frame(plot) {
    Some(image) => Some(Viewer::new("Calibration lines", 3 * image.width(), image.height())?),
    None => None,
  };
  let mut selected = viewer.as_mut().map(|viewer| SelectedImages::new(plot, viewer));

  let mut observers = CalibrationObservers(vec![]);
  if let Some(writer) = panel_writer.as_mut() {
    observers.0.push(writer);
  }
  if let Some(selected) = selected.as_mut() {
    observers.0.push(selected);
  }
  let table = calibrate_folder(&folder, &parameters.calibration, &mut observers)?;
  save_scaling_factors(Path::new(output), &table)
}

fn track(
  parameters: &ParameterSet,
  input_folder: &str,
  output: &str,
  roi: Option<&str>,
  tracker_kind: &str,
  show: bool,
  annotated_dir: Option<&str>,
) -> Result<()> {
  let folder = FrameFolder::open(Path::new(input_folder))?;
  let mut tracker = ObjectTracker::new(tracker_kind, &parameters.tracker)?;
  let first_frame = folder.first_frame()?;
  let (width, height) = first_frame.dimensions();

  let mut viewer = None;
  match roi {
    Some(text) => {
      let roi: Roi = text.parse()?;
      tracker.select_roi(&mut FixedRoi(roi), &first_frame)?;
    },
    None => {
      let viewer = viewer.insert(Viewer::new("Select ROI", width, height)?);
      tracker.select_roi(&mut *viewer, &first_frame)?;
      if !show {
        viewer.close();
      }
    },
  }
  if show && viewer.is_none() {
    viewer = Some(Viewer::new("Tracking", width, height)?);
  }
  let mut frame_writer = annotated_dir.map(|dir| FrameWriter::new(Path::new(dir))).transpose()?;

  let mut observers = Observers(vec![]);
  if let Some(viewer) = viewer.as_mut().filter(|viewer| viewer.is_open()) {
    observers.0.push(viewer);
  }
  if let Some(writer) = frame_writer.as_mut() {
    observers.0.push(writer);
  }
  let samples = tracker.track_folder(&folder, &mut observers)?;
  save_positions(Path::new(output), &samples)
}

fn msd(input: &str, output: &str, drop_failed_frames: bool, plot: bool, plot_file: Option<&str>) -> Result<()> {
  let mut samples = read_positions(Path::new(input))?;
  if drop_failed_frames {
    samples = drop_failed(samples);
  }
  let series = MsdSeries::from_samples(&samples)
    .context("Position table has failed frames, use --drop-failed to leave them out")?;
  save_msd(Path::new(output), &series)?;
  let (mean_x, mean_y) = series.mean();
  info!("Mean MSD: x {:.2}, y {:.2}.", mean_x, mean_y);

  if plot || plot_file.is_some() {
    let chart = msd_chart(&series, CHART_WIDTH, CHART_HEIGHT);
    if let Some(path) = plot_file {
      chart.save(path).context(format!("Failed to save MSD chart {}", path))?;
    }
    if plot {
      Viewer::new("MSD", CHART_WIDTH, CHART_HEIGHT)?.show_and_wait(&chart);
    }
  }
  Ok(())
}
