// NOTE This kind of import-all file isn't a common Rust idiom.

pub use crate::{
  calibration::*,
  correlation::*,
  edges::*,
  error::*,
  frame_folder::*,
  image::*,
  klt::*,
  msd::*,
  optical_flow::*,
  parameters::*,
  pyramid::*,
  render::*,
  roi::*,
  table::*,
  tracker::*,
  types::*,
  util::*,
};

pub use {
  std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    ops::Index,
    path::{Path, PathBuf},
    str::FromStr,
  },
  log::{debug, error, info, warn, LevelFilter},
  nalgebra::{dmatrix, DMatrix},
  anyhow::{anyhow, bail, Context as AnyhowContext, Result},
  image::{GrayImage, Luma, Rgb, RgbImage},
  serde::{Deserialize, Serialize},
};
