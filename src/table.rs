// Comma separated tables exchanged between the subcommands.

use crate::all::*;

const FRAME: &str = "Frame";
const CENTER_X: &str = "Center_X";
const CENTER_Y: &str = "Center_Y";
const FAILED: &str = "Failed";

pub fn write_positions<W: Write>(writer: &mut W, samples: &[PositionSample]) -> Result<()> {
  writeln!(writer, "{},{},{}", FRAME, CENTER_X, CENTER_Y)?;
  for sample in samples {
    match sample.center {
      Some(c) => writeln!(writer, "{},{},{}", quote(&sample.frame), c[0], c[1])?,
      None => writeln!(writer, "{},{},{}", quote(&sample.frame), FAILED, FAILED)?,
    }
  }
  Ok(())
}

pub fn save_positions(path: &Path, samples: &[PositionSample]) -> Result<()> {
  let mut writer = create(path)?;
  write_positions(&mut writer, samples)
    .context(format!("Failed to write positions to {}", path.display()))?;
  writer.flush()?;
  info!("Saved {} positions to {}.", samples.len(), path.display());
  Ok(())
}

pub struct PositionReader<R> {
  reader: R,
  path: PathBuf,
  line: String,
  line_number: usize,
  // Column indices of the frame name and the two coordinates.
  columns: [usize; 3],
  column_count: usize,
}

impl PositionReader<BufReader<File>> {
  pub fn open(path: &Path) -> Result<PositionReader<BufReader<File>>> {
    let file = File::open(path)
      .context(format!("Failed to open position table {}", path.display()))?;
    PositionReader::new(BufReader::new(file), path)
  }
}

impl<R: BufRead> PositionReader<R> {
  // `path` is only used in error messages.
  pub fn new(reader: R, path: &Path) -> Result<PositionReader<R>> {
    let mut reader = PositionReader {
      reader,
      path: path.to_path_buf(),
      line: String::new(),
      line_number: 0,
      columns: [0; 3],
      column_count: 0,
    };
    if !reader.read_line()? {
      return Err(reader.malformed("missing header").into());
    }
    let header = split_line(reader.line.trim_end_matches(&['\r', '\n'][..]));
    let mut columns = [0; 3];
    for (column, name) in columns.iter_mut().zip([FRAME, CENTER_X, CENTER_Y]) {
      *column = header.iter().position(|h| h == name)
        .ok_or_else(|| reader.malformed(&format!("no {} column", name)))?;
    }
    reader.columns = columns;
    reader.column_count = header.len();
    Ok(reader)
  }

  // End of data is signaled by `Ok(None)`. Blank lines are skipped.
  pub fn next(&mut self) -> Result<Option<PositionSample>> {
    loop {
      if !self.read_line()? {
        return Ok(None);
      }
      let line = self.line.trim_end_matches(&['\r', '\n'][..]);
      if line.is_empty() { continue }
      let cells = split_line(line);
      if cells.len() != self.column_count {
        let message = format!("expected {} cells, found {}", self.column_count, cells.len());
        return Err(self.malformed(&message).into());
      }
      let [frame, x, y] = self.columns;
      let center = match (cells[x].as_str(), cells[y].as_str()) {
        (FAILED, FAILED) => None,
        (x, y) => Some(Pixel::new(self.coordinate(x)?, self.coordinate(y)?)),
      };
      return Ok(Some(PositionSample { frame: cells[frame].clone(), center }));
    }
  }

  fn read_line(&mut self) -> Result<bool> {
    self.line.clear();
    let n = self.reader.read_line(&mut self.line)
      .context(format!("Failed to read {}", self.path.display()))?;
    self.line_number += 1;
    Ok(n > 0)
  }

  fn coordinate(&self, cell: &str) -> Result<i32> {
    cell.trim().parse::<i32>()
      .map_err(|_| self.malformed(&format!("bad coordinate `{}`", cell)).into())
  }

  fn malformed(&self, message: &str) -> Error {
    Error::MalformedTable {
      path: self.path.clone(),
      line: self.line_number,
      message: message.to_string(),
    }
  }
}

pub fn read_positions(path: &Path) -> Result<Vec<PositionSample>> {
  let mut reader = PositionReader::open(path)?;
  let mut samples = vec![];
  while let Some(sample) = reader.next()? {
    samples.push(sample);
  }
  debug!("Read {} positions from {}.", samples.len(), path.display());
  Ok(samples)
}

// No header. Shorter rows are padded with empty cells to the longest one.
pub fn write_scaling_factors<W: Write>(writer: &mut W, table: &ScalingTable) -> Result<()> {
  let width = table.values().map(|factors| factors.len()).max().unwrap_or(0);
  for (name, factors) in table {
    write!(writer, "{}", quote(name))?;
    for i in 0..width {
      match factors.get(i) {
        Some(f) => write!(writer, ",{:e}", f)?,
        None => write!(writer, ",")?,
      }
    }
    writeln!(writer)?;
  }
  Ok(())
}

pub fn save_scaling_factors(path: &Path, table: &ScalingTable) -> Result<()> {
  let mut writer = create(path)?;
  write_scaling_factors(&mut writer, table)
    .context(format!("Failed to write scaling factors to {}", path.display()))?;
  writer.flush()?;
  info!("Saved scaling factors of {} images to {}.", table.len(), path.display());
  Ok(())
}

pub fn write_msd<W: Write>(writer: &mut W, series: &MsdSeries) -> Result<()> {
  writeln!(writer, "MSD_X,MSD_Y")?;
  for (x, y) in series.x.iter().zip(&series.y) {
    writeln!(writer, "{},{}", x, y)?;
  }
  Ok(())
}

pub fn save_msd(path: &Path, series: &MsdSeries) -> Result<()> {
  let mut writer = create(path)?;
  write_msd(&mut writer, series)
    .context(format!("Failed to write MSD to {}", path.display()))?;
  writer.flush()?;
  info!("Saved MSD of {} lags to {}.", series.len(), path.display());
  Ok(())
}

fn create(path: &Path) -> Result<BufWriter<File>> {
  let file = File::create(path)
    .context(format!("Failed to create {}", path.display()))?;
  Ok(BufWriter::new(file))
}

fn quote(cell: &str) -> String {
  if cell.contains(&[',', '"', '\n'][..]) {
    format!("\"{}\"", cell.replace('"', "\"\""))
  }
  else {
    cell.to_string()
  }
}

// Splits one line into cells, honoring double-quoted cells.
fn split_line(line: &str) -> Vec<String> {
  let mut cells = vec![];
  let mut cell = String::new();
  let mut quoted = false;
  let mut chars = line.chars().peekable();
  while let Some(c) = chars.next() {
    match c {
      '"' if quoted && chars.peek() == Some(&'"') => {
        cell.push('"');
        chars.next();
      },
      '"' => quoted = !quoted,
      ',' if !quoted => cells.push(std::mem::take(&mut cell)),
      _ => cell.push(c),
    }
  }
  cells.push(cell);
  cells
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample(frame: &str, center: Option<(i32, i32)>) -> PositionSample {
    PositionSample {
      frame: frame.to_string(),
      center: center.map(|(x, y)| Pixel::new(x, y)),
    }
  }

  fn read(text: &str) -> Result<Vec<PositionSample>> {
    let mut reader = PositionReader::new(text.as_bytes(), Path::new("positions.csv"))?;
    let mut samples = vec![];
    while let Some(sample) = reader.next()? {
      samples.push(sample);
    }
    Ok(samples)
  }

  #[test]
  fn test_positions_round_trip() {
    let samples = vec![
      sample("frame_001.png", Some((120, 85))),
      sample("frame_002.png", None),
      sample("frame, \"odd\".png", Some((-3, 0))),
    ];
    let mut buffer = vec![];
    write_positions(&mut buffer, &samples).unwrap();
    let text = String::from_utf8(buffer).unwrap();
    assert!(text.starts_with("Frame,Center_X,Center_Y\nframe_001.png,120,85\nframe_002.png,Failed,Failed\n"));
    assert_eq!(read(&text).unwrap(), samples);
  }

  #[test]
  fn test_read_positions_columns() {
    let text = "Center_Y,Frame,Center_X\r\n4,a.png,3\r\n\r\nFailed,b.png,Failed\r\n";
    assert_eq!(read(text).unwrap(), vec![sample("a.png", Some((3, 4))), sample("b.png", None)]);
  }

  #[test]
  fn test_malformed_positions() {
    let err = read("").unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::MalformedTable { line: 1, .. })));
    let err = read("Frame,X,Y\n").unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::MalformedTable { .. })));
    let err = read("Frame,Center_X,Center_Y\na,1,2\nb,x,2\n").unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::MalformedTable { line: 3, .. })));
    let err = read("Frame,Center_X,Center_Y\na,1\n").unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::MalformedTable { line: 2, .. })));
  }

  #[test]
  fn test_scaling_factor_rows() {
    let mut table = ScalingTable::new();
    table.insert("y_1.png".to_string(), vec![1e-7]);
    table.insert("x_1.png".to_string(), vec![1e-7, 2.5e-8]);
    table.insert("x_2.png".to_string(), vec![]);
    let mut buffer = vec![];
    write_scaling_factors(&mut buffer, &table).unwrap();
    assert_eq!(String::from_utf8(buffer).unwrap(), "x_1.png,1e-7,2.5e-8\nx_2.png,,\ny_1.png,1e-7,\n");
  }

  #[test]
  fn test_msd_table() {
    let series = MsdSeries { x: vec![0., 2.5], y: vec![0., 9.] };
    let mut buffer = vec![];
    write_msd(&mut buffer, &series).unwrap();
    assert_eq!(String::from_utf8(buffer).unwrap(), "MSD_X,MSD_Y\n0,0\n2.5,9\n");
  }

  #[test]
  fn test_files() {
    let dir = std::env::temp_dir().join(format!("tweezer_track_table_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("positions.csv");
    let samples = vec![sample("a.png", Some((1, 2))), sample("b.png", None)];
    save_positions(&path, &samples).unwrap();
    assert_eq!(read_positions(&path).unwrap(), samples);
    assert!(read_positions(&dir.join("missing.csv")).is_err());
    std::fs::remove_dir_all(&dir).unwrap();
  }
}
