use crate::all::*;

// A directory of image files. Lexicographic file-name order defines the frame
// order and which image is the first one.
pub struct FrameFolder {
  pub path: PathBuf,
  pub files: Vec<PathBuf>,
}

impl FrameFolder {
  pub fn open(path: &Path) -> Result<FrameFolder> {
    if !path.is_dir() {
      bail!(Error::NotADirectory(path.to_path_buf()));
    }
    let mut files = vec![];
    let entries = std::fs::read_dir(path)
      .context(format!("Failed to list {}", path.display()))?;
    for entry in entries {
      let entry = entry.context(format!("Failed to list {}", path.display()))?;
      let file_path = entry.path();
      if file_path.is_file() {
        files.push(file_path);
      }
    }
    if files.is_empty() {
      bail!(Error::NoFramesFound(path.to_path_buf()));
    }
    files.sort_by_key(|f| file_name(f));
    Ok(FrameFolder {
      path: path.to_path_buf(),
      files,
    })
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.files.iter().any(|path| file_name(path) == name)
  }

  // First of the named images that decodes, in folder order. Unlike
  // `first_frame`, unreadable files are passed over.
  pub fn first_named_frame(&self, names: &[String]) -> Option<RgbImage> {
    self.files.iter()
      .filter(|path| names.contains(&file_name(path)))
      .find_map(|path| load_frame(path).ok())
  }

  // There is no tracking without the first frame, so this one is fatal.
  pub fn first_frame(&self) -> Result<RgbImage> {
    let path = self.files.first()
      .ok_or_else(|| Error::NoFramesFound(self.path.clone()))?;
    load_frame(path)
  }

  pub fn frames(&self) -> impl Iterator<Item = (String, Result<RgbImage>)> + '_ {
    self.files.iter().map(|path| (file_name(path), load_frame(path)))
  }
}

pub fn load_frame(path: &Path) -> Result<RgbImage> {
  let image = image::open(path)
    .map_err(|source| Error::FrameLoad { path: path.to_path_buf(), source })?;
  Ok(image.to_rgb8())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tweezer_track_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
  }

  #[test]
  fn test_sorted_frames() {
    let dir = temp_dir("sorted");
    for (name, value) in [("frame_2.png", 20u8), ("frame_10.png", 100), ("frame_1.png", 10)] {
      RgbImage::from_pixel(4, 3, Rgb([value, 0, 0])).save(dir.join(name)).unwrap();
    }
    std::fs::create_dir(dir.join("subdir")).unwrap();
    let folder = FrameFolder::open(&dir).unwrap();
    let names: Vec<String> = folder.frames().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["frame_1.png", "frame_10.png", "frame_2.png"]);
    assert_eq!(folder.first_frame().unwrap().get_pixel(0, 0)[0], 10);
    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn test_folder_errors() {
    let dir = temp_dir("errors");
    let err = FrameFolder::open(&dir).err().unwrap();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NoFramesFound(p)) if p == &dir));

    let missing = dir.join("missing");
    let err = FrameFolder::open(&missing).err().unwrap();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NotADirectory(_))));

    std::fs::write(dir.join("a_broken.png"), b"not an image").unwrap();
    let folder = FrameFolder::open(&dir).unwrap();
    let err = folder.first_frame().unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::FrameLoad { .. })));
    assert!(format!("{}", err).contains("a_broken.png"));
    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn test_named_frames() {
    let dir = temp_dir("named");
    std::fs::write(dir.join("README.txt"), b"calibration images").unwrap();
    std::fs::write(dir.join("x_0.png"), b"not an image").unwrap();
    RgbImage::from_pixel(6, 4, Rgb([1, 0, 0])).save(dir.join("x_1.png")).unwrap();
    RgbImage::from_pixel(8, 5, Rgb([2, 0, 0])).save(dir.join("y_1.png")).unwrap();
    let folder = FrameFolder::open(&dir).unwrap();
    assert!(folder.first_frame().is_err());
    assert!(folder.contains("x_0.png"));
    assert!(!folder.contains("x_2.png"));

    let names = |list: &[&str]| list.iter().map(|n| n.to_string()).collect::<Vec<_>>();
    let frame = folder.first_named_frame(&names(&["y_1.png", "README.txt", "x_0.png"])).unwrap();
    assert_eq!(frame.dimensions(), (8, 5));
    let frame = folder.first_named_frame(&names(&["y_1.png", "x_1.png"])).unwrap();
    assert_eq!(frame.dimensions(), (6, 4));
    assert!(folder.first_named_frame(&names(&["x_2.png"])).is_none());
    std::fs::remove_dir_all(&dir).unwrap();
  }
}
