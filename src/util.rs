use log::LevelFilter;

pub fn format_log(
  buf: &mut env_logger::fmt::Formatter,
  record: &log::Record,
) -> std::io::Result<()> {
  use std::io::Write;
  let mut style = buf.style();
  use env_logger::fmt::Color::*;
  use log::Level::*;
  style.set_color(match record.level() {
    Error => Red,
    Warn => Yellow,
    Info => Green,
    Debug => Magenta,
    Trace => Blue,
  });

  let location = format!("{}:{}",
    record.file().unwrap_or("?"),
    record.line().unwrap_or(0),
  );
  writeln!(buf, "{}", style.value(format!("{:5} {:30}{}", record.level(), location, record.args())))
}

// Info by default, `RUST_LOG` overrides.
pub fn init_logging() {
  env_logger::Builder::new()
    .filter_level(LevelFilter::Info)
    .parse_default_env()
    .format(format_log)
    .init();
}

// Sort key for frame files: plain lexicographic file-name order.
pub fn file_name(path: &std::path::Path) -> String {
  path.file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
