use std::{
  fs,
  path::Path,
};

use anyhow::{
  Context,
  Result,
};
use log::LevelFilter;

pub fn level_for(verbosity: u8) -> LevelFilter {
  match verbosity {
    0 => LevelFilter::Warn,
    1 => LevelFilter::Info,
    2 => LevelFilter::Debug,
    _ => LevelFilter::Trace,
  }
}

/// Send `log` records, and `tracing` events through its `log` feature, to
/// `log_file`.
pub fn setup_logging(verbosity: u8, log_file: &Path) -> Result<()> {
  if let Some(parent) = log_file.parent()
    && !parent.as_os_str().is_empty()
  {
    fs::create_dir_all(parent)
      .with_context(|| format!("failed to create log directory {}", parent.display()))?;
  }

  fern::Dispatch::new()
    .format(|out, message, record| {
      out.finish(format_args!(
        "{} {} [{}] {}",
        chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
        record.target(),
        record.level(),
        message
      ))
    })
    .level(level_for(verbosity))
    .chain(
      fern::log_file(log_file)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?,
    )
    .apply()
    .context("a logger is already installed")?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn verbosity_raises_the_level() {
    assert_eq!(level_for(0), LevelFilter::Warn);
    assert_eq!(level_for(1), LevelFilter::Info);
    assert_eq!(level_for(2), LevelFilter::Debug);
    assert_eq!(level_for(9), LevelFilter::Trace);
  }
}
