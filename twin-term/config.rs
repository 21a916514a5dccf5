use std::{
  fs,
  path::{
    Path,
    PathBuf,
  },
  time::Duration,
};

use anyhow::{
  Context,
  Result,
};
use etcetera::base_strategy::{
  BaseStrategy,
  choose_base_strategy,
};
use serde::Deserialize;
use twin_sync::SyncConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  pub sync:      SyncSection,
  pub converter: ConverterSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct SyncSection {
  pub debounce_ms: u64,
  pub scroll_sync: bool,
  pub width:       Option<u32>,
}

impl Default for SyncSection {
  fn default() -> Self {
    Self {
      debounce_ms: 300,
      scroll_sync: true,
      width:       None,
    }
  }
}

/// An external converter process speaking framed JSON on stdio. Without a
/// command the built-in flat converter is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConverterSection {
  pub command: Option<String>,
  pub args:    Vec<String>,
}

impl Config {
  /// Load `path`, or the default config file when it exists, or defaults.
  pub fn load(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(path) => path.to_path_buf(),
      None => {
        let path = default_config_file()?;
        if !path.exists() {
          log::debug!("no config file at {}, using defaults", path.display());
          return Ok(Self::default());
        }
        path
      },
    };

    let text = fs::read_to_string(&path)
      .with_context(|| format!("failed to read config file {}", path.display()))?;
    Self::parse(&text).with_context(|| format!("invalid config file {}", path.display()))
  }

  pub fn parse(text: &str) -> Result<Self> {
    Ok(toml::from_str(text)?)
  }

  pub fn sync_config(&self) -> SyncConfig {
    SyncConfig {
      debounce:    Duration::from_millis(self.sync.debounce_ms),
      width:       self.sync.width,
      scroll_sync: self.sync.scroll_sync,
    }
  }
}

pub fn config_dir() -> Result<PathBuf> {
  if let Ok(dir) = std::env::var("TWIN_CONFIG_DIR") {
    return Ok(PathBuf::from(dir));
  }
  let strategy = choose_base_strategy().context("unable to find the config directory")?;
  Ok(strategy.config_dir().join("twin"))
}

pub fn cache_dir() -> Result<PathBuf> {
  if let Ok(dir) = std::env::var("TWIN_CACHE_DIR") {
    return Ok(PathBuf::from(dir));
  }
  let strategy = choose_base_strategy().context("unable to find the cache directory")?;
  Ok(strategy.cache_dir().join("twin"))
}

pub fn default_config_file() -> Result<PathBuf> {
  Ok(config_dir()?.join("config.toml"))
}

pub fn default_log_file() -> Result<PathBuf> {
  Ok(cache_dir()?.join("twin.log"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_config_uses_defaults() {
    let config = Config::parse("").unwrap();
    assert_eq!(config, Config::default());

    let sync = config.sync_config();
    assert_eq!(sync.debounce, Duration::from_millis(300));
    assert!(sync.scroll_sync);
    assert_eq!(sync.width, None);
    assert_eq!(config.converter.command, None);
  }

  #[test]
  fn sections_are_read() {
    let config = Config::parse(
      r#"
        [sync]
        debounce-ms = 50
        scroll-sync = false
        width = 72

        [converter]
        command = "twin"
        args = ["worker"]
      "#,
    )
    .unwrap();

    assert_eq!(config.sync, SyncSection {
      debounce_ms: 50,
      scroll_sync: false,
      width:       Some(72),
    });
    assert_eq!(config.converter.command.as_deref(), Some("twin"));
    assert_eq!(config.converter.args, vec!["worker".to_string()]);
  }

  #[test]
  fn unknown_keys_are_rejected() {
    assert!(Config::parse("[sync]\ndebounce = 10\n").is_err());
    assert!(Config::parse("[render]\n").is_err());
  }

  #[test]
  fn explicit_file_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("twin.toml");
    fs::write(&path, "[sync]\nwidth = 40\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.sync.width, Some(40));
    assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
  }
}
