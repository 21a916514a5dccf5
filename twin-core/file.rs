//! File import/export helpers for filesystem hosts.

use std::{
  fs,
  io,
  path::{
    Path,
    PathBuf,
  },
};

use thiserror::Error;

use crate::{
  error::ParseError,
  pane::PaneId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
  Json,
  Yaml,
  Unknown,
}

impl FileKind {
  /// The pane a file of this kind is loaded into.
  pub const fn pane(self) -> Option<PaneId> {
    match self {
      Self::Json => Some(PaneId::A),
      Self::Yaml => Some(PaneId::B),
      Self::Unknown => None,
    }
  }

  pub const fn for_pane(pane: PaneId) -> Self {
    match pane {
      PaneId::A => Self::Json,
      PaneId::B => Self::Yaml,
    }
  }

  pub const fn extension(self) -> &'static str {
    match self {
      Self::Json => "jsonc",
      Self::Yaml => "yaml",
      Self::Unknown => "txt",
    }
  }
}

/// Classify a file by its extension, case-insensitively.
pub fn classify_file_type(filename: &str) -> FileKind {
  let extension = Path::new(filename)
    .extension()
    .and_then(|ext| ext.to_str())
    .map(str::to_ascii_lowercase);

  match extension.as_deref() {
    Some("json" | "jsonc" | "json5") => FileKind::Json,
    Some("yaml" | "yml") => FileKind::Yaml,
    _ => FileKind::Unknown,
  }
}

/// Name for an exported document: `base` with its extension replaced.
///
/// Directory components of `base` are dropped; an empty stem becomes
/// `untitled`.
pub fn generate_filename(base: &str, extension: &str) -> String {
  let stem = Path::new(base)
    .file_stem()
    .and_then(|stem| stem.to_str())
    .map(str::trim)
    .filter(|stem| !stem.is_empty())
    .unwrap_or("untitled");
  let extension = extension.trim_start_matches('.');
  if extension.is_empty() {
    stem.to_string()
  } else {
    format!("{stem}.{extension}")
  }
}

#[derive(Debug, Error)]
pub enum FileError {
  #[error("failed to read {}: {source}", path.display())]
  Read {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },
  #[error("{} is not valid UTF-8", path.display())]
  InvalidUtf8 { path: PathBuf },
  #[error("failed to write {}: {source}", path.display())]
  Write {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },
}

impl From<FileError> for ParseError {
  fn from(err: FileError) -> Self {
    ParseError::runtime(err.to_string())
  }
}

pub fn read_as_text(path: &Path) -> Result<String, FileError> {
  let bytes = fs::read(path).map_err(|source| {
    FileError::Read {
      path: path.to_path_buf(),
      source,
    }
  })?;
  String::from_utf8(bytes).map_err(|_| {
    FileError::InvalidUtf8 {
      path: path.to_path_buf(),
    }
  })
}

/// Write `text` to `path`, replacing any previous content.
pub fn export(text: &str, path: &Path) -> Result<(), FileError> {
  tracing::debug!(path = %path.display(), bytes = text.len(), "exporting document");
  fs::write(path, text).map_err(|source| {
    FileError::Write {
      path: path.to_path_buf(),
      source,
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ErrorKind;

  #[test]
  fn classify_by_extension() {
    assert_eq!(classify_file_type("config.json"), FileKind::Json);
    assert_eq!(classify_file_type("settings.JSONC"), FileKind::Json);
    assert_eq!(classify_file_type("deploy.yml"), FileKind::Yaml);
    assert_eq!(classify_file_type("dir/deploy.yaml"), FileKind::Yaml);
    assert_eq!(classify_file_type("notes.txt"), FileKind::Unknown);
    assert_eq!(classify_file_type("Makefile"), FileKind::Unknown);
  }

  #[test]
  fn generated_names_replace_the_extension() {
    assert_eq!(generate_filename("config.json", "yaml"), "config.yaml");
    assert_eq!(generate_filename("a/b/deploy.yml", ".jsonc"), "deploy.jsonc");
    assert_eq!(generate_filename("", "yaml"), "untitled.yaml");
    assert_eq!(generate_filename("plain", ""), "plain");
  }

  #[test]
  fn export_then_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(generate_filename("doc", "yaml"));

    export("a: 1\n", &path).unwrap();
    assert_eq!(read_as_text(&path).unwrap(), "a: 1\n");
  }

  #[test]
  fn read_failures_become_runtime_errors() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_as_text(&dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(err, FileError::Read { .. }));

    let parse_error = ParseError::from(err);
    assert_eq!(parse_error.kind, ErrorKind::RuntimeError);
  }

  #[test]
  fn invalid_utf8_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
    assert!(matches!(
      read_as_text(&path),
      Err(FileError::InvalidUtf8 { .. })
    ));
  }
}
