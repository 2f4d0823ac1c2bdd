use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to read {path}: {message}")]
pub struct FileReadError {
  pub path: PathBuf,
  pub message: String,
}

/// Fallible access to text configuration.
pub trait ConfigSource {
  /// Read `path` as UTF-8 text with one trailing line terminator removed.
  fn read_text(&self, path: &Path) -> Result<String, FileReadError>;
}

/// Reads files from disk, resolving relative paths against `base`.
#[derive(Debug, Clone)]
pub struct FsConfigSource {
  base: PathBuf,
}

impl FsConfigSource {
  pub fn new(base: impl Into<PathBuf>) -> Self {
    Self { base: base.into() }
  }

  pub fn resolve(&self, path: &Path) -> PathBuf {
    if path.is_absolute() {
      path.to_path_buf()
    } else {
      self.base.join(path)
    }
  }
}

impl ConfigSource for FsConfigSource {
  fn read_text(&self, path: &Path) -> Result<String, FileReadError> {
    let full = self.resolve(path);
    let read_err = |message: String| FileReadError {
      path: full.clone(),
      message,
    };

    let bytes = std::fs::read(&full).map_err(|e| read_err(e.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|e| read_err(format!("not valid UTF-8: {}", e)))?;
    debug!(path = %full.display(), len = text.len(), "read config value");
    Ok(strip_line_terminator(&text).to_string())
  }
}

/// In-memory files, for evaluating flakes without touching disk.
impl ConfigSource for BTreeMap<PathBuf, String> {
  fn read_text(&self, path: &Path) -> Result<String, FileReadError> {
    self
      .get(path)
      .map(|text| strip_line_terminator(text).to_string())
      .ok_or_else(|| FileReadError {
        path: path.to_path_buf(),
        message: "no such file".to_string(),
      })
  }
}

/// Remove exactly one trailing `\n` or `\r\n`.
///
/// Editors add a final newline to single-line files; other whitespace is
/// part of the value.
pub fn strip_line_terminator(text: &str) -> &str {
  text
    .strip_suffix("\r\n")
    .or_else(|| text.strip_suffix('\n'))
    .unwrap_or(text)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn reads_value_without_newline() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("proton_path.txt"), "/opt/example/path").unwrap();

    let source = FsConfigSource::new(temp.path());
    let value = source.read_text(Path::new("proton_path.txt")).unwrap();
    assert_eq!(value, "/opt/example/path");
  }

  #[test]
  fn strips_single_trailing_newline() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("unix.txt"), "/opt/example/path\n").unwrap();
    std::fs::write(temp.path().join("dos.txt"), "/opt/example/path\r\n").unwrap();

    let source = FsConfigSource::new(temp.path());
    assert_eq!(source.read_text(Path::new("unix.txt")).unwrap(), "/opt/example/path");
    assert_eq!(source.read_text(Path::new("dos.txt")).unwrap(), "/opt/example/path");
  }

  #[test]
  fn keeps_other_whitespace() {
    assert_eq!(strip_line_terminator("  /opt/x \n\n"), "  /opt/x \n");
    assert_eq!(strip_line_terminator("\t/opt/x"), "\t/opt/x");
    assert_eq!(strip_line_terminator(""), "");
  }

  #[test]
  fn missing_file_reports_path() {
    let temp = TempDir::new().unwrap();
    let source = FsConfigSource::new(temp.path());

    let err = source.read_text(Path::new("missing.txt")).unwrap_err();
    assert_eq!(err.path, temp.path().join("missing.txt"));
  }

  #[test]
  fn invalid_utf8_is_a_read_error() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("bad.txt"), [0xff, 0xfe, 0x00]).unwrap();

    let source = FsConfigSource::new(temp.path());
    let err = source.read_text(Path::new("bad.txt")).unwrap_err();
    assert!(err.message.contains("UTF-8"));
  }

  #[test]
  fn absolute_paths_ignore_base() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("abs.txt");
    std::fs::write(&file, "value").unwrap();

    let source = FsConfigSource::new("/nonexistent");
    assert_eq!(source.read_text(&file).unwrap(), "value");
  }

  #[test]
  fn in_memory_source() {
    let mut files = BTreeMap::new();
    files.insert(PathBuf::from("path.txt"), "/opt/example/path\n".to_string());
    assert_eq!(files.read_text(Path::new("path.txt")).unwrap(), "/opt/example/path");
    assert!(files.read_text(Path::new("other.txt")).is_err());
  }
}
