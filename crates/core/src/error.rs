//! Error types for whack-core

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while provisioning packages.
///
/// The first five variants form the taxonomy the CLI reports as
/// `<Kind>: <message>`; everything else propagates as an uncaught failure.
#[derive(Debug, Error)]
pub enum WhackError {
  #[error("could not find package source: {0}")]
  PackageSourceNotFound(String),

  #[error("expected hash {expected}, got {actual}")]
  SourceHashMismatch { expected: String, actual: String },

  #[error("no such file: {}", .0.display())]
  FileNotFound(PathBuf),

  #[error("failed to download {url}: {message}")]
  Download { url: String, message: String },

  #[error("package is not available: {0}")]
  PackageNotAvailable(String),

  #[error("command '{command}' exited with status {code:?}")]
  CommandFailed { command: String, code: Option<i32> },

  #[error("failed to fetch '{url}' from source control: {message}")]
  Git { url: String, message: String },

  #[error("invalid manifest at '{}': {message}", .path.display())]
  Manifest { path: PathBuf, message: String },

  #[error("platform error: {0}")]
  Platform(#[from] whack_platform::PlatformError),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

impl WhackError {
  /// Taxonomy name for errors the CLI catches and prints; `None` for
  /// everything that should propagate uncaught.
  pub fn kind(&self) -> Option<&'static str> {
    match self {
      WhackError::PackageSourceNotFound(_) => Some("PackageSourceNotFound"),
      WhackError::SourceHashMismatch { .. } => Some("SourceHashMismatch"),
      WhackError::FileNotFound(_) => Some("FileNotFoundError"),
      WhackError::Download { .. } => Some("DownloadError"),
      WhackError::PackageNotAvailable(_) => Some("PackageNotAvailableError"),
      _ => None,
    }
  }
}
