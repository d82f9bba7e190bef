//! Error types for whack-platform

use thiserror::Error;

/// Errors that can occur while fingerprinting the host
#[derive(Debug, Error)]
pub enum PlatformError {
  #[error("failed to run '{command}': {source}")]
  HostCommand {
    command: String,
    #[source]
    source: std::io::Error,
  },

  #[error("'{command}' exited with status {code:?}")]
  HostCommandFailed { command: String, code: Option<i32> },
}
