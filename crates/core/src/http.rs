//! Blocking HTTP client for index reads and artifact downloads.

use std::fs::{self, File};
use std::path::Path;

use tracing::info;

use crate::{Result, WhackError};

/// Explicitly-passed HTTP capability.
///
/// One client is constructed up front and handed to every component that
/// talks to the network; nothing reaches for a process-wide default.
///
/// No request timeout is configured: a transfer either completes or blocks.
#[derive(Debug, Clone)]
pub struct HttpClient {
  client: reqwest::blocking::Client,
}

impl HttpClient {
  pub fn new() -> Self {
    Self {
      client: reqwest::blocking::Client::new(),
    }
  }

  /// GET a URL and return the response body as text.
  pub fn get_text(&self, url: &str) -> Result<String> {
    let response = self.request(url)?;
    response.text().map_err(|e| download_error(url, e))
  }

  /// Stream a GET response into the file at `dest`.
  pub fn download(&self, url: &str, dest: &Path) -> Result<()> {
    info!(url = %url, dest = ?dest, "downloading");
    let mut response = self.request(url)?;
    if let Some(parent) = dest.parent() {
      fs::create_dir_all(parent)?;
    }
    let mut file = File::create(dest)?;
    response.copy_to(&mut file).map_err(|e| download_error(url, e))?;
    Ok(())
  }

  fn request(&self, url: &str) -> Result<reqwest::blocking::Response> {
    let response = self.client.get(url).send().map_err(|e| download_error(url, e))?;
    if !response.status().is_success() {
      return Err(WhackError::Download {
        url: url.to_string(),
        message: format!("HTTP {}", response.status()),
      });
    }
    Ok(response)
  }
}

impl Default for HttpClient {
  fn default() -> Self {
    Self::new()
  }
}

fn download_error(url: &str, error: reqwest::Error) -> WhackError {
  WhackError::Download {
    url: url.to_string(),
    message: error.to_string(),
  }
}
