//! Declared build downloads and the url-keyed download cache.
//!
//! A source may declare files to fetch before its build script runs, either
//! as a static `whack/downloads` list (`url [filename]` per line) or as an
//! executable producing that list on stdout.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::consts::DOWNLOADS_FILE;
use crate::hash;
use crate::http::HttpClient;
use crate::{Result, WhackError};

/// One `url [filename]` entry from a downloads list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
  pub url: String,
  pub filename: String,
}

impl Download {
  fn from_line(line: &str) -> Option<Self> {
    let mut parts = line.split_whitespace();
    let url = parts.next()?;
    let filename = parts
      .next()
      .map(str::to_string)
      .unwrap_or_else(|| url_basename(url));
    Some(Self {
      url: url.to_string(),
      filename,
    })
  }
}

/// Derive a local filename from the final path segment of a URL.
pub fn url_basename(url: &str) -> String {
  let tail = url.trim_end_matches('/').rsplit('/').next().unwrap_or(url);
  tail.split('?').next().unwrap_or(tail).to_string()
}

/// Parse a static downloads list: one `url [filename]` per line; blank lines
/// and `#` comments are skipped.
pub fn parse_downloads_list(content: &str) -> Vec<Download> {
  content
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty() && !line.starts_with('#'))
    .filter_map(Download::from_line)
    .collect()
}

/// Resolve the downloads declared by a materialized build tree.
///
/// A plain `whack/downloads` file is the list itself; a file starting with a
/// shebang is executed under the build parameter environment and its stdout
/// is the list. An absent file declares nothing.
pub fn resolve_downloads(build_dir: &Path, env: &BTreeMap<String, String>) -> Result<Vec<Download>> {
  let path = build_dir.join(DOWNLOADS_FILE);
  if !path.exists() {
    return Ok(Vec::new());
  }
  let content = fs::read_to_string(&path)?;

  if content.starts_with("#!") {
    debug!(path = ?path, "running downloads script");
    let output = Command::new(&path).current_dir(build_dir).envs(env).output()?;
    if !output.status.success() {
      return Err(WhackError::CommandFailed {
        command: path.display().to_string(),
        code: output.status.code(),
      });
    }
    return Ok(parse_downloads_list(&String::from_utf8_lossy(&output.stdout)));
  }

  Ok(parse_downloads_list(&content))
}

/// Download cache keyed by the hash of the URL alone, shared across builds
/// regardless of their parameters.
pub struct DownloadCache {
  root: PathBuf,
  http: HttpClient,
}

impl DownloadCache {
  pub fn new(root: impl Into<PathBuf>, http: HttpClient) -> Self {
    Self {
      root: root.into(),
      http,
    }
  }

  /// Fetch `url` through the cache and place a copy at `dest`.
  pub fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
    let cached = self.root.join(hash::id_of(url.as_bytes()));
    if cached.exists() {
      debug!(url = %url, "download cache hit");
    } else {
      fs::create_dir_all(&self.root)?;
      let staging = tempfile::NamedTempFile::new_in(&self.root)?;
      self.http.download(url, staging.path())?;
      // Last writer wins; concurrent fetches of one URL write the same bytes.
      staging.persist(&cached).map_err(|e| WhackError::Io(e.error))?;
      info!(url = %url, "download cached");
    }
    if let Some(parent) = dest.parent() {
      fs::create_dir_all(parent)?;
    }
    fs::copy(&cached, dest)?;
    Ok(())
  }
}
