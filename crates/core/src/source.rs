//! Package sources: materialized build instructions plus their manifest.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::debug;

use crate::consts::MANIFEST_FILE;
use crate::files::copy_recursive;
use crate::hash::Hasher;
use crate::{Result, WhackError};

/// Typed `whack/whack.json` manifest, validated once at load time.
///
/// Every field is optional in the file; the defaults are part of the
/// contract: `name` "unknown", no param slug, source paths `["whack"]`, no
/// default params, no test command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceDescription {
  pub name: String,
  pub param_slug: Option<String>,
  pub source_paths: Vec<String>,
  pub default_params: BTreeMap<String, String>,
  #[serde(rename = "test")]
  pub test_command: Option<String>,
}

impl Default for SourceDescription {
  fn default() -> Self {
    Self {
      name: "unknown".to_string(),
      param_slug: None,
      source_paths: vec!["whack".to_string()],
      default_params: BTreeMap::new(),
      test_command: None,
    }
  }
}

impl SourceDescription {
  /// Load the manifest under a materialized source root, defaulting every
  /// field when the file is absent.
  pub fn load(source_root: &Path) -> Result<Self> {
    let path = source_root.join(MANIFEST_FILE);
    if !path.exists() {
      return Ok(Self::default());
    }
    let content = fs::read_to_string(&path)?;
    serde_json::from_str(&content).map_err(|e| WhackError::Manifest {
      path,
      message: e.to_string(),
    })
  }
}

/// A materialized package source.
///
/// `temp` owns the backing directory for sources fetched into scratch space,
/// which is deleted when the source is dropped; local directory sources
/// borrow the user's tree and are never deleted.
#[derive(Debug)]
pub struct PackageSource {
  uri: String,
  path: PathBuf,
  #[allow(dead_code)]
  temp: Option<TempDir>,
  description: SourceDescription,
}

impl PackageSource {
  /// Use a directory in place (not owned, not deleted).
  pub fn local(uri: &str, path: impl Into<PathBuf>) -> Result<Self> {
    let path = path.into();
    let description = SourceDescription::load(&path)?;
    debug!(uri = %uri, path = ?path, "opened local source");
    Ok(Self {
      uri: uri.to_string(),
      path,
      temp: None,
      description,
    })
  }

  /// Take ownership of a temporary materialization rooted at `path`.
  pub fn owned(uri: &str, path: PathBuf, temp: TempDir) -> Result<Self> {
    let description = SourceDescription::load(&path)?;
    debug!(uri = %uri, path = ?path, "materialized source");
    Ok(Self {
      uri: uri.to_string(),
      path,
      temp: Some(temp),
      description,
    })
  }

  pub fn uri(&self) -> &str {
    &self.uri
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn name(&self) -> &str {
    &self.description.name
  }

  pub fn description(&self) -> &SourceDescription {
    &self.description
  }

  /// Copy only the declared source paths into `target_dir`.
  pub fn write_to(&self, target_dir: &Path) -> Result<()> {
    for source_path in &self.description.source_paths {
      let src = self.path.join(source_path);
      if !src.exists() {
        return Err(WhackError::FileNotFound(src));
      }
      copy_recursive(&src, &target_dir.join(source_path))?;
    }
    Ok(())
  }

  /// Deterministic content hash over every declared source path: sorted
  /// relative paths plus file contents.
  pub fn source_hash(&self) -> Result<String> {
    let mut hasher = Hasher::new();
    for source_path in &self.description.source_paths {
      let root = self.path.join(source_path);
      if !root.exists() {
        return Err(WhackError::FileNotFound(root));
      }
      if root.is_dir() {
        hasher.update_with_tree(&root, source_path)?;
      } else {
        hasher.update(source_path.as_bytes());
        hasher.update_with_file(&root)?;
      }
    }
    Ok(hasher.into_id())
  }
}
