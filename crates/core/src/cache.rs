//! Package cache capability.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::Result;
use crate::files::copy_recursive;

/// Capability the provisioning pipeline uses to remember built packages.
pub trait Cacher {
  /// Populate `dest` from the cache; returns whether the key was present.
  fn fetch(&self, key: &str, dest: &Path) -> Result<bool>;

  /// Store a copy of `src` under `key`.
  fn put(&self, key: &str, src: &Path) -> Result<()>;
}

/// Directory-per-key cache on local disk.
///
/// Writes stage into a temp sibling and `rename` into place. There is no
/// locking: concurrent writers of the same key race, the first rename wins
/// and later writers discard their staging copy (last-writer-wins at the
/// level of whole keys, never partially-written entries).
pub struct DirCacher {
  root: PathBuf,
}

impl DirCacher {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  fn key_path(&self, key: &str) -> PathBuf {
    self.root.join(key)
  }
}

impl Cacher for DirCacher {
  fn fetch(&self, key: &str, dest: &Path) -> Result<bool> {
    let cached = self.key_path(key);
    if !cached.is_dir() {
      return Ok(false);
    }
    debug!(key = %key, "package cache hit");
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(&cached)? {
      let entry = entry?;
      copy_recursive(&entry.path(), &dest.join(entry.file_name()))?;
    }
    Ok(true)
  }

  fn put(&self, key: &str, src: &Path) -> Result<()> {
    fs::create_dir_all(&self.root)?;
    let staging = tempfile::tempdir_in(&self.root)?;
    let staged = staging.path().join("contents");
    copy_recursive(src, &staged)?;

    let target = self.key_path(key);
    match fs::rename(&staged, &target) {
      Ok(()) => {
        info!(key = %key, "package cached");
        Ok(())
      }
      Err(_) if target.is_dir() => {
        debug!(key = %key, "key already cached by another writer");
        Ok(())
      }
      Err(error) => Err(error.into()),
    }
  }
}
