//! Relocatable deployment.
//!
//! A deployed install carries a root-remapping `run` entry point and wrapper
//! scripts for everything executable under the hidden `.bin`/`.sbin`
//! directories, letting output built against the canonical root run from
//! wherever the install actually lives.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::Result;
use crate::consts::{WHACK_ROOT, WHACK_RUN};
use crate::files::{copy_recursive, is_executable, make_executable};

/// Maximum symlink hops when resolving hidden directories.
const MAX_LINK_DEPTH: usize = 32;

pub struct Deployer;

impl Deployer {
  pub fn new() -> Self {
    Self
  }

  /// Deploy `package_dir`: into `target_dir` when given (copying first,
  /// never moving), otherwise in place. Returns the deployed root.
  ///
  /// Idempotent at the file level: re-running refreshes `run` and adds any
  /// missing wrappers; existing `bin`/`sbin` entries are never overwritten.
  pub fn deploy(&self, package_dir: &Path, target_dir: Option<&Path>) -> Result<PathBuf> {
    let root = match target_dir {
      Some(target) => {
        info!(from = ?package_dir, to = ?target, "copying package");
        copy_recursive(package_dir, target)?;
        target.to_path_buf()
      }
      None => package_dir.to_path_buf(),
    };
    let root = root.canonicalize()?;

    self.write_run_script(&root)?;
    for dir_name in ["bin", "sbin"] {
      self.write_wrappers(&root, dir_name)?;
    }
    Ok(root)
  }

  /// Write the `run` entry point.
  ///
  /// When the install already resolves at the canonical root the command is
  /// executed directly; otherwise `sbin`/`bin` are prepended to PATH and the
  /// command re-execs through the helper that mounts the install root at
  /// the canonical path for that one child process.
  fn write_run_script(&self, root: &Path) -> Result<()> {
    let run_path = root.join("run");
    let script = format!(
      r#"#!/bin/sh
set -e
ROOT=$(cd "$(dirname "$0")" && pwd)
if [ "$ROOT" = "{WHACK_ROOT}" ]; then
  exec "$@"
else
  PATH="$ROOT/sbin:$ROOT/bin:$PATH"
  export PATH
  exec {WHACK_RUN} "$ROOT" "$@"
fi
"#
    );
    fs::write(&run_path, script)?;
    make_executable(&run_path)?;
    debug!(path = ?run_path, "wrote run entry point");
    Ok(())
  }

  /// Generate wrappers in `<root>/bin` for every executable entry of
  /// `<root>/.bin` not already present (likewise for `sbin`).
  fn write_wrappers(&self, root: &Path, dir_name: &str) -> Result<()> {
    let Some(hidden) = resolve_within(root, &format!(".{dir_name}")) else {
      return Ok(());
    };
    if !hidden.is_dir() {
      return Ok(());
    }

    let visible = root.join(dir_name);
    fs::create_dir_all(&visible)?;

    for entry in fs::read_dir(&hidden)? {
      let entry = entry?;
      let Some(resolved) = resolve_links(root, entry.path()) else {
        continue;
      };
      if !is_executable(&resolved) {
        continue;
      }
      let name = entry.file_name();
      let wrapper = visible.join(&name);
      if wrapper.exists() {
        continue;
      }
      let script = format!(
        "#!/bin/sh\nexec \"{root}/run\" \"{root}/.{dir_name}/{name}\" \"$@\"\n",
        root = root.display(),
        name = name.to_string_lossy(),
      );
      fs::write(&wrapper, script)?;
      make_executable(&wrapper)?;
      debug!(wrapper = ?wrapper, "wrote wrapper");
    }
    Ok(())
  }
}

impl Default for Deployer {
  fn default() -> Self {
    Self::new()
  }
}

/// Resolve `rel` under `root` through symlinks, treating absolute link
/// targets under the canonical root as install-relative. Broken links
/// resolve to nothing.
fn resolve_within(root: &Path, rel: &str) -> Option<PathBuf> {
  resolve_links(root, root.join(rel))
}

fn resolve_links(root: &Path, start: PathBuf) -> Option<PathBuf> {
  let mut path = start;
  for _ in 0..MAX_LINK_DEPTH {
    let metadata = fs::symlink_metadata(&path).ok()?;
    if !metadata.file_type().is_symlink() {
      return Some(path);
    }
    let target = fs::read_link(&path).ok()?;
    path = if let Ok(suffix) = target.strip_prefix(WHACK_ROOT) {
      root.join(suffix)
    } else if target.is_absolute() {
      target
    } else {
      path.parent()?.join(target)
    };
  }
  None
}
