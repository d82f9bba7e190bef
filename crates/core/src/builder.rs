//! Building packages from source.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;
use tracing::{debug, info};

use crate::consts::{BUILD_SCRIPT, WHACK_ROOT, WHACK_RUN};
use crate::downloads::{DownloadCache, resolve_downloads};
use crate::request::PackageRequest;
use crate::{Result, WhackError};

/// Runs a source's build script in a fresh temp build dir, exposing the
/// in-progress install directory at the canonical root for the duration of
/// the build.
pub struct Builder {
  downloads: DownloadCache,
  whack_run: PathBuf,
}

impl Builder {
  pub fn new(downloads: DownloadCache, whack_run: PathBuf) -> Self {
    Self { downloads, whack_run }
  }

  /// Locate the helper binary: `$WHACK_RUN` override, a sibling of the
  /// current executable, then `$PATH` lookup by name.
  pub fn default_whack_run() -> PathBuf {
    if let Ok(path) = env::var("WHACK_RUN") {
      return PathBuf::from(path);
    }
    if let Ok(exe) = env::current_exe() {
      let sibling = exe.with_file_name(WHACK_RUN);
      if sibling.exists() {
        return sibling;
      }
    }
    PathBuf::from(WHACK_RUN)
  }

  /// Build the requested package into `package_dir`.
  ///
  /// The build script runs as `whack-run <package_dir> <script> WHACK_ROOT`
  /// with cwd = the build dir, under the uppercased parameter environment.
  /// A non-zero exit aborts the build; nothing is retried.
  pub fn build(&self, request: &PackageRequest, package_dir: &Path) -> Result<()> {
    let build_dir = TempDir::new()?;
    request.source().write_to(build_dir.path())?;

    let build_script = build_dir.path().join(BUILD_SCRIPT);
    if !build_script.exists() {
      return Err(WhackError::FileNotFound(build_script));
    }

    let env = param_env(&request.params());

    for download in resolve_downloads(build_dir.path(), &env)? {
      self
        .downloads
        .fetch(&download.url, &build_dir.path().join(&download.filename))?;
    }

    fs::create_dir_all(package_dir)?;
    let package_dir = package_dir.canonicalize()?;

    info!(
      name = %request.source().name(),
      package_dir = ?package_dir,
      "building package"
    );
    let status = Command::new(&self.whack_run)
      .arg(&package_dir)
      .arg(&build_script)
      .arg(WHACK_ROOT)
      .current_dir(build_dir.path())
      .envs(&env)
      .status()?;

    if !status.success() {
      return Err(WhackError::CommandFailed {
        command: build_script.display().to_string(),
        code: status.code(),
      });
    }

    request.metadata()?.write_to(&package_dir)?;
    debug!(package_dir = ?package_dir, "build complete");
    Ok(())
  }
}

/// Uppercase the parameter names into the build environment.
fn param_env(params: &BTreeMap<String, String>) -> BTreeMap<String, String> {
  params
    .iter()
    .map(|(key, value)| (key.to_uppercase(), value.clone()))
    .collect()
}
