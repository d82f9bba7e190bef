//! Recursive filesystem helpers shared by the cacher, sources and deployer.

use std::fs;
use std::path::Path;

use crate::Result;

/// Recursively copy `src` (file or directory) to `dest`, preserving
/// symlinks and file modes.
pub fn copy_recursive(src: &Path, dest: &Path) -> Result<()> {
  let file_type = fs::symlink_metadata(src)?.file_type();

  if file_type.is_symlink() {
    let target = fs::read_link(src)?;
    #[cfg(unix)]
    std::os::unix::fs::symlink(&target, dest)?;
    #[cfg(not(unix))]
    {
      let _ = target;
      fs::copy(src, dest)?;
    }
  } else if file_type.is_dir() {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
      let entry = entry?;
      copy_recursive(&entry.path(), &dest.join(entry.file_name()))?;
    }
  } else {
    if let Some(parent) = dest.parent() {
      fs::create_dir_all(parent)?;
    }
    fs::copy(src, dest)?;
  }

  Ok(())
}

/// True when `path` resolves to a non-directory with an execute bit set.
pub fn is_executable(path: &Path) -> bool {
  let Ok(metadata) = fs::metadata(path) else {
    return false;
  };
  if metadata.is_dir() {
    return false;
  }
  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
  }
  #[cfg(not(unix))]
  true
}

/// Mark a file executable.
pub fn make_executable(path: &Path) -> Result<()> {
  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
  }
  #[cfg(not(unix))]
  let _ = path;
  Ok(())
}
