//! Tarball packing and unpacking.
//!
//! Source and package tarballs carry a single top-level directory; unpacking
//! strips it so the tree lands directly in the destination.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tar::Archive;
use tracing::debug;

use crate::Result;

/// Unpack a tarball into `dest`, stripping the single leading path
/// component of every entry.
///
/// `.tar` files are read as plain tar; everything else (`.tar.gz`, `.tgz`,
/// `.whack-source`, `.whack-package`) as gzipped tar.
pub fn unpack_tarball(archive_path: &Path, dest: &Path) -> Result<()> {
  std::fs::create_dir_all(dest)?;
  let file = File::open(archive_path)?;

  if archive_path.to_string_lossy().ends_with(".tar") {
    unpack_stripped(Archive::new(BufReader::new(file)), dest)?;
  } else {
    unpack_stripped(Archive::new(GzDecoder::new(BufReader::new(file))), dest)?;
  }

  debug!(archive = ?archive_path, dest = ?dest, "unpacked");
  Ok(())
}

fn unpack_stripped<R: Read>(mut archive: Archive<R>, dest: &Path) -> Result<()> {
  for entry in archive.entries()? {
    let mut entry = entry?;
    let path = entry.path()?;

    // Strip the first component (e.g. nginx_ab12cd34.whack-source/)
    let stripped: PathBuf = path.components().skip(1).collect();

    if stripped.as_os_str().is_empty() {
      continue;
    }

    let dest_path = dest.join(&stripped);

    if let Some(parent) = dest_path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    entry.unpack(&dest_path)?;
  }

  Ok(())
}

/// Pack `src_dir` into a gzipped tarball at `dest`, nesting everything under
/// a single `top_level` directory so unpacking strips back to the original
/// tree.
pub fn pack_tarball(src_dir: &Path, dest: &Path, top_level: &str) -> Result<()> {
  let file = File::create(dest)?;
  let encoder = GzEncoder::new(file, Compression::default());
  let mut builder = tar::Builder::new(encoder);
  builder.append_dir_all(top_level, src_dir)?;
  builder.into_inner()?.finish()?;
  debug!(src = ?src_dir, dest = ?dest, "packed");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::tempdir;

  #[test]
  fn pack_then_unpack_round_trips_and_strips() {
    let temp = tempdir().unwrap();
    let tree = temp.path().join("tree");
    fs::create_dir_all(tree.join("sub")).unwrap();
    fs::write(tree.join("top.txt"), "top").unwrap();
    fs::write(tree.join("sub/nested.txt"), "nested").unwrap();

    let archive = temp.path().join("tree.whack-source");
    pack_tarball(&tree, &archive, "tree_ab12").unwrap();

    let out = temp.path().join("out");
    unpack_tarball(&archive, &out).unwrap();

    assert_eq!(fs::read_to_string(out.join("top.txt")).unwrap(), "top");
    assert_eq!(fs::read_to_string(out.join("sub/nested.txt")).unwrap(), "nested");
    assert!(!out.join("tree_ab12").exists());
  }

  #[cfg(unix)]
  #[test]
  fn unpack_preserves_executable_bit() {
    use std::os::unix::fs::PermissionsExt;

    let temp = tempdir().unwrap();
    let tree = temp.path().join("tree");
    fs::create_dir_all(&tree).unwrap();
    let script = tree.join("build");
    fs::write(&script, "#!/bin/sh\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let archive = temp.path().join("tree.tar.gz");
    pack_tarball(&tree, &archive, "top").unwrap();

    let out = temp.path().join("out");
    unpack_tarball(&archive, &out).unwrap();

    let mode = fs::metadata(out.join("build")).unwrap().permissions().mode();
    assert_ne!(mode & 0o111, 0);
  }
}
