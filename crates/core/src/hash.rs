//! Content hashing for package identity.
//!
//! Package identity is built from SHA-1 digests rendered as short base-36
//! ids: the source hash covers the declared source trees, the params hash
//! covers the source hash plus the effective build parameters, and the
//! download cache keys on the hash of the URL alone.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha1::{Digest, Sha1};
use walkdir::WalkDir;

use crate::{Result, WhackError};

/// Number of base-36 characters kept in a rendered id.
const ID_LEN: usize = 16;

/// Streaming hasher whose digest is rendered as a short base-36 id.
pub struct Hasher {
  inner: Sha1,
}

impl Hasher {
  pub fn new() -> Self {
    Self { inner: Sha1::new() }
  }

  /// Feed raw bytes into the digest.
  pub fn update(&mut self, data: impl AsRef<[u8]>) {
    self.inner.update(data.as_ref());
  }

  /// Feed a file's contents into the digest.
  pub fn update_with_file(&mut self, path: &Path) -> Result<()> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 8192];
    loop {
      let bytes_read = file.read(&mut buffer)?;
      if bytes_read == 0 {
        break;
      }
      self.inner.update(&buffer[..bytes_read]);
    }
    Ok(())
  }

  /// Feed every file under `root` into the digest, in sorted relative-path
  /// order, hashing each relative path (prefixed with `prefix`) followed by
  /// the file's contents.
  ///
  /// Collecting and sorting the paths first makes the digest independent of
  /// the filesystem's traversal order: identical trees always hash
  /// identically.
  pub fn update_with_tree(&mut self, root: &Path, prefix: &str) -> Result<()> {
    let mut files: Vec<(String, std::path::PathBuf)> = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
      let entry = entry.map_err(|e| {
        WhackError::Io(e.into_io_error().unwrap_or_else(|| std::io::Error::other("walk error")))
      })?;
      if !entry.file_type().is_file() {
        continue;
      }
      let rel = entry
        .path()
        .strip_prefix(root)
        .unwrap_or(entry.path())
        .to_string_lossy()
        .to_string();
      files.push((format!("{}/{}", prefix, rel), entry.path().to_path_buf()));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));

    for (rel, path) in files {
      self.inner.update(rel.as_bytes());
      self.update_with_file(&path)?;
    }
    Ok(())
  }

  /// Finish the digest and render it as a short base-36 id.
  pub fn into_id(self) -> String {
    let digest = self.inner.finalize();
    let rendered = to_base36(digest.as_slice());
    rendered[..ID_LEN.min(rendered.len())].to_string()
  }
}

impl Default for Hasher {
  fn default() -> Self {
    Self::new()
  }
}

/// Hash arbitrary bytes into a short base-36 id.
pub fn id_of(data: &[u8]) -> String {
  let mut hasher = Hasher::new();
  hasher.update(data);
  hasher.into_id()
}

/// Render bytes, interpreted as a big-endian integer, in base 36.
fn to_base36(bytes: &[u8]) -> String {
  const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

  let mut digits = bytes.to_vec();
  let mut out = Vec::new();

  while digits.iter().any(|&digit| digit != 0) {
    let mut remainder = 0u32;
    for digit in digits.iter_mut() {
      let current = (remainder << 8) | u32::from(*digit);
      *digit = (current / 36) as u8;
      remainder = current % 36;
    }
    out.push(ALPHABET[remainder as usize]);
  }

  if out.is_empty() {
    out.push(b'0');
  }
  out.reverse();
  String::from_utf8(out).expect("base-36 alphabet is ASCII")
}
