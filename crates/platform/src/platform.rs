//! Platform detection and ABI compatibility

use std::fmt;
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PlatformError;

/// Normalized host fingerprint: operating system, CPU architecture and C
/// library version.
///
/// Every token is lowercased with spaces and underscores folded to hyphens,
/// so a fingerprint joins into (and splits back out of) an
/// underscore-separated slug without ambiguity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
  pub os_name: String,
  pub architecture: String,
  pub libc: String,
}

impl Platform {
  /// Create a fingerprint from raw tokens, normalizing each one.
  pub fn new(os_name: &str, architecture: &str, libc: &str) -> Self {
    Self {
      os_name: normalize(os_name),
      architecture: normalize(architecture),
      libc: normalize(libc),
    }
  }

  /// Detect the fingerprint of the running host.
  ///
  /// Reads `uname --kernel-name`, `uname --machine` and
  /// `getconf GNU_LIBC_VERSION`. Host-command failures propagate.
  pub fn detect() -> Result<Self, PlatformError> {
    let os_name = host_command("uname", &["--kernel-name"])?;
    let architecture = host_command("uname", &["--machine"])?;
    let libc = host_command("getconf", &["GNU_LIBC_VERSION"])?;

    let platform = Self::new(&os_name, &architecture, &libc);
    debug!(fingerprint = %platform, "detected host platform");
    Ok(platform)
  }

  /// Render the fingerprint as an underscore-joined 3-token slug.
  ///
  /// This is the form embedded in package names and in the trailing tokens
  /// of `.whack-package` artifact filenames.
  pub fn dumps(&self) -> String {
    format!("{}_{}_{}", self.os_name, self.architecture, self.libc)
  }

  /// Rebuild a fingerprint from the 3 tokens of [`Platform::dumps`].
  ///
  /// Returns `None` unless exactly three tokens are given.
  pub fn load_list(tokens: &[&str]) -> Option<Self> {
    match tokens {
      [os_name, architecture, libc] => Some(Self::new(os_name, architecture, libc)),
      _ => None,
    }
  }

  /// Can a host with this fingerprint run a package built on `other`?
  ///
  /// OS and architecture must match exactly. The libc must match exactly
  /// too, unless both sides are `glibc-MAJOR.MINOR[.PATCH]` with the same
  /// MAJOR, in which case a newer runtime satisfies an older build
  /// requirement: `self`'s (MINOR, PATCH) must be at least `other`'s.
  pub fn can_use(&self, other: &Platform) -> bool {
    if self.os_name != other.os_name || self.architecture != other.architecture {
      return false;
    }
    if self.libc == other.libc {
      return true;
    }
    match (parse_glibc(&self.libc), parse_glibc(&other.libc)) {
      (Some((major, minor, patch)), Some((other_major, other_minor, other_patch))) => {
        major == other_major && (minor, patch) >= (other_minor, other_patch)
      }
      // Unknown libc strings require exact equality, handled above.
      _ => false,
    }
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.dumps())
  }
}

fn normalize(token: &str) -> String {
  token.trim().to_lowercase().replace([' ', '_'], "-")
}

/// Parse `glibc-MAJOR.MINOR[.PATCH]` into version numbers, PATCH defaulting
/// to zero.
fn parse_glibc(libc: &str) -> Option<(u32, u32, u32)> {
  let version = libc.strip_prefix("glibc-")?;
  let mut parts = version.split('.');
  let major = parts.next()?.parse().ok()?;
  let minor = parts.next()?.parse().ok()?;
  let patch = match parts.next() {
    Some(part) => part.parse().ok()?,
    None => 0,
  };
  if parts.next().is_some() {
    return None;
  }
  Some((major, minor, patch))
}

fn host_command(program: &str, args: &[&str]) -> Result<String, PlatformError> {
  let output = Command::new(program)
    .args(args)
    .output()
    .map_err(|source| PlatformError::HostCommand {
      command: program.to_string(),
      source,
    })?;

  if !output.status.success() {
    return Err(PlatformError::HostCommandFailed {
      command: program.to_string(),
      code: output.status.code(),
    });
  }

  Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
