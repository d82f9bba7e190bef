//! Crate-wide constants.

/// Canonical absolute path a package's build output assumes it is installed
/// at, reconciled with the real install location at run time.
pub const WHACK_ROOT: &str = "/usr/local/whack";

/// Name of the helper binary that exposes an install directory at
/// [`WHACK_ROOT`] for one child process.
pub const WHACK_RUN: &str = "whack-run";

/// Relative path of the build script within a materialized source.
pub const BUILD_SCRIPT: &str = "whack/build";

/// Relative path of the downloads list within a materialized source.
pub const DOWNLOADS_FILE: &str = "whack/downloads";

/// Relative path of the source manifest within a materialized source.
pub const MANIFEST_FILE: &str = "whack/whack.json";

/// Sidecar written next to built package contents.
pub const PACKAGE_METADATA_FILE: &str = ".whack-package.json";

/// Filename suffix of source tarballs.
pub const SOURCE_SUFFIX: &str = ".whack-source";

/// Filename suffix of prebuilt package artifacts.
pub const PACKAGE_SUFFIX: &str = ".whack-package";
