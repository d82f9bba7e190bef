//! Host platform fingerprinting for whack
//!
//! This crate provides the normalized `(os, architecture, libc)` triple that
//! package names and prebuilt-artifact filenames are keyed on, along with the
//! ABI-compatibility predicate used when matching index entries against the
//! requesting host.

mod error;
mod platform;

pub use error::PlatformError;
pub use platform::Platform;
