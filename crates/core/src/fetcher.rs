//! Package-source resolution.
//!
//! An identifier can name a source several ways: a bare name looked up in a
//! configured index, a source-control URL, a tarball URL, or a local path.
//! The fetcher tries an explicit ordered chain of strategies and
//! materializes the first match; strategies that do not apply simply pass.

use std::path::Path;

use tempfile::TempDir;
use tracing::{debug, info};

use crate::archive::unpack_tarball;
use crate::consts::SOURCE_SUFFIX;
use crate::downloads::url_basename;
use crate::http::HttpClient;
use crate::index::Index;
use crate::source::PackageSource;
use crate::{Result, WhackError};

/// Resolves identifiers into materialized package sources.
pub struct PackageSourceFetcher {
  http: HttpClient,
  index_urls: Vec<String>,
}

impl PackageSourceFetcher {
  pub fn new(http: HttpClient, index_urls: Vec<String>) -> Self {
    Self { http, index_urls }
  }

  /// Materialize the source named by `identifier`.
  ///
  /// Identifiers whose basename ends `.whack-source` embed the expected
  /// source hash; the materialized tree must hash to the same value or the
  /// fetch fails (releasing the materialization) with a hash mismatch.
  pub fn fetch(&self, identifier: &str) -> Result<PackageSource> {
    let fetched = if let Some(source) = self.fetch_from_indexes(identifier)? {
      Some(source)
    } else if let Some(source) = self.fetch_source_control(identifier)? {
      Some(source)
    } else if let Some(source) = self.fetch_http(identifier)? {
      Some(source)
    } else {
      self.fetch_local(identifier)?
    };

    let source =
      fetched.ok_or_else(|| WhackError::PackageSourceNotFound(identifier.to_string()))?;
    verify_source_hash(identifier, &source)?;
    Ok(source)
  }

  /// Bare lowercase names are looked up in each configured index, in order.
  fn fetch_from_indexes(&self, identifier: &str) -> Result<Option<PackageSource>> {
    if !is_source_name(identifier) {
      return Ok(None);
    }
    for index_url in &self.index_urls {
      let index = Index::fetch(&self.http, index_url)?;
      if let Some(entry) = index.find_package_source_by_name(identifier) {
        debug!(name = %identifier, url = %entry.url, "found source in index");
        return self.download_tarball(&entry.url).map(Some);
      }
    }
    Ok(None)
  }

  fn fetch_source_control(&self, identifier: &str) -> Result<Option<PackageSource>> {
    let Some(url) = git_url(identifier) else {
      return Ok(None);
    };
    info!(url = %url, "fetching source from git");
    let temp = TempDir::new()?;
    let checkout = temp.path().join("src");
    clone_repo(url, &checkout)?;
    PackageSource::owned(identifier, checkout, temp).map(Some)
  }

  fn fetch_http(&self, identifier: &str) -> Result<Option<PackageSource>> {
    if !identifier.starts_with("http://") && !identifier.starts_with("https://") {
      return Ok(None);
    }
    self.download_tarball(identifier).map(Some)
  }

  fn fetch_local(&self, identifier: &str) -> Result<Option<PackageSource>> {
    let path = Path::new(identifier);
    if path.is_dir() {
      debug!(path = ?path, "using local source directory");
      return PackageSource::local(identifier, path).map(Some);
    }
    if path.is_file() {
      debug!(path = ?path, "unpacking local source tarball");
      let temp = TempDir::new()?;
      let unpacked = temp.path().join("src");
      unpack_tarball(path, &unpacked)?;
      return PackageSource::owned(identifier, unpacked, temp).map(Some);
    }
    Ok(None)
  }

  /// Download a source tarball and unpack it (stripping the single
  /// top-level directory) into an owned temp dir.
  ///
  /// The hash embedded in a `.whack-source` URL is checked here, so
  /// index-delegated fetches are verified against the entry's URL.
  fn download_tarball(&self, url: &str) -> Result<PackageSource> {
    let temp = TempDir::new()?;
    let archive = temp.path().join(url_basename(url));
    self.http.download(url, &archive)?;
    let unpacked = temp.path().join("src");
    unpack_tarball(&archive, &unpacked)?;
    let source = PackageSource::owned(url, unpacked, temp)?;
    verify_source_hash(url, &source)?;
    Ok(source)
  }
}

/// Identifiers eligible for index lookup: lowercase letters, digits,
/// hyphens and underscores only.
fn is_source_name(identifier: &str) -> bool {
  !identifier.is_empty()
    && identifier
      .chars()
      .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

/// Recognize source-control identifiers and strip any scheme prefix.
fn git_url(identifier: &str) -> Option<&str> {
  if let Some(url) = identifier.strip_prefix("git+") {
    return Some(url);
  }
  if identifier.starts_with("git://")
    || (identifier.contains("://") && identifier.ends_with(".git"))
  {
    return Some(identifier);
  }
  None
}

fn clone_repo(url: &str, dest: &Path) -> Result<()> {
  let mut prepared = gix::prepare_clone(url, dest).map_err(|e| git_error(url, e))?;

  let (mut checkout, _outcome) = prepared
    .fetch_then_checkout(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| git_error(url, e))?;

  checkout
    .main_worktree(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| git_error(url, e))?;

  Ok(())
}

fn git_error(url: &str, error: impl std::fmt::Display) -> WhackError {
  WhackError::Git {
    url: url.to_string(),
    message: error.to_string(),
  }
}

/// Enforce the hash embedded in `<name>_<hash>.whack-source` identifiers.
fn verify_source_hash(identifier: &str, source: &PackageSource) -> Result<()> {
  let base = basename(identifier);
  let Some(stem) = base.strip_suffix(SOURCE_SUFFIX) else {
    return Ok(());
  };
  let Some((_, expected)) = stem.rsplit_once('_') else {
    return Ok(());
  };
  let actual = source.source_hash()?;
  if expected != actual {
    return Err(WhackError::SourceHashMismatch {
      expected: expected.to_string(),
      actual,
    });
  }
  debug!(hash = %actual, "source hash verified");
  Ok(())
}

/// Final path segment of a URL or filesystem path.
fn basename(identifier: &str) -> &str {
  let tail = identifier
    .trim_end_matches('/')
    .rsplit('/')
    .next()
    .unwrap_or(identifier);
  tail.split('?').next().unwrap_or(tail)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::tempdir;

  use crate::archive::pack_tarball;

  fn fetcher() -> PackageSourceFetcher {
    PackageSourceFetcher::new(HttpClient::new(), Vec::new())
  }

  fn write_source_tree(dir: &Path, name: &str) {
    fs::create_dir_all(dir.join("whack")).unwrap();
    fs::write(dir.join("whack/build"), "#!/bin/sh\n").unwrap();
    fs::write(
      dir.join("whack/whack.json"),
      format!(r#"{{"name": "{name}"}}"#),
    )
    .unwrap();
  }

  #[test]
  fn source_name_grammar() {
    assert!(is_source_name("nginx"));
    assert!(is_source_name("lib-foo_2"));
    assert!(!is_source_name("Nginx"));
    assert!(!is_source_name("./nginx"));
    assert!(!is_source_name(""));
  }

  #[test]
  fn git_urls_are_recognized() {
    assert_eq!(
      git_url("git+https://example.com/repo.git"),
      Some("https://example.com/repo.git")
    );
    assert_eq!(git_url("git://example.com/repo"), Some("git://example.com/repo"));
    assert_eq!(
      git_url("https://example.com/repo.git"),
      Some("https://example.com/repo.git")
    );
    assert_eq!(git_url("https://example.com/repo.tar.gz"), None);
    assert_eq!(git_url("nginx"), None);
  }

  #[test]
  fn local_directory_is_used_in_place() {
    let temp = tempdir().unwrap();
    write_source_tree(temp.path(), "nginx");

    let source = fetcher().fetch(temp.path().to_str().unwrap()).unwrap();
    assert_eq!(source.name(), "nginx");
    assert_eq!(source.path(), temp.path());
  }

  #[test]
  fn local_tarball_is_unpacked() {
    let temp = tempdir().unwrap();
    let tree = temp.path().join("tree");
    write_source_tree(&tree, "nginx");

    let archive = temp.path().join("nginx-src.tar.gz");
    pack_tarball(&tree, &archive, "nginx-src").unwrap();

    let source = fetcher().fetch(archive.to_str().unwrap()).unwrap();
    assert_eq!(source.name(), "nginx");
    assert!(source.path().join("whack/build").exists());
  }

  #[test]
  fn unknown_identifier_is_not_found() {
    let result = fetcher().fetch("/no/such/path/anywhere");
    assert!(matches!(result, Err(WhackError::PackageSourceNotFound(_))));
  }

  #[test]
  fn matching_embedded_hash_is_accepted() {
    let temp = tempdir().unwrap();
    let tree = temp.path().join("tree");
    write_source_tree(&tree, "pkg");

    let hash = PackageSource::local("tree", &tree).unwrap().source_hash().unwrap();
    let archive = temp.path().join(format!("pkg_{hash}.whack-source"));
    pack_tarball(&tree, &archive, &format!("pkg_{hash}")).unwrap();

    let source = fetcher().fetch(archive.to_str().unwrap()).unwrap();
    assert_eq!(source.name(), "pkg");
  }

  #[test]
  fn mismatched_embedded_hash_is_rejected() {
    let temp = tempdir().unwrap();
    let tree = temp.path().join("tree");
    write_source_tree(&tree, "pkg");

    let true_hash = PackageSource::local("tree", &tree).unwrap().source_hash().unwrap();
    let archive = temp.path().join("pkg_0000000000000000.whack-source");
    pack_tarball(&tree, &archive, "pkg_0000000000000000").unwrap();

    match fetcher().fetch(archive.to_str().unwrap()) {
      Err(WhackError::SourceHashMismatch { expected, actual }) => {
        assert_eq!(expected, "0000000000000000");
        assert_eq!(actual, true_hash);
      }
      other => panic!("expected SourceHashMismatch, got {other:?}"),
    }
  }

  #[test]
  fn index_lookup_resolves_bare_names() {
    let temp = tempdir().unwrap();
    let tree = temp.path().join("tree");
    write_source_tree(&tree, "nginx");

    let hash = PackageSource::local("tree", &tree).unwrap().source_hash().unwrap();
    let tarball_name = format!("nginx_{hash}.whack-source");
    let archive = temp.path().join(&tarball_name);
    pack_tarball(&tree, &archive, &format!("nginx_{hash}")).unwrap();
    let tarball_bytes = fs::read(&archive).unwrap();

    let mut server = mockito::Server::new();
    server
      .mock("GET", "/index.html")
      .with_body(format!(
        r#"<html><body><a href="/sources/{tarball_name}">nginx.whack-source</a></body></html>"#
      ))
      .create();
    server
      .mock("GET", format!("/sources/{tarball_name}").as_str())
      .with_body(tarball_bytes)
      .create();

    let fetcher = PackageSourceFetcher::new(
      HttpClient::new(),
      vec![format!("{}/index.html", server.url())],
    );
    let source = fetcher.fetch("nginx").unwrap();
    assert_eq!(source.name(), "nginx");
    assert!(source.path().join("whack/build").exists());
  }
}
