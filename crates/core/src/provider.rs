//! Tiered package provisioning: cache, then indexes, then building.

use std::path::Path;

use tempfile::TempDir;
use tracing::{debug, info};

use crate::Result;
use crate::archive::unpack_tarball;
use crate::builder::Builder;
use crate::cache::Cacher;
use crate::http::HttpClient;
use crate::index::Index;
use crate::request::PackageRequest;

/// A strategy that can place the requested package at a target directory.
///
/// Returning `false` means the strategy did not apply to this request;
/// errors are reserved for strategies that applied and failed.
pub trait PackageProvider {
  fn provide_package(&self, request: &PackageRequest, target_dir: &Path) -> Result<bool>;
}

/// Serves prebuilt artifacts from one configured index.
pub struct IndexPackageProvider {
  http: HttpClient,
  index_url: String,
}

impl IndexPackageProvider {
  pub fn new(http: HttpClient, index_url: String) -> Self {
    Self { http, index_url }
  }
}

impl PackageProvider for IndexPackageProvider {
  fn provide_package(&self, request: &PackageRequest, target_dir: &Path) -> Result<bool> {
    let index = Index::fetch(&self.http, &self.index_url)?;
    let Some(entry) = index.find_package(&request.params_hash()?, request.platform()) else {
      return Ok(false);
    };

    info!(url = %entry.url, "downloading prebuilt package");
    let staging = TempDir::new()?;
    let archive = staging.path().join("package.tar.gz");
    self.http.download(&entry.url, &archive)?;
    unpack_tarball(&archive, target_dir)?;
    Ok(true)
  }
}

/// Builds from source; applies whenever building is enabled.
pub struct BuildingPackageProvider {
  builder: Builder,
}

impl BuildingPackageProvider {
  pub fn new(builder: Builder) -> Self {
    Self { builder }
  }
}

impl PackageProvider for BuildingPackageProvider {
  fn provide_package(&self, request: &PackageRequest, target_dir: &Path) -> Result<bool> {
    self.builder.build(request, target_dir)?;
    Ok(true)
  }
}

/// First-success-wins chain over the configured strategies.
pub struct MultiplePackageProviders {
  providers: Vec<Box<dyn PackageProvider>>,
}

impl MultiplePackageProviders {
  pub fn new(providers: Vec<Box<dyn PackageProvider>>) -> Self {
    Self { providers }
  }
}

impl PackageProvider for MultiplePackageProviders {
  fn provide_package(&self, request: &PackageRequest, target_dir: &Path) -> Result<bool> {
    for provider in &self.providers {
      if provider.provide_package(request, target_dir)? {
        return Ok(true);
      }
    }
    Ok(false)
  }
}

/// Cache layer in front of the other strategies.
///
/// A hit under `request.name()` skips the whole chain: the at-most-one-build
/// guarantee lives in the cache key, not in any lock. Every success
/// back-fills the cache under the same key.
pub struct CachingPackageProvider {
  cacher: Box<dyn Cacher>,
  inner: Box<dyn PackageProvider>,
}

impl CachingPackageProvider {
  pub fn new(cacher: Box<dyn Cacher>, inner: Box<dyn PackageProvider>) -> Self {
    Self { cacher, inner }
  }
}

impl PackageProvider for CachingPackageProvider {
  fn provide_package(&self, request: &PackageRequest, target_dir: &Path) -> Result<bool> {
    let name = request.name()?;
    if self.cacher.fetch(&name, target_dir)? {
      debug!(name = %name, "provided from cache");
      return Ok(true);
    }
    if !self.inner.provide_package(request, target_dir)? {
      return Ok(false);
    }
    self.cacher.put(&name, target_dir)?;
    Ok(true)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::Cell;
  use std::collections::BTreeMap;
  use std::fs;
  use std::rc::Rc;
  use tempfile::{TempDir, tempdir};
  use whack_platform::Platform;

  use crate::cache::DirCacher;
  use crate::source::PackageSource;

  fn make_request(name: &str) -> (TempDir, PackageRequest) {
    let temp = tempdir().unwrap();
    fs::create_dir_all(temp.path().join("whack")).unwrap();
    fs::write(temp.path().join("whack/build"), "#!/bin/sh\n").unwrap();
    fs::write(
      temp.path().join("whack/whack.json"),
      format!(r#"{{"name": "{name}"}}"#),
    )
    .unwrap();
    let source = PackageSource::local("src", temp.path()).unwrap();
    let request = PackageRequest::new(
      source,
      BTreeMap::new(),
      Platform::new("linux", "x86-64", "glibc-2.13"),
    );
    (temp, request)
  }

  /// Test double that writes a marker file and counts invocations.
  struct CountingProvider {
    calls: Rc<Cell<usize>>,
    succeed: bool,
  }

  impl PackageProvider for CountingProvider {
    fn provide_package(&self, _request: &PackageRequest, target_dir: &Path) -> Result<bool> {
      self.calls.set(self.calls.get() + 1);
      if !self.succeed {
        return Ok(false);
      }
      fs::create_dir_all(target_dir)?;
      fs::write(target_dir.join("provided"), "yes")?;
      Ok(true)
    }
  }

  #[test]
  fn chain_stops_at_first_success() {
    let (_source, request) = make_request("pkg");
    let first_calls = Rc::new(Cell::new(0));
    let second_calls = Rc::new(Cell::new(0));
    let chain = MultiplePackageProviders::new(vec![
      Box::new(CountingProvider {
        calls: first_calls.clone(),
        succeed: true,
      }),
      Box::new(CountingProvider {
        calls: second_calls.clone(),
        succeed: true,
      }),
    ]);

    let target = tempdir().unwrap();
    assert!(chain.provide_package(&request, target.path()).unwrap());
    assert_eq!(first_calls.get(), 1);
    assert_eq!(second_calls.get(), 0);
  }

  #[test]
  fn chain_falls_through_declining_strategies() {
    let (_source, request) = make_request("pkg");
    let first_calls = Rc::new(Cell::new(0));
    let second_calls = Rc::new(Cell::new(0));
    let chain = MultiplePackageProviders::new(vec![
      Box::new(CountingProvider {
        calls: first_calls.clone(),
        succeed: false,
      }),
      Box::new(CountingProvider {
        calls: second_calls.clone(),
        succeed: true,
      }),
    ]);

    let target = tempdir().unwrap();
    assert!(chain.provide_package(&request, target.path()).unwrap());
    assert_eq!(first_calls.get(), 1);
    assert_eq!(second_calls.get(), 1);
  }

  #[test]
  fn everything_declining_is_not_an_error() {
    let (_source, request) = make_request("pkg");
    let chain = MultiplePackageProviders::new(vec![Box::new(CountingProvider {
      calls: Rc::new(Cell::new(0)),
      succeed: false,
    })]);

    let target = tempdir().unwrap();
    assert!(!chain.provide_package(&request, target.path()).unwrap());
  }

  #[test]
  fn identical_requests_invoke_the_chain_at_most_once() {
    let (_source, request) = make_request("pkg");
    let cache_root = tempdir().unwrap();
    let calls = Rc::new(Cell::new(0));
    let caching = CachingPackageProvider::new(
      Box::new(DirCacher::new(cache_root.path())),
      Box::new(CountingProvider {
        calls: calls.clone(),
        succeed: true,
      }),
    );

    let first = tempdir().unwrap();
    assert!(caching.provide_package(&request, first.path()).unwrap());
    let second = tempdir().unwrap();
    assert!(caching.provide_package(&request, second.path()).unwrap());

    assert_eq!(calls.get(), 1);
    assert_eq!(fs::read_to_string(second.path().join("provided")).unwrap(), "yes");
  }

  #[test]
  fn cache_miss_with_declining_chain_stays_a_miss() {
    let (_source, request) = make_request("pkg");
    let cache_root = tempdir().unwrap();
    let caching = CachingPackageProvider::new(
      Box::new(DirCacher::new(cache_root.path())),
      Box::new(CountingProvider {
        calls: Rc::new(Cell::new(0)),
        succeed: false,
      }),
    );

    let target = tempdir().unwrap();
    assert!(!caching.provide_package(&request, target.path()).unwrap());
  }

  #[test]
  fn index_provider_downloads_and_unpacks_into_target() {
    let (_source, request) = make_request("foo");
    let params_hash = request.params_hash().unwrap();
    let filename = format!("foo_linux_x86-64_glibc-2.12_{params_hash}.whack-package");

    // Build the served artifact: a tarball with a single top-level dir.
    let artifact_tree = tempdir().unwrap();
    fs::write(artifact_tree.path().join("payload"), "prebuilt").unwrap();
    let artifact = tempdir().unwrap();
    let archive = artifact.path().join(&filename);
    crate::archive::pack_tarball(artifact_tree.path(), &archive, "foo").unwrap();

    let mut server = mockito::Server::new();
    server
      .mock("GET", "/index.html")
      .with_body(format!(r#"<a href="/pkg/{filename}">{filename}</a>"#))
      .create();
    server
      .mock("GET", format!("/pkg/{filename}").as_str())
      .with_body(fs::read(&archive).unwrap())
      .create();

    let provider = IndexPackageProvider::new(
      HttpClient::new(),
      format!("{}/index.html", server.url()),
    );

    let target = tempdir().unwrap();
    assert!(provider.provide_package(&request, target.path()).unwrap());
    assert_eq!(
      fs::read_to_string(target.path().join("payload")).unwrap(),
      "prebuilt"
    );
  }

  #[test]
  fn index_provider_declines_without_a_match() {
    let mut server = mockito::Server::new();
    server.mock("GET", "/index.html").with_body("<html></html>").create();

    let (_source, request) = make_request("foo");
    let provider = IndexPackageProvider::new(
      HttpClient::new(),
      format!("{}/index.html", server.url()),
    );

    let target = tempdir().unwrap();
    assert!(!provider.provide_package(&request, target.path()).unwrap());
  }
}
