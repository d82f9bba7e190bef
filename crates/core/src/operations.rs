//! High-level operations: the façade the CLI drives.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;
use tracing::info;
use whack_platform::Platform;

use crate::archive::pack_tarball;
use crate::builder::Builder;
use crate::cache::DirCacher;
use crate::consts::{PACKAGE_SUFFIX, SOURCE_SUFFIX};
use crate::deployer::Deployer;
use crate::downloads::DownloadCache;
use crate::fetcher::PackageSourceFetcher;
use crate::http::HttpClient;
use crate::provider::{
  BuildingPackageProvider, CachingPackageProvider, IndexPackageProvider,
  MultiplePackageProviders, PackageProvider,
};
use crate::request::PackageRequest;
use crate::slug;
use crate::source::PackageSource;
use crate::{Result, WhackError};

/// Explicit configuration for the provisioning pipeline.
///
/// Everything the pipeline needs is carried here and passed down; there is
/// no process-wide default client or other implicit global state.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
  /// Index URLs consulted, in order, before building.
  pub index_urls: Vec<String>,
  /// Root of the built-package cache.
  pub package_cache_dir: PathBuf,
  /// Root of the download cache.
  pub download_cache_dir: PathBuf,
  /// Whether building from source is enabled.
  pub enable_build: bool,
  /// Path of the root-remapping helper binary.
  pub whack_run: PathBuf,
}

impl ProviderConfig {
  /// Defaults: caches under the user cache directory (overridable with
  /// `$WHACK_CACHE_DIR`), building enabled, helper resolved next to the
  /// current executable.
  pub fn default_dirs() -> Self {
    let cache_root = default_cache_root();
    Self {
      index_urls: Vec::new(),
      package_cache_dir: cache_root.join("packages"),
      download_cache_dir: cache_root.join("downloads"),
      enable_build: true,
      whack_run: Builder::default_whack_run(),
    }
  }
}

fn default_cache_root() -> PathBuf {
  if let Ok(dir) = env::var("WHACK_CACHE_DIR") {
    return PathBuf::from(dir);
  }
  dirs::cache_dir().unwrap_or_else(env::temp_dir).join("whack")
}

/// Name and location of a written source tarball.
#[derive(Debug, Clone)]
pub struct SourceTarball {
  pub full_name: String,
  pub path: PathBuf,
}

/// The operations exposed to users: install, get-package, deploy,
/// create-source-tarball, get-package-tarball and test.
pub struct Operations {
  config: ProviderConfig,
  http: HttpClient,
  platform: Platform,
}

impl Operations {
  /// Build the façade for the detected host platform.
  pub fn new(config: ProviderConfig, http: HttpClient) -> Result<Self> {
    let platform = Platform::detect()?;
    Ok(Self::with_platform(config, http, platform))
  }

  /// Build the façade for an explicitly-given platform.
  pub fn with_platform(config: ProviderConfig, http: HttpClient, platform: Platform) -> Self {
    Self {
      config,
      http,
      platform,
    }
  }

  fn fetcher(&self) -> PackageSourceFetcher {
    PackageSourceFetcher::new(self.http.clone(), self.config.index_urls.clone())
  }

  fn provider(&self) -> CachingPackageProvider {
    let mut providers: Vec<Box<dyn PackageProvider>> = Vec::new();
    for index_url in &self.config.index_urls {
      providers.push(Box::new(IndexPackageProvider::new(
        self.http.clone(),
        index_url.clone(),
      )));
    }
    if self.config.enable_build {
      let downloads = DownloadCache::new(self.config.download_cache_dir.clone(), self.http.clone());
      providers.push(Box::new(BuildingPackageProvider::new(Builder::new(
        downloads,
        self.config.whack_run.clone(),
      ))));
    }
    CachingPackageProvider::new(
      Box::new(DirCacher::new(self.config.package_cache_dir.clone())),
      Box::new(MultiplePackageProviders::new(providers)),
    )
  }

  /// Resolve an identifier into a materialized source.
  pub fn fetch_source(&self, identifier: &str) -> Result<PackageSource> {
    self.fetcher().fetch(identifier)
  }

  fn request(&self, identifier: &str, params: &BTreeMap<String, String>) -> Result<PackageRequest> {
    let source = self.fetch_source(identifier)?;
    Ok(PackageRequest::new(source, params.clone(), self.platform.clone()))
  }

  fn provide(&self, request: &PackageRequest, target_dir: &Path) -> Result<()> {
    if !self.provider().provide_package(request, target_dir)? {
      return Err(WhackError::PackageNotAvailable(request.name()?));
    }
    Ok(())
  }

  /// Provision the package into `target_dir` without deploying it.
  pub fn get_package(
    &self,
    identifier: &str,
    target_dir: &Path,
    params: &BTreeMap<String, String>,
  ) -> Result<()> {
    let request = self.request(identifier, params)?;
    self.provide(&request, target_dir)
  }

  /// Provision and deploy in place: a runnable install at `target_dir`.
  pub fn install(
    &self,
    identifier: &str,
    target_dir: &Path,
    params: &BTreeMap<String, String>,
  ) -> Result<()> {
    let request = self.request(identifier, params)?;
    self.provide(&request, target_dir)?;
    Deployer::new().deploy(target_dir, None)?;
    info!(target = ?target_dir, "installed");
    Ok(())
  }

  /// Deploy an already-provisioned package directory.
  pub fn deploy(&self, package_dir: &Path, target_dir: Option<&Path>) -> Result<PathBuf> {
    Deployer::new().deploy(package_dir, target_dir)
  }

  /// Write `<name>_<sourcehash>.whack-source` into `tarball_dir`.
  pub fn create_source_tarball(
    &self,
    source_dir: &Path,
    tarball_dir: &Path,
  ) -> Result<SourceTarball> {
    let source = PackageSource::local(&source_dir.display().to_string(), source_dir)?;
    let source_hash = source.source_hash()?;
    let full_name = slug::join(&[source.name(), &source_hash]);

    let staging = TempDir::new()?;
    let tree = staging.path().join(&full_name);
    fs::create_dir_all(&tree)?;
    source.write_to(&tree)?;

    fs::create_dir_all(tarball_dir)?;
    let path = tarball_dir.join(format!("{full_name}{SOURCE_SUFFIX}"));
    pack_tarball(&tree, &path, &full_name)?;
    info!(path = ?path, "wrote source tarball");
    Ok(SourceTarball { full_name, path })
  }

  /// Provision the package and archive it as `<request.name()>.whack-package`.
  pub fn get_package_tarball(
    &self,
    identifier: &str,
    tarball_dir: &Path,
    params: &BTreeMap<String, String>,
  ) -> Result<PathBuf> {
    let request = self.request(identifier, params)?;
    let name = request.name()?;

    let staging = TempDir::new()?;
    let package_dir = staging.path().join(&name);
    self.provide(&request, &package_dir)?;

    fs::create_dir_all(tarball_dir)?;
    let path = tarball_dir.join(format!("{name}{PACKAGE_SUFFIX}"));
    pack_tarball(&package_dir, &path, &name)?;
    info!(path = ?path, "wrote package tarball");
    Ok(path)
  }

  /// Install into scratch space and run the source's test command there.
  ///
  /// Returns whether the command exited zero. Sources without a test
  /// command trivially pass: there is nothing to run.
  pub fn test(&self, identifier: &str, params: &BTreeMap<String, String>) -> Result<bool> {
    let request = self.request(identifier, params)?;
    let Some(test_command) = request.source().description().test_command.clone() else {
      return Ok(true);
    };

    let install_dir = TempDir::new()?;
    self.provide(&request, install_dir.path())?;
    Deployer::new().deploy(install_dir.path(), None)?;

    info!(command = %test_command, "running test command");
    let status = Command::new("/bin/sh")
      .arg("-c")
      .arg(&test_command)
      .current_dir(install_dir.path())
      .status()?;
    Ok(status.success())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::tempdir;

  use crate::archive::unpack_tarball;

  fn write_source_tree(dir: &Path, manifest: &str) {
    fs::create_dir_all(dir.join("whack")).unwrap();
    fs::write(dir.join("whack/build"), "#!/bin/sh\n").unwrap();
    fs::write(dir.join("whack/whack.json"), manifest).unwrap();
  }

  #[test]
  fn source_tarball_name_embeds_the_source_hash() {
    let temp = tempdir().unwrap();
    let source_dir = temp.path().join("source");
    write_source_tree(&source_dir, r#"{"name": "nginx"}"#);

    let config = ProviderConfig {
      index_urls: Vec::new(),
      package_cache_dir: temp.path().join("cache/packages"),
      download_cache_dir: temp.path().join("cache/downloads"),
      enable_build: false,
      whack_run: PathBuf::from("whack-run"),
    };
    let operations = Operations::with_platform(
      config,
      HttpClient::new(),
      Platform::new("linux", "x86-64", "glibc-2.17"),
    );

    let tarball_dir = temp.path().join("tarballs");
    let tarball = operations.create_source_tarball(&source_dir, &tarball_dir).unwrap();

    let hash = PackageSource::local("src", &source_dir).unwrap().source_hash().unwrap();
    assert_eq!(tarball.full_name, format!("nginx_{hash}"));
    assert_eq!(
      tarball.path,
      tarball_dir.join(format!("nginx_{hash}.whack-source"))
    );
    assert!(tarball.path.exists());
  }

  #[test]
  fn source_tarball_round_trips_through_the_fetcher_grammar() {
    let temp = tempdir().unwrap();
    let source_dir = temp.path().join("source");
    write_source_tree(&source_dir, r#"{"name": "nginx"}"#);

    let config = ProviderConfig {
      index_urls: Vec::new(),
      package_cache_dir: temp.path().join("cache/packages"),
      download_cache_dir: temp.path().join("cache/downloads"),
      enable_build: false,
      whack_run: PathBuf::from("whack-run"),
    };
    let operations = Operations::with_platform(
      config,
      HttpClient::new(),
      Platform::new("linux", "x86-64", "glibc-2.17"),
    );

    let tarball = operations
      .create_source_tarball(&source_dir, &temp.path().join("tarballs"))
      .unwrap();

    // Unpacking strips the top-level dir, and the extracted tree hashes to
    // the value embedded in the tarball name.
    let unpacked = temp.path().join("unpacked");
    unpack_tarball(&tarball.path, &unpacked).unwrap();
    let extracted_hash = PackageSource::local("x", &unpacked).unwrap().source_hash().unwrap();
    assert!(tarball.full_name.ends_with(&extracted_hash));
  }

  #[test]
  fn build_disabled_with_no_index_surfaces_not_available() {
    let temp = tempdir().unwrap();
    let source_dir = temp.path().join("source");
    write_source_tree(&source_dir, r#"{"name": "nginx"}"#);

    let config = ProviderConfig {
      index_urls: Vec::new(),
      package_cache_dir: temp.path().join("cache/packages"),
      download_cache_dir: temp.path().join("cache/downloads"),
      enable_build: false,
      whack_run: PathBuf::from("whack-run"),
    };
    let operations = Operations::with_platform(
      config,
      HttpClient::new(),
      Platform::new("linux", "x86-64", "glibc-2.17"),
    );

    let result = operations.get_package(
      source_dir.to_str().unwrap(),
      &temp.path().join("target"),
      &BTreeMap::new(),
    );
    assert!(matches!(result, Err(WhackError::PackageNotAvailable(_))));
  }
}
