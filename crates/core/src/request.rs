//! Package requests: a source plus resolved parameters and platform.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use whack_platform::Platform;

use crate::Result;
use crate::consts::PACKAGE_METADATA_FILE;
use crate::hash::Hasher;
use crate::slug;
use crate::source::PackageSource;

/// A package source together with the parameters and platform a build is
/// requested for.
///
/// The request computes the canonical cache key under which at most one
/// build per fingerprint exists: equal content, equal effective params and
/// equal platform always produce the same name.
pub struct PackageRequest {
  source: PackageSource,
  params: BTreeMap<String, String>,
  platform: Platform,
}

impl PackageRequest {
  pub fn new(source: PackageSource, params: BTreeMap<String, String>, platform: Platform) -> Self {
    Self {
      source,
      params,
      platform,
    }
  }

  pub fn source(&self) -> &PackageSource {
    &self.source
  }

  pub fn platform(&self) -> &Platform {
    &self.platform
  }

  /// Effective parameters: manifest defaults overridden by explicit params.
  pub fn params(&self) -> BTreeMap<String, String> {
    let mut effective = self.source.description().default_params.clone();
    for (key, value) in &self.params {
      effective.insert(key.clone(), value.clone());
    }
    effective
  }

  /// Hash over the source hash and the canonical sorted-JSON rendering of
  /// the effective parameters.
  pub fn params_hash(&self) -> Result<String> {
    let mut hasher = Hasher::new();
    hasher.update(self.source.source_hash()?.as_bytes());
    hasher.update(serde_json::to_string(&self.params())?.as_bytes());
    Ok(hasher.into_id())
  }

  /// The canonical cache key.
  pub fn name(&self) -> Result<String> {
    let params = self.params();
    let param_slug = self
      .source
      .description()
      .param_slug
      .as_deref()
      .map(|template| slug::expand_template(template, &params))
      .unwrap_or_default();
    let platform_slug = self.platform.dumps();
    let params_hash = self.params_hash()?;
    Ok(slug::join(&[
      self.source.name(),
      &param_slug,
      &platform_slug,
      &params_hash,
    ]))
  }

  /// Sidecar metadata recorded next to built package contents.
  pub fn metadata(&self) -> Result<PackageMetadata> {
    Ok(PackageMetadata {
      name: self.name()?,
      source_name: self.source.name().to_string(),
      source_hash: self.source.source_hash()?,
      params: self.params(),
      platform: self.platform.clone(),
    })
  }
}

/// Contents of the `.whack-package.json` sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
  pub name: String,
  pub source_name: String,
  pub source_hash: String,
  pub params: BTreeMap<String, String>,
  pub platform: Platform,
}

impl PackageMetadata {
  /// Write the sidecar into a package directory.
  pub fn write_to(&self, package_dir: &Path) -> Result<()> {
    let content = serde_json::to_string(self)?;
    fs::write(package_dir.join(PACKAGE_METADATA_FILE), format!("{}\n", content))?;
    Ok(())
  }

  /// Read the sidecar from a package directory.
  pub fn read_from(package_dir: &Path) -> Result<Self> {
    let content = fs::read_to_string(package_dir.join(PACKAGE_METADATA_FILE))?;
    Ok(serde_json::from_str(&content)?)
  }
}
