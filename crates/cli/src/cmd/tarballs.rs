use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use whack_core::Operations;

pub fn cmd_create_source_tarball(
  operations: &Operations,
  source_dir: &Path,
  tarball_dir: &Path,
) -> Result<()> {
  let tarball = operations.create_source_tarball(source_dir, tarball_dir)?;
  println!("{}", tarball.path.display());
  Ok(())
}

pub fn cmd_get_package_tarball(
  operations: &Operations,
  source: &str,
  tarball_dir: &Path,
  params: &BTreeMap<String, String>,
) -> Result<()> {
  let path = operations.get_package_tarball(source, tarball_dir, params)?;
  println!("{}", path.display());
  Ok(())
}
