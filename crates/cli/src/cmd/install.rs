use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use whack_core::Operations;

pub fn cmd_install(
  operations: &Operations,
  source: &str,
  target: &Path,
  params: &BTreeMap<String, String>,
) -> Result<()> {
  operations.install(source, target, params)?;
  println!("Installed {} to {}", source, target.display());
  Ok(())
}

pub fn cmd_get_package(
  operations: &Operations,
  source: &str,
  target: &Path,
  params: &BTreeMap<String, String>,
) -> Result<()> {
  operations.get_package(source, target, params)?;
  println!("Provisioned {} at {}", source, target.display());
  Ok(())
}
