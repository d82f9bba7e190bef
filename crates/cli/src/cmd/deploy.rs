use std::path::Path;

use anyhow::Result;
use whack_core::Operations;

pub fn cmd_deploy(operations: &Operations, package: &Path, target: Option<&Path>) -> Result<()> {
  let root = operations.deploy(package, target)?;
  println!("Deployed at {}", root.display());
  Ok(())
}
