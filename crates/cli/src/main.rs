use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use whack_core::{HttpClient, Operations, ProviderConfig, WhackError};

mod cmd;

/// whack - source-based package manager with relocatable installs
#[derive(Parser)]
#[command(name = "whack")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Add a package index to consult before building (repeatable)
  #[arg(long = "add-index", global = true, value_name = "URL")]
  indexes: Vec<String>,

  /// Set a build parameter (repeatable)
  #[arg(short = 'p', long = "param", global = true, value_name = "KEY=VALUE")]
  params: Vec<String>,

  /// Never build from source; rely on caches and indexes only
  #[arg(long, global = true)]
  no_build: bool,

  /// Override the cache directory
  #[arg(long, global = true, value_name = "DIR")]
  cache_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Provision a package and deploy it at the target directory
  Install {
    /// Package source: a name, URL, tarball or local path
    source: String,
    /// Directory to install into
    target: PathBuf,
  },

  /// Provision a package into the target directory without deploying
  GetPackage {
    source: String,
    target: PathBuf,
  },

  /// Deploy an already-provisioned package directory
  Deploy {
    /// The package directory
    package: PathBuf,
    /// Copy here first instead of deploying in place
    target: Option<PathBuf>,
  },

  /// Write a source tarball for a local source directory
  CreateSourceTarball {
    source_dir: PathBuf,
    tarball_dir: PathBuf,
  },

  /// Provision a package and archive it as a .whack-package tarball
  GetPackageTarball {
    source: String,
    tarball_dir: PathBuf,
  },

  /// Install into scratch space and run the source's test command
  Test {
    source: String,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .without_time()
    .init();

  let cli = Cli::parse();
  match run(cli) {
    Ok(()) => Ok(()),
    Err(error) => report(error),
  }
}

/// Known taxonomy errors print as `<Kind>: <message>` with exit code 1;
/// everything else propagates as an uncaught failure.
fn report(error: anyhow::Error) -> Result<()> {
  if let Some(whack_error) = error.downcast_ref::<WhackError>() {
    if let Some(kind) = whack_error.kind() {
      eprintln!("{kind}: {whack_error}");
      std::process::exit(1);
    }
  }
  Err(error)
}

fn run(cli: Cli) -> Result<()> {
  let params = parse_params(&cli.params)?;
  let operations = Operations::new(build_config(&cli), HttpClient::new())?;

  match &cli.command {
    Commands::Install { source, target } => cmd::cmd_install(&operations, source, target, &params),
    Commands::GetPackage { source, target } => {
      cmd::cmd_get_package(&operations, source, target, &params)
    }
    Commands::Deploy { package, target } => cmd::cmd_deploy(&operations, package, target.as_deref()),
    Commands::CreateSourceTarball {
      source_dir,
      tarball_dir,
    } => cmd::cmd_create_source_tarball(&operations, source_dir, tarball_dir),
    Commands::GetPackageTarball { source, tarball_dir } => {
      cmd::cmd_get_package_tarball(&operations, source, tarball_dir, &params)
    }
    Commands::Test { source } => cmd::cmd_test(&operations, source, &params),
  }
}

fn build_config(cli: &Cli) -> ProviderConfig {
  let mut config = ProviderConfig::default_dirs();
  config.index_urls = cli.indexes.clone();
  config.enable_build = !cli.no_build;
  if let Some(dir) = &cli.cache_dir {
    config.package_cache_dir = dir.join("packages");
    config.download_cache_dir = dir.join("downloads");
  }
  config
}

fn parse_params(raw: &[String]) -> Result<BTreeMap<String, String>> {
  raw
    .iter()
    .map(|entry| {
      entry
        .split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| anyhow::anyhow!("invalid --param '{entry}', expected KEY=VALUE"))
    })
    .collect()
}
