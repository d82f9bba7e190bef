//! whack-run: expose an install directory at the canonical whack root.
//!
//! Usage: `whack-run <dir> <command> [args...]`
//!
//! Unshares user and mount namespaces, maps the invoking uid/gid onto
//! themselves, bind-mounts `<dir>` over `/usr/local/whack`, and execs the
//! command. The mount lives in the child's private namespace; nothing on
//! the host changes, and it disappears when the command exits.

use std::env;
use std::ffi::OsString;

use anyhow::{Result, bail};

const USAGE: &str = "usage: whack-run <dir> <command> [args...]";

fn main() -> Result<()> {
  let mut args = env::args_os().skip(1);
  let Some(root) = args.next() else {
    bail!("{USAGE}");
  };
  let Some(command) = args.next() else {
    bail!("{USAGE}");
  };
  run(root, command, args.collect())
}

#[cfg(target_os = "linux")]
fn run(root: OsString, command: OsString, args: Vec<OsString>) -> Result<()> {
  use std::fs;
  use std::os::unix::process::CommandExt;
  use std::path::Path;
  use std::process::Command;

  use anyhow::Context;
  use nix::mount::{MsFlags, mount};
  use nix::sched::{CloneFlags, unshare};
  use nix::unistd::{Gid, Uid};

  const WHACK_ROOT: &str = "/usr/local/whack";

  let uid = Uid::current();
  let gid = Gid::current();

  unshare(CloneFlags::CLONE_NEWUSER | CloneFlags::CLONE_NEWNS)
    .context("failed to unshare user and mount namespaces")?;

  // Map the invoking uid/gid onto themselves inside the new namespace;
  // setgroups must be denied before an unprivileged gid_map write.
  fs::write("/proc/self/setgroups", "deny").context("failed to deny setgroups")?;
  fs::write("/proc/self/uid_map", format!("{uid} {uid} 1")).context("failed to write uid map")?;
  fs::write("/proc/self/gid_map", format!("{gid} {gid} 1")).context("failed to write gid map")?;

  let root_path = Path::new(&root)
    .canonicalize()
    .with_context(|| format!("no such directory: {}", Path::new(&root).display()))?;

  // The mount point itself must exist; creating it needs a writable
  // /usr/local (or a pre-created /usr/local/whack).
  fs::create_dir_all(WHACK_ROOT)
    .with_context(|| format!("mount point {WHACK_ROOT} is missing and could not be created"))?;

  mount(
    Some(root_path.as_path()),
    WHACK_ROOT,
    None::<&str>,
    MsFlags::MS_BIND | MsFlags::MS_REC,
    None::<&str>,
  )
  .with_context(|| format!("failed to bind {} onto {WHACK_ROOT}", root_path.display()))?;

  let error = Command::new(&command).args(args).exec();
  Err(error).with_context(|| format!("failed to exec {}", command.to_string_lossy()))
}

#[cfg(not(target_os = "linux"))]
fn run(_root: OsString, _command: OsString, _args: Vec<OsString>) -> Result<()> {
  bail!("whack-run requires Linux mount namespaces");
}
