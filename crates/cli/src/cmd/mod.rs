mod deploy;
mod install;
mod tarballs;

pub use deploy::cmd_deploy;
pub use install::{cmd_get_package, cmd_install};
pub use tarballs::{cmd_create_source_tarball, cmd_get_package_tarball};
pub use test::cmd_test;
