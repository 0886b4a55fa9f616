// malt-core/src/lib.rs
pub mod extract;
pub mod install;
pub mod keg;
pub mod test_runner;

pub use install::{InstallEngine, InstallOptions};
pub use keg::{InstalledKeg, KegRegistry};
pub use test_runner::run_test;
