// malt-common/src/lib.rs
pub mod config;
pub mod dependency;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod registry;

// Re-export key types
pub use config::Config;
pub use error::{MaltError, Result};
pub use model::{Formula, InstallStep};
pub use registry::Formulary;
