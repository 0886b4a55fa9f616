// src/model/mod.rs
// Declares the modules within the model directory.
pub mod formula;

// Re-export
pub use formula::{Formula, InstallStep};
