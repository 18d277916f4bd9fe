//! Job and report definition documents.
//!
//! Definitions are JSON documents read from the configured folders at
//! startup, on `reload`, and one file at a time on `add`. Invalid
//! definitions are skipped with a warning; the rest still load.

pub mod loader;
pub mod variables;

pub use loader::{read_job_file, read_report_file, DefinitionLoader, Loaded};
