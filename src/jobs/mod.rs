//! Built-in job bodies
//!
//! Source-specific scrapers live outside this crate; these bodies exist so a
//! deployment can exercise the harness end to end.

pub mod export;
pub mod probe;

pub use export::ExportJob;
pub use probe::{build_probe_jobs, ProbeJob};
