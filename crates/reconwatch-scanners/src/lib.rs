//! ReconWatch Scanners
//!
//! Scanner descriptors and sandboxed, line-streaming subprocess execution
//! for the external tools a pipeline run shells out to.

pub mod descriptor;
pub mod redact;
pub mod runner;

pub use descriptor::{ScannerDescriptor, ScannerKind};
pub use redact::redact_line;
pub use runner::{ScanOutcome, ScannerRunner};
