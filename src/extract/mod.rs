//! Parameter extraction.
//!
//! Turns raw YAML parameter files from two snapshots into the comparison
//! document.

pub mod extractor;
pub mod parser;

pub use extractor::Extractor;
