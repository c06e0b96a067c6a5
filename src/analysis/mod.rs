//! Analysis modules.
//!
//! Rollups computed on top of the extracted comparison document.

pub mod aggregator;

pub use aggregator::*;
