//! Output documents and summaries.

pub mod generator;

pub use generator::*;
