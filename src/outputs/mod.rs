//! Output generation.
//!
//! # Submodules
//!
//! - [`json`]: renders responses for stdout and writes dashboard snapshots
//!   (one JSON file per resource) into a directory

pub mod json;
