//! Reporting over finalized aggregation results.
//!
//! `tables` builds the tabular views; `generator` renders and writes the
//! text report, the CSV and JSON exports, and the console view.

pub mod generator;
pub mod tables;

pub use generator::*;
pub use tables::*;
