//! Analysis modules.
//!
//! Turns parsed recordings into distance-binned obstacle statistics.

pub mod aggregator;

pub use aggregator::*;
