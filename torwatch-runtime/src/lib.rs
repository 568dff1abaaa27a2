//! TorWatch Runtime
//!
//! The [`Aggregator`] is the only component aware of every probe. It
//! classifies the target, dispatches the probes, merges their outcomes into
//! one record and returns it with the diagnostic log.

pub mod config;
pub mod aggregator;

pub use config::*;
pub use aggregator::*;
