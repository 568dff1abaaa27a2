//! TorWatch Probes
//!
//! Independent probes against the external sources, each returning a
//! [`torwatch_core::ProbeOutcome`]:
//! - **Search**: queries hidden-service search engines through Tor
//! - **Recon**: fetches an onion host through Tor, or geolocates an IPv4
//! - **Registry**: RDAP ownership/allocation lookup for an IPv4
//! - **Classifier**: external risk classification collaborator
//!
//! Probes know nothing about each other; orchestration lives in
//! `torwatch-runtime`.

pub mod config;
pub mod search;
pub mod recon;
pub mod registry;
pub mod classifier;

pub use config::*;
pub use search::*;
pub use recon::*;
pub use registry::*;
pub use classifier::*;
