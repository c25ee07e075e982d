//! drowsy-core - Core library for Drowsy
//!
//! Local-first storage and synchronization for fatigue readings: the durable
//! event store, the capture policy that decides which scores are kept, the
//! remote client contract, the background sync engine, and the read-path
//! cache coordinator used by display surfaces.

pub mod cache;
pub mod capture;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod sync;
pub mod util;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
pub use models::{EventTime, FatigueEvent, LocalId, NewFatigueEvent, Reading, TimeRange};
pub use services::EventStore;
