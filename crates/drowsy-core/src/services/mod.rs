//! Shared services used across clients

mod event_store;

pub use event_store::EventStore;
