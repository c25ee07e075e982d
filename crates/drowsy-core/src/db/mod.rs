//! Database layer for Drowsy

mod connection;
mod event_repository;
mod migrations;

pub use connection::Database;
pub use event_repository::{EventRepository, LibSqlEventRepository};
