pub mod auth_cmd;
pub mod capture;
pub mod clear;
pub mod common;
pub mod config;
pub mod delete;
pub mod list;
pub mod range;
pub mod stats;
pub mod sync;
pub mod view;
pub mod watch;
