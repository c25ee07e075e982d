//! Data models for Drowsy

mod event;
mod reading;

pub use event::{EventTime, FatigueEvent, LocalId, NewFatigueEvent};
pub use reading::{Reading, ScoreSummary, TimeRange};
