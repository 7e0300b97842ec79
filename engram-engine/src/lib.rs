//! # engram-engine
//!
//! The application root. `MemoryEngine` owns every component as a
//! shared value constructed once at startup, wires the write and read
//! paths together, and exposes the operations the admin surface
//! dispatches to.

pub mod engine;
pub mod types;

pub use engine::MemoryEngine;
pub use types::{
    ListedPage, NewMemory, StatsReport, TagListing, TimelineItem, UpdateMemory,
};
