//! This crate implements the reporting infrastructure for the differential testing tool.

mod aggregator;
mod render;
mod reporter_event;
mod runner_event;
mod summary;
mod verdict;

pub use aggregator::*;
pub use render::*;
pub use reporter_event::*;
pub use runner_event::*;
pub use summary::*;
pub use verdict::*;
