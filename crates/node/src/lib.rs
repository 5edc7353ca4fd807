//! This crate implements the handles over the nodes taking part in a differential run and the
//! readiness check gating their availability.

mod handle;
mod readiness;

pub use handle::*;
pub use readiness::*;
