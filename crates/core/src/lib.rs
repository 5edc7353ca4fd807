//! The RPC differential testing core library.
//!
//! This crate compares the responses of a reference and a candidate node over a catalog of RPC
//! calls and classifies every difference it finds.

pub mod classifier;
pub mod engine;
pub mod entry_point;
mod error;

pub use error::*;
