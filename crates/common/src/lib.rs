//! This crate provides common concepts, functionality, types, and macros that other crates in the
//! workspace can benefit from.

pub mod futures;
pub mod macros;
pub mod types;
