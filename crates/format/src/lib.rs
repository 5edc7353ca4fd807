//! The test catalog format: the ordered list of RPC calls to compare and the equivalence policies
//! deciding when two responses are considered the same.

pub mod case;
pub mod catalog;
pub mod field_path;
pub mod filter;
pub mod policy;
