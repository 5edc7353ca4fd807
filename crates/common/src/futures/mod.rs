mod backoff;
mod poll;

pub use backoff::*;
pub use poll::*;
