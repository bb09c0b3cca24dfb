//! Error values surfaced to user space.
//!
//! The kernel keeps typed failures internally; at the ABI every expected
//! failure collapses to a negative result in r2.

pub const EFAIL: i32 = -1;

/// Success result for calls that return no value.
pub const OK: i32 = 0;
