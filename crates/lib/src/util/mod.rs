//! Shared utilities.
//!
//! Content hashing, plus a scripted host for tests.

pub mod hash;

#[cfg(test)]
pub mod testutil;
