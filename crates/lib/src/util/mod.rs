//! Shared utilities.
//!
//! Content hashing, path normalization and test helpers.

pub mod hash;
pub mod path;

#[cfg(test)]
pub mod testutil;
