//! promrelay core: transport-agnostic label resolution, exposition line
//! matching, and the incremental label injector.
//!
//! This crate carries no runtime or HTTP dependencies so the rewrite logic can
//! be exercised on plain byte slices (tests, benchmarks, other transports).
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Malformed upstream text is never an error: lines that do not match the
//! sample grammar are passed through untouched.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod exposition;
pub mod labels;

/// Shared result type.
pub use error::{ErrorKind, RelayError, Result};
