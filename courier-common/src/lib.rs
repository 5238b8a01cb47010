//! Pieces shared by every courier crate.
//!
//! At the moment this is only logging: the subscriber setup used by the
//! binary and the `outgoing!`, `incoming!` and `internal!` macros the engine
//! uses to tag wire traffic.

pub mod logging;

pub use tracing;
