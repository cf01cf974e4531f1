//! `strata` — a cascaded, typed configuration tree with pluggable
//! persistence, and a chained memory-block stream for building and
//! splicing byte buffers in place.
//!
//! The two subsystems share nothing at runtime; they live in one crate
//! because both come from the same "layered state plus a single lock
//! guarding structural changes" school of design the rest of this crate's
//! modules follow.

pub mod config;
pub mod error;
pub mod logging;
pub mod persistence;
pub mod stream;

pub use error::{Error, Result};
