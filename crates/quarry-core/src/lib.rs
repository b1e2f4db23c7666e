//! Core Types for Quarry
//!
//! This crate holds the pieces every other Quarry crate depends on. Right now
//! that is the shared error model; keeping it in a leaf crate avoids
//! dependency cycles between the storage, metadata, and bootstrap layers.

pub mod error;

pub use error::{Error, Result};
