//! Domain model and pure logic for range orchestration.
//!
//! Everything here is free of I/O: the blueprint/range entity graph, the
//! job state machine, the tree validator, and per-entity display fields.
//! Persistence, provisioning and HTTP live in the sibling crates.

#[macro_use]
mod macros;

pub mod blueprint;
pub mod config;
pub mod display;
pub mod error;
pub mod job;
pub mod range;
pub mod tags;
pub mod types;
pub mod validation;
