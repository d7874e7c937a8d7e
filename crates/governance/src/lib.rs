#![deny(unused)]
//! Governance for Teamflow.
//!
//! This crate provides:
//! - Run budget control (turn and token limits)
//! - Tracing subscriber setup

pub mod budget;
pub mod tracing_layer;

pub use budget::{Exhaustion, RunBudget};
pub use tracing_layer::configure_tracing;
