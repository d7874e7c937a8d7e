//! Core type definitions for Teamflow.
//!
//! Messages travel on the environment bus; steps and generations describe
//! what happens inside a single agent run.

pub mod message;
pub mod step;

pub use message::*;
pub use step::*;
