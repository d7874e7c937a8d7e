#![deny(unused)]
//! Core types, traits, and error definitions for Teamflow.
//!
//! This crate provides the building blocks shared by the governance and
//! controller layers: the message model, the model/tool/agent capability
//! traits, configuration, and the prompt template engine.

pub mod config;
pub mod error;
pub mod events;
pub mod mocks;
pub mod template;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use events::*;
pub use template::PromptTemplate;
pub use traits::*;
pub use types::*;
