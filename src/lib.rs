#![deny(unused)]
//! Teamflow - LLM multi-agent orchestration.
//!
//! A team of model-driven agents solves a task by exchanging messages over a
//! shared bus, calling tools, and optionally following an SOP graph, while a
//! watcher supervises the run.
//!
//! - [`teamflow_core`]: messages, capability traits, errors, configuration
//! - [`teamflow_governance`]: run budgets and tracing setup
//! - [`teamflow_controller`]: environment, agents, SOP driver, scheduler

pub use teamflow_controller;
pub use teamflow_core;
pub use teamflow_governance;

pub use teamflow_controller::{AgentBuilder, Environment, GraphDriver, Scheduler, Team};
pub use teamflow_core::{config::AppConfig, Error, Result};
