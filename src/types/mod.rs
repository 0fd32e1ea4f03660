//! Core types for the actor scheduler.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (ActorId, TimerId, ConditionId)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for the worker pool and logging

mod config;
mod errors;
mod ids;

pub use config::{Config, IdleConfig, ObservabilityConfig, SchedulerConfig};
pub use errors::{Error, Result};
pub use ids::{ActorId, ConditionId, TimerId};
