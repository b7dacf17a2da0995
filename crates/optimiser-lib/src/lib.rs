//! Controller library for closed-loop cluster energy optimisation
//!
//! This crate provides the core functionality for:
//! - Observing nodes, pods and power draw from Kubernetes and Prometheus
//! - Encoding snapshots into fixed-width feature vectors
//! - Hierarchical family-then-target action selection
//! - Executing actions and measuring their power effect
//! - The periodic control loop, health checks and observability

pub mod actions;
pub mod cluster;
pub mod controller;
pub mod encoder;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod policy;

pub use error::ControllerError;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ControllerMetrics, StructuredLogger, TelemetrySink};
