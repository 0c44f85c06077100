//! KartNet Core - client prediction and server reconciliation for a simulated kart
//!
//! This library solves three problems of networked vehicle physics:
//! 1. **Input Latency**: the controller predicts its own motion through a
//!    deterministic integrator and replays unacknowledged input on top of
//!    every authoritative snapshot
//! 2. **Cheating**: the authority validates control ranges and refuses
//!    samples that claim more time than has actually elapsed
//! 3. **Jitter**: observers smooth sparse snapshots with a cubic Hermite
//!    segment and slerp, keeping motion C1 continuous
//!
//! # Roles
//!
//! Each instance picks one role per vehicle at setup:
//! - [`Controller`] - Local Predictor + Reconciler
//! - [`Authority`] - validation and canonical simulation
//! - [`Observer`] - Remote Smoother

pub mod authority;
pub mod config;
pub mod controller;
pub mod kinematics;
pub mod metrics;
pub mod observer;
pub mod sample_log;
pub mod spline;
pub mod types;

// Re-export key types for convenience
pub use authority::{Authority, ValidationError};
pub use config::{ConfigError, VehicleConstants};
pub use controller::{Controller, Reconciliation};
pub use kinematics::{advance, CollisionQuery, MoveOutcome, OpenGround};
pub use metrics::ReplicationMetrics;
pub use observer::{Observer, MIN_SMOOTHING_SPAN};
pub use sample_log::{PendingSampleLog, SampleLogError};
pub use spline::HermiteSpline;
pub use types::{
    AuthoritativeSnapshot, ControlInput, InputSample, KinematicState, PresentationFrame, Transform,
};
