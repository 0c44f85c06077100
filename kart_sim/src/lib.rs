//! KartNet Deterministic Simulation Harness
//!
//! Runs one replicated vehicle end to end inside a single process: a
//! controller predicting it, an authority validating and simulating it, and
//! observers smoothing it, all wired through simulated links.
//!
//! # Core Principle
//!
//! Every source of non-determinism is pinned down:
//! - **Time**: a virtual clock advanced only by [`SimWorld::tick`]
//! - **Network**: links with fixed latency and seeded packet loss
//! - **Randomness**: all entropy derived from a single 64-bit seed
//!
//! The same seed therefore replays the same run bit for bit, which is what
//! lets the scenarios assert that an honest controller's prediction never
//! needs correcting.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        SimWorld                           │
//! │  ┌──────────────────────────────────────────────────┐     │
//! │  │ SimContext (virtual clock)                       │     │
//! │  └──────────────────────────────────────────────────┘     │
//! │  ┌────────────┐  SimReliableLink   ┌────────────┐         │
//! │  │ Controller │───────────────────►│ Authority  │         │
//! │  │            │◄─── SimStateLink ──│            │         │
//! │  └────────────┘                    └─────┬──────┘         │
//! │                     SimStateLink x N     │                │
//! │  ┌────────────┐◄─────────────────────────┘                │
//! │  │ Observers  │                                           │
//! │  └────────────┘          Arena (walls)                    │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use kart_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::Baseline);
//! assert!(result.passed);
//! ```

mod arena;
mod context;
mod exporter;
mod network;
mod runner;
mod world;
pub mod scenarios;

pub use arena::Arena;
pub use context::SimContext;
pub use exporter::{PoseRecord, SimEvent, SimExport, SimFrame};
pub use network::{LinkConditions, LinkStats, SimBroadcast, SimReliableLink, SimStateLink};
pub use runner::{ScenarioResult, ScenarioRunner};
pub use world::{SimConfig, SimWorld};
