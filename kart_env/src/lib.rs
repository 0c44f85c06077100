//! KartNet Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seams that let the KartNet roles run
//! against either a real clock and in-process channels or the deterministic
//! simulation harness in `kart_sim`.
//!
//! # Core Concept
//!
//! The netcode core never reads a clock or touches a socket directly:
//! - Time (`now()`) comes from a [`KartContext`]
//! - Input samples travel over a reliable, ordered channel ([`ReliableSender`])
//! - Snapshots travel over a latest-value-wins channel ([`StateSyncPublisher`])
//!
//! # Example
//!
//! ```ignore
//! use kart_env::{reliable_channel, state_sync_channel, ReliableReceiver};
//!
//! let (input_tx, mut input_rx) = reliable_channel();
//! let (snapshot_tx, mut snapshot_rx) = state_sync_channel();
//!
//! while let Some((vehicle, sample)) = input_rx.try_recv() {
//!     authority.handle_sample(sample, ctx.now_secs(), &snapshot_tx)?;
//! }
//! ```

mod context;
mod network;
mod types;
mod error;
mod local_channel;
mod system_impl;

pub use context::KartContext;
pub use network::{ReliableReceiver, ReliableSender, StateSyncPublisher, StateSyncSubscriber};
pub use types::VehicleId;
pub use error::EnvError;
pub use local_channel::{
    reliable_channel, state_sync_channel, LocalReliableReceiver, LocalReliableSender,
    LocalStatePublisher, LocalStateSubscriber,
};
pub use system_impl::SystemContext;
