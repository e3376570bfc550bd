//! # Herd Daemon
//!
//! Per-node daemon lifecycle contract and handle.
//!
//! This crate provides:
//! - The [`RemoteProcess`] trait — the per-node contract consumed by the
//!   fleet controller
//! - [`RemoteDaemonHandle`] — the implementation: an explicit state machine
//!   driven through a swappable remote-execution mechanism
//!
//! **Architecture:**
//! ```text
//! FleetController (orchestration)
//!       ↓ uses
//! RemoteProcess trait (per-node contract)
//!       ↓ implemented by
//! RemoteDaemonHandle (state machine + confirmation)
//!       ↓ delegates remote I/O to
//! RemoteExecutor (ssh, agent RPC, ...)
//! ```

pub mod handle;
pub mod remote_process;

pub use handle::RemoteDaemonHandle;
pub use remote_process::{HandleOptions, RemoteProcess};
