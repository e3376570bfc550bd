//! # Herd Fleet Management
//!
//! Fleet-level orchestration of remote daemons.
//!
//! This crate provides:
//! - [`FleetController`] — composes per-node handles into fleet operations
//!   (start-all, stop-all, start/stop-by-role) with parallel fan-out and
//!   complete per-host aggregates
//! - Cluster configuration loading and validation (YAML)

pub mod config;
pub mod controller;

pub use config::ClusterConfig;
pub use controller::{
    ControllerOptions, DaemonInfo, FleetController, FleetOp, FleetOutcome, HostOutcome,
};
