//! The `txnid-server` runtime.
//!
//! ## Structure
//!
//! - [`config`] - CLI/environment settings and their validation.
//! - [`lifecycle`] - Signal handling and the snapshot-and-persist shutdown.
//! - [`service`] - The TCP accept loop, per-connection handler and the
//!   rollover hook that persists progress.
//! - [`startup`] - Resume point recovery and the startup range reservation.
//! - [`telemetry`] - Logging and optional metrics.

pub mod config;
pub mod lifecycle;
pub mod service;
pub mod startup;
pub mod telemetry;

use txnid::TxnIdGenerator;

use crate::server::service::rollover::PersistOnRollover;

/// The generator shared by every connection of a running server.
pub type Generator = TxnIdGenerator<PersistOnRollover>;
