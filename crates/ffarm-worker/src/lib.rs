//! Transcoding worker for the FFarm fleet.
//!
//! This crate provides:
//! - The HTTP client for the master's lease/heartbeat/report API
//! - The execution loop that turns leases into monitored transcodes
//! - Worker configuration

pub mod client;
pub mod config;
pub mod error;
pub mod executor;

pub use client::MasterClient;
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::WorkerLoop;
