//! Axum HTTP master for the FFarm transcoding fleet.
//!
//! This crate provides:
//! - The in-memory job store with the atomic claim contract
//! - The worker registry with liveness tracking
//! - The lease coordinator (the only writer of job and worker records)
//! - Folder scanning and encoding profiles
//! - The REST surface workers and operators talk to
//! - A background reaper that reclaims work from vanished workers

pub mod config;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod profiles;
pub mod reaper;
pub mod registry;
pub mod routes;
pub mod scan;
pub mod state;
pub mod store;

pub use config::MasterConfig;
pub use coordinator::{LeaseCoordinator, LeaseDecision};
pub use error::{MasterError, MasterResult};
pub use reaper::StaleWorkerReaper;
pub use registry::WorkerRegistry;
pub use routes::create_router;
pub use state::AppState;
pub use store::JobStore;
