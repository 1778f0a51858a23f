//! Shared data models for the FFarm transcoding fleet.
//!
//! This crate holds the entities exchanged between the master and the
//! workers: jobs and their state machine, worker records and their
//! status, and the JSON wire protocol for the lease/heartbeat/report
//! cycle.

pub mod job;
pub mod protocol;
pub mod worker;

pub use job::{Job, JobState, NewJob};
pub use protocol::{
    CompletionReport, HeartbeatRequest, HeartbeatResponse, LeaseAction, LeaseRequest,
    LeaseResponse, ProgressReport,
};
pub use worker::{Worker, WorkerStatus};
