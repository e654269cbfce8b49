//! Asynchronous job orchestration for the cold-chain dispatch planner.
//!
//! This crate runs the planning library inside a tokio process: requests
//! are validated synchronously, jobs are persisted and queued, and a
//! bounded worker pool executes the CPU-bound search on blocking threads so
//! it never starves the submitting side.
//!
//! The thin-handler rule from the HTTP services applies here too: all
//! planning logic lives in `coldroute-lib`; this crate provides only the
//! job lifecycle glue.
//!
//! ```text
//! submit ──▶ validate ──▶ Job(PENDING) ──▶ queue
//!                                            │ worker
//!                                            ▼
//!              RUNNING ── solver + progress sampler + deadline watchdog
//!                 │
//!                 ├── success ──▶ COMPLETED (routes, stops, summary)
//!                 └── error/timeout/cancel ──▶ FAILED (kind + message)
//! ```

#![deny(warnings)]

pub mod logging;
pub mod orchestrator;
pub mod report;
pub mod state;
pub mod worker;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use orchestrator::{PlanAccepted, PlanRequest, SnapshotCounts};
pub use report::{job_status, map_data, violations, JobStatus, MapData, MapRoute, MapStop};
pub use state::DispatchState;
pub use worker::Dispatcher;
