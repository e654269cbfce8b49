//! Cold-chain dispatch planning library.
//!
//! This crate exposes the planning core: snapshot loading and persistence,
//! the canonical routing model, the two-phase routing search, the thermal
//! feasibility tracker, and plan assembly. Higher-level consumers (the
//! orchestrator, the CLI) should only depend on the functions exported here
//! instead of reimplementing behavior.
//!
//! # Planning pipeline
//!
//! A plan run walks five stages, all pure except the store edges:
//!
//! 1. **Snapshot**: [`Store`] reads the depot, available vehicles, and
//!    pending shipments under one short transaction.
//! 2. **Prescreen**: [`prescreen`] excludes shipments no vehicle can serve
//!    (unreachable windows, direct-drive ceiling breaches) and records
//!    their diagnostics.
//! 3. **Model**: [`build_model`] normalizes the remainder into integer
//!    matrices, demands, windows, and cost levers.
//! 4. **Search**: [`solve`] runs parallel cheapest insertion plus guided
//!    local search under a deadline and cancellation flag.
//! 5. **Assemble**: [`assemble_plan`] schedules stops, runs the thermal
//!    tracker for the authoritative temperature verdicts, classifies
//!    unassigned shipments, and emits the summary; [`Store::complete_job`]
//!    persists everything atomically.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use coldroute_lib::{
//!     assemble_plan, build_model, prescreen, solve, PlannerConfig, PlanParameters,
//!     PlanSnapshot, SolveOptions, Strategy,
//! };
//!
//! # fn run(snapshot: PlanSnapshot) -> coldroute_lib::Result<()> {
//! let config = PlannerConfig::default();
//! let params = PlanParameters {
//!     plan_date: chrono::NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
//!     departure_minute: 480,
//!     ambient_temp: 30.0,
//!     initial_cargo_temp: -5.0,
//!     time_limit: Duration::from_secs(30),
//!     strategy: Strategy::MinimizeVehicles,
//! };
//!
//! let screen = prescreen(&snapshot, &params, &config);
//! let filtered = PlanSnapshot {
//!     depot: snapshot.depot.clone(),
//!     vehicles: snapshot.vehicles.clone(),
//!     shipments: screen.solvable.clone(),
//! };
//! let model = build_model(&filtered, &params, &config)?;
//! let assignment = solve(&model, &SolveOptions::new(params.time_limit))?;
//! let plan = assemble_plan(&filtered, &model, &assignment, screen.excluded, &params)?;
//! println!("routes: {}", plan.routes.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Error handling
//!
//! All fallible operations return [`Result<T, Error>`](Result). Hard
//! failures carry a kind the orchestrator maps onto job outcomes:
//! validation and precondition errors surface synchronously, solver
//! timeouts and infeasibility fail the job, and [`Error::Conflict`] marks a
//! stale optimistic route update the caller may retry.

#![deny(warnings)]

pub mod assemble;
pub mod builder;
pub mod config;
pub mod domain;
pub mod error;
pub mod geo;
pub mod solver;
pub mod store;
pub mod thermal;

pub use assemble::{
    assemble_plan, prescreen, AssembledPlan, Diagnostic, Prescreen, TemperatureViolation,
    UnassignedCause, UnassignedShipment, ViolationsReport,
};
pub use builder::{build_model, LaborDimension, Node, NodeKind, RoutingModel};
pub use config::PlannerConfig;
pub use domain::{
    format_minute_of_day, parse_minute_of_day, Depot, DepotId, FailureKind, Job, JobId, JobState,
    PlanParameters, PlanSnapshot, PlanSummary, Route, RouteId, Shipment, ShipmentId,
    ShipmentStatus, SlaTier, Stop, Strategy, TimeWindow, TimeWindows, Vehicle, VehicleId,
    MINUTES_PER_DAY,
};
pub use error::{Error, Result};
pub use geo::{GeoPoint, TravelMatrix, EARTH_RADIUS_KM};
pub use solver::{
    evaluate_route, solve, AssignedRoute, Assignment, RouteEval, ScheduledStop, SolveOptions,
};
pub use store::Store;
pub use thermal::{project_route, RouteLeg, RouteProjection, StopProjection, ThermalProfile};
