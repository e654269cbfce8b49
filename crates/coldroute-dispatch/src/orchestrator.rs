//! Plan request validation and resolution.
//!
//! A [`PlanRequest`] is the caller-facing input shape. Validation happens
//! here, synchronously, before any job record is created: bad dates,
//! malformed departure times, and unknown depots never reach the worker
//! pool. The resolved output is the library-level [`PlanParameters`] plus
//! the depot the plan runs from.

use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use coldroute_lib::{
    parse_minute_of_day, Depot, DepotId, Error, GeoPoint, JobId, JobState, PlanParameters, Result,
    Strategy, MINUTES_PER_DAY,
};

use crate::state::DispatchState;

/// A request to compute a dispatch plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub plan_date: NaiveDate,
    /// Reference to a stored depot; mutually exclusive with
    /// `depot_location`.
    #[serde(default)]
    pub depot_id: Option<DepotId>,
    /// Ad-hoc depot coordinate with a full-day operating window.
    #[serde(default)]
    pub depot_location: Option<GeoPoint>,
    /// Planned departure, local `HH:MM`.
    pub departure_time: String,
    #[serde(default)]
    pub ambient_temperature: Option<f64>,
    #[serde(default)]
    pub initial_cargo_temperature: Option<f64>,
    #[serde(default)]
    pub time_limit_seconds: Option<u64>,
    #[serde(default)]
    pub strategy: Strategy,
}

/// Counts captured when the job was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotCounts {
    pub shipments: usize,
    pub vehicles: usize,
}

/// Immediate, non-blocking acknowledgment of an accepted plan request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanAccepted {
    pub job_id: JobId,
    pub state: JobState,
    pub snapshot_counts: SnapshotCounts,
}

impl PlanRequest {
    /// Resolve and validate the request against the store and config.
    pub(crate) fn resolve(&self, state: &DispatchState) -> Result<(Depot, PlanParameters)> {
        let config = state.config();

        if self.depot_id.is_some() && self.depot_location.is_some() {
            return Err(Error::validation(
                "provide either depot_id or depot_location, not both",
            ));
        }

        let departure_minute = parse_minute_of_day(&self.departure_time)?;

        if let Some(temp) = self.ambient_temperature {
            if !temp.is_finite() {
                return Err(Error::validation("ambient_temperature must be finite"));
            }
        }
        if let Some(temp) = self.initial_cargo_temperature {
            if !temp.is_finite() {
                return Err(Error::validation(
                    "initial_cargo_temperature must be finite",
                ));
            }
        }

        let requested = self
            .time_limit_seconds
            .unwrap_or(config.solver_time_limit_default);
        if requested == 0 {
            return Err(Error::validation("time_limit_seconds must be positive"));
        }
        let time_limit = Duration::from_secs(requested.min(config.solver_time_limit_max));

        let depot = match (self.depot_id, self.depot_location) {
            (Some(id), None) => state.store().depot(id)?,
            (None, Some(location)) => Depot {
                id: 0,
                name: "request depot".to_string(),
                location,
                open_minute: 0,
                close_minute: MINUTES_PER_DAY - 1,
            },
            (None, None) => state.store().default_depot()?,
            (Some(_), Some(_)) => unreachable!("rejected above"),
        };
        depot.validate()?;

        let params = PlanParameters {
            plan_date: self.plan_date,
            departure_minute,
            ambient_temp: self
                .ambient_temperature
                .unwrap_or(config.default_ambient_temperature),
            initial_cargo_temp: self
                .initial_cargo_temperature
                .unwrap_or(config.default_initial_vehicle_temp),
            time_limit,
            strategy: self.strategy,
        };

        Ok((depot, params))
    }
}
