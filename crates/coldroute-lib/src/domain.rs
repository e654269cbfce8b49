//! Data model for the cold-chain dispatch planner.
//!
//! Depots, vehicles, and shipments are the immutable inputs captured in a
//! [`PlanSnapshot`] at job start. Routes and stops are the solve outputs,
//! owned by a [`Job`]. Shipments and vehicles are only referenced by id from
//! routes; there are no back-pointers.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::geo::GeoPoint;
use crate::thermal::ThermalProfile;

pub type VehicleId = i64;
pub type ShipmentId = i64;
pub type DepotId = i64;
pub type RouteId = i64;
pub type JobId = Uuid;

/// Minutes in a day; the upper bound for minute-of-day values.
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Parse a local `HH:MM` string into a minute-of-day value.
pub fn parse_minute_of_day(text: &str) -> Result<u32> {
    let (hours, minutes) = text
        .split_once(':')
        .ok_or_else(|| Error::validation(format!("expected HH:MM, got '{text}'")))?;
    let hours: u32 = hours
        .parse()
        .map_err(|_| Error::validation(format!("invalid hour in '{text}'")))?;
    let minutes: u32 = minutes
        .parse()
        .map_err(|_| Error::validation(format!("invalid minute in '{text}'")))?;
    if hours >= 24 || minutes >= 60 {
        return Err(Error::validation(format!("time of day out of range: '{text}'")));
    }
    Ok(hours * 60 + minutes)
}

/// Render a minute-of-day value as `HH:MM`.
pub fn format_minute_of_day(minute: i64) -> String {
    let minute = minute.clamp(0, i64::from(MINUTES_PER_DAY) - 1);
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

/// The single depot a plan runs from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Depot {
    pub id: DepotId,
    pub name: String,
    pub location: GeoPoint,
    /// Operating window; defines the planning horizon.
    pub open_minute: u32,
    pub close_minute: u32,
}

impl Depot {
    pub fn validate(&self) -> Result<()> {
        if self.open_minute >= self.close_minute || self.close_minute > MINUTES_PER_DAY {
            return Err(Error::validation(format!(
                "depot operating window invalid: {}..{}",
                self.open_minute, self.close_minute
            )));
        }
        Ok(())
    }
}

/// A refrigerated vehicle in the fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub name: String,
    /// Payload capacity in kilograms.
    pub weight_capacity: f64,
    /// Payload capacity in cubic meters.
    pub volume_capacity: f64,
    /// Insulation coefficient K.
    pub insulation_k: f64,
    /// Door coefficient C.
    pub door_coefficient: f64,
    pub has_curtain: bool,
    /// Active cooling rate in °C per minute, zero or negative.
    pub cooling_rate: f64,
    /// Lowest temperature the refrigeration unit can hold.
    pub min_temp: f64,
    pub available: bool,
}

impl Vehicle {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            (self.weight_capacity, "weight_capacity"),
            (self.volume_capacity, "volume_capacity"),
            (self.insulation_k, "insulation_k"),
            (self.door_coefficient, "door_coefficient"),
        ];
        for (value, field) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::validation(format!(
                    "vehicle {}: {field} must be a finite positive number",
                    self.id
                )));
            }
        }
        if !self.cooling_rate.is_finite() || self.cooling_rate > 0.0 {
            return Err(Error::validation(format!(
                "vehicle {}: cooling_rate must be zero or negative",
                self.id
            )));
        }
        if !self.min_temp.is_finite() {
            return Err(Error::validation(format!(
                "vehicle {}: min_temp must be finite",
                self.id
            )));
        }
        Ok(())
    }

    /// The thermal parameters used for temperature projection.
    pub fn thermal_profile(&self) -> ThermalProfile {
        ThermalProfile {
            insulation_k: self.insulation_k,
            door_coefficient: self.door_coefficient,
            has_curtain: self.has_curtain,
            cooling_rate_per_min: self.cooling_rate,
            unit_min_temp: self.min_temp,
        }
    }
}

/// A single delivery interval in minutes of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: u32,
    pub end: u32,
}

impl TimeWindow {
    pub fn new(start: u32, end: u32) -> Result<Self> {
        if start >= end || end > MINUTES_PER_DAY {
            return Err(Error::validation(format!(
                "time window invalid: {start}..{end}"
            )));
        }
        Ok(Self { start, end })
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            format_minute_of_day(i64::from(self.start)),
            format_minute_of_day(i64::from(self.end))
        )
    }
}

/// One or two disjoint delivery windows per day, kept in ascending order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TimeWindow>", into = "Vec<TimeWindow>")]
pub struct TimeWindows {
    windows: Vec<TimeWindow>,
}

impl TimeWindows {
    pub fn new(mut windows: Vec<TimeWindow>) -> Result<Self> {
        if windows.is_empty() || windows.len() > 2 {
            return Err(Error::validation(format!(
                "a shipment carries one or two delivery windows, got {}",
                windows.len()
            )));
        }
        windows.sort_by_key(|w| w.start);
        if windows.len() == 2 && windows[0].end > windows[1].start {
            return Err(Error::validation(format!(
                "delivery windows overlap: {} and {}",
                windows[0], windows[1]
            )));
        }
        Ok(Self { windows })
    }

    pub fn single(start: u32, end: u32) -> Result<Self> {
        Self::new(vec![TimeWindow::new(start, end)?])
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeWindow> {
        self.windows.iter()
    }

    pub fn as_slice(&self) -> &[TimeWindow] {
        &self.windows
    }

    /// End of the latest window; arrivals past this point are unservable.
    pub fn latest_end(&self) -> u32 {
        self.windows.last().map(|w| w.end).unwrap_or(0)
    }

    /// Earliest service start admitting the whole service, given an arrival
    /// minute. Waiting before a window opens is allowed; the service must fit
    /// entirely inside one window.
    pub fn earliest_service_start(&self, arrival: i64, service_minutes: i64) -> Option<i64> {
        for window in &self.windows {
            let start = arrival.max(i64::from(window.start));
            if start + service_minutes <= i64::from(window.end) {
                return Some(start);
            }
        }
        None
    }
}

impl TryFrom<Vec<TimeWindow>> for TimeWindows {
    type Error = Error;

    fn try_from(windows: Vec<TimeWindow>) -> Result<Self> {
        Self::new(windows)
    }
}

impl From<TimeWindows> for Vec<TimeWindow> {
    fn from(value: TimeWindows) -> Self {
        value.windows
    }
}

/// Service-level agreement tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlaTier {
    /// Time windows and temperature are hard; the shipment cannot be dropped.
    Strict,
    /// Droppable at a priority-scaled penalty.
    Standard,
}

impl SlaTier {
    pub fn as_str(self) -> &'static str {
        match self {
            SlaTier::Strict => "STRICT",
            SlaTier::Standard => "STANDARD",
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        match text {
            "STRICT" => Ok(SlaTier::Strict),
            "STANDARD" => Ok(SlaTier::Standard),
            other => Err(Error::validation(format!("unknown SLA tier '{other}'"))),
        }
    }
}

/// Shipment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Pending,
    Assigned,
}

impl ShipmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ShipmentStatus::Pending => "PENDING",
            ShipmentStatus::Assigned => "ASSIGNED",
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        match text {
            "PENDING" => Ok(ShipmentStatus::Pending),
            "ASSIGNED" => Ok(ShipmentStatus::Assigned),
            other => Err(Error::validation(format!(
                "unknown shipment status '{other}'"
            ))),
        }
    }
}

/// A delivery order with its thermal and timing requirements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub name: String,
    pub location: GeoPoint,
    /// Weight in kilograms.
    pub weight: f64,
    /// Volume in cubic meters.
    pub volume: f64,
    pub windows: TimeWindows,
    pub service_minutes: u32,
    /// Cargo must arrive at or below this temperature.
    pub temp_ceiling: f64,
    /// Optional lower bound for freeze-sensitive cargo.
    pub temp_floor: Option<f64>,
    pub sla: SlaTier,
    /// 0..=100; higher priority resists being dropped.
    pub priority: u8,
    pub status: ShipmentStatus,
}

impl Shipment {
    pub fn validate(&self) -> Result<()> {
        let positive = [(self.weight, "weight"), (self.volume, "volume")];
        for (value, field) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::validation(format!(
                    "shipment {}: {field} must be a finite positive number",
                    self.id
                )));
            }
        }
        if !self.temp_ceiling.is_finite() {
            return Err(Error::validation(format!(
                "shipment {}: temp_ceiling must be finite",
                self.id
            )));
        }
        if let Some(floor) = self.temp_floor {
            if !floor.is_finite() || floor > self.temp_ceiling {
                return Err(Error::validation(format!(
                    "shipment {}: temp_floor must be finite and below the ceiling",
                    self.id
                )));
            }
        }
        if self.priority > 100 {
            return Err(Error::validation(format!(
                "shipment {}: priority must be within 0..=100",
                self.id
            )));
        }
        Ok(())
    }
}

/// Immutable solve input captured at job start.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSnapshot {
    pub depot: Depot,
    pub vehicles: Vec<Vehicle>,
    pub shipments: Vec<Shipment>,
}

/// Optimization strategy requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    /// Fleet size dominates distance (lexicographic default).
    #[default]
    MinimizeVehicles,
    /// Distance only; vehicles are free.
    MinimizeDistance,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::MinimizeVehicles => "MINIMIZE_VEHICLES",
            Strategy::MinimizeDistance => "MINIMIZE_DISTANCE",
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        match text {
            "MINIMIZE_VEHICLES" => Ok(Strategy::MinimizeVehicles),
            "MINIMIZE_DISTANCE" => Ok(Strategy::MinimizeDistance),
            other => Err(Error::validation(format!("unknown strategy '{other}'"))),
        }
    }
}

/// Normalized planning parameters passed through builder, solver, and
/// assembler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanParameters {
    pub plan_date: NaiveDate,
    pub departure_minute: u32,
    pub ambient_temp: f64,
    pub initial_cargo_temp: f64,
    pub time_limit: Duration,
    pub strategy: Strategy,
}

/// One delivery on a route, with predicted temperatures.
///
/// `arrival_minute` is the start of service at the dock; any waiting before
/// a window opens happens beforehand, so `departure − arrival` equals the
/// shipment's service duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    /// 1-based, contiguous per route.
    pub sequence: u32,
    pub shipment_id: ShipmentId,
    pub arrival_minute: i64,
    pub departure_minute: i64,
    pub transit_rise: f64,
    pub service_rise: f64,
    pub cooling_applied: f64,
    pub arrival_temp: f64,
    pub departure_temp: f64,
    pub feasible: bool,
}

/// An ordered vehicle route produced by a completed solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub vehicle_id: VehicleId,
    pub stops: Vec<Stop>,
    pub total_distance_m: i64,
    pub total_duration_min: i64,
    pub initial_temp: f64,
    pub final_temp: f64,
    pub max_temp: f64,
    pub is_feasible: bool,
    /// Monotonically increasing optimistic-lock counter.
    pub version: i64,
}

/// Aggregate figures for a completed plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub total_distance_m: i64,
    pub total_duration_min: i64,
    pub vehicles_used: usize,
    pub shipments_assigned: usize,
    pub shipments_unassigned: usize,
    pub is_feasible: bool,
}

/// Job lifecycle state; transitions are monotone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        match text {
            "PENDING" => Ok(JobState::Pending),
            "RUNNING" => Ok(JobState::Running),
            "COMPLETED" => Ok(JobState::Completed),
            "FAILED" => Ok(JobState::Failed),
            other => Err(Error::validation(format!("unknown job state '{other}'"))),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job ended in FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    Timeout,
    Infeasible,
    Cancelled,
    Internal,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Timeout => "TIMEOUT",
            FailureKind::Infeasible => "INFEASIBLE",
            FailureKind::Cancelled => "CANCELLED",
            FailureKind::Internal => "INTERNAL",
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        match text {
            "TIMEOUT" => Ok(FailureKind::Timeout),
            "INFEASIBLE" => Ok(FailureKind::Infeasible),
            "CANCELLED" => Ok(FailureKind::Cancelled),
            "INTERNAL" => Ok(FailureKind::Internal),
            other => Err(Error::validation(format!("unknown failure kind '{other}'"))),
        }
    }
}

/// A persisted planning job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub plan_date: NaiveDate,
    pub state: JobState,
    /// 0..=100, monotone non-decreasing.
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: Option<PlanSummary>,
    pub error_kind: Option<FailureKind>,
    pub error_message: Option<String>,
}

impl Job {
    /// Create a fresh PENDING job record.
    pub fn pending(plan_date: NaiveDate) -> Self {
        Self {
            id: Uuid::now_v7(),
            plan_date,
            state: JobState::Pending,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            summary: None,
            error_kind: None,
            error_message: None,
        }
    }
}
