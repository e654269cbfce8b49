//! Cargo temperature projection along a planned route.
//!
//! This module predicts the cargo temperature at every stop of a route from
//! the vehicle's insulation and cooling characteristics, and decides whether
//! each delivery stays under its shipment's temperature ceiling.
//!
//! # Model
//!
//! For each leg (drive to a stop, then service at its dock):
//!
//! ```text
//! ΔT_drive = t_drive · (T_ambient − T_current) · K
//! ΔT_cool  = t_drive · R
//! T_arrival = max(T_current + ΔT_drive + ΔT_cool, T_unit_min)
//! ΔT_svc   = t_svc · C · (1 − 0.5 · curtain)
//! T_depart = T_arrival + ΔT_svc
//! ```
//!
//! Where `K` is the insulation coefficient, `C` the door coefficient,
//! `curtain` ∈ {0, 1}, and `R` the active cooling rate (negative). The
//! refrigeration unit cannot pull the cargo below its rated minimum, so
//! arrival temperatures are floored at `T_unit_min`.
//!
//! All time factors are **hours**. Callers hold schedules in minutes; the
//! projection converts internally and the public inputs are minutes to keep
//! the unit mismatch out of call sites.
//!
//! The projection is pure and deterministic: re-running it over a stored
//! stop sequence reproduces the stored temperatures exactly.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tolerance for ceiling comparisons, absorbing float noise from persisted
/// round trips.
const CEILING_EPSILON: f64 = 1e-9;

/// Vehicle parameters that drive the projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThermalProfile {
    /// Insulation coefficient K relating the ambient gradient to transit rise.
    pub insulation_k: f64,
    /// Door coefficient C for service-time rise from cargo-door openings.
    pub door_coefficient: f64,
    /// Strip curtain halves the service rise when present.
    pub has_curtain: bool,
    /// Active refrigeration rate in °C per minute, zero or negative.
    pub cooling_rate_per_min: f64,
    /// Lowest temperature the refrigeration unit can hold.
    pub unit_min_temp: f64,
}

impl ThermalProfile {
    fn validate(&self) -> Result<()> {
        if !self.insulation_k.is_finite() || self.insulation_k < 0.0 {
            return Err(Error::ThermalModel(format!(
                "insulation coefficient must be non-negative, got {}",
                self.insulation_k
            )));
        }
        if !self.door_coefficient.is_finite() || self.door_coefficient <= 0.0 {
            return Err(Error::ThermalModel(format!(
                "door coefficient must be positive, got {}",
                self.door_coefficient
            )));
        }
        if !self.cooling_rate_per_min.is_finite() || self.cooling_rate_per_min > 0.0 {
            return Err(Error::ThermalModel(format!(
                "cooling rate must be zero or negative, got {}",
                self.cooling_rate_per_min
            )));
        }
        if !self.unit_min_temp.is_finite() {
            return Err(Error::ThermalModel(
                "unit minimum temperature must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// One leg of a route: the drive to a stop and the service performed there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteLeg {
    /// Drive time to the stop in minutes (waiting excluded; the cargo door
    /// stays shut while parked).
    pub drive_minutes: f64,
    /// Door-open service time at the stop in minutes.
    pub service_minutes: f64,
    /// The shipment's temperature ceiling at this stop.
    pub temp_ceiling: f64,
}

/// Projected temperatures for a single stop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopProjection {
    pub transit_rise: f64,
    pub cooling_applied: f64,
    pub service_rise: f64,
    pub arrival_temp: f64,
    pub departure_temp: f64,
    pub within_ceiling: bool,
}

/// Projection over a whole route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteProjection {
    pub stops: Vec<StopProjection>,
    pub initial_temp: f64,
    pub final_temp: f64,
    pub max_temp: f64,
    /// Conjunction of the per-stop ceiling verdicts.
    pub is_feasible: bool,
}

/// Project cargo temperatures along a route.
///
/// # Errors
///
/// Returns [`Error::ThermalModel`] when the profile or the temperature
/// inputs are out of their physical domain.
pub fn project_route(
    profile: &ThermalProfile,
    ambient_temp: f64,
    initial_temp: f64,
    legs: &[RouteLeg],
) -> Result<RouteProjection> {
    profile.validate()?;
    if !ambient_temp.is_finite() || !initial_temp.is_finite() {
        return Err(Error::ThermalModel(
            "ambient and initial temperatures must be finite".to_string(),
        ));
    }

    let curtain_factor = if profile.has_curtain { 0.5 } else { 1.0 };

    let mut current = initial_temp;
    let mut max_temp = initial_temp;
    let mut stops = Vec::with_capacity(legs.len());
    let mut feasible = true;

    for leg in legs {
        if leg.drive_minutes < 0.0 || leg.service_minutes < 0.0 {
            return Err(Error::ThermalModel(
                "leg durations must be non-negative".to_string(),
            ));
        }

        let drive_hours = leg.drive_minutes / 60.0;
        let service_hours = leg.service_minutes / 60.0;

        let transit_rise = drive_hours * (ambient_temp - current) * profile.insulation_k;
        let raw_cooling = drive_hours * profile.cooling_rate_per_min;
        let arrival_temp = (current + transit_rise + raw_cooling).max(profile.unit_min_temp);
        // Record the cooling that actually took effect after the unit floor.
        let cooling_applied = arrival_temp - current - transit_rise;

        let service_rise = service_hours * profile.door_coefficient * curtain_factor;
        let departure_temp = arrival_temp + service_rise;

        let within_ceiling = arrival_temp <= leg.temp_ceiling + CEILING_EPSILON;
        feasible &= within_ceiling;

        max_temp = max_temp.max(arrival_temp).max(departure_temp);
        current = departure_temp;

        stops.push(StopProjection {
            transit_rise,
            cooling_applied,
            service_rise,
            arrival_temp,
            departure_temp,
            within_ceiling,
        });
    }

    Ok(RouteProjection {
        stops,
        initial_temp,
        final_temp: current,
        max_temp,
        is_feasible: feasible,
    })
}
