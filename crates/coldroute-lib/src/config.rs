//! Process-wide planner configuration.
//!
//! Loaded once at startup and treated as immutable afterwards. Every knob
//! has a production default; `from_env` overrides individual values from
//! `COLDROUTE_*` environment variables the way the services read their
//! configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Immutable planner configuration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Converts the distance matrix into the travel-time matrix.
    pub average_speed_kmh: f64,
    /// Fallback when the request omits the ambient temperature.
    pub default_ambient_temperature: f64,
    /// Fallback when the request omits the initial cargo temperature.
    pub default_initial_vehicle_temp: f64,
    /// Flat cost charged when a vehicle is used; floor for the fleet lever.
    pub vehicle_fixed_cost: i64,
    /// Soft penalty applied when the solver's conservative temperature
    /// estimate predicts a ceiling breach at a stop.
    pub temp_violation_penalty: i64,
    /// Base unit of the priority-scaled drop penalty for STANDARD shipments.
    pub late_delivery_penalty: i64,
    /// Effectively infinite penalty encoding hard constraints via costs.
    pub infeasible_cost: i64,
    /// Seconds, used when the request omits a time limit.
    pub solver_time_limit_default: u64,
    /// Seconds, upper clamp on requested time limits.
    pub solver_time_limit_max: u64,
    /// Toggles the labor dimension and its soft bound.
    pub enable_labor_dimension: bool,
    pub driver_daily_limit_minutes: i64,
    pub driver_weekly_limit_minutes: i64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            average_speed_kmh: 30.0,
            default_ambient_temperature: 30.0,
            default_initial_vehicle_temp: -5.0,
            vehicle_fixed_cost: 100_000,
            temp_violation_penalty: 50_000,
            late_delivery_penalty: 10_000,
            infeasible_cost: 1_000_000_000,
            solver_time_limit_default: 300,
            solver_time_limit_max: 900,
            enable_labor_dimension: false,
            driver_daily_limit_minutes: 600,
            driver_weekly_limit_minutes: 2_640,
        }
    }
}

impl PlannerConfig {
    /// Load configuration from the environment, starting from defaults.
    ///
    /// Unset variables keep their default; set variables that fail to parse
    /// are a [`Error::Validation`] so a bad deployment fails at startup
    /// rather than mid-solve.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        read_f64("COLDROUTE_AVERAGE_SPEED_KMH", &mut config.average_speed_kmh)?;
        read_f64(
            "COLDROUTE_DEFAULT_AMBIENT_TEMPERATURE",
            &mut config.default_ambient_temperature,
        )?;
        read_f64(
            "COLDROUTE_DEFAULT_INITIAL_VEHICLE_TEMP",
            &mut config.default_initial_vehicle_temp,
        )?;
        read_i64("COLDROUTE_VEHICLE_FIXED_COST", &mut config.vehicle_fixed_cost)?;
        read_i64(
            "COLDROUTE_TEMP_VIOLATION_PENALTY",
            &mut config.temp_violation_penalty,
        )?;
        read_i64(
            "COLDROUTE_LATE_DELIVERY_PENALTY",
            &mut config.late_delivery_penalty,
        )?;
        read_i64("COLDROUTE_INFEASIBLE_COST", &mut config.infeasible_cost)?;
        read_u64(
            "COLDROUTE_SOLVER_TIME_LIMIT_DEFAULT",
            &mut config.solver_time_limit_default,
        )?;
        read_u64(
            "COLDROUTE_SOLVER_TIME_LIMIT_MAX",
            &mut config.solver_time_limit_max,
        )?;
        read_bool(
            "COLDROUTE_ENABLE_LABOR_DIMENSION",
            &mut config.enable_labor_dimension,
        )?;
        read_i64(
            "COLDROUTE_DRIVER_DAILY_LIMIT_MINUTES",
            &mut config.driver_daily_limit_minutes,
        )?;
        read_i64(
            "COLDROUTE_DRIVER_WEEKLY_LIMIT_MINUTES",
            &mut config.driver_weekly_limit_minutes,
        )?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.average_speed_kmh.is_finite() || self.average_speed_kmh <= 0.0 {
            return Err(Error::validation(format!(
                "average_speed_kmh must be positive, got {}",
                self.average_speed_kmh
            )));
        }
        if self.solver_time_limit_default == 0
            || self.solver_time_limit_default > self.solver_time_limit_max
        {
            return Err(Error::validation(format!(
                "solver time limits inconsistent: default {} vs max {}",
                self.solver_time_limit_default, self.solver_time_limit_max
            )));
        }
        for (value, field) in [
            (self.vehicle_fixed_cost, "vehicle_fixed_cost"),
            (self.temp_violation_penalty, "temp_violation_penalty"),
            (self.late_delivery_penalty, "late_delivery_penalty"),
            (self.infeasible_cost, "infeasible_cost"),
            (self.driver_daily_limit_minutes, "driver_daily_limit_minutes"),
            (
                self.driver_weekly_limit_minutes,
                "driver_weekly_limit_minutes",
            ),
        ] {
            if value <= 0 {
                return Err(Error::validation(format!("{field} must be positive")));
            }
        }
        Ok(())
    }
}

fn read_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_f64(name: &str, slot: &mut f64) -> Result<()> {
    if let Some(raw) = read_var(name) {
        *slot = raw
            .parse()
            .map_err(|_| Error::validation(format!("{name} is not a number: '{raw}'")))?;
    }
    Ok(())
}

fn read_i64(name: &str, slot: &mut i64) -> Result<()> {
    if let Some(raw) = read_var(name) {
        *slot = raw
            .parse()
            .map_err(|_| Error::validation(format!("{name} is not an integer: '{raw}'")))?;
    }
    Ok(())
}

fn read_u64(name: &str, slot: &mut u64) -> Result<()> {
    if let Some(raw) = read_var(name) {
        *slot = raw
            .parse()
            .map_err(|_| Error::validation(format!("{name} is not an integer: '{raw}'")))?;
    }
    Ok(())
}

fn read_bool(name: &str, slot: &mut bool) -> Result<()> {
    if let Some(raw) = read_var(name) {
        *slot = match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                return Err(Error::validation(format!(
                    "{name} is not a boolean: '{raw}'"
                )))
            }
        };
    }
    Ok(())
}
