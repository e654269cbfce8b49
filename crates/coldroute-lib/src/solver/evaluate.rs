//! Route evaluation against the model's dimensions.
//!
//! A candidate stop sequence is simulated against the time, weight, volume,
//! and (optional) labor dimensions. Hard violations (a window that cannot
//! admit the service, capacity overflow, missing the depot horizon)
//! reject the sequence. Soft concerns (labor overage, the conservative
//! temperature estimate) accumulate into a penalty that is added to the
//! route's cost but never rejects it.

use crate::builder::RoutingModel;

/// Scheduled times for one node of an evaluated route.
///
/// `service_start` is where the time-dimension cumul lands: waiting before a
/// window opens is slack between `arrival` and `service_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledStop {
    pub node: usize,
    pub arrival: i64,
    pub service_start: i64,
    pub departure: i64,
}

/// Dimension totals for a feasible route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteEval {
    pub stops: Vec<ScheduledStop>,
    pub distance_m: i64,
    /// Arrival back at the depot, minutes of day.
    pub finish_minute: i64,
    /// Finish minus planned departure, including waiting slack.
    pub duration_min: i64,
    /// Travel plus service minutes, excluding waiting; the labor dimension.
    pub labor_min: i64,
    pub load_weight: i64,
    pub load_volume: i64,
    /// Labor overage and estimated-temperature penalties.
    pub soft_penalty: i64,
}

impl RouteEval {
    /// Distance plus soft penalties; the route's contribution to the
    /// solution cost before fixed and span terms.
    pub fn cost(&self) -> i64 {
        self.distance_m + self.soft_penalty
    }
}

/// Evaluate a stop sequence for a vehicle. Returns `None` when any hard
/// dimension is violated.
pub fn evaluate_route(
    model: &RoutingModel,
    vehicle: usize,
    sequence: &[usize],
) -> Option<RouteEval> {
    let mut load_weight = 0i64;
    let mut load_volume = 0i64;
    for &node in sequence {
        load_weight += model.demand_weight[node];
        load_volume += model.demand_volume[node];
    }
    if load_weight > model.cap_weight[vehicle] || load_volume > model.cap_volume[vehicle] {
        return None;
    }

    let profile = &model.thermal[vehicle];
    let curtain_factor = if profile.has_curtain { 0.5 } else { 1.0 };

    let mut stops = Vec::with_capacity(sequence.len());
    let mut cursor = model.departure_minute;
    let mut previous = 0usize;
    let mut distance_m = 0i64;
    let mut labor_min = 0i64;
    let mut soft_penalty = 0i64;
    let mut cargo_temp = model.initial_temp;

    for &node in sequence {
        let travel = model.matrix.time_min(previous, node);
        let arrival = cursor + travel;
        let service = model.service_min[node];

        let service_start = model.windows[node].earliest_service_start(arrival, service)?;
        let departure = service_start + service;

        distance_m += model.matrix.distance_m(previous, node);
        labor_min += travel + service;

        // Conservative temperature estimate mirroring the tracker; the
        // authoritative verdict happens post-solve.
        let drive_hours = travel as f64 / 60.0;
        let transit_rise = drive_hours * (model.ambient_temp - cargo_temp) * profile.insulation_k;
        let cooling = drive_hours * profile.cooling_rate_per_min;
        let arrival_temp = (cargo_temp + transit_rise + cooling).max(profile.unit_min_temp);
        if arrival_temp > model.temp_ceiling[node] {
            soft_penalty += model.temp_violation_penalty;
        }
        let service_rise =
            (service as f64 / 60.0) * profile.door_coefficient * curtain_factor;
        cargo_temp = arrival_temp + service_rise;

        stops.push(ScheduledStop {
            node,
            arrival,
            service_start,
            departure,
        });
        cursor = departure;
        previous = node;
    }

    let return_travel = model.matrix.time_min(previous, 0);
    let finish_minute = cursor + return_travel;
    if finish_minute > model.horizon_end {
        return None;
    }
    distance_m += model.matrix.distance_m(previous, 0);
    labor_min += return_travel;

    if let Some(labor) = model.labor {
        let overage = labor_min - labor.soft_limit_minutes();
        if overage > 0 {
            let overage_hours = (overage + 59) / 60;
            let base = model.fixed_cost.max(model.distance_bound);
            soft_penalty += base.saturating_mul(overage_hours.max(1));
        }
    }

    Some(RouteEval {
        stops,
        distance_m,
        finish_minute,
        duration_min: finish_minute - model.departure_minute,
        labor_min,
        load_weight,
        load_volume,
        soft_penalty,
    })
}
