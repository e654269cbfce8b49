//! Canonical routing model built from a plan snapshot.
//!
//! The builder normalizes the depot, fleet, and shipment snapshot into dense
//! node-indexed arrays: distance and time matrices, integer demand vectors,
//! per-node window sets, and the cost levers (per-vehicle fixed cost,
//! per-shipment drop penalty) that encode the lexicographic objective for
//! the integer-cost search. Node 0 is always the depot; shipments map
//! one-to-one onto nodes 1..=n in snapshot order.

use crate::config::PlannerConfig;
use crate::domain::{
    PlanParameters, PlanSnapshot, ShipmentId, SlaTier, Strategy, TimeWindows, VehicleId,
};
use crate::error::{Error, Result};
use crate::geo::TravelMatrix;
use crate::thermal::ThermalProfile;

/// Node classification within the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Depot,
    Pickup,
}

/// A model node; pickups back-reference their shipment.
#[derive(Debug, Clone)]
pub struct Node {
    pub index: usize,
    pub kind: NodeKind,
    pub shipment_id: Option<ShipmentId>,
}

/// Labor-dimension limits, present when the feature is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaborDimension {
    pub daily_limit_minutes: i64,
    pub weekly_limit_minutes: i64,
}

impl LaborDimension {
    /// The per-vehicle soft upper bound on accumulated minutes.
    pub fn soft_limit_minutes(&self) -> i64 {
        self.daily_limit_minutes.min(self.weekly_limit_minutes)
    }
}

/// Canonical model consumed by the solver.
#[derive(Debug, Clone)]
pub struct RoutingModel {
    pub nodes: Vec<Node>,
    pub matrix: TravelMatrix,

    /// Per-node demand in grams; zero at the depot.
    pub demand_weight: Vec<i64>,
    /// Per-node demand in liters; zero at the depot.
    pub demand_volume: Vec<i64>,
    /// Per-node service duration in minutes; zero at the depot.
    pub service_min: Vec<i64>,
    /// Per-node delivery windows; the depot window is the planning horizon.
    pub windows: Vec<TimeWindows>,
    /// Per-node temperature ceiling; unbounded at the depot.
    pub temp_ceiling: Vec<f64>,
    /// Per-node STRICT flag; false at the depot.
    pub strict: Vec<bool>,

    /// Per-vehicle capacity in grams.
    pub cap_weight: Vec<i64>,
    /// Per-vehicle capacity in liters.
    pub cap_volume: Vec<i64>,
    /// Per-vehicle thermal parameters for the conservative estimate.
    pub thermal: Vec<ThermalProfile>,
    pub vehicle_ids: Vec<VehicleId>,

    /// Flat cost charged iff a vehicle is used.
    pub fixed_cost: i64,
    /// Per-node drop penalty; the depot entry is unused.
    pub drop_penalty: Vec<i64>,
    /// Soft penalty per stop whose estimated arrival temperature breaches
    /// its ceiling. The thermal tracker remains authoritative post-solve.
    pub temp_violation_penalty: i64,
    /// Small coefficient on the global span pushing toward earlier finishes.
    pub span_coefficient: i64,
    /// Upper bound on any single route's arc distance, in meters.
    pub distance_bound: i64,

    pub departure_minute: i64,
    pub horizon_end: i64,
    pub ambient_temp: f64,
    pub initial_temp: f64,

    pub labor: Option<LaborDimension>,
}

impl RoutingModel {
    /// Number of pickup nodes.
    pub fn shipment_count(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicle_ids.len()
    }
}

/// Build the canonical model from a snapshot.
pub fn build_model(
    snapshot: &PlanSnapshot,
    params: &PlanParameters,
    config: &PlannerConfig,
) -> Result<RoutingModel> {
    snapshot.depot.validate()?;
    for vehicle in &snapshot.vehicles {
        vehicle.validate()?;
    }
    for shipment in &snapshot.shipments {
        shipment.validate()?;
    }
    if snapshot.vehicles.is_empty() {
        return Err(Error::validation("snapshot has no vehicles"));
    }
    if params.departure_minute < snapshot.depot.open_minute
        || params.departure_minute >= snapshot.depot.close_minute
    {
        return Err(Error::validation(format!(
            "departure minute {} outside depot window {}..{}",
            params.departure_minute, snapshot.depot.open_minute, snapshot.depot.close_minute
        )));
    }

    let node_count = snapshot.shipments.len() + 1;
    let mut points = Vec::with_capacity(node_count);
    points.push(snapshot.depot.location);
    points.extend(snapshot.shipments.iter().map(|s| s.location));
    let matrix = TravelMatrix::build(&points, config.average_speed_kmh)?;

    let mut nodes = Vec::with_capacity(node_count);
    nodes.push(Node {
        index: 0,
        kind: NodeKind::Depot,
        shipment_id: None,
    });

    let depot_window =
        TimeWindows::single(snapshot.depot.open_minute, snapshot.depot.close_minute)?;

    let mut demand_weight = vec![0i64; node_count];
    let mut demand_volume = vec![0i64; node_count];
    let mut service_min = vec![0i64; node_count];
    let mut windows = vec![depot_window; node_count];
    let mut temp_ceiling = vec![f64::INFINITY; node_count];
    let mut strict = vec![false; node_count];
    let mut drop_penalty = vec![0i64; node_count];

    let max_arc = matrix.max_arc_m();
    let distance_bound = max_arc.saturating_mul(node_count as i64 + 1);

    // A used vehicle must always cost more than any distance saving, so
    // fleet size dominates distance lexicographically.
    let fixed_cost = match params.strategy {
        Strategy::MinimizeVehicles => config
            .vehicle_fixed_cost
            .max(distance_bound.saturating_mul(10)),
        Strategy::MinimizeDistance => 0,
    };

    for (offset, shipment) in snapshot.shipments.iter().enumerate() {
        let index = offset + 1;
        nodes.push(Node {
            index,
            kind: NodeKind::Pickup,
            shipment_id: Some(shipment.id),
        });
        demand_weight[index] = (shipment.weight * 1_000.0).round() as i64;
        demand_volume[index] = (shipment.volume * 1_000.0).round() as i64;
        service_min[index] = i64::from(shipment.service_minutes);
        windows[index] = shipment.windows.clone();
        temp_ceiling[index] = shipment.temp_ceiling;
        strict[index] = shipment.sla == SlaTier::Strict;
        drop_penalty[index] = match shipment.sla {
            // STRICT drops must cost more than any feasible plan.
            SlaTier::Strict => config.infeasible_cost,
            // STANDARD drops cost more than serving the shipment from a
            // fresh vehicle, scaled so higher-priority shipments resist
            // being dropped first. Coverage therefore outranks fleet size.
            SlaTier::Standard => (fixed_cost
                .saturating_add(distance_bound)
                .saturating_add(
                    config
                        .late_delivery_penalty
                        .saturating_mul(1 + i64::from(shipment.priority)),
                ))
            .min(config.infeasible_cost - 1),
        };
    }

    let labor = config.enable_labor_dimension.then_some(LaborDimension {
        daily_limit_minutes: config.driver_daily_limit_minutes,
        weekly_limit_minutes: config.driver_weekly_limit_minutes,
    });

    Ok(RoutingModel {
        nodes,
        matrix,
        demand_weight,
        demand_volume,
        service_min,
        windows,
        temp_ceiling,
        strict,
        cap_weight: snapshot
            .vehicles
            .iter()
            .map(|v| (v.weight_capacity * 1_000.0).round() as i64)
            .collect(),
        cap_volume: snapshot
            .vehicles
            .iter()
            .map(|v| (v.volume_capacity * 1_000.0).round() as i64)
            .collect(),
        thermal: snapshot
            .vehicles
            .iter()
            .map(|v| v.thermal_profile())
            .collect(),
        vehicle_ids: snapshot.vehicles.iter().map(|v| v.id).collect(),
        fixed_cost,
        drop_penalty,
        temp_violation_penalty: config.temp_violation_penalty,
        span_coefficient: 1,
        distance_bound,
        departure_minute: i64::from(params.departure_minute),
        horizon_end: i64::from(snapshot.depot.close_minute),
        ambient_temp: params.ambient_temp,
        initial_temp: params.initial_cargo_temp,
        labor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Depot, PlanParameters, Shipment, ShipmentStatus, Vehicle};
    use crate::geo::GeoPoint;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn depot() -> Depot {
        Depot {
            id: 1,
            name: "Main".into(),
            location: GeoPoint::new(25.033, 121.565).unwrap(),
            open_minute: 0,
            close_minute: 1439,
        }
    }

    fn vehicle(id: VehicleId) -> Vehicle {
        Vehicle {
            id,
            name: format!("V{id}"),
            weight_capacity: 1_000.0,
            volume_capacity: 10.0,
            insulation_k: 0.05,
            door_coefficient: 0.8,
            has_curtain: true,
            cooling_rate: -2.5,
            min_temp: -20.0,
            available: true,
        }
    }

    fn shipment(id: ShipmentId, sla: SlaTier, priority: u8) -> Shipment {
        Shipment {
            id,
            name: format!("S{id}"),
            location: GeoPoint::new(25.050, 121.580).unwrap(),
            weight: 100.0,
            volume: 1.0,
            windows: TimeWindows::single(480, 600).unwrap(),
            service_minutes: 15,
            temp_ceiling: 5.0,
            temp_floor: None,
            sla,
            priority,
            status: ShipmentStatus::Pending,
        }
    }

    fn params() -> PlanParameters {
        PlanParameters {
            plan_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            departure_minute: 480,
            ambient_temp: 30.0,
            initial_cargo_temp: -5.0,
            time_limit: Duration::from_secs(10),
            strategy: Strategy::MinimizeVehicles,
        }
    }

    #[test]
    fn depot_is_node_zero_and_shipments_follow() {
        let snapshot = PlanSnapshot {
            depot: depot(),
            vehicles: vec![vehicle(1)],
            shipments: vec![shipment(7, SlaTier::Standard, 10)],
        };
        let model = build_model(&snapshot, &params(), &PlannerConfig::default()).unwrap();

        assert_eq!(model.nodes.len(), 2);
        assert_eq!(model.nodes[0].kind, NodeKind::Depot);
        assert_eq!(model.nodes[1].shipment_id, Some(7));
        assert_eq!(model.demand_weight[0], 0);
        assert_eq!(model.demand_weight[1], 100_000);
        assert_eq!(model.demand_volume[1], 1_000);
        assert_eq!(model.service_min[1], 15);
        assert_eq!(model.cap_weight, vec![1_000_000]);
    }

    #[test]
    fn fixed_cost_dominates_distance_under_fleet_minimization() {
        let snapshot = PlanSnapshot {
            depot: depot(),
            vehicles: vec![vehicle(1), vehicle(2)],
            shipments: vec![
                shipment(1, SlaTier::Standard, 10),
                shipment(2, SlaTier::Standard, 10),
            ],
        };
        let model = build_model(&snapshot, &params(), &PlannerConfig::default()).unwrap();
        assert!(model.fixed_cost >= model.distance_bound * 10);

        let distance_first = PlanParameters {
            strategy: Strategy::MinimizeDistance,
            ..params()
        };
        let model = build_model(&snapshot, &distance_first, &PlannerConfig::default()).unwrap();
        assert_eq!(model.fixed_cost, 0);
    }

    #[test]
    fn drop_penalties_encode_sla_and_priority() {
        let config = PlannerConfig::default();
        let snapshot = PlanSnapshot {
            depot: depot(),
            vehicles: vec![vehicle(1)],
            shipments: vec![
                shipment(1, SlaTier::Strict, 0),
                shipment(2, SlaTier::Standard, 10),
                shipment(3, SlaTier::Standard, 90),
            ],
        };
        let model = build_model(&snapshot, &params(), &config).unwrap();

        assert_eq!(model.drop_penalty[1], config.infeasible_cost);
        assert!(model.drop_penalty[2] < model.drop_penalty[3]);
        assert!(model.drop_penalty[3] < config.infeasible_cost);
        // Any drop must beat any single insertion detour.
        assert!(model.drop_penalty[2] > model.matrix.max_arc_m() * 2);
    }

    #[test]
    fn labor_dimension_follows_config_flag() {
        let snapshot = PlanSnapshot {
            depot: depot(),
            vehicles: vec![vehicle(1)],
            shipments: vec![shipment(1, SlaTier::Standard, 10)],
        };
        let off = build_model(&snapshot, &params(), &PlannerConfig::default()).unwrap();
        assert!(off.labor.is_none());

        let config = PlannerConfig {
            enable_labor_dimension: true,
            driver_daily_limit_minutes: 600,
            driver_weekly_limit_minutes: 480,
            ..PlannerConfig::default()
        };
        let on = build_model(&snapshot, &params(), &config).unwrap();
        let labor = on.labor.expect("labor dimension enabled");
        // The soft bound is the tighter of the two remaining limits.
        assert_eq!(labor.soft_limit_minutes(), 480);
    }

    #[test]
    fn rejects_departure_outside_depot_window() {
        let snapshot = PlanSnapshot {
            depot: Depot {
                open_minute: 360,
                close_minute: 1_200,
                ..depot()
            },
            vehicles: vec![vehicle(1)],
            shipments: vec![shipment(1, SlaTier::Standard, 10)],
        };
        let early = PlanParameters {
            departure_minute: 120,
            ..params()
        };
        assert!(build_model(&snapshot, &early, &PlannerConfig::default()).is_err());
    }
}
