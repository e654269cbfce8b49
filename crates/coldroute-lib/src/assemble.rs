//! Post-solve plan assembly.
//!
//! Turns the raw assignment into ordered routes with authoritative
//! per-stop temperatures from the thermal tracker, classifies unassigned
//! shipments with likely-cause diagnostics, and produces the plan summary
//! and violations report.
//!
//! Assembly also hosts the pre-solve screen: shipments no vehicle can reach
//! inside any window, or whose ceiling is breached even on a direct drive
//! with the best vehicle, are excluded from the search up front and
//! reported with `TIME_WINDOW` / `TEMPERATURE` diagnostics. A STRICT
//! shipment screened out on temperature makes the whole job infeasible; a
//! STRICT shipment screened out on an unreachable window is reported but
//! does not block the rest of the plan.

use serde::{Deserialize, Serialize};

use crate::builder::RoutingModel;
use crate::config::PlannerConfig;
use crate::domain::{
    PlanParameters, PlanSnapshot, PlanSummary, Route, Shipment, ShipmentId, SlaTier, Stop,
    VehicleId,
};
use crate::error::{Error, Result};
use crate::solver::Assignment;
use crate::thermal::{project_route, RouteLeg};

const TEMP_EPSILON: f64 = 1e-9;

/// Likely dominant cause for an unassigned shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnassignedCause {
    /// No vehicle can reach the shipment inside any of its windows.
    TimeWindow,
    /// The shipment's STRICT tier contributed to the outcome.
    StrictSla,
    /// Predicted ceiling breach on every candidate vehicle.
    Temperature,
    /// Left over after the search; capacity or routing pressure.
    CapacityOrRouting,
}

/// One diagnostic entry: the cause plus the violated parameter and values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub cause: UnassignedCause,
    pub parameter: String,
    pub current_value: f64,
    pub limit_value: f64,
}

impl Diagnostic {
    fn strict_sla() -> Self {
        Self {
            cause: UnassignedCause::StrictSla,
            parameter: "sla_tier".to_string(),
            current_value: 0.0,
            limit_value: 0.0,
        }
    }
}

/// A shipment left off every route, with its likely reasons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnassignedShipment {
    pub shipment_id: ShipmentId,
    pub name: String,
    pub sla: SlaTier,
    pub priority: u8,
    pub likely_reasons: Vec<Diagnostic>,
}

/// A stop whose tracked temperature violates a shipment bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureViolation {
    pub shipment_id: ShipmentId,
    pub vehicle_id: VehicleId,
    pub stop_sequence: u32,
    pub predicted_temp: f64,
    pub limit_temp: f64,
    /// How far past the bound the prediction lands, always positive.
    pub overshoot: f64,
    /// `temp_ceiling` or `temp_floor`.
    pub limit_name: String,
    pub sla: SlaTier,
}

/// Violations and diagnostics persisted with the job and served by the
/// report endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViolationsReport {
    pub temperature_violations: Vec<TemperatureViolation>,
    pub unassigned: Vec<UnassignedShipment>,
}

/// Result of the pre-solve screen.
#[derive(Debug, Clone)]
pub struct Prescreen {
    /// Shipments the search should consider.
    pub solvable: Vec<Shipment>,
    /// Shipments excluded up front, with diagnostics.
    pub excluded: Vec<UnassignedShipment>,
    /// A STRICT shipment was excluded on temperature; the job must fail.
    pub strict_temperature_excluded: bool,
}

/// The assembled plan, ready to persist.
#[derive(Debug, Clone)]
pub struct AssembledPlan {
    pub routes: Vec<Route>,
    pub assigned: Vec<ShipmentId>,
    pub summary: PlanSummary,
    pub report: ViolationsReport,
    /// The tracker confirmed a STRICT ceiling breach on an assigned stop.
    pub strict_temperature_breach: bool,
    /// The search dropped a STRICT shipment it should have served.
    pub strict_dropped: bool,
}

/// Direct-drive travel minutes from the depot, matching the matrix rounding.
fn direct_travel_min(snapshot: &PlanSnapshot, shipment: &Shipment, config: &PlannerConfig) -> i64 {
    let km = snapshot.depot.location.haversine_km(&shipment.location);
    (km / config.average_speed_kmh * 60.0).round() as i64
}

/// Best (coolest) achievable direct-drive arrival temperature over the fleet.
fn best_direct_arrival_temp(
    snapshot: &PlanSnapshot,
    params: &PlanParameters,
    travel_min: i64,
) -> f64 {
    let drive_hours = travel_min as f64 / 60.0;
    snapshot
        .vehicles
        .iter()
        .map(|vehicle| {
            let profile = vehicle.thermal_profile();
            let transit = drive_hours
                * (params.ambient_temp - params.initial_cargo_temp)
                * profile.insulation_k;
            let cooling = drive_hours * profile.cooling_rate_per_min;
            (params.initial_cargo_temp + transit + cooling).max(profile.unit_min_temp)
        })
        .fold(f64::INFINITY, f64::min)
}

/// Screen out shipments that cannot be served by any vehicle.
pub fn prescreen(
    snapshot: &PlanSnapshot,
    params: &PlanParameters,
    config: &PlannerConfig,
) -> Prescreen {
    let mut solvable = Vec::with_capacity(snapshot.shipments.len());
    let mut excluded = Vec::new();
    let mut strict_temperature_excluded = false;

    for shipment in &snapshot.shipments {
        let travel = direct_travel_min(snapshot, shipment, config);
        let arrival = i64::from(params.departure_minute) + travel;
        let mut reasons = Vec::new();

        if shipment
            .windows
            .earliest_service_start(arrival, i64::from(shipment.service_minutes))
            .is_none()
        {
            reasons.push(Diagnostic {
                cause: UnassignedCause::TimeWindow,
                parameter: "time_window_end".to_string(),
                current_value: arrival as f64,
                limit_value: f64::from(shipment.windows.latest_end()),
            });
        }

        let best_arrival_temp = best_direct_arrival_temp(snapshot, params, travel);
        if best_arrival_temp > shipment.temp_ceiling + TEMP_EPSILON {
            reasons.push(Diagnostic {
                cause: UnassignedCause::Temperature,
                parameter: "temp_ceiling".to_string(),
                current_value: best_arrival_temp,
                limit_value: shipment.temp_ceiling,
            });
            if shipment.sla == SlaTier::Strict {
                strict_temperature_excluded = true;
            }
        }

        if reasons.is_empty() {
            solvable.push(shipment.clone());
        } else {
            if shipment.sla == SlaTier::Strict {
                reasons.push(Diagnostic::strict_sla());
            }
            excluded.push(UnassignedShipment {
                shipment_id: shipment.id,
                name: shipment.name.clone(),
                sla: shipment.sla,
                priority: shipment.priority,
                likely_reasons: reasons,
            });
        }
    }

    Prescreen {
        solvable,
        excluded,
        strict_temperature_excluded,
    }
}

/// Assemble routes, diagnostics, and the summary from the raw assignment.
///
/// `snapshot` must be the filtered snapshot the model was built from, so
/// that node `i` maps to `snapshot.shipments[i - 1]`.
pub fn assemble_plan(
    snapshot: &PlanSnapshot,
    model: &RoutingModel,
    assignment: &Assignment,
    pre_excluded: Vec<UnassignedShipment>,
    params: &PlanParameters,
) -> Result<AssembledPlan> {
    let mut routes = Vec::with_capacity(assignment.routes.len());
    let mut assigned = Vec::new();
    let mut temperature_violations = Vec::new();
    let mut strict_temperature_breach = false;

    for assigned_route in &assignment.routes {
        let vehicle = snapshot
            .vehicles
            .get(assigned_route.vehicle)
            .ok_or_else(|| Error::internal("assignment references an unknown vehicle"))?;

        let mut legs = Vec::with_capacity(assigned_route.eval.stops.len());
        let mut previous = 0usize;
        let mut shipments = Vec::with_capacity(assigned_route.eval.stops.len());
        for scheduled in &assigned_route.eval.stops {
            let shipment = snapshot
                .shipments
                .get(scheduled.node - 1)
                .ok_or_else(|| Error::internal("assignment references an unknown node"))?;
            legs.push(RouteLeg {
                drive_minutes: model.matrix.time_min(previous, scheduled.node) as f64,
                service_minutes: f64::from(shipment.service_minutes),
                temp_ceiling: shipment.temp_ceiling,
            });
            shipments.push(shipment);
            previous = scheduled.node;
        }

        let projection = project_route(
            &vehicle.thermal_profile(),
            params.ambient_temp,
            params.initial_cargo_temp,
            &legs,
        )?;

        let mut stops = Vec::with_capacity(legs.len());
        for (index, (scheduled, projected)) in assigned_route
            .eval
            .stops
            .iter()
            .zip(projection.stops.iter())
            .enumerate()
        {
            let shipment = shipments[index];
            let sequence = index as u32 + 1;

            if !projected.within_ceiling {
                temperature_violations.push(TemperatureViolation {
                    shipment_id: shipment.id,
                    vehicle_id: vehicle.id,
                    stop_sequence: sequence,
                    predicted_temp: projected.arrival_temp,
                    limit_temp: shipment.temp_ceiling,
                    overshoot: projected.arrival_temp - shipment.temp_ceiling,
                    limit_name: "temp_ceiling".to_string(),
                    sla: shipment.sla,
                });
                if shipment.sla == SlaTier::Strict {
                    strict_temperature_breach = true;
                }
            }
            if let Some(floor) = shipment.temp_floor {
                if projected.arrival_temp < floor - TEMP_EPSILON {
                    temperature_violations.push(TemperatureViolation {
                        shipment_id: shipment.id,
                        vehicle_id: vehicle.id,
                        stop_sequence: sequence,
                        predicted_temp: projected.arrival_temp,
                        limit_temp: floor,
                        overshoot: floor - projected.arrival_temp,
                        limit_name: "temp_floor".to_string(),
                        sla: shipment.sla,
                    });
                }
            }

            assigned.push(shipment.id);
            stops.push(Stop {
                sequence,
                shipment_id: shipment.id,
                arrival_minute: scheduled.service_start,
                departure_minute: scheduled.departure,
                transit_rise: projected.transit_rise,
                service_rise: projected.service_rise,
                cooling_applied: projected.cooling_applied,
                arrival_temp: projected.arrival_temp,
                departure_temp: projected.departure_temp,
                feasible: projected.within_ceiling,
            });
        }

        routes.push(Route {
            vehicle_id: vehicle.id,
            stops,
            total_distance_m: assigned_route.eval.distance_m,
            total_duration_min: assigned_route.eval.duration_min,
            initial_temp: projection.initial_temp,
            final_temp: projection.final_temp,
            max_temp: projection.max_temp,
            is_feasible: projection.is_feasible,
            version: 1,
        });
    }

    let mut unassigned = pre_excluded;
    let mut strict_dropped = false;
    let max_weight_cap = snapshot
        .vehicles
        .iter()
        .map(|v| v.weight_capacity)
        .fold(0.0, f64::max);
    for &node in &assignment.dropped {
        let shipment = snapshot
            .shipments
            .get(node - 1)
            .ok_or_else(|| Error::internal("dropped node out of range"))?;
        let mut reasons = vec![Diagnostic {
            cause: UnassignedCause::CapacityOrRouting,
            parameter: "vehicle_capacity".to_string(),
            current_value: shipment.weight,
            limit_value: max_weight_cap,
        }];
        if shipment.sla == SlaTier::Strict {
            strict_dropped = true;
            reasons.push(Diagnostic::strict_sla());
        }
        unassigned.push(UnassignedShipment {
            shipment_id: shipment.id,
            name: shipment.name.clone(),
            sla: shipment.sla,
            priority: shipment.priority,
            likely_reasons: reasons,
        });
    }

    let summary = PlanSummary {
        total_distance_m: routes.iter().map(|r| r.total_distance_m).sum(),
        total_duration_min: routes.iter().map(|r| r.total_duration_min).sum(),
        vehicles_used: routes.len(),
        shipments_assigned: assigned.len(),
        shipments_unassigned: unassigned.len(),
        is_feasible: routes.iter().all(|r| r.is_feasible) && !strict_dropped,
    };

    Ok(AssembledPlan {
        routes,
        assigned,
        summary,
        report: ViolationsReport {
            temperature_violations,
            unassigned,
        },
        strict_temperature_breach,
        strict_dropped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_model;
    use crate::domain::{Depot, ShipmentStatus, Strategy, TimeWindows, Vehicle};
    use crate::geo::GeoPoint;
    use crate::solver::{solve, SolveOptions};
    use chrono::NaiveDate;
    use std::time::Duration;

    fn depot() -> Depot {
        Depot {
            id: 1,
            name: "Main".into(),
            location: GeoPoint::new(25.033, 121.565).unwrap(),
            open_minute: 0,
            close_minute: 1_439,
        }
    }

    fn vehicle() -> Vehicle {
        Vehicle {
            id: 1,
            name: "V1".into(),
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

    fn shipment(id: i64) -> Shipment {
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
            sla: SlaTier::Strict,
            priority: 50,
            status: ShipmentStatus::Pending,
        }
    }

    fn params() -> PlanParameters {
        PlanParameters {
            plan_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            departure_minute: 480,
            ambient_temp: 30.0,
            initial_cargo_temp: -5.0,
            time_limit: Duration::from_secs(5),
            strategy: Strategy::MinimizeVehicles,
        }
    }

    #[test]
    fn prescreen_flags_unreachable_window() {
        let mut snapshot = PlanSnapshot {
            depot: depot(),
            vehicles: vec![vehicle()],
            shipments: vec![shipment(1)],
        };
        // The window closes five minutes after departure; the drive takes
        // longer than that.
        snapshot.shipments[0].windows = TimeWindows::single(480, 485).unwrap();

        let screen = prescreen(&snapshot, &params(), &PlannerConfig::default());
        assert!(screen.solvable.is_empty());
        assert_eq!(screen.excluded.len(), 1);
        assert!(!screen.strict_temperature_excluded);

        let causes: Vec<UnassignedCause> = screen.excluded[0]
            .likely_reasons
            .iter()
            .map(|d| d.cause)
            .collect();
        assert!(causes.contains(&UnassignedCause::TimeWindow));
        assert!(causes.contains(&UnassignedCause::StrictSla));
    }

    #[test]
    fn prescreen_flags_temperature_impossible_strict() {
        let mut snapshot = PlanSnapshot {
            depot: depot(),
            vehicles: vec![Vehicle {
                insulation_k: 0.10,
                has_curtain: false,
                cooling_rate: 0.0,
                ..vehicle()
            }],
            shipments: vec![shipment(1)],
        };
        // Far away, hot ambient, tight ceiling: breach on a direct drive.
        snapshot.shipments[0].location = GeoPoint::new(25.43, 121.95).unwrap();
        snapshot.shipments[0].temp_ceiling = 0.0;
        snapshot.shipments[0].windows = TimeWindows::single(0, 1_439).unwrap();
        let params = PlanParameters {
            ambient_temp: 40.0,
            ..params()
        };

        let screen = prescreen(&snapshot, &params, &PlannerConfig::default());
        assert!(screen.solvable.is_empty());
        assert!(screen.strict_temperature_excluded);
        let diag = &screen.excluded[0].likely_reasons[0];
        assert_eq!(diag.cause, UnassignedCause::Temperature);
        assert!(diag.current_value > diag.limit_value);
    }

    #[test]
    fn assemble_populates_stops_and_summary() {
        let snapshot = PlanSnapshot {
            depot: depot(),
            vehicles: vec![vehicle()],
            shipments: vec![shipment(1)],
        };
        let params = params();
        let config = PlannerConfig::default();
        let model = build_model(&snapshot, &params, &config).unwrap();
        let assignment = solve(&model, &SolveOptions::new(params.time_limit)).unwrap();

        let plan = assemble_plan(&snapshot, &model, &assignment, Vec::new(), &params).unwrap();
        assert_eq!(plan.routes.len(), 1);
        let route = &plan.routes[0];
        assert_eq!(route.stops.len(), 1);
        let stop = &route.stops[0];

        assert_eq!(stop.sequence, 1);
        assert_eq!(
            stop.departure_minute - stop.arrival_minute,
            i64::from(snapshot.shipments[0].service_minutes)
        );
        assert!(stop.feasible);
        assert!(route.is_feasible);
        assert_eq!(plan.summary.vehicles_used, 1);
        assert_eq!(plan.summary.shipments_assigned, 1);
        assert_eq!(plan.summary.shipments_unassigned, 0);
        assert!(plan.summary.is_feasible);
        assert!(plan.report.temperature_violations.is_empty());
        assert!(!plan.strict_temperature_breach);
        assert!(!plan.strict_dropped);
    }

    #[test]
    fn assemble_reports_ceiling_breach_on_strict_stop() {
        // Each shipment survives a direct drive, but whichever is visited
        // second inherits the first stop's door-open warming and breaches.
        // The prescreen cannot catch this; only the tracker does.
        let mut snapshot = PlanSnapshot {
            depot: depot(),
            vehicles: vec![Vehicle {
                insulation_k: 0.10,
                door_coefficient: 1.2,
                has_curtain: false,
                cooling_rate: 0.0,
                ..vehicle()
            }],
            shipments: vec![shipment(1), shipment(2)],
        };
        for s in &mut snapshot.shipments {
            s.temp_ceiling = -4.3;
            s.service_minutes = 30;
            s.windows = TimeWindows::single(0, 1_439).unwrap();
        }
        snapshot.shipments[1].location = GeoPoint::new(25.052, 121.582).unwrap();
        let params = PlanParameters {
            ambient_temp: 40.0,
            ..params()
        };
        let config = PlannerConfig::default();

        let screen = prescreen(&snapshot, &params, &config);
        assert_eq!(screen.solvable.len(), 2, "direct drives pass the screen");

        let filtered = PlanSnapshot {
            depot: snapshot.depot.clone(),
            vehicles: snapshot.vehicles.clone(),
            shipments: screen.solvable.clone(),
        };
        let model = build_model(&filtered, &params, &config).unwrap();
        let assignment = solve(&model, &SolveOptions::new(params.time_limit)).unwrap();
        let plan =
            assemble_plan(&filtered, &model, &assignment, screen.excluded, &params).unwrap();

        assert_eq!(plan.routes.len(), 1);
        assert!(!plan.routes[0].is_feasible);
        assert!(plan.strict_temperature_breach);
        assert_eq!(plan.report.temperature_violations.len(), 1);
        let violation = &plan.report.temperature_violations[0];
        assert_eq!(violation.limit_name, "temp_ceiling");
        assert_eq!(violation.stop_sequence, 2);
        assert!(violation.overshoot > 0.0);
        // The first stop stays inside its ceiling.
        assert!(plan.routes[0].stops[0].feasible);
        assert!(!plan.routes[0].stops[1].feasible);
    }

    #[test]
    fn solver_dropped_strict_marks_plan() {
        let mut snapshot = PlanSnapshot {
            depot: depot(),
            vehicles: vec![vehicle()],
            shipments: vec![shipment(1), shipment(2)],
        };
        snapshot.shipments[0].weight = 700.0;
        snapshot.shipments[1].weight = 600.0;
        snapshot.shipments[0].windows = TimeWindows::single(0, 1_439).unwrap();
        snapshot.shipments[1].windows = TimeWindows::single(0, 1_439).unwrap();
        let params = params();
        let config = PlannerConfig::default();
        let model = build_model(&snapshot, &params, &config).unwrap();
        let assignment = solve(&model, &SolveOptions::new(params.time_limit)).unwrap();

        let plan = assemble_plan(&snapshot, &model, &assignment, Vec::new(), &params).unwrap();
        assert_eq!(plan.report.unassigned.len(), 1);
        assert!(plan.strict_dropped);
        assert!(!plan.summary.is_feasible);
        let causes: Vec<UnassignedCause> = plan.report.unassigned[0]
            .likely_reasons
            .iter()
            .map(|d| d.cause)
            .collect();
        assert!(causes.contains(&UnassignedCause::CapacityOrRouting));
        assert!(causes.contains(&UnassignedCause::StrictSla));
    }
}
