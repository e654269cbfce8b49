//! Routing search over the canonical model.
//!
//! The search runs in two phases: a parallel cheapest-insertion pass builds
//! the first solution without premature drops, then guided local search
//! improves it for the remaining time budget. Costs are single integers
//! encoding the lexicographic objective: per-vehicle fixed cost dominates
//! distance, distance dominates the span coefficient.
//!
//! The search is deterministic: moves are scanned in a fixed order and no
//! randomness is involved, so equal snapshots produce equal plans. A
//! cancellation flag is polled between search iterations; on observation the
//! best solution found so far is returned.

mod evaluate;
mod improve;
mod insertion;

pub use evaluate::{evaluate_route, RouteEval, ScheduledStop};

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::builder::RoutingModel;
use crate::error::{Error, Result};

/// Knobs for a single solve.
#[derive(Debug, Clone)]
pub struct SolveOptions {
    pub time_limit: Duration,
    /// Observed between search iterations; set by the orchestrator's
    /// deadline watchdog or an explicit cancel.
    pub cancel: Arc<AtomicBool>,
}

impl SolveOptions {
    pub fn new(time_limit: Duration) -> Self {
        Self {
            time_limit,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// One used vehicle in the raw assignment.
#[derive(Debug, Clone)]
pub struct AssignedRoute {
    /// Index into the model's vehicle arrays.
    pub vehicle: usize,
    pub eval: RouteEval,
}

/// Raw solver output, before plan assembly.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub routes: Vec<AssignedRoute>,
    /// Node indices left unassigned, ascending.
    pub dropped: Vec<usize>,
    pub cost: i64,
}

/// Working solution shared by the construction and improvement phases.
#[derive(Debug, Clone)]
pub(crate) struct SolutionState {
    /// Stop sequences per vehicle index; empty when unused.
    pub routes: Vec<Vec<usize>>,
    /// Cached evaluation per vehicle; `None` for unused vehicles.
    pub evals: Vec<Option<RouteEval>>,
    /// Shipment nodes not on any route.
    pub dropped: BTreeSet<usize>,
}

impl SolutionState {
    pub fn empty(model: &RoutingModel) -> Self {
        Self {
            routes: vec![Vec::new(); model.vehicle_count()],
            evals: vec![None; model.vehicle_count()],
            dropped: (1..model.nodes.len()).collect(),
        }
    }

    /// Replace a vehicle's sequence if the new one is hard-feasible.
    /// Membership in `dropped` is managed by the caller.
    pub fn try_set_route(
        &mut self,
        model: &RoutingModel,
        vehicle: usize,
        sequence: Vec<usize>,
    ) -> bool {
        if sequence.is_empty() {
            self.routes[vehicle] = sequence;
            self.evals[vehicle] = None;
            return true;
        }
        match evaluate_route(model, vehicle, &sequence) {
            Some(eval) => {
                self.routes[vehicle] = sequence;
                self.evals[vehicle] = Some(eval);
                true
            }
            None => false,
        }
    }

    pub fn vehicles_used(&self) -> usize {
        self.evals.iter().flatten().count()
    }

    pub fn max_duration(&self) -> i64 {
        self.evals
            .iter()
            .flatten()
            .map(|eval| eval.duration_min)
            .max()
            .unwrap_or(0)
    }

    /// Total solution cost: route costs, fixed costs, drop penalties, and
    /// the span term.
    pub fn cost(&self, model: &RoutingModel) -> i64 {
        let route_cost: i64 = self.evals.iter().flatten().map(RouteEval::cost).sum();
        let fixed = model.fixed_cost * self.vehicles_used() as i64;
        let drops: i64 = self
            .dropped
            .iter()
            .map(|&node| model.drop_penalty[node])
            .sum();
        let span = model.span_coefficient * self.max_duration();
        route_cost + fixed + drops + span
    }

    /// Lexicographic tie-break: cost, then fleet size, then the largest
    /// route duration. Sequences are scanned in vehicle-id order everywhere,
    /// which settles any remaining ties deterministically.
    pub fn objective_key(&self, model: &RoutingModel) -> (i64, usize, i64) {
        (self.cost(model), self.vehicles_used(), self.max_duration())
    }
}

/// Deadline plus cancellation flag, polled between search iterations.
#[derive(Clone)]
pub(crate) struct SearchBudget {
    deadline: Instant,
    cancel: Arc<AtomicBool>,
}

impl SearchBudget {
    pub(crate) fn new(options: &SolveOptions) -> Self {
        Self {
            deadline: Instant::now() + options.time_limit,
            cancel: Arc::clone(&options.cancel),
        }
    }

    pub fn exhausted(&self) -> bool {
        self.cancel.load(Ordering::Relaxed) || Instant::now() >= self.deadline
    }
}

/// Run the two-phase search and return the best assignment found.
///
/// # Errors
///
/// Returns [`Error::SolverTimeout`] when the budget expired before the
/// construction phase produced any assignment at all.
pub fn solve(model: &RoutingModel, options: &SolveOptions) -> Result<Assignment> {
    let budget = SearchBudget::new(options);
    let started = Instant::now();

    if model.shipment_count() == 0 {
        return Ok(Assignment {
            routes: Vec::new(),
            dropped: Vec::new(),
            cost: 0,
        });
    }

    let constructed = insertion::cheapest_insertion(model, &budget);
    let Some(mut state) = constructed else {
        return Err(Error::SolverTimeout);
    };

    debug!(
        cost = state.cost(model),
        vehicles = state.vehicles_used(),
        dropped = state.dropped.len(),
        "first solution constructed"
    );

    improve::guided_local_search(model, &mut state, &budget);

    let cost = state.cost(model);
    let mut routes = Vec::new();
    for (vehicle, eval) in state.evals.iter().enumerate() {
        if let Some(eval) = eval {
            if !eval.stops.is_empty() {
                routes.push(AssignedRoute {
                    vehicle,
                    eval: eval.clone(),
                });
            }
        }
    }

    info!(
        cost,
        vehicles = routes.len(),
        dropped = state.dropped.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "solve finished"
    );

    Ok(Assignment {
        routes,
        dropped: state.dropped.iter().copied().collect(),
        cost,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_model;
    use crate::config::PlannerConfig;
    use crate::domain::{
        Depot, PlanParameters, PlanSnapshot, Shipment, ShipmentStatus, SlaTier, Strategy,
        TimeWindow, TimeWindows, Vehicle,
    };
    use crate::geo::GeoPoint;
    use chrono::NaiveDate;

    fn depot() -> Depot {
        Depot {
            id: 1,
            name: "Main".into(),
            location: GeoPoint::new(25.033, 121.565).unwrap(),
            open_minute: 0,
            close_minute: 1_439,
        }
    }

    fn vehicle(id: i64) -> Vehicle {
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

    fn shipment(id: i64, lat: f64, lon: f64) -> Shipment {
        Shipment {
            id,
            name: format!("S{id}"),
            location: GeoPoint::new(lat, lon).unwrap(),
            weight: 100.0,
            volume: 1.0,
            windows: TimeWindows::single(0, 1_439).unwrap(),
            service_minutes: 15,
            temp_ceiling: 5.0,
            temp_floor: None,
            sla: SlaTier::Standard,
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

    fn solve_snapshot(snapshot: &PlanSnapshot, params: &PlanParameters) -> Assignment {
        let model = build_model(snapshot, params, &PlannerConfig::default()).unwrap();
        solve(&model, &SolveOptions::new(params.time_limit)).unwrap()
    }

    #[test]
    fn single_shipment_single_route() {
        let snapshot = PlanSnapshot {
            depot: depot(),
            vehicles: vec![vehicle(1)],
            shipments: vec![shipment(1, 25.050, 121.580)],
        };
        let assignment = solve_snapshot(&snapshot, &params());

        assert_eq!(assignment.routes.len(), 1);
        assert!(assignment.dropped.is_empty());
        let eval = &assignment.routes[0].eval;
        assert_eq!(eval.stops.len(), 1);
        // Out-and-back distance: twice the single-arc haversine.
        let model = build_model(&snapshot, &params(), &PlannerConfig::default()).unwrap();
        assert_eq!(eval.distance_m, 2 * model.matrix.distance_m(0, 1));
    }

    #[test]
    fn clustered_shipments_share_one_vehicle() {
        // Fleet minimization: both shipments fit one vehicle, so the second
        // vehicle must stay parked even though splitting shortens each route.
        let snapshot = PlanSnapshot {
            depot: depot(),
            vehicles: vec![vehicle(1), vehicle(2)],
            shipments: vec![shipment(1, 25.050, 121.580), shipment(2, 25.052, 121.582)],
        };
        let assignment = solve_snapshot(&snapshot, &params());

        assert_eq!(assignment.routes.len(), 1);
        assert!(assignment.dropped.is_empty());
        assert_eq!(assignment.routes[0].eval.stops.len(), 2);
    }

    #[test]
    fn second_window_is_chosen_when_first_is_past() {
        let mut snapshot = PlanSnapshot {
            depot: depot(),
            vehicles: vec![vehicle(1)],
            shipments: vec![shipment(1, 25.050, 121.580)],
        };
        snapshot.shipments[0].windows = TimeWindows::new(vec![
            TimeWindow::new(360, 390).unwrap(),
            TimeWindow::new(840, 900).unwrap(),
        ])
        .unwrap();

        let assignment = solve_snapshot(&snapshot, &params());
        assert_eq!(assignment.routes.len(), 1);
        let stop = assignment.routes[0].eval.stops[0];
        assert!(stop.service_start >= 840);
        assert!(stop.departure <= 900);
    }

    #[test]
    fn overweight_pair_drops_lower_priority_standard() {
        let mut snapshot = PlanSnapshot {
            depot: depot(),
            vehicles: vec![vehicle(1)],
            shipments: vec![shipment(1, 25.050, 121.580), shipment(2, 25.051, 121.581)],
        };
        snapshot.shipments[0].weight = 700.0;
        snapshot.shipments[0].priority = 80;
        snapshot.shipments[1].weight = 600.0;
        snapshot.shipments[1].priority = 20;

        let assignment = solve_snapshot(&snapshot, &params());
        assert_eq!(assignment.routes.len(), 1);
        assert_eq!(assignment.dropped, vec![2]);
        let model = build_model(&snapshot, &params(), &PlannerConfig::default()).unwrap();
        // The reported cost carries the dropped shipment's penalty.
        assert!(assignment.cost >= model.drop_penalty[2]);
    }

    #[test]
    fn empty_model_returns_empty_assignment() {
        let snapshot = PlanSnapshot {
            depot: depot(),
            vehicles: vec![vehicle(1)],
            shipments: vec![],
        };
        let assignment = solve_snapshot(&snapshot, &params());
        assert!(assignment.routes.is_empty());
        assert!(assignment.dropped.is_empty());
        assert_eq!(assignment.cost, 0);
    }

    #[test]
    fn cancelled_before_start_times_out() {
        let snapshot = PlanSnapshot {
            depot: depot(),
            vehicles: vec![vehicle(1)],
            shipments: vec![shipment(1, 25.050, 121.580)],
        };
        let model = build_model(&snapshot, &params(), &PlannerConfig::default()).unwrap();
        let options = SolveOptions::new(Duration::from_secs(5));
        options.cancel.store(true, Ordering::Relaxed);

        match solve(&model, &options) {
            Err(Error::SolverTimeout) => {}
            other => panic!("expected SolverTimeout, got {other:?}"),
        }
    }
}
