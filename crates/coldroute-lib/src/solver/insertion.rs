//! Parallel cheapest-insertion construction.
//!
//! Builds the first solution by repeatedly applying the globally cheapest
//! feasible insertion across all vehicles. Every shipment that can be
//! serviced somewhere gets inserted: drop penalties exceed the cost of
//! opening a fresh vehicle, so construction never drops prematurely, and
//! nodes are left unassigned only when no vehicle can take them at all.

use super::{evaluate_route, SearchBudget, SolutionState};
use crate::builder::RoutingModel;

/// Candidate insertion of one node into one route position.
struct InsertionMove {
    delta: i64,
    node: usize,
    vehicle: usize,
    position: usize,
}

/// Construct a first solution. Returns `None` only when the budget was
/// already exhausted before construction began; an interrupted pass still
/// yields the partial solution built so far.
pub(crate) fn cheapest_insertion(
    model: &RoutingModel,
    budget: &SearchBudget,
) -> Option<SolutionState> {
    if budget.exhausted() {
        return None;
    }

    let mut state = SolutionState::empty(model);

    loop {
        if budget.exhausted() {
            break;
        }

        let Some(best) = find_cheapest(model, &state) else {
            break;
        };

        let mut sequence = state.routes[best.vehicle].clone();
        sequence.insert(best.position, best.node);
        let applied = state.try_set_route(model, best.vehicle, sequence);
        debug_assert!(applied, "selected insertion re-evaluated as infeasible");
        state.dropped.remove(&best.node);
    }

    Some(state)
}

/// Scan every unassigned node, vehicle, and position for the cheapest
/// feasible insertion. Scanning order (node, then vehicle, then position,
/// all ascending) breaks cost ties deterministically.
fn find_cheapest(model: &RoutingModel, state: &SolutionState) -> Option<InsertionMove> {
    let mut best: Option<InsertionMove> = None;

    for &node in &state.dropped {
        for vehicle in 0..model.vehicle_count() {
            let current = &state.routes[vehicle];
            let current_cost = state.evals[vehicle].as_ref().map_or(0, |eval| eval.cost());
            // Opening a parked vehicle charges its fixed cost.
            let opening_cost = if current.is_empty() {
                model.fixed_cost
            } else {
                0
            };

            for position in 0..=current.len() {
                let mut candidate = current.clone();
                candidate.insert(position, node);
                let Some(eval) = evaluate_route(model, vehicle, &candidate) else {
                    continue;
                };

                let delta = eval.cost() - current_cost + opening_cost;
                if best.as_ref().is_none_or(|b| delta < b.delta) {
                    best = Some(InsertionMove {
                        delta,
                        node,
                        vehicle,
                        position,
                    });
                }
            }
        }
    }

    best
}
