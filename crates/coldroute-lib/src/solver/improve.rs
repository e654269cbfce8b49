//! Guided local search improvement phase.
//!
//! Runs first-improvement descent over relocate, swap, intra-route 2-opt,
//! and reinsertion of dropped nodes, on a cost augmented with arc-feature
//! penalties. At each local optimum the arc with the highest utility
//! (distance over one-plus-penalty) is penalized, steering the descent away
//! from long arcs it keeps clinging to. The best solution by real cost is
//! kept throughout and restored at the end.

use std::collections::HashMap;

use super::{SearchBudget, SolutionState};
use crate::builder::RoutingModel;

/// Penalization cycles without a new best before the plateau is declared.
const MAX_STALE_CYCLES: u32 = 20;

type Arc = (usize, usize);

pub(crate) fn guided_local_search(
    model: &RoutingModel,
    state: &mut SolutionState,
    budget: &SearchBudget,
) {
    let mut penalties: HashMap<Arc, i64> = HashMap::new();
    let lambda = penalty_weight(model, state);

    let mut best = state.clone();
    let mut best_key = best.objective_key(model);
    let mut stale_cycles = 0u32;

    while !budget.exhausted() && stale_cycles < MAX_STALE_CYCLES {
        descend(model, state, budget, &penalties, lambda);

        let key = state.objective_key(model);
        if key < best_key {
            best = state.clone();
            best_key = key;
            stale_cycles = 0;
        } else {
            stale_cycles += 1;
        }

        if budget.exhausted() {
            break;
        }
        penalize_worst_arc(model, state, &mut penalties);
    }

    *state = best;
}

/// λ scales arc penalties against real distance; a tenth of the mean arc
/// length keeps penalties influential without drowning the objective.
fn penalty_weight(_model: &RoutingModel, state: &SolutionState) -> i64 {
    let mut distance = 0i64;
    let mut arcs = 0i64;
    for (vehicle, eval) in state.evals.iter().enumerate() {
        if let Some(eval) = eval {
            distance += eval.distance_m;
            arcs += state.routes[vehicle].len() as i64 + 1;
        }
    }
    if arcs == 0 {
        return 1;
    }
    (distance / (10 * arcs)).max(1)
}

/// First-improvement descent on the augmented cost, until a local optimum
/// or budget exhaustion.
fn descend(
    model: &RoutingModel,
    state: &mut SolutionState,
    budget: &SearchBudget,
    penalties: &HashMap<Arc, i64>,
    lambda: i64,
) {
    loop {
        if budget.exhausted() {
            return;
        }
        let current = augmented_cost(model, state, penalties, lambda);
        if try_reinsert_dropped(model, state, penalties, lambda, current)
            || try_exchange_dropped(model, state, penalties, lambda, current)
            || try_relocate(model, state, penalties, lambda, current)
            || try_swap(model, state, penalties, lambda, current)
            || try_two_opt(model, state, penalties, lambda, current)
        {
            continue;
        }
        return;
    }
}

fn augmented_cost(
    model: &RoutingModel,
    state: &SolutionState,
    penalties: &HashMap<Arc, i64>,
    lambda: i64,
) -> i64 {
    let mut penalty_sum = 0i64;
    for (vehicle, eval) in state.evals.iter().enumerate() {
        if eval.is_some() {
            for arc in route_arcs(&state.routes[vehicle]) {
                penalty_sum += penalties.get(&arc).copied().unwrap_or(0);
            }
        }
    }
    state.cost(model) + lambda * penalty_sum
}

/// Arcs of a route including the depot legs.
fn route_arcs(sequence: &[usize]) -> impl Iterator<Item = Arc> + '_ {
    let first = sequence.first().map(|&n| (0usize, n));
    let middle = sequence.windows(2).map(|pair| (pair[0], pair[1]));
    let last = sequence.last().map(|&n| (n, 0usize));
    first.into_iter().chain(middle).chain(last)
}

/// Apply `edit` to a copy of the state; keep it when it lowers the
/// augmented cost.
fn accept_if_better(
    model: &RoutingModel,
    state: &mut SolutionState,
    penalties: &HashMap<Arc, i64>,
    lambda: i64,
    current: i64,
    edit: impl FnOnce(&mut SolutionState) -> bool,
) -> bool {
    let mut candidate = state.clone();
    if !edit(&mut candidate) {
        return false;
    }
    if augmented_cost(model, &candidate, penalties, lambda) < current {
        *state = candidate;
        return true;
    }
    false
}

fn try_reinsert_dropped(
    model: &RoutingModel,
    state: &mut SolutionState,
    penalties: &HashMap<Arc, i64>,
    lambda: i64,
    current: i64,
) -> bool {
    let dropped: Vec<usize> = state.dropped.iter().copied().collect();
    for node in dropped {
        for vehicle in 0..model.vehicle_count() {
            for position in 0..=state.routes[vehicle].len() {
                let accepted = accept_if_better(
                    model,
                    state,
                    penalties,
                    lambda,
                    current,
                    |candidate| {
                        let mut sequence = candidate.routes[vehicle].clone();
                        sequence.insert(position, node);
                        if candidate.try_set_route(model, vehicle, sequence) {
                            candidate.dropped.remove(&node);
                            true
                        } else {
                            false
                        }
                    },
                );
                if accepted {
                    return true;
                }
            }
        }
    }
    false
}

/// Swap a routed node with a dropped one. This is how a higher-penalty
/// (higher-priority) shipment evicts a cheaper one when capacity only
/// admits one of them.
fn try_exchange_dropped(
    model: &RoutingModel,
    state: &mut SolutionState,
    penalties: &HashMap<Arc, i64>,
    lambda: i64,
    current: i64,
) -> bool {
    let dropped: Vec<usize> = state.dropped.iter().copied().collect();
    for node in dropped {
        for vehicle in 0..model.vehicle_count() {
            for index in 0..state.routes[vehicle].len() {
                let accepted = accept_if_better(
                    model,
                    state,
                    penalties,
                    lambda,
                    current,
                    |candidate| {
                        let mut sequence = candidate.routes[vehicle].clone();
                        let evicted = std::mem::replace(&mut sequence[index], node);
                        if candidate.try_set_route(model, vehicle, sequence) {
                            candidate.dropped.remove(&node);
                            candidate.dropped.insert(evicted);
                            true
                        } else {
                            false
                        }
                    },
                );
                if accepted {
                    return true;
                }
            }
        }
    }
    false
}

fn try_relocate(
    model: &RoutingModel,
    state: &mut SolutionState,
    penalties: &HashMap<Arc, i64>,
    lambda: i64,
    current: i64,
) -> bool {
    for from in 0..model.vehicle_count() {
        for index in 0..state.routes[from].len() {
            for to in 0..model.vehicle_count() {
                let upper = if to == from {
                    state.routes[to].len().saturating_sub(1)
                } else {
                    state.routes[to].len()
                };
                for position in 0..=upper {
                    if to == from && position == index {
                        continue;
                    }
                    let accepted = accept_if_better(
                        model,
                        state,
                        penalties,
                        lambda,
                        current,
                        |candidate| {
                            let mut source = candidate.routes[from].clone();
                            let node = source.remove(index);
                            if to == from {
                                source.insert(position, node);
                                candidate.try_set_route(model, from, source)
                            } else {
                                let mut target = candidate.routes[to].clone();
                                target.insert(position, node);
                                candidate.try_set_route(model, from, source)
                                    && candidate.try_set_route(model, to, target)
                            }
                        },
                    );
                    if accepted {
                        return true;
                    }
                }
            }
        }
    }
    false
}

fn try_swap(
    model: &RoutingModel,
    state: &mut SolutionState,
    penalties: &HashMap<Arc, i64>,
    lambda: i64,
    current: i64,
) -> bool {
    for a in 0..model.vehicle_count() {
        for i in 0..state.routes[a].len() {
            for b in a..model.vehicle_count() {
                let start = if a == b { i + 1 } else { 0 };
                for j in start..state.routes[b].len() {
                    let accepted = accept_if_better(
                        model,
                        state,
                        penalties,
                        lambda,
                        current,
                        |candidate| {
                            if a == b {
                                let mut route = candidate.routes[a].clone();
                                route.swap(i, j);
                                candidate.try_set_route(model, a, route)
                            } else {
                                let mut first = candidate.routes[a].clone();
                                let mut second = candidate.routes[b].clone();
                                std::mem::swap(&mut first[i], &mut second[j]);
                                candidate.try_set_route(model, a, first)
                                    && candidate.try_set_route(model, b, second)
                            }
                        },
                    );
                    if accepted {
                        return true;
                    }
                }
            }
        }
    }
    false
}

fn try_two_opt(
    model: &RoutingModel,
    state: &mut SolutionState,
    penalties: &HashMap<Arc, i64>,
    lambda: i64,
    current: i64,
) -> bool {
    for vehicle in 0..model.vehicle_count() {
        let len = state.routes[vehicle].len();
        for i in 0..len {
            for j in (i + 1)..len {
                let accepted = accept_if_better(
                    model,
                    state,
                    penalties,
                    lambda,
                    current,
                    |candidate| {
                        let mut route = candidate.routes[vehicle].clone();
                        route[i..=j].reverse();
                        candidate.try_set_route(model, vehicle, route)
                    },
                );
                if accepted {
                    return true;
                }
            }
        }
    }
    false
}

/// Penalize the solution arc with the highest utility, deterministically
/// preferring the first one found in scan order on ties.
fn penalize_worst_arc(
    model: &RoutingModel,
    state: &SolutionState,
    penalties: &mut HashMap<Arc, i64>,
) {
    let mut worst: Option<(Arc, i64)> = None;
    for (vehicle, eval) in state.evals.iter().enumerate() {
        if eval.is_none() {
            continue;
        }
        for arc in route_arcs(&state.routes[vehicle]) {
            let penalty = penalties.get(&arc).copied().unwrap_or(0);
            let utility = model.matrix.distance_m(arc.0, arc.1) / (1 + penalty);
            if worst.is_none_or(|(_, best)| utility > best) {
                worst = Some((arc, utility));
            }
        }
    }
    if let Some((arc, _)) = worst {
        *penalties.entry(arc).or_insert(0) += 1;
    }
}
