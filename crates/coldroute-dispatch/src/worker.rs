//! Bounded worker pool running plan jobs.
//!
//! The dispatcher validates requests synchronously, persists a PENDING job,
//! and enqueues a task. Workers drain the queue: each task transitions its
//! job to RUNNING, snapshots the input, runs the solver on a blocking
//! thread, and persists the outcome. A progress sampler writes a monotone
//! value every couple of seconds (capped at 95 until the terminal write),
//! and a watchdog flips the solver's cancellation flag when the wall-clock
//! deadline passes. Unexpected infrastructure failures are retried once
//! before the job is failed with an INTERNAL error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{error, info, warn};

use coldroute_lib::{
    assemble_plan, build_model, prescreen, solve, Depot, Error, FailureKind, Job, JobId,
    JobState, PlanParameters, PlanSnapshot, Result, SolveOptions, ViolationsReport,
};

use crate::orchestrator::{PlanAccepted, PlanRequest, SnapshotCounts};
use crate::state::DispatchState;

/// Extra wall-clock allowance past the solver time limit before the
/// watchdog cancels the solve.
const DEADLINE_OVERHEAD: Duration = Duration::from_secs(2);

/// Progress sampling cadence.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

/// Progress ceiling until the terminal transition writes 100.
const PROGRESS_CAP: u8 = 95;

struct PlanTask {
    job_id: JobId,
    depot: Depot,
    params: PlanParameters,
}

/// Per-job cancellation state. The solver only observes the flag; the
/// worker distinguishes a user cancel from a deadline cancel afterwards.
struct CancelState {
    solver_flag: Arc<AtomicBool>,
    user_requested: AtomicBool,
}

impl CancelState {
    fn new() -> Self {
        Self {
            solver_flag: Arc::new(AtomicBool::new(false)),
            user_requested: AtomicBool::new(false),
        }
    }

    fn request_user_cancel(&self) {
        self.user_requested.store(true, Ordering::Relaxed);
        self.solver_flag.store(true, Ordering::Relaxed);
    }

    fn user_cancelled(&self) -> bool {
        self.user_requested.load(Ordering::Relaxed)
    }
}

type CancelMap = Arc<StdMutex<HashMap<JobId, Arc<CancelState>>>>;

/// Accepts plan requests and runs them on a bounded worker pool.
pub struct Dispatcher {
    state: DispatchState,
    tx: mpsc::Sender<PlanTask>,
    cancels: CancelMap,
}

impl Dispatcher {
    /// Spawn `workers` queue consumers and return the dispatcher handle.
    pub fn start(state: DispatchState, workers: usize) -> Self {
        let (tx, rx) = mpsc::channel::<PlanTask>(64);
        let rx = Arc::new(AsyncMutex::new(rx));
        let cancels: CancelMap = Arc::new(StdMutex::new(HashMap::new()));

        for worker_id in 0..workers.max(1) {
            tokio::spawn(worker_loop(
                worker_id,
                state.clone(),
                Arc::clone(&rx),
                Arc::clone(&cancels),
            ));
        }

        Self { state, tx, cancels }
    }

    /// Validate the request, create the job, and enqueue it. Returns
    /// immediately with the PENDING job id.
    pub async fn submit(&self, request: PlanRequest) -> Result<PlanAccepted> {
        let (depot, params) = request.resolve(&self.state)?;

        let (shipments, vehicles) = self.state.store().snapshot_counts()?;
        if shipments == 0 {
            return Err(Error::PreconditionFailure {
                message: "no pending shipments to plan".to_string(),
            });
        }
        if vehicles == 0 {
            return Err(Error::PreconditionFailure {
                message: "no available vehicles".to_string(),
            });
        }

        let job = Job::pending(params.plan_date);
        self.state.store().create_job(&job)?;

        self.register_cancel(job.id);
        let task = PlanTask {
            job_id: job.id,
            depot,
            params,
        };
        if self.tx.send(task).await.is_err() {
            // The pool is gone; leave a terminal record rather than a job
            // stuck in PENDING.
            self.state.store().fail_job(
                job.id,
                Utc::now(),
                FailureKind::Internal,
                "worker pool is not running",
                None,
            )?;
            return Err(Error::internal("worker pool is not running"));
        }

        info!(job_id = %job.id, shipments, vehicles, "plan request accepted");
        Ok(PlanAccepted {
            job_id: job.id,
            state: JobState::Pending,
            snapshot_counts: SnapshotCounts {
                shipments,
                vehicles,
            },
        })
    }

    /// Request cancellation of a queued or running job.
    ///
    /// Terminal jobs absorb the request; unknown ids are NotFound.
    pub fn cancel(&self, job_id: JobId) -> Result<()> {
        let entry = {
            let cancels = self
                .cancels
                .lock()
                .map_err(|_| Error::internal("cancel map poisoned"))?;
            cancels.get(&job_id).cloned()
        };
        match entry {
            Some(cancel) => {
                cancel.request_user_cancel();
                info!(job_id = %job_id, "cancellation requested");
                Ok(())
            }
            None => {
                // Known but already finished is a no-op; unknown is an error.
                let job = self.state.store().get_job(job_id)?;
                if job.state.is_terminal() {
                    Ok(())
                } else {
                    Err(Error::internal(format!(
                        "job {job_id} is {} but has no cancel handle",
                        job.state
                    )))
                }
            }
        }
    }

    pub fn state(&self) -> &DispatchState {
        &self.state
    }

    fn register_cancel(&self, job_id: JobId) -> Arc<CancelState> {
        let cancel = Arc::new(CancelState::new());
        if let Ok(mut cancels) = self.cancels.lock() {
            cancels.insert(job_id, Arc::clone(&cancel));
        }
        cancel
    }
}

async fn worker_loop(
    worker_id: usize,
    state: DispatchState,
    rx: Arc<AsyncMutex<mpsc::Receiver<PlanTask>>>,
    cancels: CancelMap,
) {
    loop {
        let task = { rx.lock().await.recv().await };
        let Some(task) = task else {
            break;
        };
        let job_id = task.job_id;
        let cancel = cancels
            .lock()
            .ok()
            .and_then(|map| map.get(&job_id).cloned())
            .unwrap_or_else(|| Arc::new(CancelState::new()));

        info!(worker_id, job_id = %job_id, "job picked up");
        let mut outcome = run_task(&state, &task, &cancel).await;
        if let Err(err) = &outcome {
            if err.is_retryable() {
                warn!(worker_id, job_id = %job_id, error = %err, "retrying job once");
                outcome = run_task(&state, &task, &cancel).await;
            }
        }
        if let Err(err) = outcome {
            error!(worker_id, job_id = %job_id, error = %err, "job failed internally");
            if let Err(store_err) = state.store().fail_job(
                job_id,
                Utc::now(),
                FailureKind::Internal,
                &err.to_string(),
                None,
            ) {
                error!(job_id = %job_id, error = %store_err, "failed to record job failure");
            }
        }

        if let Ok(mut map) = cancels.lock() {
            map.remove(&job_id);
        }
    }
}

/// Run one job to a terminal state. Domain outcomes (infeasible, timeout,
/// cancelled) are written to the store and return `Ok`; only unexpected
/// infrastructure failures bubble as `Err` for the retry path.
async fn run_task(state: &DispatchState, task: &PlanTask, cancel: &CancelState) -> Result<()> {
    let store = state.store();
    let config = state.config().clone();
    let job_id = task.job_id;

    store.mark_job_running(job_id, Utc::now())?;

    if cancel.user_cancelled() {
        store.fail_job(
            job_id,
            Utc::now(),
            FailureKind::Cancelled,
            "cancelled before start",
            None,
        )?;
        return Ok(());
    }

    // Snapshot: the solve owns these exclusively from here on.
    let vehicles = store.available_vehicles()?;
    let shipments = store.pending_shipments()?;
    if vehicles.is_empty() || shipments.is_empty() {
        store.fail_job(
            job_id,
            Utc::now(),
            FailureKind::Infeasible,
            "snapshot is empty: no pending shipments or no available vehicles",
            None,
        )?;
        return Ok(());
    }
    let snapshot = PlanSnapshot {
        depot: task.depot.clone(),
        vehicles,
        shipments,
    };

    let screen = prescreen(&snapshot, &task.params, &config);
    if screen.strict_temperature_excluded {
        let report = ViolationsReport {
            temperature_violations: Vec::new(),
            unassigned: screen.excluded,
        };
        store.fail_job(
            job_id,
            Utc::now(),
            FailureKind::Infeasible,
            "a STRICT shipment cannot meet its temperature ceiling on any vehicle",
            Some(&report),
        )?;
        return Ok(());
    }

    let filtered = PlanSnapshot {
        depot: snapshot.depot.clone(),
        vehicles: snapshot.vehicles.clone(),
        shipments: screen.solvable.clone(),
    };
    let model = build_model(&filtered, &task.params, &config)?;

    let sampler = tokio::spawn(progress_sampler(
        state.clone(),
        job_id,
        task.params.time_limit,
    ));
    let watchdog_flag = Arc::clone(&cancel.solver_flag);
    let deadline = task.params.time_limit + DEADLINE_OVERHEAD;
    let watchdog = tokio::spawn(async move {
        tokio::time::sleep(deadline).await;
        watchdog_flag.store(true, Ordering::Relaxed);
    });

    let options = SolveOptions {
        time_limit: task.params.time_limit,
        cancel: Arc::clone(&cancel.solver_flag),
    };
    let solver_model = model.clone();
    let solve_result = tokio::task::spawn_blocking(move || solve(&solver_model, &options)).await;

    sampler.abort();
    watchdog.abort();

    let assignment = match solve_result {
        Err(join_err) => {
            return Err(Error::internal(format!("solver task aborted: {join_err}")));
        }
        Ok(Err(Error::SolverTimeout)) => {
            let (kind, message) = if cancel.user_cancelled() {
                (FailureKind::Cancelled, "cancelled by request")
            } else {
                (
                    FailureKind::Timeout,
                    "deadline reached before a first solution was found",
                )
            };
            store.fail_job(job_id, Utc::now(), kind, message, None)?;
            return Ok(());
        }
        Ok(Err(other)) => return Err(other),
        Ok(Ok(assignment)) => assignment,
    };

    if cancel.user_cancelled() {
        store.fail_job(
            job_id,
            Utc::now(),
            FailureKind::Cancelled,
            "cancelled by request",
            None,
        )?;
        return Ok(());
    }

    let plan = assemble_plan(&filtered, &model, &assignment, screen.excluded, &task.params)?;

    if plan.strict_temperature_breach {
        store.fail_job(
            job_id,
            Utc::now(),
            FailureKind::Infeasible,
            "tracked temperature breaches a STRICT shipment's ceiling",
            Some(&plan.report),
        )?;
        return Ok(());
    }
    if plan.strict_dropped {
        store.fail_job(
            job_id,
            Utc::now(),
            FailureKind::Infeasible,
            "a STRICT shipment could not be assigned to any route",
            Some(&plan.report),
        )?;
        return Ok(());
    }

    store.complete_job(job_id, Utc::now(), &plan)?;
    Ok(())
}

/// Ramp progress with elapsed time against the solve budget, capped below
/// 100 so only the terminal transition finishes the bar.
async fn progress_sampler(state: DispatchState, job_id: JobId, budget: Duration) {
    let started = tokio::time::Instant::now();
    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    // The first tick fires immediately; skip it so progress starts low.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let elapsed = started.elapsed().as_secs_f64();
        let ratio = (elapsed / budget.as_secs_f64().max(1.0)).min(1.0);
        let progress = (5.0 + ratio * 90.0).round() as u8;
        if state
            .store()
            .update_progress(job_id, progress.min(PROGRESS_CAP))
            .is_err()
        {
            break;
        }
    }
}
