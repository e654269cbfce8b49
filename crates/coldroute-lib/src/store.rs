//! SQLite persistence for fleet data, shipments, jobs, and plans.
//!
//! The store owns a single connection behind a mutex; every public method
//! is one short transaction. Snapshots are read at job start, plan results
//! are written back in a single all-or-nothing transaction at completion,
//! and nothing is persisted for a job that fails mid-solve except the job
//! record itself.
//!
//! Route rows carry a monotonically increasing `version`; updates check the
//! expected version and reject stale writers with [`Error::Conflict`].

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::assemble::{AssembledPlan, ViolationsReport};
use crate::domain::{
    Depot, DepotId, FailureKind, Job, JobId, JobState, PlanSummary, Route, RouteId, Shipment,
    ShipmentId, ShipmentStatus, SlaTier, Stop, TimeWindow, TimeWindows, Vehicle, VehicleId,
};
use crate::error::{Error, Result};
use crate::geo::GeoPoint;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS depots (
    id            INTEGER PRIMARY KEY,
    name          TEXT NOT NULL,
    lat           REAL NOT NULL,
    lon           REAL NOT NULL,
    open_minute   INTEGER NOT NULL,
    close_minute  INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS vehicles (
    id               INTEGER PRIMARY KEY,
    name             TEXT NOT NULL,
    weight_capacity  REAL NOT NULL,
    volume_capacity  REAL NOT NULL,
    insulation_k     REAL NOT NULL,
    door_coefficient REAL NOT NULL,
    has_curtain      INTEGER NOT NULL,
    cooling_rate     REAL NOT NULL,
    min_temp         REAL NOT NULL,
    available        INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS shipments (
    id              INTEGER PRIMARY KEY,
    name            TEXT NOT NULL,
    lat             REAL NOT NULL,
    lon             REAL NOT NULL,
    weight          REAL NOT NULL,
    volume          REAL NOT NULL,
    w1_start        INTEGER NOT NULL,
    w1_end          INTEGER NOT NULL,
    w2_start        INTEGER,
    w2_end          INTEGER,
    service_minutes INTEGER NOT NULL,
    temp_ceiling    REAL NOT NULL,
    temp_floor      REAL,
    sla             TEXT NOT NULL,
    priority        INTEGER NOT NULL,
    status          TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS jobs (
    id            TEXT PRIMARY KEY,
    plan_date     TEXT NOT NULL,
    state         TEXT NOT NULL,
    progress      INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,
    started_at    TEXT,
    finished_at   TEXT,
    summary       TEXT,
    violations    TEXT,
    error_kind    TEXT,
    error_message TEXT
);
CREATE TABLE IF NOT EXISTS routes (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id             TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    vehicle_id         INTEGER NOT NULL,
    total_distance_m   INTEGER NOT NULL,
    total_duration_min INTEGER NOT NULL,
    initial_temp       REAL NOT NULL,
    final_temp         REAL NOT NULL,
    max_temp           REAL NOT NULL,
    is_feasible        INTEGER NOT NULL,
    version            INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS stops (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    route_id         INTEGER NOT NULL REFERENCES routes(id) ON DELETE CASCADE,
    sequence         INTEGER NOT NULL,
    shipment_id      INTEGER NOT NULL,
    arrival_minute   INTEGER NOT NULL,
    departure_minute INTEGER NOT NULL,
    transit_rise     REAL NOT NULL,
    service_rise     REAL NOT NULL,
    cooling_applied  REAL NOT NULL,
    arrival_temp     REAL NOT NULL,
    departure_temp   REAL NOT NULL,
    feasible         INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_routes_job ON routes(job_id);
CREATE INDEX IF NOT EXISTS idx_stops_route ON stops(route_id);
";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Persistent store shared by the orchestrator and the CLI.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if needed) the store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        info!(path = %path.display(), "store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("store mutex poisoned"))
    }

    // ------------------------------------------------------------------
    // Fleet and shipment data

    pub fn insert_depot(&self, depot: &Depot) -> Result<DepotId> {
        depot.validate()?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO depots (id, name, lat, lon, open_minute, close_minute)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id_or_null(depot.id),
                depot.name,
                depot.location.lat,
                depot.location.lon,
                depot.open_minute,
                depot.close_minute,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_vehicle(&self, vehicle: &Vehicle) -> Result<VehicleId> {
        vehicle.validate()?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO vehicles (id, name, weight_capacity, volume_capacity, insulation_k,
                                   door_coefficient, has_curtain, cooling_rate, min_temp, available)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id_or_null(vehicle.id),
                vehicle.name,
                vehicle.weight_capacity,
                vehicle.volume_capacity,
                vehicle.insulation_k,
                vehicle.door_coefficient,
                vehicle.has_curtain,
                vehicle.cooling_rate,
                vehicle.min_temp,
                vehicle.available,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_shipment(&self, shipment: &Shipment) -> Result<ShipmentId> {
        shipment.validate()?;
        let windows = shipment.windows.as_slice();
        let second = windows.get(1);
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO shipments (id, name, lat, lon, weight, volume,
                                    w1_start, w1_end, w2_start, w2_end,
                                    service_minutes, temp_ceiling, temp_floor,
                                    sla, priority, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                id_or_null(shipment.id),
                shipment.name,
                shipment.location.lat,
                shipment.location.lon,
                shipment.weight,
                shipment.volume,
                windows[0].start,
                windows[0].end,
                second.map(|w| w.start),
                second.map(|w| w.end),
                shipment.service_minutes,
                shipment.temp_ceiling,
                shipment.temp_floor,
                shipment.sla.as_str(),
                shipment.priority,
                shipment.status.as_str(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn depot(&self, id: DepotId) -> Result<Depot> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name, lat, lon, open_minute, close_minute FROM depots WHERE id = ?1",
            [id],
            row_to_depot,
        )
        .optional()?
        .ok_or(Error::NotFound {
            entity: "depot",
            id: id.to_string(),
        })
    }

    /// The lone configured depot; plans that omit a depot reference use it.
    pub fn default_depot(&self) -> Result<Depot> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name, lat, lon, open_minute, close_minute
             FROM depots ORDER BY id LIMIT 1",
            [],
            row_to_depot,
        )
        .optional()?
        .ok_or(Error::NotFound {
            entity: "depot",
            id: "default".to_string(),
        })
    }

    pub fn available_vehicles(&self) -> Result<Vec<Vehicle>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, weight_capacity, volume_capacity, insulation_k,
                    door_coefficient, has_curtain, cooling_rate, min_temp, available
             FROM vehicles WHERE available = 1 ORDER BY id",
        )?;
        let rows = stmt.query_map([], row_to_vehicle)?;
        collect_rows(rows)
    }

    pub fn pending_shipments(&self) -> Result<Vec<Shipment>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, lat, lon, weight, volume, w1_start, w1_end, w2_start, w2_end,
                    service_minutes, temp_ceiling, temp_floor, sla, priority, status
             FROM shipments WHERE status = 'PENDING' ORDER BY id",
        )?;
        let rows = stmt.query_map([], row_to_shipment)?;
        collect_rows(rows)
    }

    pub fn get_shipment(&self, id: ShipmentId) -> Result<Shipment> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name, lat, lon, weight, volume, w1_start, w1_end, w2_start, w2_end,
                    service_minutes, temp_ceiling, temp_floor, sla, priority, status
             FROM shipments WHERE id = ?1",
            [id],
            row_to_shipment,
        )
        .optional()?
        .ok_or(Error::NotFound {
            entity: "shipment",
            id: id.to_string(),
        })
    }

    /// Pending-shipment and available-vehicle counts for precondition checks.
    pub fn snapshot_counts(&self) -> Result<(usize, usize)> {
        let conn = self.lock()?;
        let shipments: i64 = conn.query_row(
            "SELECT COUNT(*) FROM shipments WHERE status = 'PENDING'",
            [],
            |row| row.get(0),
        )?;
        let vehicles: i64 = conn.query_row(
            "SELECT COUNT(*) FROM vehicles WHERE available = 1",
            [],
            |row| row.get(0),
        )?;
        Ok((shipments as usize, vehicles as usize))
    }

    // ------------------------------------------------------------------
    // Jobs

    pub fn create_job(&self, job: &Job) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO jobs (id, plan_date, state, progress, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                job.id.to_string(),
                job.plan_date.format(DATE_FORMAT).to_string(),
                job.state.as_str(),
                job.progress,
                job.created_at.to_rfc3339(),
            ],
        )?;
        debug!(job_id = %job.id, "job created");
        Ok(())
    }

    pub fn get_job(&self, id: JobId) -> Result<Job> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, plan_date, state, progress, created_at, started_at, finished_at,
                    summary, violations, error_kind, error_message
             FROM jobs WHERE id = ?1",
            [id.to_string()],
            row_to_job,
        )
        .optional()?
        .ok_or(Error::NotFound {
            entity: "job",
            id: id.to_string(),
        })
    }

    /// Most recent completed job for a plan date, if any.
    pub fn latest_completed_job(&self, plan_date: NaiveDate) -> Result<Option<JobId>> {
        let conn = self.lock()?;
        let id: Option<String> = conn
            .query_row(
                "SELECT id FROM jobs WHERE plan_date = ?1 AND state = 'COMPLETED'
                 ORDER BY created_at DESC LIMIT 1",
                [plan_date.format(DATE_FORMAT).to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(raw) => Ok(Some(parse_job_id(&raw)?)),
            None => Ok(None),
        }
    }

    /// PENDING → RUNNING. Re-marking a RUNNING job is a no-op so the retry
    /// path stays monotone.
    pub fn mark_job_running(&self, id: JobId, at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE jobs SET state = 'RUNNING', started_at = COALESCE(started_at, ?2)
             WHERE id = ?1 AND state IN ('PENDING', 'RUNNING')",
            params![id.to_string(), at.to_rfc3339()],
        )?;
        if updated == 0 {
            return Err(Error::internal(format!(
                "job {id} is terminal; cannot transition to RUNNING"
            )));
        }
        Ok(())
    }

    /// Monotone progress write; lower values are absorbed, and terminal
    /// states are untouched.
    pub fn update_progress(&self, id: JobId, progress: u8) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE jobs SET progress = MAX(progress, ?2)
             WHERE id = ?1 AND state = 'RUNNING'",
            params![id.to_string(), progress.min(100)],
        )?;
        Ok(())
    }

    /// Atomically persist the assembled plan and complete the job.
    ///
    /// Routes, stops, shipment status updates, and the job transition all
    /// commit together or not at all.
    pub fn complete_job(&self, id: JobId, at: DateTime<Utc>, plan: &AssembledPlan) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let state: Option<String> = tx
            .query_row(
                "SELECT state FROM jobs WHERE id = ?1",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match state.as_deref() {
            None => {
                return Err(Error::NotFound {
                    entity: "job",
                    id: id.to_string(),
                })
            }
            Some("RUNNING") => {}
            Some(other) => {
                return Err(Error::internal(format!(
                    "job {id} is {other}; cannot complete"
                )))
            }
        }

        for route in &plan.routes {
            tx.execute(
                "INSERT INTO routes (job_id, vehicle_id, total_distance_m, total_duration_min,
                                     initial_temp, final_temp, max_temp, is_feasible, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id.to_string(),
                    route.vehicle_id,
                    route.total_distance_m,
                    route.total_duration_min,
                    route.initial_temp,
                    route.final_temp,
                    route.max_temp,
                    route.is_feasible,
                    route.version,
                ],
            )?;
            let route_id = tx.last_insert_rowid();
            for stop in &route.stops {
                tx.execute(
                    "INSERT INTO stops (route_id, sequence, shipment_id, arrival_minute,
                                        departure_minute, transit_rise, service_rise,
                                        cooling_applied, arrival_temp, departure_temp, feasible)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        route_id,
                        stop.sequence,
                        stop.shipment_id,
                        stop.arrival_minute,
                        stop.departure_minute,
                        stop.transit_rise,
                        stop.service_rise,
                        stop.cooling_applied,
                        stop.arrival_temp,
                        stop.departure_temp,
                        stop.feasible,
                    ],
                )?;
            }
        }

        for shipment_id in &plan.assigned {
            tx.execute(
                "UPDATE shipments SET status = 'ASSIGNED' WHERE id = ?1",
                [shipment_id],
            )?;
        }

        tx.execute(
            "UPDATE jobs SET state = 'COMPLETED', progress = 100, finished_at = ?2,
                             summary = ?3, violations = ?4
             WHERE id = ?1",
            params![
                id.to_string(),
                at.to_rfc3339(),
                serde_json::to_string(&plan.summary)?,
                serde_json::to_string(&plan.report)?,
            ],
        )?;

        tx.commit()?;
        info!(job_id = %id, routes = plan.routes.len(), "plan persisted");
        Ok(())
    }

    /// Transition a job to FAILED. No plan rows are written; an optional
    /// report preserves the diagnostics that explain the failure. Already
    /// terminal jobs are left untouched.
    pub fn fail_job(
        &self,
        id: JobId,
        at: DateTime<Utc>,
        kind: FailureKind,
        message: &str,
        report: Option<&ViolationsReport>,
    ) -> Result<()> {
        let violations = report.map(serde_json::to_string).transpose()?;
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE jobs SET state = 'FAILED', finished_at = ?2, error_kind = ?3,
                             error_message = ?4, violations = COALESCE(?5, violations)
             WHERE id = ?1 AND state IN ('PENDING', 'RUNNING')",
            params![
                id.to_string(),
                at.to_rfc3339(),
                kind.as_str(),
                message,
                violations,
            ],
        )?;
        if updated > 0 {
            info!(job_id = %id, kind = kind.as_str(), "job failed");
        }
        Ok(())
    }

    /// Delete a job; routes and stops cascade.
    pub fn delete_job(&self, id: JobId) -> Result<()> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM jobs WHERE id = ?1", [id.to_string()])?;
        if deleted == 0 {
            return Err(Error::NotFound {
                entity: "job",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Routes and reports

    pub fn job_route_ids(&self, id: JobId) -> Result<Vec<RouteId>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id FROM routes WHERE job_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map([id.to_string()], |row| row.get(0))?;
        collect_rows(rows)
    }

    pub fn routes_for_job(&self, id: JobId) -> Result<Vec<(RouteId, Route)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, vehicle_id, total_distance_m, total_duration_min, initial_temp,
                    final_temp, max_temp, is_feasible, version
             FROM routes WHERE job_id = ?1 ORDER BY id",
        )?;
        let headers: Vec<(RouteId, Route)> = collect_rows(stmt.query_map(
            [id.to_string()],
            |row| {
                Ok((
                    row.get::<_, RouteId>(0)?,
                    Route {
                        vehicle_id: row.get(1)?,
                        stops: Vec::new(),
                        total_distance_m: row.get(2)?,
                        total_duration_min: row.get(3)?,
                        initial_temp: row.get(4)?,
                        final_temp: row.get(5)?,
                        max_temp: row.get(6)?,
                        is_feasible: row.get(7)?,
                        version: row.get(8)?,
                    },
                ))
            },
        )?)?;

        let mut stop_stmt = conn.prepare(
            "SELECT sequence, shipment_id, arrival_minute, departure_minute, transit_rise,
                    service_rise, cooling_applied, arrival_temp, departure_temp, feasible
             FROM stops WHERE route_id = ?1 ORDER BY sequence",
        )?;

        let mut routes = Vec::with_capacity(headers.len());
        for (route_id, mut route) in headers {
            route.stops = collect_rows(stop_stmt.query_map([route_id], row_to_stop)?)?;
            routes.push((route_id, route));
        }
        Ok(routes)
    }

    /// Violations report persisted with the job; empty when none was stored.
    pub fn violations_report(&self, id: JobId) -> Result<ViolationsReport> {
        // Existence check first so unknown ids surface as NotFound.
        self.get_job(id)?;
        let conn = self.lock()?;
        let raw: Option<String> = conn.query_row(
            "SELECT violations FROM jobs WHERE id = ?1",
            [id.to_string()],
            |row| row.get(0),
        )?;
        match raw {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(ViolationsReport::default()),
        }
    }

    /// Optimistically update a route's feasibility verdict.
    ///
    /// Returns the new version. A stale `expected_version` yields
    /// [`Error::Conflict`] and leaves the row untouched; callers may reload
    /// and retry.
    pub fn update_route_feasibility(
        &self,
        route_id: RouteId,
        expected_version: i64,
        is_feasible: bool,
    ) -> Result<i64> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let found: Option<i64> = tx
            .query_row(
                "SELECT version FROM routes WHERE id = ?1",
                [route_id],
                |row| row.get(0),
            )
            .optional()?;
        let found = found.ok_or(Error::NotFound {
            entity: "route",
            id: route_id.to_string(),
        })?;
        if found != expected_version {
            return Err(Error::Conflict {
                route_id,
                expected: expected_version,
                found,
            });
        }

        tx.execute(
            "UPDATE routes SET is_feasible = ?2, version = version + 1 WHERE id = ?1",
            params![route_id, is_feasible],
        )?;
        tx.commit()?;
        Ok(found + 1)
    }
}

fn id_or_null(id: i64) -> Option<i64> {
    (id > 0).then_some(id)
}

fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }
    Ok(items)
}

/// Wrap a domain parse failure so it can surface through rusqlite's row
/// mapping, keeping the mappers in plain `rusqlite::Result` form.
fn domain_err(err: Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
}

fn row_to_depot(row: &Row<'_>) -> rusqlite::Result<Depot> {
    Ok(Depot {
        id: row.get(0)?,
        name: row.get(1)?,
        location: GeoPoint {
            lat: row.get(2)?,
            lon: row.get(3)?,
        },
        open_minute: row.get(4)?,
        close_minute: row.get(5)?,
    })
}

fn row_to_vehicle(row: &Row<'_>) -> rusqlite::Result<Vehicle> {
    Ok(Vehicle {
        id: row.get(0)?,
        name: row.get(1)?,
        weight_capacity: row.get(2)?,
        volume_capacity: row.get(3)?,
        insulation_k: row.get(4)?,
        door_coefficient: row.get(5)?,
        has_curtain: row.get(6)?,
        cooling_rate: row.get(7)?,
        min_temp: row.get(8)?,
        available: row.get(9)?,
    })
}

fn row_to_shipment(row: &Row<'_>) -> rusqlite::Result<Shipment> {
    let mut windows = vec![
        TimeWindow::new(row.get::<_, u32>(6)?, row.get::<_, u32>(7)?).map_err(domain_err)?
    ];
    if let (Some(start), Some(end)) = (
        row.get::<_, Option<u32>>(8)?,
        row.get::<_, Option<u32>>(9)?,
    ) {
        windows.push(TimeWindow::new(start, end).map_err(domain_err)?);
    }

    Ok(Shipment {
        id: row.get(0)?,
        name: row.get(1)?,
        location: GeoPoint {
            lat: row.get(2)?,
            lon: row.get(3)?,
        },
        weight: row.get(4)?,
        volume: row.get(5)?,
        windows: TimeWindows::new(windows).map_err(domain_err)?,
        service_minutes: row.get(10)?,
        temp_ceiling: row.get(11)?,
        temp_floor: row.get(12)?,
        sla: SlaTier::parse(&row.get::<_, String>(13)?).map_err(domain_err)?,
        priority: row.get(14)?,
        status: ShipmentStatus::parse(&row.get::<_, String>(15)?).map_err(domain_err)?,
    })
}

fn row_to_stop(row: &Row<'_>) -> rusqlite::Result<Stop> {
    Ok(Stop {
        sequence: row.get(0)?,
        shipment_id: row.get(1)?,
        arrival_minute: row.get(2)?,
        departure_minute: row.get(3)?,
        transit_rise: row.get(4)?,
        service_rise: row.get(5)?,
        cooling_applied: row.get(6)?,
        arrival_temp: row.get(7)?,
        departure_temp: row.get(8)?,
        feasible: row.get(9)?,
    })
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: parse_job_id(&row.get::<_, String>(0)?).map_err(domain_err)?,
        plan_date: parse_date(&row.get::<_, String>(1)?).map_err(domain_err)?,
        state: JobState::parse(&row.get::<_, String>(2)?).map_err(domain_err)?,
        progress: row.get(3)?,
        created_at: parse_timestamp(&row.get::<_, String>(4)?).map_err(domain_err)?,
        started_at: row
            .get::<_, Option<String>>(5)?
            .map(|raw| parse_timestamp(&raw))
            .transpose()
            .map_err(domain_err)?,
        finished_at: row
            .get::<_, Option<String>>(6)?
            .map(|raw| parse_timestamp(&raw))
            .transpose()
            .map_err(domain_err)?,
        summary: row
            .get::<_, Option<String>>(7)?
            .map(|raw| serde_json::from_str::<PlanSummary>(&raw))
            .transpose()
            .map_err(|err| domain_err(Error::from(err)))?,
        error_kind: row
            .get::<_, Option<String>>(9)?
            .map(|raw| FailureKind::parse(&raw))
            .transpose()
            .map_err(domain_err)?,
        error_message: row.get(10)?,
    })
}

fn parse_job_id(raw: &str) -> Result<JobId> {
    raw.parse()
        .map_err(|_| Error::internal(format!("malformed job id in store: '{raw}'")))
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| Error::internal(format!("malformed plan date in store: '{raw}'")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| Error::internal(format!("malformed timestamp in store: '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::AssembledPlan;
    use crate::domain::PlanSummary;

    fn depot() -> Depot {
        Depot {
            id: 0,
            name: "Main".into(),
            location: GeoPoint {
                lat: 25.033,
                lon: 121.565,
            },
            open_minute: 0,
            close_minute: 1_439,
        }
    }

    fn vehicle() -> Vehicle {
        Vehicle {
            id: 0,
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

    fn shipment() -> Shipment {
        Shipment {
            id: 0,
            name: "S1".into(),
            location: GeoPoint {
                lat: 25.050,
                lon: 121.580,
            },
            weight: 100.0,
            volume: 1.0,
            windows: TimeWindows::new(vec![
                TimeWindow::new(480, 600).unwrap(),
                TimeWindow::new(840, 900).unwrap(),
            ])
            .unwrap(),
            service_minutes: 15,
            temp_ceiling: 5.0,
            temp_floor: Some(-10.0),
            sla: SlaTier::Strict,
            priority: 50,
            status: ShipmentStatus::Pending,
        }
    }

    fn plan_with_one_route(vehicle_id: VehicleId, shipment_id: ShipmentId) -> AssembledPlan {
        AssembledPlan {
            routes: vec![Route {
                vehicle_id,
                stops: vec![Stop {
                    sequence: 1,
                    shipment_id,
                    arrival_minute: 485,
                    departure_minute: 500,
                    transit_rise: 0.3,
                    service_rise: 0.1,
                    cooling_applied: -0.2,
                    arrival_temp: -4.9,
                    departure_temp: -4.8,
                    feasible: true,
                }],
                total_distance_m: 4_800,
                total_duration_min: 25,
                initial_temp: -5.0,
                final_temp: -4.8,
                max_temp: -4.8,
                is_feasible: true,
                version: 1,
            }],
            assigned: vec![shipment_id],
            summary: PlanSummary {
                total_distance_m: 4_800,
                total_duration_min: 25,
                vehicles_used: 1,
                shipments_assigned: 1,
                shipments_unassigned: 0,
                is_feasible: true,
            },
            report: ViolationsReport::default(),
            strict_temperature_breach: false,
            strict_dropped: false,
        }
    }

    #[test]
    fn fixture_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let depot_id = store.insert_depot(&depot()).unwrap();
        let vehicle_id = store.insert_vehicle(&vehicle()).unwrap();
        let _shipment_id = store.insert_shipment(&shipment()).unwrap();

        let loaded_depot = store.depot(depot_id).unwrap();
        assert_eq!(loaded_depot.name, "Main");
        assert_eq!(store.default_depot().unwrap().id, depot_id);

        let vehicles = store.available_vehicles().unwrap();
        assert_eq!(vehicles.len(), 1);
        assert_eq!(vehicles[0].id, vehicle_id);

        let shipments = store.pending_shipments().unwrap();
        assert_eq!(shipments.len(), 1);
        assert_eq!(shipments[0].windows.as_slice().len(), 2);
        assert_eq!(shipments[0].temp_floor, Some(-10.0));

        assert_eq!(store.snapshot_counts().unwrap(), (1, 1));
    }

    #[test]
    fn job_lifecycle_happy_path() {
        let store = Store::open_in_memory().unwrap();
        let vehicle_id = store.insert_vehicle(&vehicle()).unwrap();
        let shipment_id = store.insert_shipment(&shipment()).unwrap();

        let job = Job::pending(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        store.create_job(&job).unwrap();
        store.mark_job_running(job.id, Utc::now()).unwrap();
        store.update_progress(job.id, 40).unwrap();

        store
            .complete_job(job.id, Utc::now(), &plan_with_one_route(vehicle_id, shipment_id))
            .unwrap();

        let loaded = store.get_job(job.id).unwrap();
        assert_eq!(loaded.state, JobState::Completed);
        assert_eq!(loaded.progress, 100);
        assert!(loaded.finished_at.is_some());
        assert_eq!(loaded.summary.unwrap().shipments_assigned, 1);

        let routes = store.routes_for_job(job.id).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].1.stops.len(), 1);
        assert_eq!(routes[0].1.stops[0].shipment_id, shipment_id);

        // Assigned shipments flipped status, so the pending set is empty.
        assert!(store.pending_shipments().unwrap().is_empty());
        assert_eq!(
            store.latest_completed_job(job.plan_date).unwrap(),
            Some(job.id)
        );
    }

    #[test]
    fn progress_is_monotone() {
        let store = Store::open_in_memory().unwrap();
        let job = Job::pending(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        store.create_job(&job).unwrap();
        store.mark_job_running(job.id, Utc::now()).unwrap();

        store.update_progress(job.id, 50).unwrap();
        store.update_progress(job.id, 30).unwrap();
        assert_eq!(store.get_job(job.id).unwrap().progress, 50);

        store.update_progress(job.id, 95).unwrap();
        assert_eq!(store.get_job(job.id).unwrap().progress, 95);
    }

    #[test]
    fn fail_job_is_terminal_and_keeps_report() {
        let store = Store::open_in_memory().unwrap();
        let job = Job::pending(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        store.create_job(&job).unwrap();
        store.mark_job_running(job.id, Utc::now()).unwrap();

        let report = ViolationsReport::default();
        store
            .fail_job(
                job.id,
                Utc::now(),
                FailureKind::Timeout,
                "deadline reached",
                Some(&report),
            )
            .unwrap();

        let loaded = store.get_job(job.id).unwrap();
        assert_eq!(loaded.state, JobState::Failed);
        assert_eq!(loaded.error_kind, Some(FailureKind::Timeout));
        assert_eq!(loaded.error_message.as_deref(), Some("deadline reached"));

        // A second failure attempt is absorbed.
        store
            .fail_job(job.id, Utc::now(), FailureKind::Internal, "later", None)
            .unwrap();
        let still = store.get_job(job.id).unwrap();
        assert_eq!(still.error_kind, Some(FailureKind::Timeout));

        // And the job cannot go back to RUNNING.
        assert!(store.mark_job_running(job.id, Utc::now()).is_err());
        assert!(store.violations_report(job.id).is_ok());
    }

    #[test]
    fn route_update_is_optimistic() {
        let store = Store::open_in_memory().unwrap();
        let vehicle_id = store.insert_vehicle(&vehicle()).unwrap();
        let shipment_id = store.insert_shipment(&shipment()).unwrap();

        let job = Job::pending(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        store.create_job(&job).unwrap();
        store.mark_job_running(job.id, Utc::now()).unwrap();
        store
            .complete_job(job.id, Utc::now(), &plan_with_one_route(vehicle_id, shipment_id))
            .unwrap();

        let route_id = store.job_route_ids(job.id).unwrap()[0];
        let version = store
            .update_route_feasibility(route_id, 1, false)
            .unwrap();
        assert_eq!(version, 2);

        // A writer holding the old version is rejected.
        match store.update_route_feasibility(route_id, 1, true) {
            Err(Error::Conflict {
                expected, found, ..
            }) => {
                assert_eq!(expected, 1);
                assert_eq!(found, 2);
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn delete_job_cascades_to_routes_and_stops() {
        let store = Store::open_in_memory().unwrap();
        let vehicle_id = store.insert_vehicle(&vehicle()).unwrap();
        let shipment_id = store.insert_shipment(&shipment()).unwrap();

        let job = Job::pending(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        store.create_job(&job).unwrap();
        store.mark_job_running(job.id, Utc::now()).unwrap();
        store
            .complete_job(job.id, Utc::now(), &plan_with_one_route(vehicle_id, shipment_id))
            .unwrap();

        store.delete_job(job.id).unwrap();
        assert!(matches!(
            store.get_job(job.id),
            Err(Error::NotFound { .. })
        ));
        assert!(store.job_route_ids(job.id).unwrap().is_empty());
    }

    #[test]
    fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plans.db");

        {
            let store = Store::open(&path).unwrap();
            store.insert_depot(&depot()).unwrap();
            store.insert_vehicle(&vehicle()).unwrap();
        }

        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.default_depot().unwrap().name, "Main");
        assert_eq!(reopened.available_vehicles().unwrap().len(), 1);
    }

    #[test]
    fn completing_a_non_running_job_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        let vehicle_id = store.insert_vehicle(&vehicle()).unwrap();
        let shipment_id = store.insert_shipment(&shipment()).unwrap();

        let job = Job::pending(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        store.create_job(&job).unwrap();

        // Still PENDING: completion must be refused and nothing written.
        let result = store.complete_job(job.id, Utc::now(), &plan_with_one_route(vehicle_id, shipment_id));
        assert!(result.is_err());
        assert!(store.job_route_ids(job.id).unwrap().is_empty());
        assert_eq!(store.get_job(job.id).unwrap().state, JobState::Pending);
    }
}
