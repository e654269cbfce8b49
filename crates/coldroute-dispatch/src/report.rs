//! Status, violation, and map-data queries over persisted jobs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use coldroute_lib::{
    Error, GeoPoint, Job, JobId, Result, RouteId, SlaTier, VehicleId, ViolationsReport,
};

use crate::state::DispatchState;

/// Full job record plus the ids of any persisted routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    #[serde(flatten)]
    pub job: Job,
    pub route_ids: Vec<RouteId>,
}

/// One stop of a route as rendered on the map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapStop {
    pub sequence: u32,
    pub shipment_id: i64,
    pub name: String,
    pub location: GeoPoint,
    pub arrival_minute: i64,
    pub departure_minute: i64,
    pub predicted_temp: f64,
    pub temp_ceiling: f64,
    pub sla: SlaTier,
    pub feasible: bool,
}

/// One vehicle route as rendered on the map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapRoute {
    pub route_id: RouteId,
    pub vehicle_id: VehicleId,
    pub is_feasible: bool,
    pub stops: Vec<MapStop>,
}

/// Depot coordinate plus ordered per-route stops for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapData {
    pub plan_date: NaiveDate,
    pub job_id: JobId,
    pub depot: GeoPoint,
    pub routes: Vec<MapRoute>,
}

/// Look up a job with its route ids.
pub fn job_status(state: &DispatchState, job_id: JobId) -> Result<JobStatus> {
    let job = state.store().get_job(job_id)?;
    let route_ids = state.store().job_route_ids(job_id)?;
    Ok(JobStatus { job, route_ids })
}

/// The violations report persisted with a job: temperature-violating stops
/// and unassigned shipments with their likely causes.
pub fn violations(state: &DispatchState, job_id: JobId) -> Result<ViolationsReport> {
    state.store().violations_report(job_id)
}

/// Map data for a plan date; resolves to the given job or the latest
/// completed job for that date.
pub fn map_data(
    state: &DispatchState,
    plan_date: NaiveDate,
    job_id: Option<JobId>,
) -> Result<MapData> {
    let store = state.store();

    let job_id = match job_id {
        Some(id) => id,
        None => store
            .latest_completed_job(plan_date)?
            .ok_or(Error::NotFound {
                entity: "job",
                id: format!("completed for {plan_date}"),
            })?,
    };
    // Validates the id and pins the date actually planned.
    let job = store.get_job(job_id)?;

    let depot = store.default_depot()?.location;

    let mut routes = Vec::new();
    for (route_id, route) in store.routes_for_job(job_id)? {
        let mut stops = Vec::with_capacity(route.stops.len());
        for stop in &route.stops {
            let shipment = store.get_shipment(stop.shipment_id)?;
            stops.push(MapStop {
                sequence: stop.sequence,
                shipment_id: shipment.id,
                name: shipment.name.clone(),
                location: shipment.location,
                arrival_minute: stop.arrival_minute,
                departure_minute: stop.departure_minute,
                predicted_temp: stop.arrival_temp,
                temp_ceiling: shipment.temp_ceiling,
                sla: shipment.sla,
                feasible: stop.feasible,
            });
        }
        routes.push(MapRoute {
            route_id,
            vehicle_id: route.vehicle_id,
            is_feasible: route.is_feasible,
            stops,
        });
    }

    Ok(MapData {
        plan_date: job.plan_date,
        job_id,
        depot,
        routes,
    })
}
