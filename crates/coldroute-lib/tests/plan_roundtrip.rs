//! Persisting a plan and re-running the thermal tracker over the stored
//! stop sequence must reproduce the stored per-stop temperatures.

use std::time::Duration;

use chrono::{NaiveDate, Utc};

use coldroute_lib::{
    assemble_plan, build_model, prescreen, project_route, solve, Depot, GeoPoint, Job,
    PlanParameters, PlanSnapshot, PlannerConfig, RouteLeg, Shipment, ShipmentStatus, SlaTier,
    SolveOptions, Store, Strategy, TimeWindows, TravelMatrix, Vehicle,
};

const TOLERANCE: f64 = 1e-6;

#[test]
fn stored_temperatures_survive_reprojection() {
    let depot = Depot {
        id: 1,
        name: "Taipei DC".into(),
        location: GeoPoint::new(25.033, 121.565).unwrap(),
        open_minute: 0,
        close_minute: 1_439,
    };
    let vehicle = Vehicle {
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
    };
    let shipments: Vec<Shipment> = [
        (1, 25.050, 121.580, 20),
        (2, 25.055, 121.590, 10),
        (3, 25.041, 121.552, 25),
    ]
    .into_iter()
    .map(|(id, lat, lon, service)| Shipment {
        id,
        name: format!("S{id}"),
        location: GeoPoint::new(lat, lon).unwrap(),
        weight: 120.0,
        volume: 1.2,
        windows: TimeWindows::single(480, 1_200).unwrap(),
        service_minutes: service,
        temp_ceiling: 6.0,
        temp_floor: None,
        sla: SlaTier::Standard,
        priority: 40,
        status: ShipmentStatus::Pending,
    })
    .collect();

    let snapshot = PlanSnapshot {
        depot: depot.clone(),
        vehicles: vec![vehicle.clone()],
        shipments,
    };
    let params = PlanParameters {
        plan_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        departure_minute: 480,
        ambient_temp: 32.0,
        initial_cargo_temp: -4.0,
        time_limit: Duration::from_secs(10),
        strategy: Strategy::MinimizeVehicles,
    };
    let config = PlannerConfig::default();

    // Plan and persist.
    let store = Store::open_in_memory().unwrap();
    store.insert_depot(&depot).unwrap();
    store.insert_vehicle(&vehicle).unwrap();
    for shipment in &snapshot.shipments {
        store.insert_shipment(shipment).unwrap();
    }

    let screen = prescreen(&snapshot, &params, &config);
    assert_eq!(screen.solvable.len(), 3);
    let model = build_model(&snapshot, &params, &config).unwrap();
    let assignment = solve(&model, &SolveOptions::new(params.time_limit)).unwrap();
    let plan = assemble_plan(&snapshot, &model, &assignment, screen.excluded, &params).unwrap();
    assert!(!plan.routes.is_empty());

    let job = Job::pending(params.plan_date);
    store.create_job(&job).unwrap();
    store.mark_job_running(job.id, Utc::now()).unwrap();
    store.complete_job(job.id, Utc::now(), &plan).unwrap();

    // Reload and re-run the tracker over the stored sequence.
    let routes = store.routes_for_job(job.id).unwrap();
    assert_eq!(routes.len(), plan.routes.len());

    for (_, stored) in routes {
        let mut points = vec![depot.location];
        let mut service = Vec::new();
        let mut ceilings = Vec::new();
        for stop in &stored.stops {
            let shipment = store.get_shipment(stop.shipment_id).unwrap();
            points.push(shipment.location);
            service.push(f64::from(shipment.service_minutes));
            ceilings.push(shipment.temp_ceiling);
        }
        let matrix = TravelMatrix::build(&points, config.average_speed_kmh).unwrap();

        let legs: Vec<RouteLeg> = (0..stored.stops.len())
            .map(|leg| RouteLeg {
                drive_minutes: matrix.time_min(leg, leg + 1) as f64,
                service_minutes: service[leg],
                temp_ceiling: ceilings[leg],
            })
            .collect();

        let projection = project_route(
            &vehicle.thermal_profile(),
            params.ambient_temp,
            params.initial_cargo_temp,
            &legs,
        )
        .unwrap();

        assert_eq!(projection.stops.len(), stored.stops.len());
        for (projected, stop) in projection.stops.iter().zip(stored.stops.iter()) {
            assert!((projected.arrival_temp - stop.arrival_temp).abs() < TOLERANCE);
            assert!((projected.departure_temp - stop.departure_temp).abs() < TOLERANCE);
            assert!((projected.transit_rise - stop.transit_rise).abs() < TOLERANCE);
            assert!((projected.service_rise - stop.service_rise).abs() < TOLERANCE);
            assert!((projected.cooling_applied - stop.cooling_applied).abs() < TOLERANCE);
        }
        assert!((projection.final_temp - stored.final_temp).abs() < TOLERANCE);
        assert!((projection.max_temp - stored.max_temp).abs() < TOLERANCE);
    }
}
