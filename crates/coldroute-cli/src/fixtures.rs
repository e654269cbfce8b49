//! JSON fixture import for seeding the store.
//!
//! Times are human-facing `HH:MM` strings in the file and converted to
//! minute-of-day values on load. The spreadsheet ingest proper lives
//! outside this workspace; this importer is the developer-facing seam.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use coldroute_lib::{
    parse_minute_of_day, Depot, GeoPoint, Shipment, ShipmentStatus, SlaTier, Store, TimeWindow,
    TimeWindows, Vehicle,
};

#[derive(Debug, Deserialize)]
pub struct FixtureFile {
    #[serde(default)]
    pub depot: Option<DepotFixture>,
    #[serde(default)]
    pub vehicles: Vec<VehicleFixture>,
    #[serde(default)]
    pub shipments: Vec<ShipmentFixture>,
}

#[derive(Debug, Deserialize)]
pub struct DepotFixture {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default = "default_open")]
    pub open: String,
    #[serde(default = "default_close")]
    pub close: String,
}

fn default_open() -> String {
    "00:00".to_string()
}

fn default_close() -> String {
    "23:59".to_string()
}

#[derive(Debug, Deserialize)]
pub struct VehicleFixture {
    pub name: String,
    pub weight_capacity: f64,
    pub volume_capacity: f64,
    pub insulation_k: f64,
    pub door_coefficient: f64,
    #[serde(default)]
    pub has_curtain: bool,
    pub cooling_rate: f64,
    pub min_temp: f64,
    #[serde(default = "default_true")]
    pub available: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ShipmentFixture {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub weight: f64,
    pub volume: f64,
    /// One or two `["HH:MM", "HH:MM"]` pairs.
    pub windows: Vec<[String; 2]>,
    pub service_minutes: u32,
    pub temp_ceiling: f64,
    #[serde(default)]
    pub temp_floor: Option<f64>,
    pub sla: String,
    #[serde(default)]
    pub priority: u8,
}

/// Counts of the rows an import wrote.
#[derive(Debug, Default, serde::Serialize)]
pub struct ImportSummary {
    pub depots: usize,
    pub vehicles: usize,
    pub shipments: usize,
}

/// Load a fixture file into the store.
pub fn import(store: &Store, path: &Path) -> Result<ImportSummary> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading fixture file {}", path.display()))?;
    let fixture: FixtureFile =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;

    let mut summary = ImportSummary::default();

    if let Some(depot) = fixture.depot {
        store.insert_depot(&Depot {
            id: 0,
            name: depot.name,
            location: GeoPoint::new(depot.lat, depot.lon)?,
            open_minute: parse_minute_of_day(&depot.open)?,
            close_minute: parse_minute_of_day(&depot.close)?,
        })?;
        summary.depots = 1;
    }

    for vehicle in fixture.vehicles {
        store.insert_vehicle(&Vehicle {
            id: 0,
            name: vehicle.name,
            weight_capacity: vehicle.weight_capacity,
            volume_capacity: vehicle.volume_capacity,
            insulation_k: vehicle.insulation_k,
            door_coefficient: vehicle.door_coefficient,
            has_curtain: vehicle.has_curtain,
            cooling_rate: vehicle.cooling_rate,
            min_temp: vehicle.min_temp,
            available: vehicle.available,
        })?;
        summary.vehicles += 1;
    }

    for shipment in fixture.shipments {
        let windows = shipment
            .windows
            .iter()
            .map(|[start, end]| {
                Ok(TimeWindow::new(
                    parse_minute_of_day(start)?,
                    parse_minute_of_day(end)?,
                )?)
            })
            .collect::<Result<Vec<_>>>()?;
        store.insert_shipment(&Shipment {
            id: 0,
            name: shipment.name,
            location: GeoPoint::new(shipment.lat, shipment.lon)?,
            weight: shipment.weight,
            volume: shipment.volume,
            windows: TimeWindows::new(windows)?,
            service_minutes: shipment.service_minutes,
            temp_ceiling: shipment.temp_ceiling,
            temp_floor: shipment.temp_floor,
            sla: SlaTier::parse(&shipment.sla)?,
            priority: shipment.priority,
            status: ShipmentStatus::Pending,
        })?;
        summary.shipments += 1;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FIXTURE: &str = r#"{
        "depot": { "name": "DC", "lat": 25.033, "lon": 121.565 },
        "vehicles": [
            {
                "name": "V1", "weight_capacity": 1000, "volume_capacity": 10,
                "insulation_k": 0.05, "door_coefficient": 0.8, "has_curtain": true,
                "cooling_rate": -2.5, "min_temp": -20
            }
        ],
        "shipments": [
            {
                "name": "S1", "lat": 25.050, "lon": 121.580,
                "weight": 100, "volume": 1,
                "windows": [["08:00", "10:00"], ["14:00", "15:00"]],
                "service_minutes": 15, "temp_ceiling": 5,
                "sla": "STRICT", "priority": 50
            }
        ]
    }"#;

    #[test]
    fn imports_a_full_fixture() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FIXTURE.as_bytes()).unwrap();

        let store = Store::open_in_memory().unwrap();
        let summary = import(&store, file.path()).unwrap();

        assert_eq!(summary.depots, 1);
        assert_eq!(summary.vehicles, 1);
        assert_eq!(summary.shipments, 1);

        let shipments = store.pending_shipments().unwrap();
        assert_eq!(shipments[0].windows.as_slice().len(), 2);
        assert_eq!(shipments[0].windows.as_slice()[0].start, 480);
        assert_eq!(shipments[0].windows.as_slice()[1].end, 900);
    }

    #[test]
    fn rejects_bad_window_strings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let broken = FIXTURE.replace("\"08:00\"", "\"8am\"");
        file.write_all(broken.as_bytes()).unwrap();

        let store = Store::open_in_memory().unwrap();
        assert!(import(&store, file.path()).is_err());
    }
}
