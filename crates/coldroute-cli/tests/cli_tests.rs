//! End-to-end CLI tests driving the real binary against a temp store.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

const FIXTURE: &str = r#"{
    "depot": { "name": "Taipei DC", "lat": 25.033, "lon": 121.565 },
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
            "windows": [["08:00", "10:00"]],
            "service_minutes": 15, "temp_ceiling": 5,
            "sla": "STRICT", "priority": 50
        }
    ]
}"#;

fn cli() -> Command {
    Command::cargo_bin("coldroute").expect("binary builds")
}

fn write_fixture(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("fixture.json");
    std::fs::write(&path, FIXTURE).unwrap();
    path
}

#[test]
fn import_then_plan_then_inspect() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("plan.db");
    let fixture = write_fixture(&dir);

    cli()
        .args(["--db", db.to_str().unwrap(), "import"])
        .arg(&fixture)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 vehicle(s)"));

    let output = cli()
        .args([
            "--db",
            db.to_str().unwrap(),
            "--format",
            "json",
            "plan",
            "--date",
            "2026-03-02",
            "--departure",
            "08:00",
            "--time-limit",
            "10",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let status: Value = serde_json::from_slice(&output).expect("json status");
    assert_eq!(status["state"], "COMPLETED");
    assert_eq!(status["progress"], 100);
    assert_eq!(status["summary"]["shipments_assigned"], 1);
    let job_id = status["id"].as_str().expect("job id").to_string();

    cli()
        .args(["--db", db.to_str().unwrap(), "status", &job_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("COMPLETED"));

    cli()
        .args(["--db", db.to_str().unwrap(), "report", &job_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("no violations"));

    cli()
        .args([
            "--db",
            db.to_str().unwrap(),
            "map",
            "--date",
            "2026-03-02",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("S1"));
}

#[test]
fn plan_without_fixtures_fails_precondition() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("empty.db");

    cli()
        .args([
            "--db",
            db.to_str().unwrap(),
            "plan",
            "--date",
            "2026-03-02",
            "--depot-lat",
            "25.033",
            "--depot-lon",
            "121.565",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("precondition"));
}

#[test]
fn malformed_departure_time_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("plan.db");
    let fixture = write_fixture(&dir);

    cli()
        .args(["--db", db.to_str().unwrap(), "import"])
        .arg(&fixture)
        .assert()
        .success();

    cli()
        .args([
            "--db",
            db.to_str().unwrap(),
            "plan",
            "--date",
            "2026-03-02",
            "--departure",
            "25:99",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid"));
}

#[test]
fn unknown_job_id_is_a_clean_error() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("plan.db");

    cli()
        .args([
            "--db",
            db.to_str().unwrap(),
            "status",
            "0195d6a0-0000-7000-8000-000000000000",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));

    cli()
        .args(["--db", db.to_str().unwrap(), "status", "not-a-uuid"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a valid job id"));
}

#[test]
fn help_lists_subcommands() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("import"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("report"))
        .stdout(predicate::str::contains("map"));
}
