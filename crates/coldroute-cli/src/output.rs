//! Output rendering for CLI responses.

use coldroute_dispatch::{JobStatus, MapData};
use coldroute_lib::{format_minute_of_day, ViolationsReport};

use crate::fixtures::ImportSummary;

/// Selected output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

pub fn render_import(format: OutputFormat, summary: &ImportSummary) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(summary)?),
        OutputFormat::Text => {
            println!(
                "imported {} depot(s), {} vehicle(s), {} shipment(s)",
                summary.depots, summary.vehicles, summary.shipments
            );
        }
    }
    Ok(())
}

pub fn render_status(format: OutputFormat, status: &JobStatus) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(status)?),
        OutputFormat::Text => {
            println!("job       {}", status.job.id);
            println!("date      {}", status.job.plan_date);
            println!("state     {}", status.job.state);
            println!("progress  {}%", status.job.progress);
            if let Some(summary) = &status.job.summary {
                println!(
                    "summary   {} route(s), {:.1} km, {} min, {} assigned, {} unassigned, feasible: {}",
                    summary.vehicles_used,
                    summary.total_distance_m as f64 / 1_000.0,
                    summary.total_duration_min,
                    summary.shipments_assigned,
                    summary.shipments_unassigned,
                    summary.is_feasible
                );
            }
            if let Some(kind) = status.job.error_kind {
                println!(
                    "error     [{}] {}",
                    kind.as_str(),
                    status.job.error_message.as_deref().unwrap_or("")
                );
            }
            if !status.route_ids.is_empty() {
                let ids: Vec<String> =
                    status.route_ids.iter().map(|id| id.to_string()).collect();
                println!("routes    {}", ids.join(", "));
            }
        }
    }
    Ok(())
}

pub fn render_report(format: OutputFormat, report: &ViolationsReport) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            if report.temperature_violations.is_empty() && report.unassigned.is_empty() {
                println!("no violations");
                return Ok(());
            }
            for violation in &report.temperature_violations {
                println!(
                    "temperature: shipment {} stop {} predicted {:.2} °C vs {} {:.2} °C (over by {:.2}) [{}]",
                    violation.shipment_id,
                    violation.stop_sequence,
                    violation.predicted_temp,
                    violation.limit_name,
                    violation.limit_temp,
                    violation.overshoot,
                    violation.sla.as_str()
                );
            }
            for unassigned in &report.unassigned {
                let reasons: Vec<String> = unassigned
                    .likely_reasons
                    .iter()
                    .map(|d| {
                        format!(
                            "{:?}({} {:.2}/{:.2})",
                            d.cause, d.parameter, d.current_value, d.limit_value
                        )
                    })
                    .collect();
                println!(
                    "unassigned: shipment {} [{}] priority {}: {}",
                    unassigned.shipment_id,
                    unassigned.sla.as_str(),
                    unassigned.priority,
                    reasons.join(", ")
                );
            }
        }
    }
    Ok(())
}

pub fn render_map(format: OutputFormat, map: &MapData) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(map)?),
        OutputFormat::Text => {
            println!(
                "plan {} (job {}) depot ({:.4}, {:.4})",
                map.plan_date, map.job_id, map.depot.lat, map.depot.lon
            );
            for route in &map.routes {
                println!(
                    "route {} vehicle {} feasible {}",
                    route.route_id, route.vehicle_id, route.is_feasible
                );
                for stop in &route.stops {
                    println!(
                        "  {}. {} ({:.4}, {:.4}) {}-{} {:.2} °C (limit {:.2}) {}",
                        stop.sequence,
                        stop.name,
                        stop.location.lat,
                        stop.location.lon,
                        format_minute_of_day(stop.arrival_minute),
                        format_minute_of_day(stop.departure_minute),
                        stop.predicted_temp,
                        stop.temp_ceiling,
                        if stop.feasible { "ok" } else { "VIOLATION" }
                    );
                }
            }
        }
    }
    Ok(())
}
