//! Great-circle distance and travel-time matrices.
//!
//! Distances use the haversine formula on a spherical Earth (radius
//! 6 371 km). Travel time derives from distance and a configurable average
//! speed. Matrices are symmetric with a zero diagonal and hold integer
//! meters / minutes so the routing search can work on integer costs.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6_371.0;

/// WGS-style coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(Error::validation(format!("latitude out of range: {lat}")));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(Error::validation(format!("longitude out of range: {lon}")));
        }
        Ok(Self { lat, lon })
    }

    /// Great-circle distance to another point in kilometers.
    pub fn haversine_km(&self, other: &Self) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlon = (other.lon - self.lon).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_KM * c
    }
}

/// Symmetric pairwise distance and travel-time matrices keyed by node index.
#[derive(Debug, Clone)]
pub struct TravelMatrix {
    size: usize,
    distance_m: Vec<i64>,
    time_min: Vec<i64>,
}

impl TravelMatrix {
    /// Build both matrices for the given points.
    ///
    /// `average_speed_kmh` converts distance into drive minutes; it must be
    /// strictly positive.
    pub fn build(points: &[GeoPoint], average_speed_kmh: f64) -> Result<Self> {
        if !average_speed_kmh.is_finite() || average_speed_kmh <= 0.0 {
            return Err(Error::validation(format!(
                "average speed must be positive, got {average_speed_kmh}"
            )));
        }

        let size = points.len();
        let mut distance_m = vec![0i64; size * size];
        let mut time_min = vec![0i64; size * size];

        for i in 0..size {
            for j in (i + 1)..size {
                let km = points[i].haversine_km(&points[j]);
                let meters = (km * 1_000.0).round() as i64;
                let minutes = (km / average_speed_kmh * 60.0).round() as i64;

                distance_m[i * size + j] = meters;
                distance_m[j * size + i] = meters;
                time_min[i * size + j] = minutes;
                time_min[j * size + i] = minutes;
            }
        }

        Ok(Self {
            size,
            distance_m,
            time_min,
        })
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Distance between two node indices in meters.
    pub fn distance_m(&self, from: usize, to: usize) -> i64 {
        self.distance_m[from * self.size + to]
    }

    /// Travel time between two node indices in minutes.
    pub fn time_min(&self, from: usize, to: usize) -> i64 {
        self.time_min[from * self.size + to]
    }

    /// Largest single-arc distance in the matrix, in meters.
    pub fn max_arc_m(&self) -> i64 {
        self.distance_m.iter().copied().max().unwrap_or(0)
    }
}
