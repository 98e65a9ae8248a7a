//! Great-circle distance and travel-cost estimation

use serde::Serialize;

/// Earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Below this distance the flat minimum fee applies
const MINIMUM_FEE_THRESHOLD_KM: f64 = 100.0;
const MINIMUM_FEE: i64 = 50;
const COST_PER_KM: f64 = 0.15;
const BOOKING_AND_TAX_FEE: f64 = 45.0;

/// Great-circle distance in kilometers between two points given in
/// decimal degrees.
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Tiered travel-cost estimate in currency units. Total over all
/// `distance_km >= 0`: short hops get a flat minimum fee, everything else
/// is per-km plus a fixed booking & tax fee.
pub fn estimate_cost(distance_km: f64) -> i64 {
    if distance_km < MINIMUM_FEE_THRESHOLD_KM {
        return MINIMUM_FEE;
    }
    (distance_km * COST_PER_KM + BOOKING_AND_TAX_FEE).round() as i64
}

/// Distance/cost payload for a resolved landmark and a caller-supplied origin
#[derive(Debug, Clone, Serialize)]
pub struct TravelEstimate {
    pub distance_km: f64,
    pub estimated_cost: i64,
}

/// Combined report, distance rounded to two decimals for presentation
pub fn travel_estimate(
    origin_lat: f64,
    origin_lon: f64,
    landmark_lat: f64,
    landmark_lon: f64,
) -> TravelEstimate {
    let distance_km = haversine(origin_lat, origin_lon, landmark_lat, landmark_lon);
    TravelEstimate {
        distance_km: (distance_km * 100.0).round() / 100.0,
        estimated_cost: estimate_cost(distance_km),
    }
}
