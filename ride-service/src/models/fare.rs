use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A coordinate pair as accepted by the distance-matrix service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct GeoPoint {
    #[validate(range(min = -90.0, max = 90.0, message = "Latitude must be within [-90, 90]"))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0, message = "Longitude must be within [-180, 180]"))]
    pub lng: f64,
}

impl GeoPoint {
    /// `lat,lng` form used in routing queries.
    pub fn as_query_value(&self) -> String {
        format!("{},{}", self.lat, self.lng)
    }
}

/// Normalized routing result between two points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub distance_km: Decimal,
    pub duration_secs: u64,
    pub duration_text: String,
}

/// Pricing parameters of a vehicle class.
///
/// Both fields are optional so that a vehicle registered without pricing is
/// reported as invalid input instead of silently quoting a zero fare.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VehicleRate {
    pub base_fare: Option<Decimal>,
    pub price_per_km: Option<Decimal>,
}

impl VehicleRate {
    pub fn new(base_fare: Decimal, price_per_km: Decimal) -> Self {
        Self {
            base_fare: Some(base_fare),
            price_per_km: Some(price_per_km),
        }
    }
}

/// A bookable vehicle class and its pricing, keyed by `car_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub car_name: String,
    #[serde(default)]
    pub base_fare: Option<Decimal>,
    #[serde(default)]
    pub price_per_km: Option<Decimal>,
}

impl Vehicle {
    pub fn new(car_name: impl Into<String>, base_fare: Decimal, price_per_km: Decimal) -> Self {
        Self {
            car_name: car_name.into(),
            base_fare: Some(base_fare),
            price_per_km: Some(price_per_km),
        }
    }

    pub fn rate(&self) -> VehicleRate {
        VehicleRate {
            base_fare: self.base_fare,
            price_per_km: self.price_per_km,
        }
    }
}

/// Price of a route for a vehicle rate. Not persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FareQuote {
    pub distance_km: Decimal,
    pub duration_secs: u64,
    pub duration_text: String,
    pub base_fare: Decimal,
    pub price_per_km: Decimal,
    pub total_fare: Decimal,
}
