use std::sync::Arc;

use crate::models::{Booking, FareQuote, GeoPoint, NewBooking, RouteLeg, VehicleRate};
use crate::services::metrics;
use crate::services::rate::{round_to_minor, FareError};
use crate::services::routing::RouteResolver;
use crate::services::settlement::SettlementError;
use crate::services::store::{BookingStore, VehicleStore};

/// Quotes fares and creates bookings from a quote.
#[derive(Clone)]
pub struct FareService {
    resolver: RouteResolver,
    bookings: Arc<dyn BookingStore>,
    vehicles: Arc<dyn VehicleStore>,
}

impl FareService {
    pub fn new(
        resolver: RouteResolver,
        bookings: Arc<dyn BookingStore>,
        vehicles: Arc<dyn VehicleStore>,
    ) -> Self {
        Self {
            resolver,
            bookings,
            vehicles,
        }
    }

    pub async fn quote_fare(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
        rate: &VehicleRate,
    ) -> Result<FareQuote, SettlementError> {
        // Reject bad pricing before spending a routing call on it.
        rate.fare_for(rust_decimal::Decimal::ZERO)?;

        let leg = self.resolver.resolve(origin, destination).await.inspect_err(|e| {
            metrics::record_quote("route_unavailable");
            tracing::warn!(error = %e, "Fare quote failed: route unavailable");
        })?;

        let quote = price_leg(leg, rate)?;
        metrics::record_quote("ok");

        tracing::info!(
            distance_km = %quote.distance_km,
            total_fare = %quote.total_fare,
            "Fare quoted"
        );
        Ok(quote)
    }

    /// Quote the trip at the registered rate of `details.car_name` and persist
    /// a `pending/pending` booking at that price.
    pub async fn book_ride(&self, details: NewBooking) -> Result<Booking, SettlementError> {
        let vehicle = self
            .vehicles
            .get(&details.car_name)
            .await?
            .ok_or_else(|| SettlementError::VehicleNotFound(details.car_name.clone()))?;

        let quote = self
            .quote_fare(&details.origin, &details.destination, &vehicle.rate())
            .await?;
        let booking = Booking::from_quote(details, &quote);

        self.bookings.insert(&booking).await?;

        tracing::info!(
            booking_id = %booking.id,
            total_fare = %booking.total_fare,
            payment_method = ?booking.payment_method,
            "Booking created"
        );
        Ok(booking)
    }

    pub async fn get_booking(&self, id: &str) -> Result<Booking, SettlementError> {
        self.bookings
            .get(id)
            .await?
            .ok_or_else(|| SettlementError::BookingNotFound(id.to_string()))
    }
}

/// The quoted total is what gets charged, so it is rounded to the minor unit.
fn price_leg(leg: RouteLeg, rate: &VehicleRate) -> Result<FareQuote, FareError> {
    let total_fare = round_to_minor(rate.fare_for(leg.distance_km)?);
    let (Some(base_fare), Some(price_per_km)) = (rate.base_fare, rate.price_per_km) else {
        return Err(FareError::InvalidInput("vehicle rate is incomplete".to_string()));
    };

    Ok(FareQuote {
        distance_km: leg.distance_km,
        duration_secs: leg.duration_secs,
        duration_text: leg.duration_text,
        base_fare,
        price_per_km,
        total_fare,
    })
}
