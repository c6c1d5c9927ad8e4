use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fare::{FareQuote, GeoPoint};

/// How the rider pays for the trip.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Cash on delivery. No online payment, advance stays zero.
    Cod,
    /// Partial amount online, balance collected at trip completion.
    Advanced,
    /// Full fare online.
    Online,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Completed,
}

impl PaymentStatus {
    /// `Paid` and `Completed` are never moved back to `Pending`.
    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Completed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: String,
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    pub pickup_address: String,
    pub drop_address: String,
    pub distance_km: Decimal,
    pub duration_secs: u64,
    pub duration_text: String,
    pub ride_at: DateTime<Utc>,
    pub passengers: u32,
    pub car_name: String,
    pub base_fare: Decimal,
    pub price_per_km: Decimal,
    pub total_fare: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub advance_payment: Decimal,
    pub balance_payment: Decimal,
    pub trip_status: TripStatus,
    pub driver_assigned: Option<String>,
    /// Gateway transaction whose settlement has been applied to this booking.
    pub settlement_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Rider and trip details supplied at booking time.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    pub pickup_address: String,
    pub drop_address: String,
    pub ride_at: DateTime<Utc>,
    pub passengers: u32,
    pub car_name: String,
    pub payment_method: PaymentMethod,
}

impl Booking {
    /// Build a `pending/pending` booking priced by `quote`.
    pub fn from_quote(details: NewBooking, quote: &FareQuote) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: details.name,
            email: details.email,
            mobile: details.mobile,
            origin: details.origin,
            destination: details.destination,
            pickup_address: details.pickup_address,
            drop_address: details.drop_address,
            distance_km: quote.distance_km,
            duration_secs: quote.duration_secs,
            duration_text: quote.duration_text.clone(),
            ride_at: details.ride_at,
            passengers: details.passengers,
            car_name: details.car_name,
            base_fare: quote.base_fare,
            price_per_km: quote.price_per_km,
            total_fare: quote.total_fare,
            payment_method: details.payment_method,
            payment_status: PaymentStatus::Pending,
            advance_payment: Decimal::ZERO,
            balance_payment: quote.total_fare,
            trip_status: TripStatus::Pending,
            driver_assigned: None,
            settlement_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a payment update. Trip fields are left alone.
    pub fn apply_payment_update(&mut self, update: &BookingPaymentUpdate) {
        self.advance_payment = update.advance_payment;
        self.balance_payment = update.balance_payment;
        self.payment_status = update.payment_status;
        self.settlement_ref = Some(update.settlement_ref.clone());
        self.updated_at = Utc::now();
    }
}

/// The only booking fields settlement is allowed to write.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingPaymentUpdate {
    pub advance_payment: Decimal,
    pub balance_payment: Decimal,
    pub payment_status: PaymentStatus,
    pub settlement_ref: String,
}
