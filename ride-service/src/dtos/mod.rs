use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::{GeoPoint, NewBooking, PaymentMethod, VehicleRate};
use crate::services::razorpay::{OrderHandle, RazorpayOrder};
use crate::services::settlement::{PaymentCallback, RejectionReason, SettlementResult};

fn non_negative_rate(rate: &VehicleRate) -> Result<(), ValidationError> {
    let negative = [rate.base_fare, rate.price_per_km]
        .into_iter()
        .flatten()
        .any(|v| v.is_sign_negative() && !v.is_zero());
    if negative {
        return Err(ValidationError::new("negative_rate"));
    }
    Ok(())
}

fn positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount <= Decimal::ZERO {
        return Err(ValidationError::new("non_positive_amount"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct QuoteRequest {
    #[validate(nested)]
    pub origin: GeoPoint,
    #[validate(nested)]
    pub destination: GeoPoint,
    #[validate(custom(function = "non_negative_rate"))]
    pub rate: VehicleRate,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreateBookingRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 7, max = 20))]
    pub mobile: String,
    #[validate(nested)]
    pub origin: GeoPoint,
    #[validate(nested)]
    pub destination: GeoPoint,
    #[validate(length(min = 1, max = 500))]
    pub pickup_address: String,
    #[validate(length(min = 1, max = 500))]
    pub drop_address: String,
    pub ride_at: DateTime<Utc>,
    #[validate(range(min = 1, max = 50))]
    pub passengers: u32,
    /// Priced at this vehicle type's registered rate.
    #[validate(length(min = 1, max = 100))]
    pub car_name: String,
    pub payment_method: PaymentMethod,
}

impl From<CreateBookingRequest> for NewBooking {
    fn from(req: CreateBookingRequest) -> Self {
        Self {
            name: req.name,
            email: req.email,
            mobile: req.mobile,
            origin: req.origin,
            destination: req.destination,
            pickup_address: req.pickup_address,
            drop_address: req.drop_address,
            ride_at: req.ride_at,
            passengers: req.passengers,
            car_name: req.car_name,
            payment_method: req.payment_method,
        }
    }
}

/// Request to open a payment order for a booking.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1))]
    pub booking_id: String,
    /// Major units (rupees for INR).
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
}

/// Response after creating an order; everything checkout needs to start.
#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order_id: String,
    /// Amount in smallest currency unit.
    pub amount: u64,
    pub currency: String,
    pub key_id: String,
    pub booking_id: String,
}

impl CreateOrderResponse {
    pub fn new(order: OrderHandle, key_id: &str, booking_id: String) -> Self {
        Self {
            order_id: order.id,
            amount: order.amount,
            currency: order.currency,
            key_id: key_id.to_string(),
            booking_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderStatusResponse {
    pub order_id: String,
    pub amount: u64,
    pub amount_paid: u64,
    pub amount_due: u64,
    pub currency: String,
    pub status: String,
    pub attempts: u32,
    pub receipt: Option<String>,
}

impl From<RazorpayOrder> for OrderStatusResponse {
    fn from(order: RazorpayOrder) -> Self {
        Self {
            order_id: order.id,
            amount: order.amount,
            amount_paid: order.amount_paid,
            amount_due: order.amount_due,
            currency: order.currency,
            status: order.status,
            attempts: order.attempts,
            receipt: order.receipt,
        }
    }
}

/// Checkout callback, field names as Razorpay's widget returns them.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, max = 64))]
    pub razorpay_order_id: String,
    #[validate(length(min = 1, max = 64))]
    pub razorpay_payment_id: String,
    #[validate(length(min = 1, max = 256))]
    pub razorpay_signature: String,
    #[validate(email)]
    pub user_email: String,
    pub ride_id: Option<String>,
}

impl From<VerifyPaymentRequest> for PaymentCallback {
    fn from(req: VerifyPaymentRequest) -> Self {
        Self {
            order_id: req.razorpay_order_id,
            transaction_id: req.razorpay_payment_id,
            signature: req.razorpay_signature,
            user_email: req.user_email,
            ride_id: req.ride_id.filter(|id| !id.is_empty()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub status: &'static str,
    pub order_id: String,
    pub transaction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl From<SettlementResult> for VerifyPaymentResponse {
    fn from(result: SettlementResult) -> Self {
        let settled = result.is_settled();
        Self {
            success: settled,
            status: if settled { "settled" } else { "rejected" },
            order_id: result.order_id,
            transaction_id: result.transaction_id,
            reason: result.reason.as_ref().map(RejectionReason::as_str),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quote_request_rejects_unknown_fields() {
        let body = json!({
            "origin": {"lat": 12.97, "lng": 77.59},
            "destination": {"lat": 12.93, "lng": 77.62},
            "rate": {"base_fare": "50", "price_per_km": "12"},
            "surge": 2
        });
        assert!(serde_json::from_value::<QuoteRequest>(body).is_err());
    }

    #[test]
    fn quote_request_validates_coordinates_and_rate() {
        let body = json!({
            "origin": {"lat": 95.0, "lng": 77.59},
            "destination": {"lat": 12.93, "lng": 77.62},
            "rate": {"base_fare": "50", "price_per_km": "12"}
        });
        let req: QuoteRequest = serde_json::from_value(body).unwrap();
        assert!(req.validate().is_err());

        let body = json!({
            "origin": {"lat": 12.97, "lng": 77.59},
            "destination": {"lat": 12.93, "lng": 77.62},
            "rate": {"base_fare": "-1", "price_per_km": "12"}
        });
        let req: QuoteRequest = serde_json::from_value(body).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn booking_request_does_not_accept_a_rate() {
        let body = json!({
            "name": "Asha",
            "email": "asha@example.com",
            "mobile": "9999999999",
            "origin": {"lat": 12.97, "lng": 77.59},
            "destination": {"lat": 12.93, "lng": 77.62},
            "pickup_address": "MG Road",
            "drop_address": "Koramangala",
            "ride_at": "2026-11-01T09:30:00Z",
            "passengers": 2,
            "car_name": "Sedan",
            "payment_method": "online",
            "rate": {"base_fare": "1", "price_per_km": "0"}
        });
        assert!(serde_json::from_value::<CreateBookingRequest>(body).is_err());
    }

    #[test]
    fn order_amount_must_be_positive() {
        let req: CreateOrderRequest =
            serde_json::from_value(json!({"booking_id": "b1", "amount": "0"})).unwrap();
        assert!(req.validate().is_err());

        let req: CreateOrderRequest =
            serde_json::from_value(json!({"booking_id": "b1", "amount": "170.00"})).unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn empty_ride_id_is_treated_as_absent() {
        let req: VerifyPaymentRequest = serde_json::from_value(json!({
            "razorpay_order_id": "order_abc",
            "razorpay_payment_id": "pay_123",
            "razorpay_signature": "deadbeef",
            "user_email": "rider@example.com",
            "ride_id": ""
        }))
        .unwrap();
        assert!(req.validate().is_ok());

        let callback = PaymentCallback::from(req);
        assert!(callback.ride_id.is_none());
        assert_eq!(callback.transaction_id, "pay_123");
    }
}
