mod common;

use async_trait::async_trait;
use chrono::Utc;
use common::{payment_body, razorpay_config, sign};
use ride_service::models::{
    Booking, BookingPaymentUpdate, FareQuote, GeoPoint, NewBooking, PaymentMethod, PaymentStatus,
};
use ride_service::services::settlement::{PaymentCallback, SettlementError, SettlementStatus};
use ride_service::services::store::StoreError;
use ride_service::services::{
    BookingStore, InMemoryBookingStore, InMemoryPaymentStore, PaymentStore, RazorpayClient,
    SettlementOrchestrator,
};
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Booking store whose first `n` payment updates fail.
struct FlakyBookingStore {
    inner: InMemoryBookingStore,
    failures_left: AtomicUsize,
    updates: AtomicUsize,
}

impl FlakyBookingStore {
    fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryBookingStore::new(),
            failures_left: AtomicUsize::new(failures),
            updates: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl BookingStore for FlakyBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        self.inner.insert(booking).await
    }

    async fn get(&self, id: &str) -> Result<Option<Booking>, StoreError> {
        self.inner.get(id).await
    }

    async fn apply_payment_update(
        &self,
        id: &str,
        update: &BookingPaymentUpdate,
    ) -> Result<Option<Booking>, StoreError> {
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.apply_payment_update(id, update).await
    }
}

fn online_booking() -> Booking {
    let quote = FareQuote {
        distance_km: dec!(10),
        duration_secs: 1200,
        duration_text: "20 mins".to_string(),
        base_fare: dec!(50),
        price_per_km: dec!(12),
        total_fare: dec!(170),
    };
    Booking::from_quote(
        NewBooking {
            name: "Asha".to_string(),
            email: "asha@example.com".to_string(),
            mobile: "9999999999".to_string(),
            origin: GeoPoint { lat: 12.97, lng: 77.59 },
            destination: GeoPoint { lat: 12.93, lng: 77.62 },
            pickup_address: "MG Road".to_string(),
            drop_address: "Koramangala".to_string(),
            ride_at: Utc::now(),
            passengers: 1,
            car_name: "Sedan".to_string(),
            payment_method: PaymentMethod::Online,
        },
        &quote,
    )
}

fn callback(ride_id: &str) -> PaymentCallback {
    PaymentCallback {
        order_id: "order_abc".to_string(),
        transaction_id: "pay_123".to_string(),
        signature: sign("order_abc", "pay_123"),
        user_email: "rider@example.com".to_string(),
        ride_id: Some(ride_id.to_string()),
    }
}

async fn gateway_with_captured_payment(booking_id: &str) -> (MockServer, RazorpayClient) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders/order_abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "order_abc",
            "amount": 17000,
            "currency": "INR",
            "receipt": "rcpt_test",
            "status": "paid",
            "notes": {"booking_id": booking_id}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/payments/pay_123"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(payment_body("pay_123", "order_abc", 17000, "captured")),
        )
        .mount(&server)
        .await;

    let client = RazorpayClient::new(razorpay_config(server.uri()))
        .expect("Failed to build gateway client");
    (server, client)
}

#[tokio::test]
async fn duplicate_delivery_repairs_a_lost_booking_update() {
    let booking = online_booking();
    let (_server, gateway) = gateway_with_captured_payment(&booking.id).await;
    let bookings = Arc::new(FlakyBookingStore::new(1));
    let payments = Arc::new(InMemoryPaymentStore::new());
    bookings.insert(&booking).await.unwrap();

    let orchestrator = SettlementOrchestrator::new(gateway, bookings.clone(), payments.clone());

    let err = orchestrator
        .confirm_payment(callback(&booking.id))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::PersistenceFailure(_)));
    assert!(err.is_retryable());

    // Record kept, booking still pending.
    assert_eq!(payments.count().await.unwrap(), 1);
    let pending = bookings.get(&booking.id).await.unwrap().unwrap();
    assert_eq!(pending.payment_status, PaymentStatus::Pending);

    let result = orchestrator
        .confirm_payment(callback(&booking.id))
        .await
        .unwrap();
    assert_eq!(result.status, SettlementStatus::Settled);
    assert_eq!(payments.count().await.unwrap(), 1);

    let repaired = bookings.get(&booking.id).await.unwrap().unwrap();
    assert_eq!(repaired.payment_status, PaymentStatus::Paid);
    assert_eq!(repaired.advance_payment, dec!(170));
    assert_eq!(repaired.balance_payment, dec!(0));
    assert_eq!(repaired.settlement_ref.as_deref(), Some("pay_123"));

    // A third delivery finds the settlement already applied.
    orchestrator
        .confirm_payment(callback(&booking.id))
        .await
        .unwrap();
    assert_eq!(bookings.updates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unconfigured_gateway_refuses_to_settle() {
    let server = MockServer::start().await;
    let mut config = razorpay_config(server.uri());
    config.key_secret = secrecy::Secret::new(String::new());
    let gateway = RazorpayClient::new(config).unwrap();
    assert!(!gateway.is_configured());

    let orchestrator = SettlementOrchestrator::new(
        gateway,
        Arc::new(InMemoryBookingStore::new()),
        Arc::new(InMemoryPaymentStore::new()),
    );

    let err = orchestrator
        .confirm_payment(callback("any"))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Configuration(_)));
}
