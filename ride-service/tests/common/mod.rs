#![allow(dead_code)]

use ride_service::config::{
    Config, ObservabilityConfig, RazorpayConfig, RoutingConfig, ServerConfig, StoreBackend,
    StoreConfig,
};
use ride_service::models::{Booking, Vehicle};
use ride_service::services::PaymentStore;
use rust_decimal_macros::dec;
use ride_service::startup::{AppState, Application};
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::utils::signature::hmac_sha256_hex;
use wiremock::matchers::{body_partial_json, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_KEY_ID: &str = "rzp_test_key";
pub const TEST_KEY_SECRET: &str = "rzp_test_secret";

pub fn razorpay_config(api_base_url: String) -> RazorpayConfig {
    RazorpayConfig {
        key_id: TEST_KEY_ID.to_string(),
        key_secret: Secret::new(TEST_KEY_SECRET.to_string()),
        api_base_url,
        currency: "INR".to_string(),
        timeout_secs: 2,
    }
}

pub fn routing_config(api_base_url: String) -> RoutingConfig {
    RoutingConfig {
        api_base_url,
        api_key: Secret::new("routing_test_key".to_string()),
        timeout_secs: 2,
    }
}

/// Signature Razorpay checkout would hand back for this pair.
pub fn sign(order_id: &str, payment_id: &str) -> String {
    hmac_sha256_hex(TEST_KEY_SECRET, &format!("{}|{}", order_id, payment_id))
        .expect("Failed to sign payment")
}

pub fn payment_body(payment_id: &str, order_id: &str, amount: u64, status: &str) -> Value {
    json!({
        "id": payment_id,
        "entity": "payment",
        "amount": amount,
        "currency": "INR",
        "status": status,
        "order_id": order_id,
        "method": "upi",
        "email": "rider@example.com",
        "contact": "+919999999999"
    })
}

pub struct TestApp {
    pub http_address: String,
    pub http_port: u16,
    pub state: AppState,
    pub razorpay: MockServer,
    pub routing: MockServer,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let razorpay = MockServer::start().await;
        let routing = MockServer::start().await;

        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Random port
            },
            store: StoreConfig {
                backend: StoreBackend::Memory,
                mongodb: None,
            },
            razorpay: razorpay_config(razorpay.uri()),
            routing: routing_config(routing.uri()),
            observability: ObservabilityConfig {
                log_level: "error".to_string(),
                otlp_endpoint: None,
            },
            service_name: "ride-service-test".to_string(),
        };

        ride_service::services::init_metrics();

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let http_port = app.http_port();
        let http_address = format!("http://127.0.0.1:{}", http_port);
        let state = app.state();
        state
            .vehicles
            .upsert(&Vehicle::new("Sedan", dec!(50), dec!(12)))
            .await
            .expect("Failed to seed vehicle");

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", http_address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            http_address,
            http_port,
            state,
            razorpay,
            routing,
            client,
        }
    }

    /// Routing service answers every lookup with this leg.
    pub async fn mock_route(&self, meters: u64, seconds: u64) {
        Mock::given(method("GET"))
            .and(path("/maps/api/distancematrix/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "origin_addresses": ["MG Road"],
                "destination_addresses": ["Koramangala"],
                "rows": [{"elements": [{
                    "status": "OK",
                    "distance": {"text": format!("{} m", meters), "value": meters},
                    "duration": {"text": format!("{} secs", seconds), "value": seconds}
                }]}]
            })))
            .mount(&self.routing)
            .await;
    }

    /// Order creation for exactly `amount` minor units answers with `order_id`.
    pub async fn mock_order(&self, order_id: &str, amount: u64) {
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(body_partial_json(json!({"amount": amount})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": order_id,
                "entity": "order",
                "amount": amount,
                "amount_paid": 0,
                "amount_due": amount,
                "currency": "INR",
                "receipt": "rcpt_test",
                "status": "created",
                "attempts": 0,
                "created_at": 1700000000
            })))
            .mount(&self.razorpay)
            .await;
    }

    /// Order lookup carrying the booking link written at order creation.
    pub async fn mock_order_lookup(&self, order_id: &str, booking_id: &str, amount: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/orders/{}", order_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": order_id,
                "entity": "order",
                "amount": amount,
                "amount_paid": amount,
                "amount_due": 0,
                "currency": "INR",
                "receipt": "rcpt_test",
                "status": "paid",
                "attempts": 1,
                "notes": {"booking_id": booking_id},
                "created_at": 1700000000
            })))
            .mount(&self.razorpay)
            .await;
    }

    pub async fn mock_payment(&self, payment_id: &str, order_id: &str, amount: u64, status: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/payments/{}", payment_id)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(payment_body(payment_id, order_id, amount, status)),
            )
            .mount(&self.razorpay)
            .await;
    }

    /// Fail the test if the gateway is asked for payment details.
    pub async fn forbid_payment_lookup(&self) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/payments/.*$"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&self.razorpay)
            .await;
    }

    pub async fn create_booking(&self, payment_method: &str) -> Booking {
        let response = self.request_booking("Sedan", payment_method).await;
        assert_eq!(response.status().as_u16(), 201);
        response.json().await.expect("Failed to parse booking")
    }

    pub async fn request_booking(&self, car_name: &str, payment_method: &str) -> reqwest::Response {
        self
            .client
            .post(format!("{}/bookings", self.http_address))
            .json(&json!({
                "name": "Asha",
                "email": "asha@example.com",
                "mobile": "9999999999",
                "origin": {"lat": 12.9716, "lng": 77.5946},
                "destination": {"lat": 12.9352, "lng": 77.6245},
                "pickup_address": "MG Road",
                "drop_address": "Koramangala",
                "ride_at": "2026-11-01T09:30:00Z",
                "passengers": 2,
                "car_name": car_name,
                "payment_method": payment_method
            }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get_booking(&self, id: &str) -> Booking {
        self.client
            .get(format!("{}/bookings/{}", self.http_address, id))
            .send()
            .await
            .expect("Failed to execute request")
            .json()
            .await
            .expect("Failed to parse booking")
    }

    pub async fn create_order(&self, booking_id: &str, amount: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/orders", self.http_address))
            .json(&json!({"booking_id": booking_id, "amount": amount}))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn verify(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
        ride_id: Option<&str>,
    ) -> reqwest::Response {
        let mut body = json!({
            "razorpay_order_id": order_id,
            "razorpay_payment_id": payment_id,
            "razorpay_signature": signature,
            "user_email": "rider@example.com"
        });
        if let Some(ride_id) = ride_id {
            body["ride_id"] = json!(ride_id);
        }

        self.client
            .post(format!("{}/payments/verify", self.http_address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn payment_count(&self) -> u64 {
        self.state
            .payments
            .count()
            .await
            .expect("Failed to count payments")
    }
}
