//! Razorpay payment gateway client.
//!
//! Implements Razorpay's Orders API for payment initiation, checkout
//! signature verification, and payment lookup for settlement.

use crate::config::RazorpayConfig;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::utils::signature::{hmac_sha256_hex, verify_hmac_sha256_hex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    /// The request may have reached Razorpay; the order might exist.
    #[error("Order outcome unknown: {0}")]
    OrderOutcomeUnknown(String),

    #[error("Gateway rejected request: {code} - {description}")]
    Rejected { code: String, description: String },

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }
}

/// Razorpay client for interacting with the Razorpay API.
#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    config: RazorpayConfig,
}

/// Request to create a Razorpay order.
#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    /// Amount in smallest currency unit (paise for INR).
    amount: u64,
    currency: &'a str,
    receipt: &'a str,
    /// Capture automatically once authorized.
    payment_capture: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<serde_json::Value>,
}

/// Response from Razorpay order creation and lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayOrder {
    pub id: String,
    /// Amount in smallest currency unit.
    pub amount: u64,
    #[serde(default)]
    pub amount_paid: u64,
    #[serde(default)]
    pub amount_due: u64,
    pub currency: String,
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub attempts: u32,
    pub notes: Option<serde_json::Value>,
    #[serde(default)]
    pub created_at: u64,
}

/// What callers need to hand to checkout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderHandle {
    pub id: String,
    pub amount: u64,
    pub currency: String,
}

impl From<&RazorpayOrder> for OrderHandle {
    fn from(order: &RazorpayOrder) -> Self {
        Self {
            id: order.id.clone(),
            amount: order.amount,
            currency: order.currency.clone(),
        }
    }
}

/// Razorpay API error response.
#[derive(Debug, Deserialize)]
struct RazorpayError {
    error: RazorpayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

/// Razorpay payment entity status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayPaymentStatus {
    Created,
    Authorized,
    Captured,
    Refunded,
    Failed,
    #[serde(other)]
    Unknown,
}

/// Razorpay payment entity, the authoritative view of a transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionDetails {
    pub id: String,
    /// Amount in smallest currency unit.
    pub amount: u64,
    pub currency: String,
    pub status: GatewayPaymentStatus,
    pub order_id: Option<String>,
    pub method: Option<String>,
    pub email: Option<String>,
    pub contact: Option<String>,
}

impl RazorpayClient {
    /// Create a new Razorpay client. Every request is bounded by the configured timeout.
    pub fn new(config: RazorpayConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { client, config })
    }

    /// Check if Razorpay is configured (credentials are set).
    pub fn is_configured(&self) -> bool {
        !self.config.key_id.is_empty() && !self.config.key_secret.expose_secret().is_empty()
    }

    /// Public key id handed to the checkout widget.
    pub fn key_id(&self) -> &str {
        &self.config.key_id
    }

    pub fn currency(&self) -> &str {
        &self.config.currency
    }

    fn ensure_configured(&self) -> Result<(), GatewayError> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(GatewayError::NotConfigured(
                "Razorpay credentials not configured".to_string(),
            ))
        }
    }

    /// Create a new order in Razorpay.
    ///
    /// `amount` is in the smallest currency unit and must be positive. A
    /// timeout or unreadable success response yields
    /// [`GatewayError::OrderOutcomeUnknown`]: look the order up instead of
    /// creating another one.
    pub async fn create_order(
        &self,
        amount: u64,
        currency: &str,
        receipt: &str,
        notes: Option<serde_json::Value>,
    ) -> Result<OrderHandle, GatewayError> {
        if amount == 0 {
            return Err(GatewayError::InvalidAmount(
                "amount must be a positive number of minor units".to_string(),
            ));
        }
        self.ensure_configured()?;

        let request = CreateOrderRequest {
            amount,
            currency,
            receipt,
            payment_capture: 1,
            notes,
        };

        let url = format!("{}/orders", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_builder() {
                    GatewayError::Unavailable(format!("Razorpay unreachable: {}", e))
                } else {
                    GatewayError::OrderOutcomeUnknown(format!("Razorpay order request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            GatewayError::OrderOutcomeUnknown(format!("failed to read Razorpay response: {}", e))
        })?;

        tracing::debug!(status = %status, body = %body, "Razorpay create_order response");

        if status.is_success() {
            let order: RazorpayOrder = serde_json::from_str(&body).map_err(|e| {
                GatewayError::OrderOutcomeUnknown(format!("unreadable Razorpay order: {}", e))
            })?;
            tracing::info!(
                order_id = %order.id,
                amount = order.amount,
                currency = %order.currency,
                "Razorpay order created"
            );
            Ok(OrderHandle::from(&order))
        } else {
            let err = error_from_response(status, &body);
            tracing::error!(status = %status, error = %err, "Razorpay order creation failed");
            Err(err)
        }
    }

    /// Fetch an existing order by ID.
    pub async fn get_order(&self, order_id: &str) -> Result<RazorpayOrder, GatewayError> {
        self.ensure_configured()?;

        let url = format!("{}/orders/{}", self.config.api_base_url, order_id);
        let (status, body) = self.get(&url).await?;

        if status.is_success() {
            serde_json::from_str(&body)
                .map_err(|e| GatewayError::Unavailable(format!("unreadable Razorpay order: {}", e)))
        } else {
            match error_from_response(status, &body) {
                GatewayError::TransactionNotFound(detail) => Err(GatewayError::Rejected {
                    code: "NOT_FOUND".to_string(),
                    description: detail,
                }),
                other => Err(other),
            }
        }
    }

    /// Fetch a payment by ID. This is the only trusted source of amount and currency.
    pub async fn fetch_payment(&self, payment_id: &str) -> Result<TransactionDetails, GatewayError> {
        self.ensure_configured()?;

        let url = format!("{}/payments/{}", self.config.api_base_url, payment_id);
        let (status, body) = self.get(&url).await?;

        if status.is_success() {
            let payment: TransactionDetails = serde_json::from_str(&body).map_err(|e| {
                GatewayError::Unavailable(format!("unreadable Razorpay payment: {}", e))
            })?;
            tracing::debug!(
                payment_id = %payment.id,
                amount = payment.amount,
                status = ?payment.status,
                "Razorpay payment fetched"
            );
            Ok(payment)
        } else {
            let err = error_from_response(status, &body);
            tracing::warn!(payment_id = %payment_id, error = %err, "Razorpay payment fetch failed");
            Err(err)
        }
    }

    /// Verify payment signature from Razorpay checkout.
    ///
    /// The signature is computed as:
    /// `HMAC-SHA256(order_id + "|" + payment_id, key_secret)`
    ///
    /// Returns `Ok(false)` on any mismatch. Errors are reserved for an unusable secret.
    pub fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, GatewayError> {
        let payload = format!("{}|{}", order_id, payment_id);

        let is_valid = verify_hmac_sha256_hex(self.config.key_secret.expose_secret(), &payload, signature)
            .map_err(|e| GatewayError::NotConfigured(e.to_string()))?;

        if is_valid {
            tracing::info!(
                order_id = %order_id,
                payment_id = %payment_id,
                "Payment signature verified successfully"
            );
        } else {
            tracing::warn!(
                order_id = %order_id,
                payment_id = %payment_id,
                "Payment signature verification failed"
            );
        }

        Ok(is_valid)
    }

    /// Signature checkout would return for this order/payment pair.
    pub fn sign_payment(&self, order_id: &str, payment_id: &str) -> Result<String, GatewayError> {
        hmac_sha256_hex(
            self.config.key_secret.expose_secret(),
            &format!("{}|{}", order_id, payment_id),
        )
        .map_err(|e| GatewayError::NotConfigured(e.to_string()))
    }

    async fn get(&self, url: &str) -> Result<(StatusCode, String), GatewayError> {
        let response = self
            .client
            .get(url)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("Razorpay request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("failed to read Razorpay response: {}", e)))?;

        Ok((status, body))
    }
}

fn error_from_response(status: StatusCode, body: &str) -> GatewayError {
    let detail = serde_json::from_str::<RazorpayError>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| RazorpayErrorDetail {
            code: "UNKNOWN".to_string(),
            description: body.to_string(),
        });

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        GatewayError::Unavailable(format!("Razorpay responded {}: {}", status, detail.description))
    } else if status == StatusCode::NOT_FOUND
        || detail.description.to_lowercase().contains("does not exist")
    {
        GatewayError::TransactionNotFound(detail.description)
    } else {
        GatewayError::Rejected {
            code: detail.code,
            description: detail.description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn test_config() -> RazorpayConfig {
        RazorpayConfig {
            key_id: "rzp_test_123".to_string(),
            key_secret: Secret::new("test_secret".to_string()),
            api_base_url: "https://api.razorpay.com/v1".to_string(),
            currency: "INR".to_string(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_is_configured() {
        let client = RazorpayClient::new(test_config()).unwrap();
        assert!(client.is_configured());

        let empty_config = RazorpayConfig {
            key_id: "".to_string(),
            key_secret: Secret::new("".to_string()),
            ..test_config()
        };
        let client = RazorpayClient::new(empty_config).unwrap();
        assert!(!client.is_configured());
    }

    #[test]
    fn test_payment_signature_verification() {
        let client = RazorpayClient::new(test_config()).unwrap();

        let expected = hmac_sha256_hex("test_secret", "order_123|pay_456").unwrap();
        assert_eq!(client.sign_payment("order_123", "pay_456").unwrap(), expected);

        assert!(client
            .verify_payment_signature("order_123", "pay_456", &expected)
            .unwrap());
    }

    #[test]
    fn test_every_single_character_flip_fails() {
        let client = RazorpayClient::new(test_config()).unwrap();
        let valid = client.sign_payment("order_abc", "pay_123").unwrap();

        for i in 0..valid.len() {
            let mut chars: Vec<char> = valid.chars().collect();
            chars[i] = if chars[i] == '0' { '1' } else { '0' };
            let tampered: String = chars.into_iter().collect();

            assert!(
                !client
                    .verify_payment_signature("order_abc", "pay_123", &tampered)
                    .unwrap(),
                "flip at position {} verified",
                i
            );
        }
    }

    #[test]
    fn test_invalid_signature() {
        let client = RazorpayClient::new(test_config()).unwrap();

        assert!(!client
            .verify_payment_signature("order_123", "pay_456", "invalid_signature")
            .unwrap());
    }

    #[test]
    fn test_swapped_ids_fail() {
        let client = RazorpayClient::new(test_config()).unwrap();
        let signature = client.sign_payment("order_123", "pay_456").unwrap();

        assert!(!client
            .verify_payment_signature("pay_456", "order_123", &signature)
            .unwrap());
    }

    #[test]
    fn test_empty_secret_is_a_configuration_error() {
        let client = RazorpayClient::new(RazorpayConfig {
            key_secret: Secret::new(String::new()),
            ..test_config()
        })
        .unwrap();

        assert!(matches!(
            client.verify_payment_signature("order_123", "pay_456", "abc"),
            Err(GatewayError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_amount_is_rejected_locally() {
        let client = RazorpayClient::new(test_config()).unwrap();
        let err = client.create_order(0, "INR", "rcpt_1", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidAmount(_)));
    }

    #[test]
    fn test_error_classification() {
        let not_found = r#"{"error":{"code":"BAD_REQUEST_ERROR","description":"The id provided does not exist"}}"#;
        assert!(matches!(
            error_from_response(StatusCode::BAD_REQUEST, not_found),
            GatewayError::TransactionNotFound(_)
        ));

        assert!(matches!(
            error_from_response(StatusCode::BAD_GATEWAY, "upstream"),
            GatewayError::Unavailable(_)
        ));

        let bad_amount = r#"{"error":{"code":"BAD_REQUEST_ERROR","description":"Order amount less than minimum amount allowed"}}"#;
        match error_from_response(StatusCode::BAD_REQUEST, bad_amount) {
            GatewayError::Rejected { code, .. } => assert_eq!(code, "BAD_REQUEST_ERROR"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
