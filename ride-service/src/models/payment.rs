use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Append-only record of one gateway transaction.
///
/// `(order_id, transaction_id)` is unique; a record is never edited after insert.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PaymentRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub order_id: String,
    pub transaction_id: String,
    /// Amount in major units (rupees for INR).
    pub amount: Decimal,
    /// Amount in the gateway's minor unit (paise for INR).
    pub amount_minor: u64,
    pub currency: String,
    pub status: PaymentRecordStatus,
    pub user_email: String,
    pub phone: Option<String>,
    pub ride_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRecordStatus {
    Success,
    Failed,
    Pending,
}

impl PaymentRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentRecordStatus::Success => "success",
            PaymentRecordStatus::Failed => "failed",
            PaymentRecordStatus::Pending => "pending",
        }
    }
}
