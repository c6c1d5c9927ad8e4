//! Settlement orchestrator.
//!
//! Drives one payment attempt from order creation through signature
//! verification, idempotent persistence of the payment record and the booking
//! payment transition. The orchestrator holds no state of its own: the
//! payment store's unique `(order_id, transaction_id)` key is the only
//! concurrency control, and the booking's `settlement_ref` makes the booking
//! write land at most once. The booking a payment settles is the one named
//! in the gateway order's notes, never one supplied by the caller.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Booking, BookingPaymentUpdate, PaymentMethod, PaymentRecord, PaymentRecordStatus,
    PaymentStatus,
};
use crate::services::metrics;
use crate::services::rate::{from_minor_units, round_to_minor, to_minor_units, FareError};
use crate::services::razorpay::{
    GatewayError, GatewayPaymentStatus, OrderHandle, RazorpayClient, RazorpayOrder,
};
use crate::services::routing::RouteError;
use crate::services::store::{BookingStore, PaymentStore, StoreError};

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Booking not found: {0}")]
    BookingNotFound(String),

    #[error("Vehicle type not available: {0}")]
    VehicleNotFound(String),

    #[error("Route unavailable: {0}")]
    RouteUnavailable(String),

    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Order outcome unknown: {0}")]
    OrderOutcomeUnknown(String),

    #[error("Gateway rejected request: {code} - {description}")]
    GatewayRejected { code: String, description: String },

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Payment gateway misconfigured: {0}")]
    Configuration(String),

    #[error("Illegal settlement transition: {from} -> {to}")]
    IllegalTransition {
        from: SettlementState,
        to: SettlementState,
    },
}

impl SettlementError {
    /// Transient failures: the same request may be repeated safely.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SettlementError::RouteUnavailable(_)
                | SettlementError::GatewayUnavailable(_)
                | SettlementError::OrderOutcomeUnknown(_)
                | SettlementError::PersistenceFailure(_)
        )
    }
}

impl From<GatewayError> for SettlementError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotConfigured(msg) => SettlementError::Configuration(msg),
            GatewayError::InvalidAmount(msg) => SettlementError::InvalidInput(msg),
            GatewayError::Unavailable(msg) => SettlementError::GatewayUnavailable(msg),
            GatewayError::OrderOutcomeUnknown(msg) => SettlementError::OrderOutcomeUnknown(msg),
            GatewayError::Rejected { code, description } => {
                SettlementError::GatewayRejected { code, description }
            }
            GatewayError::TransactionNotFound(msg) => SettlementError::TransactionNotFound(msg),
        }
    }
}

impl From<StoreError> for SettlementError {
    fn from(err: StoreError) -> Self {
        SettlementError::PersistenceFailure(err.to_string())
    }
}

impl From<FareError> for SettlementError {
    fn from(err: FareError) -> Self {
        match err {
            FareError::InvalidInput(msg) => SettlementError::InvalidInput(msg),
        }
    }
}

impl From<RouteError> for SettlementError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::Unavailable(msg) => SettlementError::RouteUnavailable(msg),
        }
    }
}

impl From<SettlementError> for AppError {
    fn from(err: SettlementError) -> Self {
        match err {
            SettlementError::InvalidInput(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            SettlementError::BookingNotFound(id) => {
                AppError::NotFound(anyhow::anyhow!("Booking {} not found", id))
            }
            SettlementError::VehicleNotFound(car_name) => {
                AppError::NotFound(anyhow::anyhow!("Vehicle type {} not available", car_name))
            }
            SettlementError::TransactionNotFound(msg) => {
                AppError::NotFound(anyhow::anyhow!("Transaction not found: {}", msg))
            }
            SettlementError::RouteUnavailable(msg) => AppError::ServiceUnavailable(msg),
            SettlementError::GatewayUnavailable(msg) => AppError::ServiceUnavailable(msg),
            SettlementError::OrderOutcomeUnknown(msg) => AppError::GatewayTimeout(msg),
            SettlementError::GatewayRejected { code, description } => {
                AppError::BadGateway(format!("{}: {}", code, description))
            }
            SettlementError::PersistenceFailure(msg) => {
                AppError::DatabaseError(anyhow::anyhow!(msg))
            }
            SettlementError::Configuration(msg) => AppError::ConfigError(anyhow::anyhow!(msg)),
            e @ SettlementError::IllegalTransition { .. } => {
                AppError::InternalError(anyhow::anyhow!(e.to_string()))
            }
        }
    }
}

/// Lifecycle of a single payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementState {
    Initiated,
    AwaitingConfirmation,
    Verifying,
    Settled,
    Rejected,
}

impl SettlementState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SettlementState::Settled | SettlementState::Rejected)
    }

    pub fn can_transition_to(&self, next: SettlementState) -> bool {
        use SettlementState::*;
        matches!(
            (self, next),
            (Initiated, AwaitingConfirmation)
                | (AwaitingConfirmation, Verifying)
                | (Verifying, Settled)
                | (Verifying, Rejected)
        )
    }
}

impl fmt::Display for SettlementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SettlementState::Initiated => "initiated",
            SettlementState::AwaitingConfirmation => "awaiting_confirmation",
            SettlementState::Verifying => "verifying",
            SettlementState::Settled => "settled",
            SettlementState::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Tracks the state of one attempt and refuses illegal moves.
#[derive(Debug)]
struct Attempt {
    state: SettlementState,
}

impl Attempt {
    fn starting_at(state: SettlementState) -> Self {
        Self { state }
    }

    fn advance(&mut self, next: SettlementState) -> Result<(), SettlementError> {
        if !self.state.can_transition_to(next) {
            return Err(SettlementError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Settled,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    SignatureMismatch,
    OrderMismatch,
    /// The callback names a booking other than the one the order was opened for.
    BookingMismatch,
    PaymentNotSuccessful,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::SignatureMismatch => "signature_mismatch",
            RejectionReason::OrderMismatch => "order_mismatch",
            RejectionReason::BookingMismatch => "booking_mismatch",
            RejectionReason::PaymentNotSuccessful => "payment_not_successful",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementResult {
    pub status: SettlementStatus,
    pub transaction_id: String,
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,
}

impl SettlementResult {
    fn settled(order_id: &str, transaction_id: &str) -> Self {
        Self {
            status: SettlementStatus::Settled,
            transaction_id: transaction_id.to_string(),
            order_id: order_id.to_string(),
            reason: None,
        }
    }

    fn rejected(order_id: &str, transaction_id: &str, reason: RejectionReason) -> Self {
        Self {
            status: SettlementStatus::Rejected,
            transaction_id: transaction_id.to_string(),
            order_id: order_id.to_string(),
            reason: Some(reason),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.status == SettlementStatus::Settled
    }
}

/// What the checkout widget hands back after the rider pays.
#[derive(Debug, Clone)]
pub struct PaymentCallback {
    pub order_id: String,
    pub transaction_id: String,
    pub signature: String,
    pub user_email: String,
    pub ride_id: Option<String>,
}

/// Outcome of planning the booking side of a settlement.
#[derive(Debug, Clone, PartialEq)]
pub enum BookingPlan {
    Apply(BookingPaymentUpdate),
    /// The booking already carries this transaction's settlement.
    AlreadyApplied,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    CashOnDelivery,
    AlreadySettled,
    /// Another transaction's settlement is already on the booking.
    SettledByAnotherTransaction,
}

/// Decide the booking payment transition for a confirmed transaction.
///
/// A booking takes exactly one settlement: once `settlement_ref` is set, only
/// a repeat of that same transaction is recognized, and it changes nothing.
/// `amount` is the gateway's authoritative amount in major units.
pub fn plan_booking_update(booking: &Booking, transaction_id: &str, amount: Decimal) -> BookingPlan {
    match booking.settlement_ref.as_deref() {
        Some(applied) if applied == transaction_id => return BookingPlan::AlreadyApplied,
        Some(_) => return BookingPlan::Skipped(SkipReason::SettledByAnotherTransaction),
        None => {}
    }

    let total_fare = round_to_minor(booking.total_fare);
    let payment_status = match booking.payment_method {
        PaymentMethod::Cod => return BookingPlan::Skipped(SkipReason::CashOnDelivery),
        _ if booking.payment_status.is_settled() => {
            return BookingPlan::Skipped(SkipReason::AlreadySettled)
        }
        PaymentMethod::Online if amount >= total_fare => PaymentStatus::Paid,
        PaymentMethod::Online | PaymentMethod::Advanced => booking.payment_status,
    };

    BookingPlan::Apply(BookingPaymentUpdate {
        advance_payment: amount,
        balance_payment: total_fare - amount,
        payment_status,
        settlement_ref: transaction_id.to_string(),
    })
}

/// Booking id `create_order` wrote into the order notes.
fn linked_booking(order: &RazorpayOrder) -> Option<String> {
    order
        .notes
        .as_ref()
        .and_then(|notes| notes.get("booking_id"))
        .and_then(|id| id.as_str())
        .map(str::to_string)
}

fn record_status(status: GatewayPaymentStatus) -> PaymentRecordStatus {
    match status {
        GatewayPaymentStatus::Captured | GatewayPaymentStatus::Authorized => {
            PaymentRecordStatus::Success
        }
        GatewayPaymentStatus::Failed | GatewayPaymentStatus::Refunded => {
            PaymentRecordStatus::Failed
        }
        GatewayPaymentStatus::Created | GatewayPaymentStatus::Unknown => {
            PaymentRecordStatus::Pending
        }
    }
}

#[derive(Clone)]
pub struct SettlementOrchestrator {
    gateway: RazorpayClient,
    bookings: Arc<dyn BookingStore>,
    payments: Arc<dyn PaymentStore>,
}

impl SettlementOrchestrator {
    pub fn new(
        gateway: RazorpayClient,
        bookings: Arc<dyn BookingStore>,
        payments: Arc<dyn PaymentStore>,
    ) -> Self {
        Self {
            gateway,
            bookings,
            payments,
        }
    }

    pub fn gateway(&self) -> &RazorpayClient {
        &self.gateway
    }

    /// Create a gateway order for `amount` (major units) against a booking.
    pub async fn create_order(
        &self,
        booking_id: &str,
        amount: Decimal,
    ) -> Result<OrderHandle, SettlementError> {
        if amount <= Decimal::ZERO {
            return Err(SettlementError::InvalidInput(
                "amount must be greater than zero".to_string(),
            ));
        }

        let booking = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| SettlementError::BookingNotFound(booking_id.to_string()))?;

        validate_order_amount(&booking, amount)?;
        let amount_minor = to_minor_units(amount)?;

        let mut attempt = Attempt::starting_at(SettlementState::Initiated);

        let receipt = format!("rcpt_{}", Uuid::new_v4().simple());
        let notes = serde_json::json!({ "booking_id": booking.id });

        let order = self
            .gateway
            .create_order(amount_minor, self.gateway.currency(), &receipt, Some(notes))
            .await
            .inspect_err(|e| {
                tracing::warn!(booking_id = %booking.id, error = %e, "Order creation failed");
            })?;

        attempt.advance(SettlementState::AwaitingConfirmation)?;

        tracing::info!(
            booking_id = %booking.id,
            order_id = %order.id,
            amount_minor = order.amount,
            receipt = %receipt,
            state = %attempt.state,
            "Payment order created"
        );

        Ok(order)
    }

    /// Look up an order, e.g. after `create_order` reported an unknown outcome.
    pub async fn get_order(&self, order_id: &str) -> Result<RazorpayOrder, SettlementError> {
        Ok(self.gateway.get_order(order_id).await?)
    }

    /// Verify and settle a checkout callback.
    ///
    /// Safe to call any number of times with the same callback: the result is
    /// recomputed from the stored record and the booking is written at most
    /// once per transaction.
    pub async fn confirm_payment(
        &self,
        callback: PaymentCallback,
    ) -> Result<SettlementResult, SettlementError> {
        let result = self.settle(&callback).await;
        match &result {
            Ok(r) if r.is_settled() => {}
            Ok(_) => metrics::record_settlement("rejected"),
            Err(_) => metrics::record_settlement("error"),
        }
        result
    }

    async fn settle(&self, callback: &PaymentCallback) -> Result<SettlementResult, SettlementError> {
        let order_id = callback.order_id.as_str();
        let transaction_id = callback.transaction_id.as_str();

        let mut attempt = Attempt::starting_at(SettlementState::AwaitingConfirmation);
        attempt.advance(SettlementState::Verifying)?;

        let signature_ok =
            self.gateway
                .verify_payment_signature(order_id, transaction_id, &callback.signature)?;
        if !signature_ok {
            attempt.advance(SettlementState::Rejected)?;
            return Ok(SettlementResult::rejected(
                order_id,
                transaction_id,
                RejectionReason::SignatureMismatch,
            ));
        }

        let details = self.gateway.fetch_payment(transaction_id).await?;

        if let Some(gateway_order) = details.order_id.as_deref() {
            if gateway_order != order_id {
                tracing::warn!(
                    order_id = %order_id,
                    transaction_id = %transaction_id,
                    gateway_order_id = %gateway_order,
                    "Transaction belongs to a different order"
                );
                attempt.advance(SettlementState::Rejected)?;
                return Ok(SettlementResult::rejected(
                    order_id,
                    transaction_id,
                    RejectionReason::OrderMismatch,
                ));
            }
        }

        let order = self.gateway.get_order(order_id).await?;
        let booking_id = linked_booking(&order);
        match (callback.ride_id.as_deref(), booking_id.as_deref()) {
            (Some(claimed), Some(linked)) if claimed != linked => {
                tracing::warn!(
                    order_id = %order_id,
                    transaction_id = %transaction_id,
                    claimed_booking = %claimed,
                    linked_booking = %linked,
                    "Callback names a booking the order was not opened for"
                );
                attempt.advance(SettlementState::Rejected)?;
                return Ok(SettlementResult::rejected(
                    order_id,
                    transaction_id,
                    RejectionReason::BookingMismatch,
                ));
            }
            (Some(claimed), None) => {
                tracing::warn!(
                    order_id = %order_id,
                    claimed_booking = %claimed,
                    "Order carries no booking link; callback ride id ignored"
                );
            }
            _ => {}
        }

        let record = PaymentRecord {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            transaction_id: transaction_id.to_string(),
            amount: from_minor_units(details.amount),
            amount_minor: details.amount,
            currency: details.currency.clone(),
            status: record_status(details.status),
            user_email: callback.user_email.clone(),
            phone: details.contact.clone(),
            ride_id: booking_id,
            created_at: Utc::now(),
        };

        let outcome = match self.payments.insert_if_absent(record).await {
            Ok(outcome) => outcome,
            Err(StoreError::Conflict(detail)) => {
                tracing::warn!(
                    order_id = %order_id,
                    transaction_id = %transaction_id,
                    detail = %detail,
                    "Transaction already settled under another order"
                );
                attempt.advance(SettlementState::Rejected)?;
                return Ok(SettlementResult::rejected(
                    order_id,
                    transaction_id,
                    RejectionReason::OrderMismatch,
                ));
            }
            Err(e) => return Err(e.into()),
        };

        let stored = outcome.record;
        if outcome.created {
            tracing::info!(
                order_id = %order_id,
                transaction_id = %transaction_id,
                amount = %stored.amount,
                currency = %stored.currency,
                status = stored.status.as_str(),
                "Payment record stored"
            );
        } else {
            tracing::info!(
                order_id = %order_id,
                transaction_id = %transaction_id,
                "Duplicate payment confirmation"
            );
            metrics::record_settlement("duplicate");
        }

        if stored.status != PaymentRecordStatus::Success {
            tracing::warn!(
                order_id = %order_id,
                transaction_id = %transaction_id,
                status = stored.status.as_str(),
                "Payment not successful at gateway"
            );
            attempt.advance(SettlementState::Rejected)?;
            return Ok(SettlementResult::rejected(
                order_id,
                transaction_id,
                RejectionReason::PaymentNotSuccessful,
            ));
        }

        if let Some(ride_id) = stored.ride_id.as_deref() {
            self.reconcile_booking(ride_id, &stored).await?;
        }

        attempt.advance(SettlementState::Settled)?;
        if outcome.created {
            metrics::record_settlement("settled");
            metrics::record_amount(&stored.currency, stored.amount_minor);
        }

        Ok(SettlementResult::settled(order_id, transaction_id))
    }

    /// Apply the booking side of a settlement. Also repairs a booking whose
    /// update was lost after the payment record had been stored.
    async fn reconcile_booking(
        &self,
        booking_id: &str,
        record: &PaymentRecord,
    ) -> Result<(), SettlementError> {
        let Some(booking) = self.bookings.get(booking_id).await? else {
            tracing::warn!(
                booking_id = %booking_id,
                transaction_id = %record.transaction_id,
                "Payment references an unknown booking; payment kept"
            );
            return Ok(());
        };

        match plan_booking_update(&booking, &record.transaction_id, record.amount) {
            BookingPlan::Apply(update) => {
                if update.balance_payment < Decimal::ZERO {
                    tracing::warn!(
                        booking_id = %booking_id,
                        amount = %record.amount,
                        total_fare = %booking.total_fare,
                        "Payment exceeds total fare"
                    );
                }
                if booking.payment_method == PaymentMethod::Online
                    && update.payment_status != PaymentStatus::Paid
                {
                    tracing::warn!(
                        booking_id = %booking_id,
                        amount = %record.amount,
                        total_fare = %booking.total_fare,
                        "Payment does not cover the fare; booking left pending"
                    );
                }
                let updated = self
                    .bookings
                    .apply_payment_update(booking_id, &update)
                    .await?;
                if updated.is_none() {
                    tracing::warn!(
                        booking_id = %booking_id,
                        transaction_id = %record.transaction_id,
                        "Booking missing or settled by another transaction; not updated"
                    );
                } else {
                    tracing::info!(
                        booking_id = %booking_id,
                        transaction_id = %record.transaction_id,
                        advance = %update.advance_payment,
                        balance = %update.balance_payment,
                        payment_status = ?update.payment_status,
                        "Booking payment updated"
                    );
                }
            }
            BookingPlan::AlreadyApplied => {
                tracing::debug!(booking_id = %booking_id, "Settlement already applied to booking");
            }
            BookingPlan::Skipped(reason) => {
                tracing::warn!(
                    booking_id = %booking_id,
                    transaction_id = %record.transaction_id,
                    reason = ?reason,
                    "Booking payment update skipped"
                );
            }
        }

        Ok(())
    }
}

fn validate_order_amount(booking: &Booking, amount: Decimal) -> Result<(), SettlementError> {
    if booking.payment_method == PaymentMethod::Cod {
        return Err(SettlementError::InvalidInput(
            "cash-on-delivery bookings are not paid online".to_string(),
        ));
    }
    if booking.payment_status != PaymentStatus::Pending {
        return Err(SettlementError::InvalidInput(format!(
            "booking {} is already paid",
            booking.id
        )));
    }
    // The advance is taken once; the balance is collected at trip completion.
    if let Some(settled) = &booking.settlement_ref {
        return Err(SettlementError::InvalidInput(format!(
            "booking {} already has a settled payment ({})",
            booking.id, settled
        )));
    }

    let total_fare = round_to_minor(booking.total_fare);
    let amount = round_to_minor(amount);
    if amount > total_fare {
        return Err(SettlementError::InvalidInput(format!(
            "amount {} exceeds total fare {}",
            amount, total_fare
        )));
    }
    if booking.payment_method == PaymentMethod::Online && amount != total_fare {
        return Err(SettlementError::InvalidInput(format!(
            "online bookings must be paid in full ({})",
            total_fare
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FareQuote, GeoPoint, NewBooking};
    use rust_decimal_macros::dec;

    fn booking(method: PaymentMethod) -> Booking {
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
                payment_method: method,
            },
            &quote,
        )
    }

    #[test]
    fn state_machine_allows_only_forward_moves() {
        use SettlementState::*;
        assert!(Initiated.can_transition_to(AwaitingConfirmation));
        assert!(AwaitingConfirmation.can_transition_to(Verifying));
        assert!(Verifying.can_transition_to(Settled));
        assert!(Verifying.can_transition_to(Rejected));

        assert!(!Initiated.can_transition_to(Settled));
        assert!(!Settled.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Verifying));
        assert!(Settled.is_terminal() && Rejected.is_terminal());
    }

    #[test]
    fn illegal_transition_is_an_internal_error() {
        let mut attempt = Attempt::starting_at(SettlementState::Settled);
        let err = attempt.advance(SettlementState::Verifying).unwrap_err();
        assert!(matches!(err, SettlementError::IllegalTransition { .. }));
        assert!(matches!(AppError::from(err), AppError::InternalError(_)));
    }

    #[test]
    fn online_payment_marks_booking_paid() {
        let booking = booking(PaymentMethod::Online);
        match plan_booking_update(&booking, "pay_123", dec!(170)) {
            BookingPlan::Apply(update) => {
                assert_eq!(update.payment_status, PaymentStatus::Paid);
                assert_eq!(update.advance_payment, dec!(170));
                assert_eq!(update.balance_payment, dec!(0));
                assert_eq!(update.settlement_ref, "pay_123");
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn advance_payment_keeps_status_and_balances_total() {
        let booking = booking(PaymentMethod::Advanced);
        match plan_booking_update(&booking, "pay_123", dec!(50)) {
            BookingPlan::Apply(update) => {
                assert_eq!(update.payment_status, PaymentStatus::Pending);
                assert_eq!(
                    update.advance_payment + update.balance_payment,
                    booking.total_fare
                );
                assert_eq!(update.balance_payment, dec!(120));
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn cod_booking_is_never_mutated() {
        let booking = booking(PaymentMethod::Cod);
        assert_eq!(
            plan_booking_update(&booking, "pay_123", dec!(170)),
            BookingPlan::Skipped(SkipReason::CashOnDelivery)
        );
    }

    #[test]
    fn same_settlement_is_not_applied_twice() {
        let mut booking = booking(PaymentMethod::Online);
        booking.settlement_ref = Some("pay_123".to_string());
        assert_eq!(
            plan_booking_update(&booking, "pay_123", dec!(170)),
            BookingPlan::AlreadyApplied
        );
    }

    #[test]
    fn online_underpayment_leaves_booking_pending() {
        let booking = booking(PaymentMethod::Online);
        match plan_booking_update(&booking, "pay_123", dec!(1)) {
            BookingPlan::Apply(update) => {
                assert_eq!(update.payment_status, PaymentStatus::Pending);
                assert_eq!(update.advance_payment, dec!(1));
                assert_eq!(update.balance_payment, dec!(169));
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn older_transaction_never_overwrites_a_settlement() {
        let mut booking = booking(PaymentMethod::Advanced);
        booking.settlement_ref = Some("pay_2".to_string());
        booking.advance_payment = dec!(120);
        booking.balance_payment = dec!(50);

        assert_eq!(
            plan_booking_update(&booking, "pay_1", dec!(50)),
            BookingPlan::Skipped(SkipReason::SettledByAnotherTransaction)
        );
    }

    #[test]
    fn fractional_fare_is_compared_in_paise() {
        let mut online = booking(PaymentMethod::Online);
        online.total_fare = dec!(141.9675);
        online.balance_payment = dec!(141.9675);

        assert!(validate_order_amount(&online, dec!(141.97)).is_ok());
        match plan_booking_update(&online, "pay_123", dec!(141.97)) {
            BookingPlan::Apply(update) => {
                assert_eq!(update.payment_status, PaymentStatus::Paid);
                assert_eq!(update.balance_payment, dec!(0));
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn settled_advance_booking_takes_no_second_order() {
        let mut advanced = booking(PaymentMethod::Advanced);
        advanced.settlement_ref = Some("pay_1".to_string());
        advanced.advance_payment = dec!(50);
        advanced.balance_payment = dec!(120);

        assert!(matches!(
            validate_order_amount(&advanced, dec!(120)),
            Err(SettlementError::InvalidInput(_))
        ));
    }

    #[test]
    fn booking_link_is_read_from_order_notes() {
        let order: RazorpayOrder = serde_json::from_value(serde_json::json!({
            "id": "order_abc",
            "amount": 17000,
            "currency": "INR",
            "receipt": "rcpt_1",
            "notes": {"booking_id": "b-1"}
        }))
        .unwrap();
        assert_eq!(linked_booking(&order).as_deref(), Some("b-1"));

        let bare: RazorpayOrder = serde_json::from_value(serde_json::json!({
            "id": "order_abc",
            "amount": 17000,
            "currency": "INR",
            "receipt": null,
            "notes": []
        }))
        .unwrap();
        assert!(linked_booking(&bare).is_none());
    }

    #[test]
    fn paid_booking_never_regresses() {
        let mut booking = booking(PaymentMethod::Advanced);
        booking.payment_status = PaymentStatus::Completed;
        assert_eq!(
            plan_booking_update(&booking, "pay_999", dec!(10)),
            BookingPlan::Skipped(SkipReason::AlreadySettled)
        );
    }

    #[test]
    fn order_amount_rules() {
        let online = booking(PaymentMethod::Online);
        assert!(validate_order_amount(&online, dec!(170)).is_ok());
        assert!(validate_order_amount(&online, dec!(100)).is_err());

        let advanced = booking(PaymentMethod::Advanced);
        assert!(validate_order_amount(&advanced, dec!(50)).is_ok());
        assert!(validate_order_amount(&advanced, dec!(170.01)).is_err());

        assert!(validate_order_amount(&booking(PaymentMethod::Cod), dec!(10)).is_err());

        let mut paid = booking(PaymentMethod::Online);
        paid.payment_status = PaymentStatus::Paid;
        assert!(validate_order_amount(&paid, dec!(170)).is_err());
    }

    #[test]
    fn gateway_statuses_map_to_record_statuses() {
        assert_eq!(
            record_status(GatewayPaymentStatus::Captured),
            PaymentRecordStatus::Success
        );
        assert_eq!(
            record_status(GatewayPaymentStatus::Authorized),
            PaymentRecordStatus::Success
        );
        assert_eq!(
            record_status(GatewayPaymentStatus::Failed),
            PaymentRecordStatus::Failed
        );
        assert_eq!(
            record_status(GatewayPaymentStatus::Created),
            PaymentRecordStatus::Pending
        );
    }

    #[test]
    fn error_mapping_and_retryability() {
        assert!(SettlementError::GatewayUnavailable("down".into()).is_retryable());
        assert!(SettlementError::OrderOutcomeUnknown("timeout".into()).is_retryable());
        assert!(!SettlementError::InvalidInput("bad".into()).is_retryable());

        assert!(matches!(
            AppError::from(SettlementError::OrderOutcomeUnknown("t".into())),
            AppError::GatewayTimeout(_)
        ));
        assert!(matches!(
            AppError::from(SettlementError::BookingNotFound("b".into())),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(SettlementError::from(GatewayError::Rejected {
                code: "BAD_REQUEST_ERROR".into(),
                description: "nope".into(),
            })),
            AppError::BadGateway(_)
        ));
    }
}
