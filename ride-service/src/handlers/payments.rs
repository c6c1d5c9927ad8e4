//! Razorpay order and checkout confirmation handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::dtos::{
    CreateOrderRequest, CreateOrderResponse, OrderStatusResponse, VerifyPaymentRequest,
    VerifyPaymentResponse,
};
use crate::services::settlement::PaymentCallback;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

/// Create a Razorpay order for a booking.
///
/// The client uses the returned `order_id` and `key_id` to open checkout.
pub async fn create_order(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), AppError> {
    tracing::info!(
        booking_id = %payload.booking_id,
        amount = %payload.amount,
        "Creating payment order"
    );

    let order = state
        .orchestrator
        .create_order(&payload.booking_id, payload.amount)
        .await?;

    let key_id = state.orchestrator.gateway().key_id();
    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse::new(order, key_id, payload.booking_id)),
    ))
}

/// Poll an order at the gateway.
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderStatusResponse>, AppError> {
    let order = state.orchestrator.get_order(&order_id).await?;
    Ok(Json(order.into()))
}

/// Verify a checkout callback and settle the payment.
///
/// A rejected settlement is a 400 with the reason; transient failures come
/// back as 5xx and the same request can be sent again.
pub async fn verify_payment(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<VerifyPaymentRequest>,
) -> Result<(StatusCode, Json<VerifyPaymentResponse>), AppError> {
    let callback = PaymentCallback::from(payload);

    tracing::info!(
        order_id = %callback.order_id,
        transaction_id = %callback.transaction_id,
        ride_id = ?callback.ride_id,
        "Verifying payment"
    );

    let result = state.orchestrator.confirm_payment(callback).await?;

    let status = if result.is_settled() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(result.into())))
}
