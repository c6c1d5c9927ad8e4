use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::dtos::CreateBookingRequest;
use crate::models::Booking;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

/// Price the trip at the vehicle's registered rate and store the booking.
pub async fn create_booking(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = state.fares.book_ride(payload.into()).await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.fares.get_booking(&id).await?;
    Ok(Json(booking))
}
