use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::dtos::QuoteRequest;
use crate::models::FareQuote;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

pub async fn quote_fare(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<QuoteRequest>,
) -> Result<Json<FareQuote>, AppError> {
    let quote = state
        .fares
        .quote_fare(&payload.origin, &payload.destination, &payload.rate)
        .await?;

    Ok(Json(quote))
}
