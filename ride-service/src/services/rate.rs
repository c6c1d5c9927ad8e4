//! Fare arithmetic.
//!
//! Pure functions over `Decimal`; no I/O. `compute_fare` is exact; amounts
//! that are charged are rounded to the currency's minor unit.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

use crate::models::VehicleRate;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FareError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// `base_fare + per_km_rate * distance_km`.
///
/// Fails when a rate parameter is absent or any input is negative.
pub fn compute_fare(
    base_fare: Option<Decimal>,
    per_km_rate: Option<Decimal>,
    distance_km: Decimal,
) -> Result<Decimal, FareError> {
    let base_fare =
        base_fare.ok_or_else(|| FareError::InvalidInput("base fare is missing".to_string()))?;
    let per_km_rate = per_km_rate
        .ok_or_else(|| FareError::InvalidInput("per-km rate is missing".to_string()))?;

    if distance_km.is_sign_negative() && !distance_km.is_zero() {
        return Err(FareError::InvalidInput(format!(
            "distance must not be negative, got {}",
            distance_km
        )));
    }
    if base_fare.is_sign_negative() && !base_fare.is_zero() {
        return Err(FareError::InvalidInput(format!(
            "base fare must not be negative, got {}",
            base_fare
        )));
    }
    if per_km_rate.is_sign_negative() && !per_km_rate.is_zero() {
        return Err(FareError::InvalidInput(format!(
            "per-km rate must not be negative, got {}",
            per_km_rate
        )));
    }

    base_fare
        .checked_add(
            per_km_rate
                .checked_mul(distance_km)
                .ok_or_else(|| FareError::InvalidInput("fare overflow".to_string()))?,
        )
        .ok_or_else(|| FareError::InvalidInput("fare overflow".to_string()))
}

impl VehicleRate {
    pub fn fare_for(&self, distance_km: Decimal) -> Result<Decimal, FareError> {
        compute_fare(self.base_fare, self.price_per_km, distance_km)
    }
}

/// Round to two decimals, half away from zero, so the amount is payable.
pub fn round_to_minor(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a major-unit amount to minor units (x100), rounding half away from zero.
pub fn to_minor_units(amount: Decimal) -> Result<u64, FareError> {
    let minor = round_to_minor(amount)
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|m| m.to_u64())
        .ok_or_else(|| FareError::InvalidInput(format!("amount {} is out of range", amount)))?;

    if minor == 0 {
        return Err(FareError::InvalidInput(format!(
            "amount must be positive, got {}",
            amount
        )));
    }

    Ok(minor)
}

/// Convert a minor-unit amount back to major units with two decimals.
pub fn from_minor_units(minor: u64) -> Decimal {
    Decimal::from(minor) / Decimal::ONE_HUNDRED
}

/// Metres from the routing service to kilometres, exactly.
pub fn meters_to_km(meters: u64) -> Decimal {
    Decimal::from(meters) / Decimal::ONE_THOUSAND
}
