//! Distance-matrix routing client.
//!
//! Every upstream failure shape collapses into [`RouteError::Unavailable`] so
//! callers never depend on the provider's response format. There is no
//! automatic retry: re-quoting against a changed route must be a caller
//! decision.

use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use thiserror::Error;

use crate::config::RoutingConfig;
use crate::models::{GeoPoint, RouteLeg};
use crate::services::rate::meters_to_km;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Route unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone)]
pub struct RouteResolver {
    client: Client,
    config: RoutingConfig,
}

#[derive(Debug, Deserialize)]
struct DistanceMatrixResponse {
    status: Option<String>,
    #[serde(default)]
    rows: Vec<DistanceMatrixRow>,
}

#[derive(Debug, Deserialize)]
struct DistanceMatrixRow {
    #[serde(default)]
    elements: Vec<DistanceMatrixElement>,
}

#[derive(Debug, Deserialize)]
struct DistanceMatrixElement {
    status: Option<String>,
    distance: Option<Measure>,
    duration: Option<Measure>,
}

#[derive(Debug, Deserialize)]
struct Measure {
    text: Option<String>,
    value: f64,
}

impl RouteResolver {
    pub fn new(config: RoutingConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { client, config })
    }

    /// Resolve driving distance and duration between two points.
    pub async fn resolve(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
    ) -> Result<RouteLeg, RouteError> {
        let url = format!(
            "{}/maps/api/distancematrix/json",
            self.config.api_base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .get(&url)
            .query(&[
                ("origins", origin.as_query_value()),
                ("destinations", destination.as_query_value()),
                ("key", self.config.api_key.expose_secret().clone()),
            ])
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    "routing service timed out".to_string()
                } else {
                    format!("routing service request failed: {}", e)
                };
                tracing::warn!(error = %e, "Distance lookup failed");
                RouteError::Unavailable(reason)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            RouteError::Unavailable(format!("failed to read routing response: {}", e))
        })?;

        if !status.is_success() {
            tracing::warn!(status = %status, body = %body, "Routing service returned an error");
            return Err(RouteError::Unavailable(format!(
                "routing service responded with {}",
                status
            )));
        }

        let leg = parse_route(&body)?;

        tracing::debug!(
            distance_km = %leg.distance_km,
            duration_secs = leg.duration_secs,
            "Route resolved"
        );

        Ok(leg)
    }
}

fn parse_route(body: &str) -> Result<RouteLeg, RouteError> {
    let parsed: DistanceMatrixResponse = serde_json::from_str(body)
        .map_err(|e| RouteError::Unavailable(format!("malformed routing response: {}", e)))?;

    if let Some(status) = parsed.status.as_deref() {
        if status != "OK" {
            return Err(RouteError::Unavailable(format!(
                "routing service status {}",
                status
            )));
        }
    }

    let element = parsed
        .rows
        .first()
        .and_then(|row| row.elements.first())
        .ok_or_else(|| RouteError::Unavailable("routing response has no elements".to_string()))?;

    if let Some(status) = element.status.as_deref() {
        if status != "OK" {
            return Err(RouteError::Unavailable(format!(
                "no route between points: {}",
                status
            )));
        }
    }

    let distance = element
        .distance
        .as_ref()
        .ok_or_else(|| RouteError::Unavailable("distance missing from response".to_string()))?;

    if !distance.value.is_finite() || distance.value < 0.0 {
        return Err(RouteError::Unavailable(format!(
            "invalid distance value {}",
            distance.value
        )));
    }

    let (duration_secs, duration_text) = match element.duration.as_ref() {
        Some(d) if d.value.is_finite() && d.value >= 0.0 => (
            d.value.round() as u64,
            d.text.clone().unwrap_or_default(),
        ),
        _ => (0, String::new()),
    };

    Ok(RouteLeg {
        distance_km: meters_to_km(distance.value.round() as u64),
        duration_secs,
        duration_text,
    })
}
