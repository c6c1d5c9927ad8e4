use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
pub static SETTLEMENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static SETTLED_AMOUNT_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static FARE_QUOTES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Install the Prometheus recorder and register domain counters.
///
/// Safe to call more than once (tests spawn several applications per
/// process); only the first call installs anything.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = METRICS_HANDLE.set(handle);
        }
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder already installed");
        }
    }

    let registry = Registry::new();

    let settlements_counter = IntCounterVec::new(
        Opts::new(
            "ride_settlements_total",
            "Settlement attempts by outcome",
        ),
        &["outcome"],
    );

    // Amount counter in smallest currency unit
    let amount_counter = IntCounterVec::new(
        Opts::new(
            "ride_settled_amount_total",
            "Settled payment amounts by currency (in smallest unit)",
        ),
        &["currency"],
    );

    let quotes_counter = IntCounterVec::new(
        Opts::new("ride_fare_quotes_total", "Fare quotes by outcome"),
        &["outcome"],
    );

    let (Ok(settlements_counter), Ok(amount_counter), Ok(quotes_counter)) =
        (settlements_counter, amount_counter, quotes_counter)
    else {
        tracing::error!("Failed to create domain metrics");
        return;
    };

    for collector in [
        settlements_counter.clone(),
        amount_counter.clone(),
        quotes_counter.clone(),
    ] {
        if let Err(e) = registry.register(Box::new(collector)) {
            tracing::error!(error = %e, "Failed to register metric");
        }
    }

    let _ = PROMETHEUS_REGISTRY.set(registry);
    let _ = SETTLEMENTS_TOTAL.set(settlements_counter);
    let _ = SETTLED_AMOUNT_TOTAL.set(amount_counter);
    let _ = FARE_QUOTES_TOTAL.set(quotes_counter);
}

pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    // Append custom prometheus metrics
    if let Some(registry) = PROMETHEUS_REGISTRY.get() {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        if let Ok(custom_metrics) = String::from_utf8(buffer) {
            output.push_str(&custom_metrics);
        }
    }

    output
}

/// Record a settlement outcome (`settled`, `duplicate`, `rejected`, `error`).
pub fn record_settlement(outcome: &str) {
    if let Some(counter) = SETTLEMENTS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Record a newly settled amount.
pub fn record_amount(currency: &str, amount_minor: u64) {
    if let Some(counter) = SETTLED_AMOUNT_TOTAL.get() {
        counter.with_label_values(&[currency]).inc_by(amount_minor);
    }
}

pub fn record_quote(outcome: &str) {
    if let Some(counter) = FARE_QUOTES_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}
