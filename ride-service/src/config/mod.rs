use secrecy::Secret;
use serde::Deserialize;
use service_core::config::{self as core_config, get_env, get_env_parsed, is_production};
use service_core::error::AppError;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub razorpay: RazorpayConfig,
    pub routing: RoutingConfig,
    pub observability: ObservabilityConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub mongodb: Option<MongoConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Mongo,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(format!("Invalid store backend: {}", s)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MongoConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

/// Razorpay credentials and endpoint. Injected into the gateway client at construction.
#[derive(Deserialize, Clone, Debug)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub api_base_url: String,
    pub currency: String,
    pub timeout_secs: u64,
}

impl RazorpayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Distance-matrix routing service settings.
#[derive(Deserialize, Clone, Debug)]
pub struct RoutingConfig {
    pub api_base_url: String,
    pub api_key: Secret<String>,
    pub timeout_secs: u64,
}

impl RoutingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Debug)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = is_production();

        let host = get_env("RIDE_SERVICE_HOST", Some("0.0.0.0"), is_prod)?;
        let port = get_env_parsed("RIDE_SERVICE_PORT", common.port, is_prod)?;

        let backend: StoreBackend = get_env("STORE_BACKEND", Some("mongo"), is_prod)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let mongodb = match backend {
            StoreBackend::Mongo => Some(MongoConfig {
                url: Secret::new(get_env("MONGODB_URI", None, is_prod)?),
                db_name: get_env("MONGODB_DATABASE", Some("ride_db"), is_prod)?,
            }),
            StoreBackend::Memory => {
                if is_prod {
                    return Err(AppError::ConfigError(anyhow::anyhow!(
                        "STORE_BACKEND=memory is not allowed in production"
                    )));
                }
                None
            }
        };

        let razorpay = RazorpayConfig {
            key_id: get_env("RAZORPAY_KEY_ID", Some(""), is_prod)?,
            key_secret: Secret::new(get_env("RAZORPAY_KEY_SECRET", Some(""), is_prod)?),
            api_base_url: get_env(
                "RAZORPAY_API_BASE_URL",
                Some("https://api.razorpay.com/v1"),
                is_prod,
            )?,
            currency: get_env("RAZORPAY_CURRENCY", Some("INR"), is_prod)?,
            timeout_secs: get_env_parsed("RAZORPAY_TIMEOUT_SECS", 10u64, is_prod)?,
        };

        let routing = RoutingConfig {
            api_base_url: get_env(
                "ROUTING_API_BASE_URL",
                Some("https://api.distancematrix.ai"),
                is_prod,
            )?,
            api_key: Secret::new(get_env("ROUTING_API_KEY", Some(""), is_prod)?),
            timeout_secs: get_env_parsed("ROUTING_TIMEOUT_SECS", 5u64, is_prod)?,
        };

        let observability = ObservabilityConfig {
            log_level: get_env(
                "LOG_LEVEL",
                Some(&format!("{},ride_service=debug", common.log_level)),
                false,
            )?,
            otlp_endpoint: std::env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
        };

        Ok(Self {
            server: ServerConfig { host, port },
            store: StoreConfig { backend, mongodb },
            razorpay,
            routing,
            observability,
            service_name: "ride-service".to_string(),
        })
    }
}
