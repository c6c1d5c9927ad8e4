//! Application startup and lifecycle management.

use crate::config::{Config, StoreBackend};
use crate::handlers;
use crate::services::{
    BookingStore, FareService, InMemoryBookingStore, InMemoryPaymentStore, InMemoryVehicleStore,
    MongoBookingStore, MongoPaymentStore, MongoVehicleStore, PaymentStore, RazorpayClient,
    RouteResolver, SettlementOrchestrator, VehicleStore,
};
use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{
    metrics_middleware, request_id_middleware, REQUEST_ID_HEADER,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub orchestrator: SettlementOrchestrator,
    pub fares: FareService,
    pub payments: Arc<dyn PaymentStore>,
    pub vehicles: Arc<dyn VehicleStore>,
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let Stores {
            bookings,
            payments,
            vehicles,
        } = build_stores(&config).await?;

        let razorpay = RazorpayClient::new(config.razorpay.clone())?;
        if razorpay.is_configured() {
            tracing::info!("Razorpay client initialized");
        } else {
            tracing::warn!("Razorpay credentials not configured - payment endpoints will fail");
        }

        let resolver = RouteResolver::new(config.routing.clone())?;

        let state = AppState {
            config: config.clone(),
            orchestrator: SettlementOrchestrator::new(razorpay, bookings.clone(), payments.clone()),
            fares: FareService::new(resolver, bookings, vehicles.clone()),
            payments,
            vehicles,
        };

        // Port 0 = random port for testing
        let host: std::net::IpAddr = config.server.host.parse().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "invalid host '{}': {}",
                config.server.host,
                e
            ))
        })?;
        let http_addr = SocketAddr::from((host, config.server.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", http_addr, e);
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(
            port = http_port,
            store = ?config.store.backend,
            "Ride service listening"
        );

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);
        axum::serve(self.http_listener, router).await
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/fares/quote", post(handlers::fares::quote_fare))
        .route("/bookings", post(handlers::bookings::create_booking))
        .route("/bookings/:id", get(handlers::bookings::get_booking))
        .route("/orders", post(handlers::payments::create_order))
        .route("/orders/:id", get(handlers::payments::get_order))
        .route("/payments/verify", post(handlers::payments::verify_payment))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        // MatchedPath is only available to route layers
        .route_layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

struct Stores {
    bookings: Arc<dyn BookingStore>,
    payments: Arc<dyn PaymentStore>,
    vehicles: Arc<dyn VehicleStore>,
}

async fn build_stores(config: &Config) -> Result<Stores, AppError> {
    match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory stores; data is lost on restart");
            Ok(Stores {
                bookings: Arc::new(InMemoryBookingStore::new()),
                payments: Arc::new(InMemoryPaymentStore::new()),
                vehicles: Arc::new(InMemoryVehicleStore::new()),
            })
        }
        StoreBackend::Mongo => {
            let mongo = config.store.mongodb.as_ref().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("MongoDB settings missing"))
            })?;

            let mut client_options = ClientOptions::parse(mongo.url.expose_secret())
                .await
                .map_err(|e| {
                    tracing::error!("Failed to parse MongoDB connection string: {}", e);
                    AppError::from(e)
                })?;
            client_options.app_name = Some(config.service_name.clone());

            let client = Client::with_options(client_options).map_err(|e| {
                tracing::error!("Failed to create MongoDB client: {}", e);
                AppError::from(e)
            })?;
            let db = client.database(&mongo.db_name);

            let bookings = MongoBookingStore::new(&db);
            let payments = MongoPaymentStore::new(&db);
            let vehicles = MongoVehicleStore::new(&db);

            bookings.init_indexes().await.map_err(|e| {
                tracing::error!("Failed to initialize booking indexes: {}", e);
                AppError::DatabaseError(e.into())
            })?;
            payments.init_indexes().await.map_err(|e| {
                tracing::error!("Failed to initialize payment indexes: {}", e);
                AppError::DatabaseError(e.into())
            })?;

            vehicles.init_indexes().await.map_err(|e| {
                tracing::error!("Failed to initialize vehicle indexes: {}", e);
                AppError::DatabaseError(e.into())
            })?;

            Ok(Stores {
                bookings: Arc::new(bookings),
                payments: Arc::new(payments),
                vehicles: Arc::new(vehicles),
            })
        }
    }
}
