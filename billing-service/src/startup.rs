//! Application startup and lifecycle management.

use crate::config::BillingConfig;
use crate::handlers;
use crate::services::{get_metrics, init_metrics, BillSync, Database, LiveBillSync};
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: BillingConfig,
    pub db: Arc<Database>,
    pub bill_sync: Arc<dyn BillSync>,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": "billing-service",
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "billing-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: BillingConfig) -> Result<Self, AppError> {
        init_metrics();

        let db = Arc::new(
            Database::new(
                &config.database.url,
                config.database.max_connections,
                config.database.min_connections,
            )
            .await?,
        );
        db.run_migrations().await?;

        let bill_sync: Arc<dyn BillSync> = Arc::new(LiveBillSync::new(db.clone()));

        let state = AppState {
            config: config.clone(),
            db,
            bill_sync,
        };

        // Port 0 asks the OS for a free port, which the tests rely on.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Billing service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the application state for direct use by tests.
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .route("/admins", post(handlers::admins::create_admin))
            .route(
                "/customers",
                post(handlers::customers::create_customer).get(handlers::customers::list_customers),
            )
            .route(
                "/deliveries",
                post(handlers::deliveries::create_delivery)
                    .get(handlers::deliveries::list_deliveries),
            )
            .route(
                "/deliveries/:entry_id",
                put(handlers::deliveries::update_delivery)
                    .delete(handlers::deliveries::delete_delivery),
            )
            .route("/bills/generate", post(handlers::bills::generate_bills))
            .route("/bills", get(handlers::bills::list_bills))
            .route(
                "/bills/:bill_id",
                get(handlers::bills::get_bill).delete(handlers::bills::delete_bill),
            )
            .route(
                "/bills/:bill_id/payments",
                post(handlers::payments::record_payment),
            )
            .route(
                "/payments/:payment_id",
                delete(handlers::payments::delete_payment),
            )
            .route(
                "/bills/:bill_id/invoice",
                post(handlers::invoices::generate_invoice),
            )
            .route(
                "/invoices/:invoice_id",
                delete(handlers::invoices::delete_invoice),
            )
            .route("/payment-logs", get(handlers::logs::list_payment_logs))
            .with_state(self.state)
            .layer(middleware::from_fn(metrics_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            );

        axum::serve(self.listener, router).await
    }
}
