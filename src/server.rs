use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware, Router};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::Result;
use crate::handlers::{
    admin_coupons, admin_distributions, admin_stats, get_coupon, upload_coupons, SharedState,
};
use crate::middleware::{logging_middleware, rate_limit_middleware};

/// Builds the router. The rate limiter guards only the public coupon
/// endpoint; the upload route gets a body limit matching the CSV size cap.
pub fn create_app(state: SharedState) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;

    Router::new()
        .route(
            "/api/coupon",
            get(get_coupon).route_layer(middleware::from_fn_with_state(
                state.clone(),
                rate_limit_middleware,
            )),
        )
        .route("/api/admin/stats", get(admin_stats))
        .route("/api/admin/distributions", get(admin_distributions))
        .route("/api/admin/coupons", get(admin_coupons))
        .route(
            "/api/admin/upload-coupons",
            post(upload_coupons).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

pub struct Server {
    app: Router,
    bind_address: String,
}

impl Server {
    pub fn new(state: SharedState) -> Self {
        let bind_address = state.config.bind_address.clone();
        Self {
            app: create_app(state),
            bind_address,
        }
    }

    pub async fn run(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.bind_address)
            .await
            .map_err(|err| {
                crate::error::CouponError::Config(format!(
                    "failed to bind {}: {err}",
                    self.bind_address
                ))
            })?;

        tracing::info!("Coupon dispatch server starting on {}", self.bind_address);
        tracing::info!("Coupon endpoint available at /api/coupon");
        tracing::info!("Admin endpoints available under /api/admin");

        // Run server with graceful shutdown
        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| crate::error::CouponError::Storage(format!("server error: {err}")))?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
