//! Courseware API
//!
//! Order pricing, payment orchestration and exactly-once settlement for an
//! online course marketplace.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod payments;
pub mod repositories;
pub mod services;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::ToSchema;

use crate::events::EventSender;
use crate::payments::GatewayRegistry;
use crate::services::orders::OrderService;
use crate::services::payments::{CheckoutUrls, PaymentOrchestrator};
use crate::services::settlement::SettlementExecutor;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub events: EventSender,
    pub orders: OrderService,
    pub payments: PaymentOrchestrator,
}

impl AppState {
    /// Wires the services from configuration and an open pool.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        events: EventSender,
        gateways: GatewayRegistry,
    ) -> Self {
        let settlement = Arc::new(SettlementExecutor::with_repositories(
            db.clone(),
            events.clone(),
            config.reward_points_per_unit,
        ));
        let orders = OrderService::new(
            db.clone(),
            settlement.clone(),
            events.clone(),
            config.order_expiry_hours,
        );
        let payments = PaymentOrchestrator::new(
            db.clone(),
            gateways,
            settlement,
            events.clone(),
            config.currency.clone(),
            CheckoutUrls {
                success_url: config.payments.success_url.clone(),
                cancel_url: config.payments.cancel_url.clone(),
            },
        );

        Self {
            db,
            config: Arc::new(config),
            events,
            orders,
            payments,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

// Common response wrappers
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some("Validation failed".to_string()),
            errors: Some(errors),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/orders",
            get(handlers::orders::list_orders).post(handlers::orders::place_order),
        )
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/payments/charge", post(handlers::payments::create_charge))
        .route(
            "/payments/webhook/:provider",
            post(handlers::payments::payment_webhook),
        )
}

/// Full application router with tracing, timeouts and caller identity.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .nest("/api/v1", api_v1_routes())
        .layer(middleware::from_fn(auth::trusted_user_header))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
