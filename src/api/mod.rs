//! HTTP surface: deposit and withdrawal entry points plus the browser and
//! gateway callbacks that resume redirected deposits.

pub mod callbacks;
pub mod health;
pub mod payments;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::payments::deposit::DepositSession;
use crate::payments::traits::GatewayClient;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// Deposits waiting on a callback, by session id. The per-deposit mutex
/// keeps flow calls on one session strictly sequential.
pub type DepositRegistry = Arc<RwLock<HashMap<String, Arc<Mutex<DepositSession>>>>>;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayConfig>,
    pub environment: String,
    pub client: Arc<dyn GatewayClient>,
    pub deposits: DepositRegistry,
}

impl AppState {
    pub fn new(gateway: Arc<GatewayConfig>, environment: impl Into<String>, client: Arc<dyn GatewayClient>) -> Self {
        Self {
            gateway,
            environment: environment.into(),
            client,
            deposits: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn deposit(&self, session_id: &str) -> Option<Arc<Mutex<DepositSession>>> {
        self.deposits.read().await.get(session_id).cloned()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/deposits", post(payments::create_deposit))
        .route("/deposits/:session_id", get(payments::get_deposit))
        .route("/withdrawals", post(payments::create_withdrawal))
        .route(
            "/callbacks/challenge/:session_id",
            post(callbacks::challenge_result),
        )
        .route(
            "/callbacks/notification/:session_id",
            post(callbacks::payment_notification),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(session_id: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("no pending deposit {}", session_id),
        )
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status = match err {
            GatewayError::InvalidAmount { .. }
            | GatewayError::InvalidPaymentMethod { .. }
            | GatewayError::InvalidSession { .. }
            | GatewayError::Decode { .. } => StatusCode::BAD_REQUEST,
            GatewayError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
