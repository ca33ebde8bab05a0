// src/handlers.rs

pub mod health;
pub mod realtime;
pub mod webhook;

use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{config::AppState, docs::ApiDoc};

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/api/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/health", get(health::health))
        .route("/webhook/zapplus", post(webhook::receive_zapplus))
        .route("/ws", get(realtime::realtime_ws))
        .with_state(app_state)
}
