// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Webhook ---
        handlers::webhook::receive_zapplus,

        // --- Health ---
        handlers::health::health,
    ),
    components(
        schemas(
            // --- Webhook ---
            models::webhook::MessageEnvelope,
            models::webhook::MessagePayload,
            models::webhook::MediaInfo,
            models::webhook::WebhookReply,

            // --- Health ---
            handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "Webhook", description = "Eventos recebidos do ZapPlus"),
        (name = "Health", description = "Estado do serviço")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

// O WebSocket `/ws` usa o JWT do painel em `?token=`
impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "realtime_token",
            SecurityScheme::ApiKey(ApiKey::Query(ApiKeyValue::new("token"))),
        );
    }
}
