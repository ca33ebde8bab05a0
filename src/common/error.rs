// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

// Erros que atravessam o pipeline até a resposta HTTP do webhook.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Webhook inválido: {0}")]
    InvalidWebhook(String),

    #[error("Telefone inválido: '{0}'")]
    InvalidPhone(String),

    #[error("Canal não encontrado para a sessão '{0}'")]
    ChannelNotFound(String),

    // Canal aponta para um tenant que não existe: erro de integridade
    #[error("Tenant {0} não encontrado")]
    TenantNotFound(Uuid),

    #[error("Token inválido")]
    InvalidToken,

    // Variante para erros de banco de dados
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "Um ou mais campos são inválidos.",
                    "details": details,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            AppError::InvalidWebhook(ref reason) => {
                tracing::warn!("Webhook rejeitado: {}", reason);
                (StatusCode::BAD_REQUEST, "Invalid webhook data")
            }
            AppError::InvalidPhone(_) => (StatusCode::BAD_REQUEST, "Invalid phone number"),
            AppError::ChannelNotFound(_) => (
                StatusCode::BAD_REQUEST,
                "Channel not found and no tenant ID provided",
            ),
            AppError::TenantNotFound(ref tenant_id) => {
                // Configuração quebrada: precisa aparecer nos logs
                tracing::error!(%tenant_id, "🔥 Canal aponta para tenant inexistente");
                (StatusCode::BAD_REQUEST, "Tenant not found")
            }
            AppError::InvalidToken | AppError::JwtError(_) => (
                StatusCode::UNAUTHORIZED,
                "Token de autenticação inválido ou ausente.",
            ),

            // Todos os outros erros (DatabaseError, InternalServerError) viram 500.
            ref e => {
                tracing::error!("Erro Interno do Servidor: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Ocorreu um erro inesperado.")
            }
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
