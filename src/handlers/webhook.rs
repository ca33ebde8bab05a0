// src/handlers/webhook.rs

use axum::{body::Bytes, extract::State, Json};

use crate::{
    common::error::AppError,
    config::AppState,
    models::webhook::{MessageEnvelope, WebhookReply, ZapPlusWebhook},
};

#[utoipa::path(
    post,
    path = "/webhook/zapplus",
    tag = "Webhook",
    request_body(
        content = MessageEnvelope,
        description = "Evento do ZapPlus (`message`, `message.ack` ou qualquer outro, que é ignorado)"
    ),
    responses(
        (status = 200, description = "Evento aceito", body = WebhookReply),
        (status = 400, description = "Corpo inválido, telefone inválido ou sessão sem canal"),
        (status = 500, description = "Falha de persistência; o provedor pode reenviar")
    )
)]
pub async fn receive_zapplus(
    State(app_state): State<AppState>,
    body: Bytes,
) -> Result<Json<WebhookReply>, AppError> {
    let event = ZapPlusWebhook::parse(&body)?;
    let outcome = app_state.webhook_service.handle(event).await?;

    // A resposta não espera a IA; o serviço acompanha a tarefa até o desligamento
    drop(outcome.background);

    Ok(Json(outcome.reply))
}
