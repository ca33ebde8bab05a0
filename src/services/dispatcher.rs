// src/services/dispatcher.rs

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("sessão do canal não configurada")]
    SessionNotConfigured,

    #[error("falha na requisição ao ZapPlus: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ZapPlus respondeu com status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("resposta do ZapPlus ilegível: {0}")]
    Decode(String),

    #[error("resposta do ZapPlus sem ID da mensagem")]
    ExternalIdMissing,
}

/// Envio de mensagens de volta ao cliente pelo provedor.
#[async_trait]
pub trait MessageDispatcher: Send + Sync {
    /// Envia o texto e devolve o ID externo atribuído pelo provedor.
    async fn send_text(&self, session: &str, phone: &str, text: &str) -> Result<String, DispatchError>;
}

/// Endereço do chat no provedor: "5511999998888@c.us".
/// Se já vier endereçado (tem '@'), usa como está.
pub fn to_chat_id(phone: &str) -> String {
    if phone.contains('@') {
        return phone.to_string();
    }
    let digits: String = phone
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | ' ' | '-' | '+'))
        .collect();
    format!("{}@c.us", digits)
}

/// O WhatsApp usa *negrito* simples; a IA costuma devolver **negrito** de markdown.
pub fn collapse_emphasis(text: &str) -> String {
    text.replace("**", "*")
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendTextRequest<'a> {
    chat_id: String,
    text: String,
    link_preview: bool,
    link_preview_high_quality: bool,
    session: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct SendTextResponse {
    #[serde(rename = "_data", default)]
    data: Option<SentData>,
}

#[derive(Debug, Default, Deserialize)]
struct SentData {
    #[serde(default)]
    id: Option<SentDataId>,
}

#[derive(Debug, Default, Deserialize)]
struct SentDataId {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Clone)]
pub struct ZapPlusClient {
    http: reqwest::Client,
    base_url: String,
}

impl ZapPlusClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DispatchError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MessageDispatcher for ZapPlusClient {
    async fn send_text(&self, session: &str, phone: &str, text: &str) -> Result<String, DispatchError> {
        if session.is_empty() {
            return Err(DispatchError::SessionNotConfigured);
        }

        let request = SendTextRequest {
            chat_id: to_chat_id(phone),
            text: collapse_emphasis(text),
            link_preview: true,
            link_preview_high_quality: false,
            session,
        };

        let response = self
            .http
            .post(format!("{}/api/sendText", self.base_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.as_u16() != 200 && status.as_u16() != 201 {
            return Err(DispatchError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SendTextResponse =
            serde_json::from_str(&body).map_err(|e| DispatchError::Decode(e.to_string()))?;

        let external_id = parsed
            .data
            .and_then(|data| data.id)
            .and_then(|id| id.id)
            .filter(|id| !id.is_empty())
            .ok_or(DispatchError::ExternalIdMissing)?;

        tracing::info!(session, chat_id = %request.chat_id, %external_id, "📤 Mensagem enviada ao ZapPlus");
        Ok(external_id)
    }
}
