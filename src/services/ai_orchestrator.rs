// src/services/ai_orchestrator.rs

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    db::stores::TenantStore,
    models::tenancy::SETTING_AI_SYSTEM_PROMPT,
    services::conversation_memory::{ChatTurn, ConversationMemory},
};

const DEFAULT_SYSTEM_PROMPT: &str = "Você é o assistente virtual de atendimento de uma loja no WhatsApp. \
Responda em português do Brasil, de forma curta, educada e objetiva. \
Se não souber a resposta, diga que um atendente humano vai continuar a conversa.";

const IMAGE_PROMPT: &str = "O cliente enviou esta imagem. Descreva o que ela mostra e responda ao cliente \
de acordo com o contexto da conversa.";

const TRANSCRIPTION_MODEL: &str = "whisper-1";

#[derive(Debug, Error)]
pub enum AiError {
    #[error("falha na requisição à IA: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IA respondeu com status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("IA não retornou nenhuma resposta")]
    EmptyCompletion,

    #[error("falha ao baixar mídia: {0}")]
    MediaDownload(String),
}

/// O agente que gera as respostas. As regras de negócio da IA ficam do lado de lá.
#[async_trait]
pub trait AiOrchestrator: Send + Sync {
    async fn process_message_with_conversation(
        &self,
        tenant_id: Uuid,
        phone: &str,
        text: &str,
        conversation_id: Uuid,
    ) -> Result<String, AiError>;

    async fn process_image_message(
        &self,
        tenant_id: Uuid,
        phone: &str,
        media_url: &str,
        message_id: Uuid,
    ) -> Result<String, AiError>;

    async fn process_audio_message(
        &self,
        tenant_id: Uuid,
        phone: &str,
        media_url: &str,
        message_id: Uuid,
    ) -> Result<String, AiError>;
}

// --- Resposta da API (formato OpenAI) ---

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// Cliente para qualquer API compatível com OpenAI (`/chat/completions`, `/audio/transcriptions`).
pub struct OpenAiOrchestrator {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    memory: Arc<ConversationMemory>,
    tenants: Arc<dyn TenantStore>,
}

impl OpenAiOrchestrator {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
        memory: Arc<ConversationMemory>,
        tenants: Arc<dyn TenantStore>,
    ) -> Result<Self, AiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            memory,
            tenants,
        })
    }

    async fn system_prompt(&self, tenant_id: Uuid) -> String {
        match self.tenants.find_setting(tenant_id, SETTING_AI_SYSTEM_PROMPT).await {
            Ok(Some(setting)) => setting
                .setting_value
                .filter(|prompt| !prompt.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            Ok(None) => DEFAULT_SYSTEM_PROMPT.to_string(),
            Err(e) => {
                tracing::warn!(%tenant_id, "Falha ao ler prompt personalizado: {}", e);
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
        }
    }

    /// Monta [sistema, histórico..., mensagem atual].
    async fn build_messages(&self, tenant_id: Uuid, phone: &str, user_content: Value) -> Vec<Value> {
        let mut messages = vec![json!({ "role": "system", "content": self.system_prompt(tenant_id).await })];
        for turn in self.memory.history(tenant_id, phone).await {
            messages.push(json!({ "role": turn.role, "content": turn.content }));
        }
        messages.push(json!({ "role": "user", "content": user_content }));
        messages
    }

    async fn complete(&self, messages: Vec<Value>) -> Result<String, AiError> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "messages": messages }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::UnexpectedStatus { status: status.as_u16(), body });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or(AiError::EmptyCompletion)
    }

    async fn transcribe(&self, media_url: &str) -> Result<String, AiError> {
        let download = self
            .http
            .get(media_url)
            .send()
            .await
            .map_err(|e| AiError::MediaDownload(e.to_string()))?;
        if !download.status().is_success() {
            return Err(AiError::MediaDownload(format!("status {}", download.status())));
        }
        let audio = download.bytes().await.map_err(|e| AiError::MediaDownload(e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .text("model", TRANSCRIPTION_MODEL)
            .part("file", reqwest::multipart::Part::bytes(audio.to_vec()).file_name("audio.ogg"));

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::UnexpectedStatus { status: status.as_u16(), body });
        }

        let transcription: TranscriptionResponse = response.json().await?;
        Ok(transcription.text.trim().to_string())
    }
}

#[async_trait]
impl AiOrchestrator for OpenAiOrchestrator {
    async fn process_message_with_conversation(
        &self,
        tenant_id: Uuid,
        phone: &str,
        text: &str,
        conversation_id: Uuid,
    ) -> Result<String, AiError> {
        tracing::debug!(%tenant_id, %conversation_id, "🤖 Processando texto");
        let messages = self.build_messages(tenant_id, phone, json!(text)).await;
        let reply = self.complete(messages).await?;

        self.memory
            .append(tenant_id, phone, [ChatTurn::user(text), ChatTurn::assistant(reply.as_str())])
            .await;
        Ok(reply)
    }

    async fn process_image_message(
        &self,
        tenant_id: Uuid,
        phone: &str,
        media_url: &str,
        message_id: Uuid,
    ) -> Result<String, AiError> {
        tracing::debug!(%tenant_id, %message_id, "🤖 Processando imagem");
        let content = json!([
            { "type": "text", "text": IMAGE_PROMPT },
            { "type": "image_url", "image_url": { "url": media_url } },
        ]);
        let messages = self.build_messages(tenant_id, phone, content).await;
        let reply = self.complete(messages).await?;

        self.memory
            .append(
                tenant_id,
                phone,
                [ChatTurn::user("🖼️ [Imagem enviada]"), ChatTurn::assistant(reply.as_str())],
            )
            .await;
        Ok(reply)
    }

    async fn process_audio_message(
        &self,
        tenant_id: Uuid,
        phone: &str,
        media_url: &str,
        message_id: Uuid,
    ) -> Result<String, AiError> {
        tracing::debug!(%tenant_id, %message_id, "🤖 Transcrevendo áudio");
        let transcription = self.transcribe(media_url).await?;
        if transcription.is_empty() {
            // Áudio sem fala: nada a responder
            return Ok(String::new());
        }

        let messages = self.build_messages(tenant_id, phone, json!(transcription)).await;
        let reply = self.complete(messages).await?;

        self.memory
            .append(
                tenant_id,
                phone,
                [
                    ChatTurn::user(format!("🎙️ [Áudio transcrito]: {}", transcription)),
                    ChatTurn::assistant(reply.as_str()),
                ],
            )
            .await;
        Ok(reply)
    }
}
