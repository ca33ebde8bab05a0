// src/models/webhook.rs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    models::messaging::{MessageSource, MessageType},
};

// ---
// 1. O formato "cru" do webhook do ZapPlus
// ---
// O campo `event` decide o formato do resto do corpo. Eventos que não nos interessam
// caem em `Other` e são descartados sem olhar o payload.
#[derive(Debug, Deserialize)]
#[serde(tag = "event")]
pub enum ZapPlusWebhook {
    #[serde(rename = "message")]
    Message(MessageEnvelope),
    #[serde(rename = "message.ack")]
    Ack(AckEnvelope),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct MessageEnvelope {
    #[validate(length(min = 1, message = "O campo 'session' é obrigatório."))]
    #[serde(default)]
    #[schema(example = "loja-centro")]
    pub session: String,

    // Mapa livre. Pode trazer `tenantId` e `source`.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Map<String, Value>>,

    pub payload: MessagePayload,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct MessagePayload {
    #[schema(example = "true_5511999998888@c.us_3EB0C767D097")]
    pub id: String,
    #[schema(example = "5511999998888@c.us")]
    pub from: String,
    pub from_me: bool,
    pub body: String,
    pub has_media: bool,
    pub media: Option<MediaInfo>,
    pub media_url: Option<String>,
}

// Serialize: o schema com `default` serializa os valores padrão dos campos
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct MediaInfo {
    pub url: Option<String>,
    pub filename: Option<String>,
    pub mimetype: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AckEnvelope {
    #[serde(default)]
    pub session: String,
    #[serde(default)]
    pub payload: AckPayload,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AckPayload {
    pub ack: Option<i64>,
    pub ack_name: Option<String>,
    #[serde(rename = "_data")]
    pub data: Option<AckData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AckData {
    pub id: Option<AckDataId>,
    pub ack_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AckDataId {
    pub id: Option<String>,
}

// ---
// 2. O evento já tipado, pronto para o pipeline
// ---

#[derive(Debug, Clone)]
pub enum WebhookEvent {
    Message(InboundMessage),
    Ack(AckEvent),
    Ignored,
}

#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub session: String,
    // `metadata.tenantId`, quando for um UUID válido
    pub tenant_hint: Option<Uuid>,
    pub source: MessageSource,
    pub external_id: Option<String>,
    // O "from" cru, ex: "5511999998888@c.us"
    pub from: String,
    pub from_me: bool,
    pub body: String,
    pub message_type: MessageType,
    pub media_url: Option<String>,
    pub mime_type: Option<String>,
    pub filename: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AckEvent {
    pub session: String,
    pub external_id: Option<String>,
    pub ack_name: Option<String>,
}

impl ZapPlusWebhook {
    /// Decodifica o corpo e converte para o evento tipado.
    /// Corpo malformado vira `InvalidWebhook` (400).
    pub fn parse(body: &[u8]) -> Result<WebhookEvent, AppError> {
        let raw: ZapPlusWebhook = serde_json::from_slice(body)
            .map_err(|e| AppError::InvalidWebhook(e.to_string()))?;
        raw.into_event()
    }

    pub fn into_event(self) -> Result<WebhookEvent, AppError> {
        match self {
            ZapPlusWebhook::Message(envelope) => {
                // Mensagens que nós mesmos enviamos não passam pelo resto da validação
                if !envelope.payload.from_me {
                    envelope.validate()?;
                }
                Ok(WebhookEvent::Message(envelope.into_inbound()))
            }
            ZapPlusWebhook::Ack(envelope) => Ok(WebhookEvent::Ack(envelope.into_ack())),
            ZapPlusWebhook::Other => Ok(WebhookEvent::Ignored),
        }
    }
}

impl MessageEnvelope {
    fn into_inbound(self) -> InboundMessage {
        let metadata = self.metadata.unwrap_or_default();

        let tenant_hint = metadata
            .get("tenantId")
            .and_then(Value::as_str)
            .and_then(|raw| Uuid::parse_str(raw).ok());

        let source = match metadata.get("source").and_then(Value::as_str) {
            Some("chat") => MessageSource::Chat,
            _ => MessageSource::Whatsapp,
        };

        let payload = self.payload;
        let media = payload.media.unwrap_or_default();
        let mime_type = non_empty(media.mimetype);

        let message_type = MessageType::classify(payload.has_media, mime_type.as_deref());

        // `mediaUrl` primeiro, depois `media.url`
        let media_url = non_empty(payload.media_url).or_else(|| non_empty(media.url));

        // Em documentos o nome do arquivo pode vir no body
        let filename = non_empty(media.filename).or_else(|| {
            (payload.has_media && !payload.body.is_empty()).then(|| payload.body.clone())
        });

        InboundMessage {
            session: self.session,
            tenant_hint,
            source,
            external_id: non_empty(Some(payload.id)),
            from: payload.from,
            from_me: payload.from_me,
            body: payload.body,
            message_type,
            media_url,
            mime_type,
            filename,
        }
    }
}

impl AckEnvelope {
    fn into_ack(self) -> AckEvent {
        let data = self.payload.data.unwrap_or_default();
        let external_id = data.id.and_then(|id| non_empty(id.id));
        let ack_name = non_empty(self.payload.ack_name).or_else(|| non_empty(data.ack_name));

        AckEvent {
            session: self.session,
            external_id,
            ack_name,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

// ---
// 3. Resposta devolvida ao provedor
// ---
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WebhookReply {
    AckProcessed,
    Ignored,
    // Mensagem gravada, IA não acionada
    MessageProcessed,
    // Mensagem gravada e tarefa de IA agendada
    Processed { message_id: Uuid },
}
