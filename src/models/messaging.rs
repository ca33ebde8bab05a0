// src/models/messaging.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// --- ENUMS ---

// Mapeia o CREATE TYPE channel_status do banco
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "channel_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Disconnected,
    Connecting,
    Connected,
}

// Mapeia o CREATE TYPE conversation_status do banco
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "conversation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Open,
    Closed,
    Waiting,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "message_direction", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "message_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Audio,
    Video,
    Document,
    File,
}

impl MessageType {
    /// Classifica a mensagem recebida pelo MIME da mídia.
    /// Sem mídia (ou sem o bloco `media`) é sempre texto.
    pub fn classify(has_media: bool, mime_type: Option<&str>) -> Self {
        let Some(mime) = mime_type.filter(|_| has_media) else {
            return MessageType::Text;
        };

        if mime.starts_with("image/") {
            MessageType::Image
        } else if mime.starts_with("audio/") {
            MessageType::Audio
        } else if mime.starts_with("video/") {
            MessageType::Video
        } else if mime.contains("document") || mime.contains("application/") {
            MessageType::Document
        } else {
            MessageType::File
        }
    }

    /// Tipos que a IA sabe atender.
    pub fn is_ai_supported(self) -> bool {
        matches!(self, MessageType::Text | MessageType::Image | MessageType::Audio)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "message_source", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    Whatsapp,
    Chat,
}

// ---
// Status da mensagem
// ---
// No banco o status é TEXT livre (há registros legados com valores fora desta lista),
// por isso a struct `Message` guarda String e este enum é só a visão tipada.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Received,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Received => "received",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
            MessageStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "received" => Some(MessageStatus::Received),
            "sent" => Some(MessageStatus::Sent),
            "delivered" => Some(MessageStatus::Delivered),
            "read" => Some(MessageStatus::Read),
            "failed" => Some(MessageStatus::Failed),
            _ => None,
        }
    }

    /// Nível na hierarquia sent(1) < delivered(2) < read(3).
    /// Status fora da hierarquia retornam None.
    pub fn lattice_level(self) -> Option<u8> {
        match self {
            MessageStatus::Sent => Some(1),
            MessageStatus::Delivered => Some(2),
            MessageStatus::Read => Some(3),
            MessageStatus::Received | MessageStatus::Failed => None,
        }
    }

    /// Converte o `ackName` do provedor. Nomes desconhecidos retornam None.
    pub fn from_ack_name(ack_name: &str) -> Option<Self> {
        match ack_name {
            "SERVER" => Some(MessageStatus::Sent),
            "DEVICE" => Some(MessageStatus::Delivered),
            "READ" => Some(MessageStatus::Read),
            _ => None,
        }
    }
}

/// Regra de segurança: nunca rebaixar o status.
/// Se o status atual ou o novo estiver fora da hierarquia, a troca é livre.
pub fn accepts_status_transition(current: &str, target: MessageStatus) -> bool {
    let current_level = MessageStatus::parse(current).and_then(MessageStatus::lattice_level);

    match (current_level, target.lattice_level()) {
        (Some(current_level), Some(target_level)) => target_level > current_level,
        _ => true,
    }
}

// ---
// 1. Channel (A sessão do provedor)
// ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    // zapplus, whatsapp, webchat...
    #[sqlx(rename = "type")]
    pub channel_type: String,
    // Identificador da sessão no ZapPlus (único por provedor)
    pub session: Option<String>,
    pub status: ChannelStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---
// 2. Customer (O contato do WhatsApp)
// ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: Uuid,
    pub tenant_id: Uuid,
    // Somente dígitos
    pub phone: String,
    // Fica vazio até o checkout
    pub name: String,
    // false = bloqueado (mensagens são gravadas mas nunca vão para a IA)
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---
// 3. Conversation
// ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
    pub channel_id: Uuid,
    pub status: ConversationStatus,
    pub priority: String,
    pub is_archived: bool,
    pub is_pinned: bool,
    pub ai_enabled: bool,
    pub unread_count: i32,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---
// 4. Message (append-only)
// ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub conversation_id: Uuid,
    pub customer_id: Uuid,
    // Nulo para mensagens recebidas e respostas da IA
    pub user_id: Option<Uuid>,
    pub user_name: Option<String>,
    #[sqlx(rename = "type")]
    pub message_type: MessageType,
    pub content: String,
    pub direction: MessageDirection,
    pub status: String,
    pub source: MessageSource,
    pub external_id: Option<String>,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub filename: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn has_media_url(&self) -> bool {
        self.media_url.as_deref().is_some_and(|url| !url.is_empty())
    }
}

/// Dados para gravar uma nova mensagem.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub tenant_id: Uuid,
    pub conversation_id: Uuid,
    pub customer_id: Uuid,
    pub user_name: Option<String>,
    pub message_type: MessageType,
    pub content: String,
    pub direction: MessageDirection,
    pub status: MessageStatus,
    pub source: MessageSource,
    pub external_id: Option<String>,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub filename: Option<String>,
    pub is_read: bool,
}
