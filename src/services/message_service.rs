// src/services/message_service.rs

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::stores::{ConversationStore, MessageStore},
    models::{
        messaging::{
            accepts_status_transition, Conversation, Customer, Message, MessageDirection,
            MessageSource, MessageStatus, MessageType, NewMessage,
        },
        webhook::{AckEvent, InboundMessage},
    },
    services::notifier::Notifier,
};

// Nome gravado nas respostas automáticas
pub const AI_REPLY_AUTHOR: &str = "Assistente IA";

// Tentativas de compare-and-set quando outro ACK muda o status no meio do caminho
const ACK_CAS_ATTEMPTS: usize = 3;

/// Resultado de um ACK. Todos os casos respondem "ack_processed" ao provedor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    Updated { message_id: Uuid, old_status: String, new_status: MessageStatus },
    UnknownAck,
    MissingExternalId,
    UntrackedMessage,
    // Já estava no mesmo nível ou acima
    Stale,
}

#[derive(Clone)]
pub struct MessageService {
    messages: Arc<dyn MessageStore>,
    conversations: Arc<dyn ConversationStore>,
    notifier: Arc<dyn Notifier>,
}

impl MessageService {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        conversations: Arc<dyn ConversationStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            messages,
            conversations,
            notifier,
        }
    }

    /// Grava a mensagem recebida, soma uma não lida na conversa e avisa o painel.
    pub async fn ingest_inbound(
        &self,
        conversation: &Conversation,
        customer: &Customer,
        inbound: &InboundMessage,
    ) -> Result<Message, AppError> {
        let message = self
            .messages
            .insert(NewMessage {
                tenant_id: conversation.tenant_id,
                conversation_id: conversation.id,
                customer_id: customer.id,
                user_name: None,
                message_type: inbound.message_type,
                content: inbound.body.clone(),
                direction: MessageDirection::In,
                status: MessageStatus::Received,
                source: inbound.source,
                external_id: inbound.external_id.clone(),
                media_url: inbound.media_url.clone(),
                media_type: inbound.mime_type.clone(),
                filename: inbound.filename.clone(),
                is_read: false,
            })
            .await?;

        // A mensagem já está gravada; falha no contador não derruba o webhook
        if let Err(e) = self
            .conversations
            .record_inbound(conversation.tenant_id, conversation.id, message.created_at)
            .await
        {
            tracing::error!(conversation_id = %conversation.id, "Falha ao atualizar não lidas: {}", e);
        }

        self.notifier.broadcast_webhook_notification(
            conversation.tenant_id,
            "message",
            json!({
                "type": "new_message",
                "message_id": message.id,
                "conversation_id": conversation.id,
                "customer_phone": customer.phone,
                "content": message.content,
                "from_me": inbound.from_me,
            }),
        );

        tracing::info!(message_id = %message.id, message_type = ?message.message_type, "📥 Mensagem recebida gravada");
        Ok(message)
    }

    /// Aplica um ACK de entrega. Nunca rebaixa o status dentro de sent < delivered < read.
    pub async fn process_ack(&self, ack: &AckEvent) -> Result<AckOutcome, AppError> {
        let Some(target) = ack.ack_name.as_deref().and_then(MessageStatus::from_ack_name) else {
            tracing::debug!(ack_name = ?ack.ack_name, "ACK ignorado");
            return Ok(AckOutcome::UnknownAck);
        };

        let Some(external_id) = ack.external_id.as_deref() else {
            tracing::debug!(session = %ack.session, "ACK sem ID externo");
            return Ok(AckOutcome::MissingExternalId);
        };

        for _ in 0..ACK_CAS_ATTEMPTS {
            let Some(message) = self.messages.find_by_external_id(external_id).await? else {
                tracing::debug!(external_id, "ACK de mensagem que não é nossa");
                return Ok(AckOutcome::UntrackedMessage);
            };

            if !accepts_status_transition(&message.status, target) {
                return Ok(AckOutcome::Stale);
            }

            if self
                .messages
                .compare_and_set_status(message.id, &message.status, target)
                .await?
            {
                self.notifier.broadcast_webhook_notification(
                    message.tenant_id,
                    "message_status",
                    json!({
                        "type": "message_status_update",
                        "message_id": message.id,
                        "old_status": message.status,
                        "new_status": target.as_str(),
                    }),
                );
                tracing::info!(message_id = %message.id, from = %message.status, to = target.as_str(), "✅ Status atualizado");

                return Ok(AckOutcome::Updated {
                    message_id: message.id,
                    old_status: message.status,
                    new_status: target,
                });
            }
        }

        // Perdemos todas as corridas: outros ACKs mais novos já foram aplicados
        tracing::warn!(external_id, "ACK desistiu após disputas de status");
        Ok(AckOutcome::Stale)
    }

    /// Grava a resposta da IA antes do envio (status "sent", autor "Assistente IA").
    pub async fn record_ai_reply(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
        customer_id: Uuid,
        source: MessageSource,
        content: &str,
    ) -> Result<Message, AppError> {
        self.messages
            .insert(NewMessage {
                tenant_id,
                conversation_id,
                customer_id,
                user_name: Some(AI_REPLY_AUTHOR.to_string()),
                message_type: MessageType::Text,
                content: content.to_string(),
                direction: MessageDirection::Out,
                status: MessageStatus::Sent,
                source,
                external_id: None,
                media_url: None,
                media_type: None,
                filename: None,
                is_read: true,
            })
            .await
    }

    pub async fn mark_dispatched(
        &self,
        tenant_id: Uuid,
        message_id: Uuid,
        external_id: &str,
    ) -> Result<(), AppError> {
        self.messages.mark_dispatched(tenant_id, message_id, external_id).await
    }

    pub async fn mark_failed(&self, tenant_id: Uuid, message_id: Uuid) -> Result<(), AppError> {
        self.messages.mark_failed(tenant_id, message_id).await
    }

    pub async fn fail_if_undispatched(&self, tenant_id: Uuid, message_id: Uuid) -> Result<bool, AppError> {
        self.messages.fail_if_undispatched(tenant_id, message_id).await
    }

    pub fn notify_ai_reply(&self, message: &Message) {
        self.notifier.broadcast_to_tenant(
            message.tenant_id,
            "ai_response",
            json!({
                "message_id": message.id,
                "conversation_id": message.conversation_id,
                "content": message.content,
                "status": message.status,
                "timestamp": Utc::now(),
            }),
        );
    }
}
