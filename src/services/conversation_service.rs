// src/services/conversation_service.rs

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::stores::{ChannelStore, ConversationStore, CustomerStore},
    models::messaging::{Conversation, Customer},
};

// Quantas vezes tentamos de novo quando outro webhook vence a corrida pela conversa aberta
const RESOLVE_ATTEMPTS: usize = 3;

/// "5511999998888@c.us" -> "5511999998888".
/// Corta no '@' e mantém só os dígitos.
pub fn normalize_phone(from: &str) -> Result<String, AppError> {
    let local = from.split('@').next().unwrap_or_default();
    let phone: String = local.chars().filter(char::is_ascii_digit).collect();

    if phone.is_empty() {
        return Err(AppError::InvalidPhone(from.to_string()));
    }
    Ok(phone)
}

#[derive(Clone)]
pub struct ConversationService {
    customers: Arc<dyn CustomerStore>,
    conversations: Arc<dyn ConversationStore>,
    channels: Arc<dyn ChannelStore>,
}

impl ConversationService {
    pub fn new(
        customers: Arc<dyn CustomerStore>,
        conversations: Arc<dyn ConversationStore>,
        channels: Arc<dyn ChannelStore>,
    ) -> Self {
        Self {
            customers,
            conversations,
            channels,
        }
    }

    /// Cliente do tenant para o telefone (já normalizado). Cria com nome vazio se preciso.
    pub async fn resolve_customer(&self, tenant_id: Uuid, phone: &str) -> Result<Customer, AppError> {
        self.customers.upsert_by_phone(tenant_id, phone).await
    }

    /// Conversa ativa do cliente:
    /// 1. a aberta, se existir
    /// 2. senão, a arquivada é reaberta (não lidas voltam a zero)
    /// 3. senão, uma nova no canal whatsapp padrão do tenant
    pub async fn resolve_conversation(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
    ) -> Result<Conversation, AppError> {
        for attempt in 1..=RESOLVE_ATTEMPTS {
            if let Some(open) = self.conversations.find_open(tenant_id, customer_id).await? {
                return Ok(open);
            }

            if let Some(archived) = self.conversations.find_archived(tenant_id, customer_id).await? {
                if let Some(reopened) = self.conversations.reopen(tenant_id, archived.id).await? {
                    tracing::info!(conversation_id = %reopened.id, "📂 Conversa arquivada reaberta");
                    return Ok(reopened);
                }
            } else {
                let channel = self.channels.find_or_create_default(tenant_id).await?;
                if let Some(created) = self
                    .conversations
                    .create_open(tenant_id, customer_id, channel.id)
                    .await?
                {
                    tracing::info!(conversation_id = %created.id, "🆕 Nova conversa aberta");
                    return Ok(created);
                }
            }

            tracing::debug!(%customer_id, attempt, "Conversa aberta criada em paralelo, relendo");
        }

        // Só chega aqui se a conversa aberta sumir entre as tentativas
        self.conversations
            .find_open(tenant_id, customer_id)
            .await?
            .ok_or_else(|| {
                AppError::InternalServerError(anyhow::anyhow!(
                    "não foi possível resolver a conversa do cliente {}",
                    customer_id
                ))
            })
    }

    /// Telefone normalizado, cliente e conversa ativa de um remetente.
    pub async fn resolve(
        &self,
        tenant_id: Uuid,
        from: &str,
    ) -> Result<(String, Customer, Conversation), AppError> {
        let phone = normalize_phone(from)?;
        let customer = self.resolve_customer(tenant_id, &phone).await?;
        let conversation = self.resolve_conversation(tenant_id, customer.id).await?;
        Ok((phone, customer, conversation))
    }

    /// Estado atual da conversa (o `ai_enabled` pode ter mudado desde a resolução).
    pub async fn reload(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, AppError> {
        self.conversations.find(tenant_id, conversation_id).await
    }
}
