// src/db/stores.rs

// Contratos de persistência usados pelos serviços.
// Os repositórios Postgres implementam estes traits; os testes usam uma versão em memória.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        credits::{AiCredits, NewCreditTransaction},
        messaging::{Channel, Conversation, Customer, Message, MessageStatus, NewMessage},
        tenancy::{Tenant, TenantSetting},
    },
};

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, AppError>;

    /// Busca uma configuração ativa do tenant.
    async fn find_setting(
        &self,
        tenant_id: Uuid,
        key: &str,
    ) -> Result<Option<TenantSetting>, AppError>;
}

#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn find_by_session(&self, session: &str) -> Result<Option<Channel>, AppError>;

    /// Cria o canal da sessão ligado ao tenant, já "connected".
    /// Se outro webhook criou o mesmo canal antes, devolve o existente.
    async fn create_for_session(&self, tenant_id: Uuid, session: &str) -> Result<Channel, AppError>;

    /// Canal "whatsapp" padrão do tenant, criado se não existir.
    async fn find_or_create_default(&self, tenant_id: Uuid) -> Result<Channel, AppError>;
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    /// UPSERT por (tenant, telefone). Nunca cria duplicados.
    async fn upsert_by_phone(&self, tenant_id: Uuid, phone: &str) -> Result<Customer, AppError>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn find(&self, tenant_id: Uuid, conversation_id: Uuid)
        -> Result<Option<Conversation>, AppError>;

    /// Conversa aberta e não arquivada do cliente.
    async fn find_open(&self, tenant_id: Uuid, customer_id: Uuid)
        -> Result<Option<Conversation>, AppError>;

    async fn find_archived(&self, tenant_id: Uuid, customer_id: Uuid)
        -> Result<Option<Conversation>, AppError>;

    /// Desarquiva, reabre e zera o contador de não lidas.
    /// Retorna None se ela já foi reaberta ou se já existir outra conversa aberta para o cliente.
    async fn reopen(&self, tenant_id: Uuid, conversation_id: Uuid)
        -> Result<Option<Conversation>, AppError>;

    /// Cria a conversa aberta. Retorna None se outra conversa aberta venceu a corrida.
    async fn create_open(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        channel_id: Uuid,
    ) -> Result<Option<Conversation>, AppError>;

    /// `unread_count + 1` e `last_message_at`, atômico no banco.
    async fn record_inbound(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, message: NewMessage) -> Result<Message, AppError>;

    /// Busca global por ID externo (ACKs não trazem tenant).
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Message>, AppError>;

    /// Troca o status somente se ele ainda for `expected` (compare-and-set).
    async fn compare_and_set_status(
        &self,
        message_id: Uuid,
        expected: &str,
        status: MessageStatus,
    ) -> Result<bool, AppError>;

    async fn mark_dispatched(
        &self,
        tenant_id: Uuid,
        message_id: Uuid,
        external_id: &str,
    ) -> Result<(), AppError>;

    async fn mark_failed(&self, tenant_id: Uuid, message_id: Uuid) -> Result<(), AppError>;

    /// Marca "failed" só se a resposta ainda não foi entregue ao provedor
    /// (status "sent" e sem ID externo). Retorna se houve mudança.
    async fn fail_if_undispatched(&self, tenant_id: Uuid, message_id: Uuid) -> Result<bool, AppError>;
}

#[async_trait]
pub trait CreditStore: Send + Sync {
    async fn find_credits(&self, tenant_id: Uuid) -> Result<Option<AiCredits>, AppError>;

    /// Grava o lançamento e desconta o saldo numa única transação.
    /// Retorna false (sem efeito nenhum) se o saldo não cobre o valor.
    async fn deduct(&self, entry: NewCreditTransaction) -> Result<bool, AppError>;
}
