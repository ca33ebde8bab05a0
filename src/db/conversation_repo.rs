// src/db/conversation_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::stores::ConversationStore,
    models::messaging::Conversation,
};

#[derive(Clone)]
pub struct ConversationRepository {
    pool: PgPool,
}

impl ConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for ConversationRepository {
    async fn find(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, AppError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE id = $1 AND tenant_id = $2",
        )
        .bind(conversation_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(conversation)
    }

    async fn find_open(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
    ) -> Result<Option<Conversation>, AppError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT * FROM conversations
            WHERE tenant_id = $1 AND customer_id = $2 AND status = 'open' AND is_archived = false
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(conversation)
    }

    async fn find_archived(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
    ) -> Result<Option<Conversation>, AppError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT * FROM conversations
            WHERE tenant_id = $1 AND customer_id = $2 AND is_archived = true
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(conversation)
    }

    async fn reopen(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, AppError> {
        let result = sqlx::query_as::<_, Conversation>(
            r#"
            UPDATE conversations
            SET is_archived = false, status = 'open', unread_count = 0, updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND is_archived = true
            RETURNING *
            "#,
        )
        .bind(conversation_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(conversation) => Ok(conversation),
            // O índice parcial de "uma conversa aberta por cliente" barrou: outra já está aberta
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_open(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        channel_id: Uuid,
    ) -> Result<Option<Conversation>, AppError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations
                (tenant_id, customer_id, channel_id, status, priority,
                 is_archived, is_pinned, ai_enabled, unread_count)
            VALUES ($1, $2, $3, 'open', 'normal', false, false, true, 0)
            ON CONFLICT (tenant_id, customer_id) WHERE status = 'open' AND is_archived = false
            DO NOTHING
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(customer_id)
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(conversation)
    }

    async fn record_inbound(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        // Incremento no próprio banco: sem "lost update" entre webhooks simultâneos
        sqlx::query(
            r#"
            UPDATE conversations
            SET unread_count = unread_count + 1, last_message_at = $3, updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(conversation_id)
        .bind(tenant_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
