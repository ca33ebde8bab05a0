// src/db/message_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::stores::MessageStore,
    models::messaging::{Message, MessageStatus, NewMessage},
};

#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    async fn insert(&self, message: NewMessage) -> Result<Message, AppError> {
        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages
                (tenant_id, conversation_id, customer_id, user_name, type, content, direction,
                 status, source, external_id, media_url, media_type, filename, is_read)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(message.tenant_id)
        .bind(message.conversation_id)
        .bind(message.customer_id)
        .bind(message.user_name)
        .bind(message.message_type)
        .bind(message.content)
        .bind(message.direction)
        .bind(message.status.as_str())
        .bind(message.source)
        .bind(message.external_id)
        .bind(message.media_url)
        .bind(message.media_type)
        .bind(message.filename)
        .bind(message.is_read)
        .fetch_one(&self.pool)
        .await?;
        Ok(message)
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Message>, AppError> {
        let message = sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE external_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(message)
    }

    async fn compare_and_set_status(
        &self,
        message_id: Uuid,
        expected: &str,
        status: MessageStatus,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(message_id)
        .bind(expected)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_dispatched(
        &self,
        tenant_id: Uuid,
        message_id: Uuid,
        external_id: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE messages
            SET external_id = $3, status = 'sent', updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(message_id)
        .bind(tenant_id)
        .bind(external_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, tenant_id: Uuid, message_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE messages
            SET status = 'failed', updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(message_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_if_undispatched(&self, tenant_id: Uuid, message_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET status = 'failed', updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND status = 'sent' AND external_id IS NULL
            "#,
        )
        .bind(message_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
