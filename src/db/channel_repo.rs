// src/db/channel_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{common::error::AppError, db::stores::ChannelStore, models::messaging::Channel};

#[derive(Clone)]
pub struct ChannelRepository {
    pool: PgPool,
}

impl ChannelRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelStore for ChannelRepository {
    async fn find_by_session(&self, session: &str) -> Result<Option<Channel>, AppError> {
        let channel = sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE session = $1")
            .bind(session)
            .fetch_optional(&self.pool)
            .await?;
        Ok(channel)
    }

    async fn create_for_session(&self, tenant_id: Uuid, session: &str) -> Result<Channel, AppError> {
        // UPSERT: dois webhooks simultâneos da mesma sessão terminam no mesmo canal.
        // O canal continua ligado ao tenant de quem chegou primeiro.
        let channel = sqlx::query_as::<_, Channel>(
            r#"
            INSERT INTO channels (tenant_id, name, type, session, status, is_active)
            VALUES ($1, $2, 'zapplus', $3, 'connected', true)
            ON CONFLICT (session) WHERE session IS NOT NULL
            DO UPDATE SET updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(format!("ZapPlus {}", session))
        .bind(session)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            // tenantId da metadata aponta para um tenant que não existe
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_foreign_key_violation() {
                    return AppError::TenantNotFound(tenant_id);
                }
            }
            e.into()
        })?;
        Ok(channel)
    }

    async fn find_or_create_default(&self, tenant_id: Uuid) -> Result<Channel, AppError> {
        let existing = sqlx::query_as::<_, Channel>(
            r#"
            SELECT * FROM channels
            WHERE tenant_id = $1 AND type = 'whatsapp'
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(channel) = existing {
            return Ok(channel);
        }

        let channel = sqlx::query_as::<_, Channel>(
            r#"
            INSERT INTO channels (tenant_id, name, type, session, status, is_active)
            VALUES ($1, 'WhatsApp', 'whatsapp', NULL, 'connected', true)
            ON CONFLICT (tenant_id) WHERE type = 'whatsapp' AND session IS NULL
            DO UPDATE SET updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(channel)
    }
}
