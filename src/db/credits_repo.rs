// src/db/credits_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::stores::CreditStore,
    models::credits::{AiCredits, NewCreditTransaction},
};

#[derive(Clone)]
pub struct CreditsRepository {
    pool: PgPool,
}

impl CreditsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreditStore for CreditsRepository {
    async fn find_credits(&self, tenant_id: Uuid) -> Result<Option<AiCredits>, AppError> {
        let credits = sqlx::query_as::<_, AiCredits>("SELECT * FROM ai_credits WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(credits)
    }

    async fn deduct(&self, entry: NewCreditTransaction) -> Result<bool, AppError> {
        // --- INÍCIO DA TRANSAÇÃO ---
        let mut tx = self.pool.begin().await?;

        // 1. Lançamento no livro-razão
        sqlx::query(
            r#"
            INSERT INTO ai_credit_transactions (tenant_id, user_id, type, amount, description)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.tenant_id)
        .bind(entry.user_id)
        .bind(entry.kind)
        .bind(entry.amount)
        .bind(&entry.description)
        .execute(&mut *tx)
        .await?; // Se falhar aqui, o tx sofre rollback automático ao sair do escopo (drop)

        // 2. Desconto com guarda de saldo. O WHERE fecha a corrida entre
        //    "verificar saldo" e "descontar" de webhooks simultâneos.
        let updated = sqlx::query(
            r#"
            UPDATE ai_credits
            SET used_credits = used_credits + $2,
                remaining_credits = remaining_credits - $2,
                updated_at = NOW()
            WHERE tenant_id = $1 AND remaining_credits >= $2
            "#,
        )
        .bind(entry.tenant_id)
        .bind(entry.amount)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        // --- FIM DA TRANSAÇÃO ---
        Ok(true)
    }
}
