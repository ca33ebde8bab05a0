// src/db/customer_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{common::error::AppError, db::stores::CustomerStore, models::messaging::Customer};

#[derive(Clone)]
pub struct CustomerRepository {
    pool: PgPool,
}

impl CustomerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustomerStore for CustomerRepository {
    async fn upsert_by_phone(&self, tenant_id: Uuid, phone: &str) -> Result<Customer, AppError> {
        // Esta query é um "UPSERT".
        // O DO UPDATE é proposital: sem ele o RETURNING não devolve a linha existente.
        // O nome fica vazio; ele é pedido durante o checkout.
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (tenant_id, phone, name, is_active)
            VALUES ($1, $2, '', true)
            ON CONFLICT (tenant_id, phone)
            DO UPDATE SET phone = EXCLUDED.phone
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(phone)
        .fetch_one(&self.pool)
        .await?;
        Ok(customer)
    }
}
