// src/db/tenancy_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::stores::TenantStore,
    models::tenancy::{Tenant, TenantSetting},
};

#[derive(Clone)]
pub struct TenantRepository {
    pool: PgPool,
}

impl TenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantStore for TenantRepository {
    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, AppError> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tenant)
    }

    async fn find_setting(
        &self,
        tenant_id: Uuid,
        key: &str,
    ) -> Result<Option<TenantSetting>, AppError> {
        // Só configurações ativas contam
        let setting = sqlx::query_as::<_, TenantSetting>(
            r#"
            SELECT * FROM tenant_settings
            WHERE tenant_id = $1 AND setting_key = $2 AND is_active = true
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(setting)
    }
}
