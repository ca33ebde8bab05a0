// src/services/tenancy_service.rs

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::stores::{ChannelStore, TenantStore},
    models::{
        messaging::Channel,
        tenancy::{Tenant, SETTING_AI_GLOBAL_ENABLED},
    },
};

/// Roteamento multi-tenant: sessão do provedor -> (canal, tenant).
#[derive(Clone)]
pub struct TenantService {
    tenants: Arc<dyn TenantStore>,
    channels: Arc<dyn ChannelStore>,
}

impl TenantService {
    pub fn new(tenants: Arc<dyn TenantStore>, channels: Arc<dyn ChannelStore>) -> Self {
        Self { tenants, channels }
    }

    /// Resolve o canal da sessão e o tenant dono dele.
    ///
    /// Sessão desconhecida com `tenantId` na metadata cria o canal na hora (já "connected").
    /// Sem `tenantId` o webhook é rejeitado com `ChannelNotFound`.
    pub async fn resolve_channel(
        &self,
        session: &str,
        tenant_hint: Option<Uuid>,
    ) -> Result<(Channel, Tenant), AppError> {
        let channel = match self.channels.find_by_session(session).await? {
            Some(channel) => channel,
            None => {
                let Some(tenant_id) = tenant_hint else {
                    tracing::warn!(session, "Canal não encontrado e metadata sem tenantId");
                    return Err(AppError::ChannelNotFound(session.to_string()));
                };

                let channel = self.channels.create_for_session(tenant_id, session).await?;
                tracing::info!(session, channel_id = %channel.id, %tenant_id, "📡 Canal criado para nova sessão");
                channel
            }
        };

        let tenant = self
            .tenants
            .find_tenant(channel.tenant_id)
            .await?
            .ok_or(AppError::TenantNotFound(channel.tenant_id))?;

        Ok((channel, tenant))
    }

    /// Chave geral da IA do tenant. Sem configuração (ou erro ao ler) vale "ligada".
    pub async fn ai_globally_enabled(&self, tenant_id: Uuid) -> bool {
        match self.tenants.find_setting(tenant_id, SETTING_AI_GLOBAL_ENABLED).await {
            Ok(Some(setting)) => setting.as_flag(),
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(%tenant_id, "Falha ao ler ai_global_enabled, assumindo ligada: {}", e);
                true
            }
        }
    }
}
