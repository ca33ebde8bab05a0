// src/models/tenancy.rs

use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Status que libera o atendimento automático.
pub const TENANT_STATUS_ACTIVE: &str = "active";

/// Chave da configuração que liga/desliga a IA para o tenant inteiro.
pub const SETTING_AI_GLOBAL_ENABLED: &str = "ai_global_enabled";

/// Prompt de sistema personalizado da IA.
pub const SETTING_AI_SYSTEM_PROMPT: &str = "ai_system_prompt_template";

// ---
// 1. Tenant (A "Loja")
// ---
// A conta principal. Todo o resto (canais, clientes, conversas, créditos) pertence a ela.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    // active, suspended, ...
    pub status: String,
    // Telefone da loja, usado na mensagem de indisponibilidade
    pub store_phone: Option<String>,
    // Custo em créditos por mensagem processada pela IA (0 = grátis)
    pub cost_per_message: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn is_active(&self) -> bool {
        self.status == TENANT_STATUS_ACTIVE
    }
}

// ---
// 2. TenantSetting (Configuração chave/valor)
// ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TenantSetting {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub setting_key: String,
    pub setting_value: Option<String>,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl TenantSetting {
    /// Interpreta a configuração como booleano. Só "true" liga.
    pub fn as_flag(&self) -> bool {
        self.setting_value.as_deref() == Some("true")
    }
}
