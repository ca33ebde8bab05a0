// src/config.rs

use std::{env, str::FromStr, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::{
        ChannelRepository, ConversationRepository, CreditsRepository, CustomerRepository,
        MessageRepository, TenantRepository,
    },
    services::{
        ai_orchestrator::{AiOrchestrator, OpenAiOrchestrator},
        conversation_memory::ConversationMemory,
        conversation_service::ConversationService,
        credit_service::CreditService,
        dispatcher::ZapPlusClient,
        message_service::MessageService,
        notifier::RealtimeHub,
        tenancy_service::TenantService,
        webhook_service::WebhookService,
    },
};

// Eventos guardados por assinante antes de começar a descartar
const REALTIME_BUFFER: usize = 256;

/// Configuração lida do ambiente (e do `.env`, se existir).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub zapplus_base_url: String,
    pub zapplus_timeout: Duration,
    // Sem chave a IA fica desligada: mensagens são só gravadas
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub ai_task_timeout: Duration,
    pub ai_memory_max_turns: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL deve ser definida")?,
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET deve ser definido")?,
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:3000".to_string())?,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 5)?,
            zapplus_base_url: env_or("ZAPPLUS_BASE_URL", "http://localhost:3000".to_string())?,
            zapplus_timeout: Duration::from_secs(env_or("ZAPPLUS_TIMEOUT_SECS", 30)?),
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|key| !key.trim().is_empty()),
            openai_base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1".to_string())?,
            openai_model: env_or("OPENAI_MODEL", "gpt-4o-mini".to_string())?,
            ai_task_timeout: Duration::from_secs(env_or("AI_TASK_TIMEOUT_SECS", 60)?),
            ai_memory_max_turns: env_or("AI_MEMORY_MAX_TURNS", 20)?,
        })
    }

    pub async fn connect_db(&self) -> anyhow::Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(self.db_max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&self.database_url)
            .await
            .context("Falha ao conectar ao banco de dados")?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");
        Ok(pool)
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("valor inválido para {}: {}", key, e)),
        _ => Ok(default),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub jwt_secret: String,
    pub webhook_service: WebhookService,
    pub realtime_hub: RealtimeHub,
}

impl AppState {
    pub fn new(config: &Config, db_pool: PgPool) -> anyhow::Result<Self> {
        // --- Monta o gráfico de dependências ---
        let tenant_repo = Arc::new(TenantRepository::new(db_pool.clone()));
        let channel_repo = Arc::new(ChannelRepository::new(db_pool.clone()));
        let customer_repo = Arc::new(CustomerRepository::new(db_pool.clone()));
        let conversation_repo = Arc::new(ConversationRepository::new(db_pool.clone()));
        let message_repo = Arc::new(MessageRepository::new(db_pool.clone()));
        let credits_repo = Arc::new(CreditsRepository::new(db_pool));

        let realtime_hub = RealtimeHub::new(REALTIME_BUFFER);

        let dispatcher = Arc::new(
            ZapPlusClient::new(config.zapplus_base_url.clone(), config.zapplus_timeout)
                .context("Falha ao criar o cliente do ZapPlus")?,
        );

        let ai: Option<Arc<dyn AiOrchestrator>> = match &config.openai_api_key {
            Some(api_key) => {
                let memory = Arc::new(ConversationMemory::new(config.ai_memory_max_turns));
                let orchestrator = OpenAiOrchestrator::new(
                    config.openai_base_url.clone(),
                    api_key.clone(),
                    config.openai_model.clone(),
                    config.ai_task_timeout,
                    memory,
                    tenant_repo.clone(),
                )
                .context("Falha ao criar o cliente da IA")?;
                tracing::info!(model = %config.openai_model, "🤖 IA configurada");
                Some(Arc::new(orchestrator))
            }
            None => {
                tracing::warn!("OPENAI_API_KEY ausente: mensagens serão gravadas sem resposta automática");
                None
            }
        };

        let webhook_service = WebhookService::new(
            TenantService::new(tenant_repo, channel_repo.clone()),
            ConversationService::new(customer_repo, conversation_repo.clone(), channel_repo),
            MessageService::new(message_repo, conversation_repo, Arc::new(realtime_hub.clone())),
            CreditService::new(credits_repo),
            dispatcher,
            ai,
            config.ai_task_timeout,
        );

        Ok(Self {
            jwt_secret: config.jwt_secret.clone(),
            webhook_service,
            realtime_hub,
        })
    }
}
