// src/services/webhook_service.rs

use std::{
    future::Future,
    sync::{Arc, OnceLock},
    time::Duration,
};

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        messaging::{Conversation, Customer, Message, MessageSource, MessageType},
        tenancy::Tenant,
        webhook::{InboundMessage, WebhookEvent, WebhookReply},
    },
    services::{
        ai_orchestrator::AiOrchestrator,
        conversation_service::ConversationService,
        credit_service::{unavailable_message, CreditService},
        dispatcher::MessageDispatcher,
        message_service::MessageService,
        tenancy_service::TenantService,
    },
};

/// Como terminou uma tarefa em segundo plano.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Responded { message_id: Uuid },
    // IA devolveu texto vazio
    NoReply,
    AiFailed,
    DispatchFailed { message_id: Uuid },
    // Estourou o prazo e foi cancelada
    Abandoned,
    Panicked,
    FallbackSent,
    FallbackFailed,
}

/// Resposta imediata ao provedor + a tarefa que ficou rodando (se houver).
pub struct WebhookOutcome {
    pub reply: WebhookReply,
    pub background: Option<JoinHandle<TaskOutcome>>,
}

impl WebhookOutcome {
    fn reply(reply: WebhookReply) -> Self {
        Self { reply, background: None }
    }
}

enum AiDecision {
    Skip(&'static str),
    NoCredits,
    Proceed(Arc<dyn AiOrchestrator>),
}

/// Tudo o que a tarefa da IA precisa, copiado do webhook (o request já terminou quando ela roda).
struct AiJob {
    tenant_id: Uuid,
    conversation_id: Uuid,
    customer_id: Uuid,
    phone: String,
    from: String,
    session: String,
    source: MessageSource,
    inbound: Message,
}

#[derive(Clone)]
pub struct WebhookService {
    tenants: TenantService,
    conversations: ConversationService,
    messages: MessageService,
    credits: CreditService,
    dispatcher: Arc<dyn MessageDispatcher>,
    ai: Option<Arc<dyn AiOrchestrator>>,
    ai_timeout: Duration,
    // Tarefas em segundo plano ainda vivas, esperadas no desligamento
    tasks: TaskTracker,
}

// Folga além do prazo da IA para o supervisor gravar o desfecho
const DRAIN_GRACE: Duration = Duration::from_secs(5);

impl WebhookService {
    pub fn new(
        tenants: TenantService,
        conversations: ConversationService,
        messages: MessageService,
        credits: CreditService,
        dispatcher: Arc<dyn MessageDispatcher>,
        ai: Option<Arc<dyn AiOrchestrator>>,
        ai_timeout: Duration,
    ) -> Self {
        Self {
            tenants,
            conversations,
            messages,
            credits,
            dispatcher,
            ai,
            ai_timeout,
            tasks: TaskTracker::new(),
        }
    }

    /// Espera as tarefas em segundo plano terminarem. Chamado depois que o servidor parou.
    /// Retorna false se alguma não terminou dentro do prazo.
    pub async fn drain(&self) -> bool {
        self.tasks.close();
        let pending = self.tasks.len();
        if pending > 0 {
            tracing::info!(pending, "Aguardando tarefas em segundo plano");
        }
        tokio::time::timeout(self.ai_timeout + DRAIN_GRACE, self.tasks.wait())
            .await
            .is_ok()
    }

    pub async fn handle(&self, event: WebhookEvent) -> Result<WebhookOutcome, AppError> {
        match event {
            WebhookEvent::Ack(ack) => {
                let outcome = self.messages.process_ack(&ack).await?;
                tracing::debug!(?outcome, "ACK tratado");
                Ok(WebhookOutcome::reply(WebhookReply::AckProcessed))
            }
            WebhookEvent::Message(inbound) if inbound.from_me => {
                tracing::debug!(session = %inbound.session, "Mensagem enviada por nós, ignorada");
                Ok(WebhookOutcome::reply(WebhookReply::Ignored))
            }
            WebhookEvent::Message(inbound) => self.handle_inbound(inbound).await,
            WebhookEvent::Ignored => Ok(WebhookOutcome::reply(WebhookReply::Ignored)),
        }
    }

    async fn handle_inbound(&self, inbound: InboundMessage) -> Result<WebhookOutcome, AppError> {
        let (channel, tenant) = self
            .tenants
            .resolve_channel(&inbound.session, inbound.tenant_hint)
            .await?;

        let (phone, customer, conversation) = self.conversations.resolve(tenant.id, &inbound.from).await?;

        let message = self.messages.ingest_inbound(&conversation, &customer, &inbound).await?;

        tracing::info!(
            tenant_id = %tenant.id,
            channel_id = %channel.id,
            conversation_id = %conversation.id,
            message_id = %message.id,
            "📨 Mensagem processada"
        );

        match self.ai_gate(&tenant, &customer, &conversation, &message).await {
            AiDecision::Skip(reason) => {
                tracing::info!(message_id = %message.id, reason, "IA não acionada");
                Ok(WebhookOutcome::reply(WebhookReply::MessageProcessed))
            }
            AiDecision::NoCredits => {
                let text = unavailable_message(&tenant);
                let handle = self.spawn_fallback(tenant.id, inbound.session, inbound.from, text);
                Ok(WebhookOutcome {
                    reply: WebhookReply::MessageProcessed,
                    background: Some(handle),
                })
            }
            AiDecision::Proceed(ai) => {
                let message_id = message.id;
                let job = AiJob {
                    tenant_id: tenant.id,
                    conversation_id: conversation.id,
                    customer_id: customer.id,
                    phone,
                    from: inbound.from,
                    session: inbound.session,
                    source: inbound.source,
                    inbound: message,
                };
                let handle = self.spawn_ai_task(ai, job);
                Ok(WebhookOutcome {
                    reply: WebhookReply::Processed { message_id },
                    background: Some(handle),
                })
            }
        }
    }

    /// Portões da IA, na ordem. O desconto de créditos é o último: só cobra o que vai rodar.
    async fn ai_gate(
        &self,
        tenant: &Tenant,
        customer: &Customer,
        conversation: &Conversation,
        message: &Message,
    ) -> AiDecision {
        if !message.message_type.is_ai_supported() {
            return AiDecision::Skip("tipo de mensagem não suportado");
        }
        if message.content.trim().is_empty() && !message.has_media_url() {
            return AiDecision::Skip("mensagem sem conteúdo");
        }

        if !customer.is_active {
            return AiDecision::Skip("cliente bloqueado");
        }

        // Relê a conversa: o atendente pode ter desligado a IA agora há pouco
        let current = match self.conversations.reload(tenant.id, conversation.id).await {
            Ok(Some(current)) => current,
            Ok(None) => return AiDecision::Skip("conversa não encontrada"),
            Err(e) => {
                tracing::error!(conversation_id = %conversation.id, "Falha ao reler conversa: {}", e);
                return AiDecision::Skip("falha ao reler conversa");
            }
        };
        if !current.ai_enabled {
            return AiDecision::Skip("IA desligada na conversa");
        }

        if !self.tenants.ai_globally_enabled(tenant.id).await {
            return AiDecision::Skip("IA desligada para o tenant");
        }

        if !tenant.is_active() {
            return AiDecision::Skip("tenant inativo");
        }

        let Some(ai) = self.ai.clone() else {
            return AiDecision::Skip("IA não configurada");
        };

        if !self.credits.check_and_deduct(tenant).await {
            return AiDecision::NoCredits;
        }

        AiDecision::Proceed(ai)
    }

    fn spawn_ai_task(&self, ai: Arc<dyn AiOrchestrator>, job: AiJob) -> JoinHandle<TaskOutcome> {
        let reply_slot = Arc::new(OnceLock::new());
        let service = self.clone();
        let tenant_id = job.tenant_id;
        let slot = reply_slot.clone();

        self.supervise("ia", tenant_id, reply_slot, async move {
            service.run_ai_job(ai, job, slot).await
        })
    }

    fn spawn_fallback(&self, tenant_id: Uuid, session: String, from: String, text: String) -> JoinHandle<TaskOutcome> {
        let dispatcher = self.dispatcher.clone();
        self.supervise("fallback", tenant_id, Arc::new(OnceLock::new()), async move {
            match dispatcher.send_text(&session, &from, &text).await {
                Ok(external_id) => {
                    tracing::info!(%tenant_id, %external_id, "Aviso de indisponibilidade enviado");
                    TaskOutcome::FallbackSent
                }
                Err(e) => {
                    tracing::error!(%tenant_id, "Falha ao enviar aviso de indisponibilidade: {}", e);
                    TaskOutcome::FallbackFailed
                }
            }
        })
    }

    /// Roda a tarefa isolada, com prazo. Pânico ou prazo estourado viram um resultado,
    /// e a resposta já gravada (se houver) é marcada como "failed".
    fn supervise<F>(
        &self,
        label: &'static str,
        tenant_id: Uuid,
        reply_slot: Arc<OnceLock<Uuid>>,
        job: F,
    ) -> JoinHandle<TaskOutcome>
    where
        F: Future<Output = TaskOutcome> + Send + 'static,
    {
        let messages = self.messages.clone();
        let timeout = self.ai_timeout;

        self.tasks.spawn(async move {
            let mut inner = tokio::spawn(job);

            let outcome = match tokio::time::timeout(timeout, &mut inner).await {
                Ok(Ok(outcome)) => return outcome,
                Ok(Err(join_err)) if join_err.is_panic() => {
                    let panic = join_err.into_panic();
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "pânico sem mensagem".to_string());
                    tracing::error!(%tenant_id, task = label, %reason, "🔥 Tarefa em segundo plano entrou em pânico");
                    TaskOutcome::Panicked
                }
                Ok(Err(_)) => {
                    tracing::warn!(%tenant_id, task = label, "Tarefa em segundo plano cancelada");
                    TaskOutcome::Abandoned
                }
                Err(_) => {
                    inner.abort();
                    tracing::warn!(%tenant_id, task = label, timeout_secs = timeout.as_secs(), "⏱️ Tarefa abandonada por tempo");
                    TaskOutcome::Abandoned
                }
            };

            // Só falha o que não chegou ao provedor
            if let Some(message_id) = reply_slot.get() {
                match messages.fail_if_undispatched(tenant_id, *message_id).await {
                    Ok(true) => tracing::warn!(%message_id, "Resposta da IA marcada como failed"),
                    Ok(false) => {}
                    Err(e) => tracing::error!(%message_id, "Falha ao marcar resposta como failed: {}", e),
                }
            }
            outcome
        })
    }

    async fn run_ai_job(
        &self,
        ai: Arc<dyn AiOrchestrator>,
        job: AiJob,
        reply_slot: Arc<OnceLock<Uuid>>,
    ) -> TaskOutcome {
        let inbound = &job.inbound;

        let result = match (inbound.message_type, inbound.media_url.as_deref()) {
            (MessageType::Image, Some(url)) if !url.is_empty() => {
                ai.process_image_message(job.tenant_id, &job.phone, url, inbound.id).await
            }
            (MessageType::Audio, Some(url)) if !url.is_empty() => {
                ai.process_audio_message(job.tenant_id, &job.phone, url, inbound.id).await
            }
            _ => {
                ai.process_message_with_conversation(job.tenant_id, &job.phone, &inbound.content, job.conversation_id)
                    .await
            }
        };

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(tenant_id = %job.tenant_id, message_id = %inbound.id, "❌ Erro da IA: {}", e);
                return TaskOutcome::AiFailed;
            }
        };

        if reply.trim().is_empty() {
            tracing::info!(message_id = %inbound.id, "IA sem resposta para a mensagem");
            return TaskOutcome::NoReply;
        }

        let stored = match self
            .messages
            .record_ai_reply(job.tenant_id, job.conversation_id, job.customer_id, job.source, &reply)
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                // Sem registro não enviamos: nada sai sem ficar gravado
                tracing::error!(tenant_id = %job.tenant_id, "Falha ao gravar resposta da IA: {}", e);
                return TaskOutcome::AiFailed;
            }
        };
        let _ = reply_slot.set(stored.id);
        self.messages.notify_ai_reply(&stored);

        // Chat interno: o painel já recebeu a resposta, não passa pelo ZapPlus
        if job.source == MessageSource::Chat {
            tracing::info!(message_id = %stored.id, "✅ Resposta da IA registrada no chat");
            return TaskOutcome::Responded { message_id: stored.id };
        }

        match self.dispatcher.send_text(&job.session, &job.from, &reply).await {
            Ok(external_id) => {
                if let Err(e) = self.messages.mark_dispatched(job.tenant_id, stored.id, &external_id).await {
                    tracing::error!(message_id = %stored.id, "Falha ao gravar ID externo: {}", e);
                }
                tracing::info!(message_id = %stored.id, %external_id, "✅ Resposta da IA entregue ao provedor");
                TaskOutcome::Responded { message_id: stored.id }
            }
            Err(e) => {
                tracing::error!(message_id = %stored.id, "❌ Falha ao enviar resposta da IA: {}", e);
                if let Err(e) = self.messages.mark_failed(job.tenant_id, stored.id).await {
                    tracing::error!(message_id = %stored.id, "Falha ao marcar resposta como failed: {}", e);
                }
                TaskOutcome::DispatchFailed { message_id: stored.id }
            }
        }
    }
}
