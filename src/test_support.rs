// src/test_support.rs

// Dublês para os testes: armazenamento em memória (com as mesmas garantias de
// unicidade e atomicidade do Postgres), IA roteirizada e despachante que grava os envios.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::AppState,
    db::stores::{
        ChannelStore, ConversationStore, CreditStore, CustomerStore, MessageStore, TenantStore,
    },
    middleware::auth::RealtimeClaims,
    models::{
        credits::{AiCreditTransaction, AiCredits, NewCreditTransaction},
        messaging::{
            Channel, ChannelStatus, Conversation, ConversationStatus, Customer, Message,
            MessageDirection, MessageSource, MessageStatus, MessageType, NewMessage,
        },
        tenancy::{Tenant, TenantSetting},
        webhook::InboundMessage,
    },
    services::{
        ai_orchestrator::{AiError, AiOrchestrator},
        conversation_service::ConversationService,
        credit_service::CreditService,
        dispatcher::{DispatchError, MessageDispatcher},
        message_service::MessageService,
        notifier::RealtimeHub,
        tenancy_service::TenantService,
        webhook_service::WebhookService,
    },
};

pub const TEST_JWT_SECRET: &str = "segredo-de-teste";

// ---
// Armazenamento em memória
// ---

#[derive(Default)]
struct State {
    tenants: HashMap<Uuid, Tenant>,
    settings: Vec<TenantSetting>,
    channels: Vec<Channel>,
    customers: Vec<Customer>,
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    credits: HashMap<Uuid, AiCredits>,
    ledger: Vec<AiCreditTransaction>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    // Simula falha no INSERT do livro-razão (a transação inteira volta)
    pub fail_ledger_insert: AtomicBool,
    // Simula banco fora do ar ao gravar mensagens
    pub fail_message_insert: AtomicBool,
}

impl MemoryStore {
    pub fn add_tenant(&self, status: &str, cost_per_message: i32) -> Tenant {
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: "Loja Teste".into(),
            status: status.into(),
            store_phone: Some("11987654321".into()),
            cost_per_message,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.state.lock().unwrap().tenants.insert(tenant.id, tenant.clone());
        tenant
    }

    pub fn add_session_channel(&self, tenant_id: Uuid, session: &str) -> Channel {
        let channel = new_channel(tenant_id, "zapplus", Some(session));
        self.state.lock().unwrap().channels.push(channel.clone());
        channel
    }

    pub fn set_setting(&self, tenant_id: Uuid, key: &str, value: &str) {
        let mut state = self.state.lock().unwrap();
        state.settings.retain(|s| !(s.tenant_id == tenant_id && s.setting_key == key));
        state.settings.push(TenantSetting {
            id: Uuid::new_v4(),
            tenant_id,
            setting_key: key.into(),
            setting_value: Some(value.into()),
            is_active: true,
            updated_at: Utc::now(),
        });
    }

    pub fn set_credits(&self, tenant_id: Uuid, remaining: i32) {
        self.state.lock().unwrap().credits.insert(
            tenant_id,
            AiCredits {
                id: Uuid::new_v4(),
                tenant_id,
                total_credits: remaining,
                used_credits: 0,
                remaining_credits: remaining,
                updated_at: Utc::now(),
            },
        );
    }

    pub fn credits(&self, tenant_id: Uuid) -> Option<AiCredits> {
        self.state.lock().unwrap().credits.get(&tenant_id).cloned()
    }

    pub fn ledger_len(&self) -> usize {
        self.state.lock().unwrap().ledger.len()
    }

    pub fn ledger_entry(&self, index: usize) -> Option<AiCreditTransaction> {
        self.state.lock().unwrap().ledger.get(index).cloned()
    }

    pub fn add_customer_with_conversation(&self, tenant_id: Uuid, phone: &str) -> (Customer, Conversation) {
        let customer = new_customer(tenant_id, phone);
        let channel = new_channel(tenant_id, "whatsapp", None);
        let conversation = new_conversation(tenant_id, customer.id, channel.id);

        let mut state = self.state.lock().unwrap();
        state.customers.push(customer.clone());
        state.channels.push(channel);
        state.conversations.push(conversation.clone());
        (customer, conversation)
    }

    pub fn find_customer(&self, tenant_id: Uuid, phone: &str) -> Option<Customer> {
        let state = self.state.lock().unwrap();
        state
            .customers
            .iter()
            .find(|c| c.tenant_id == tenant_id && c.phone == phone)
            .cloned()
    }

    pub fn block_customer(&self, customer_id: Uuid) {
        let mut state = self.state.lock().unwrap();
        if let Some(customer) = state.customers.iter_mut().find(|c| c.id == customer_id) {
            customer.is_active = false;
        }
    }

    pub fn set_conversation_ai(&self, conversation_id: Uuid, enabled: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(conversation) = state.conversations.iter_mut().find(|c| c.id == conversation_id) {
            conversation.ai_enabled = enabled;
        }
    }

    pub fn archive(&self, conversation_id: Uuid) {
        let mut state = self.state.lock().unwrap();
        if let Some(conversation) = state.conversations.iter_mut().find(|c| c.id == conversation_id) {
            conversation.is_archived = true;
            conversation.status = ConversationStatus::Closed;
        }
    }

    pub fn record_inbound_sync(&self, tenant_id: Uuid, conversation_id: Uuid, at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        if let Some(conversation) = state
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id && c.tenant_id == tenant_id)
        {
            conversation.unread_count += 1;
            conversation.last_message_at = Some(at);
        }
    }

    pub fn conversation(&self, conversation_id: Uuid) -> Option<Conversation> {
        let state = self.state.lock().unwrap();
        state.conversations.iter().find(|c| c.id == conversation_id).cloned()
    }

    pub fn message(&self, message_id: Uuid) -> Option<Message> {
        let state = self.state.lock().unwrap();
        state.messages.iter().find(|m| m.id == message_id).cloned()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().unwrap().messages.clone()
    }

    pub fn outbound_messages(&self) -> Vec<Message> {
        self.messages()
            .into_iter()
            .filter(|m| m.direction == MessageDirection::Out)
            .collect()
    }

    pub fn channel_count(&self) -> usize {
        self.state.lock().unwrap().channels.len()
    }

    pub fn customer_count(&self) -> usize {
        self.state.lock().unwrap().customers.len()
    }

    pub fn conversation_count(&self) -> usize {
        self.state.lock().unwrap().conversations.len()
    }
}

fn new_channel(tenant_id: Uuid, channel_type: &str, session: Option<&str>) -> Channel {
    Channel {
        id: Uuid::new_v4(),
        tenant_id,
        name: session.map_or_else(|| "WhatsApp".to_string(), |s| format!("ZapPlus {}", s)),
        channel_type: channel_type.into(),
        session: session.map(str::to_string),
        status: ChannelStatus::Connected,
        is_active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn new_customer(tenant_id: Uuid, phone: &str) -> Customer {
    Customer {
        id: Uuid::new_v4(),
        tenant_id,
        phone: phone.into(),
        name: String::new(),
        is_active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn new_conversation(tenant_id: Uuid, customer_id: Uuid, channel_id: Uuid) -> Conversation {
    Conversation {
        id: Uuid::new_v4(),
        tenant_id,
        customer_id,
        channel_id,
        status: ConversationStatus::Open,
        priority: "normal".into(),
        is_archived: false,
        is_pinned: false,
        ai_enabled: true,
        unread_count: 0,
        last_message_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn is_open(conversation: &Conversation) -> bool {
    conversation.status == ConversationStatus::Open && !conversation.is_archived
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, AppError> {
        Ok(self.state.lock().unwrap().tenants.get(&tenant_id).cloned())
    }

    async fn find_setting(&self, tenant_id: Uuid, key: &str) -> Result<Option<TenantSetting>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .settings
            .iter()
            .find(|s| s.tenant_id == tenant_id && s.setting_key == key && s.is_active)
            .cloned())
    }
}

#[async_trait]
impl ChannelStore for MemoryStore {
    async fn find_by_session(&self, session: &str) -> Result<Option<Channel>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .channels
            .iter()
            .find(|c| c.session.as_deref() == Some(session))
            .cloned())
    }

    async fn create_for_session(&self, tenant_id: Uuid, session: &str) -> Result<Channel, AppError> {
        let mut state = self.state.lock().unwrap();
        if !state.tenants.contains_key(&tenant_id) {
            return Err(AppError::TenantNotFound(tenant_id));
        }
        if let Some(existing) = state.channels.iter().find(|c| c.session.as_deref() == Some(session)) {
            return Ok(existing.clone());
        }
        let channel = new_channel(tenant_id, "zapplus", Some(session));
        state.channels.push(channel.clone());
        Ok(channel)
    }

    async fn find_or_create_default(&self, tenant_id: Uuid) -> Result<Channel, AppError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state
            .channels
            .iter()
            .find(|c| c.tenant_id == tenant_id && c.channel_type == "whatsapp")
        {
            return Ok(existing.clone());
        }
        let channel = new_channel(tenant_id, "whatsapp", None);
        state.channels.push(channel.clone());
        Ok(channel)
    }
}

#[async_trait]
impl CustomerStore for MemoryStore {
    async fn upsert_by_phone(&self, tenant_id: Uuid, phone: &str) -> Result<Customer, AppError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state
            .customers
            .iter()
            .find(|c| c.tenant_id == tenant_id && c.phone == phone)
        {
            return Ok(existing.clone());
        }
        let customer = new_customer(tenant_id, phone);
        state.customers.push(customer.clone());
        Ok(customer)
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn find(&self, tenant_id: Uuid, conversation_id: Uuid) -> Result<Option<Conversation>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .conversations
            .iter()
            .find(|c| c.id == conversation_id && c.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_open(&self, tenant_id: Uuid, customer_id: Uuid) -> Result<Option<Conversation>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .conversations
            .iter()
            .find(|c| c.tenant_id == tenant_id && c.customer_id == customer_id && is_open(c))
            .cloned())
    }

    async fn find_archived(&self, tenant_id: Uuid, customer_id: Uuid) -> Result<Option<Conversation>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .conversations
            .iter()
            .filter(|c| c.tenant_id == tenant_id && c.customer_id == customer_id && c.is_archived)
            .max_by_key(|c| c.updated_at)
            .cloned())
    }

    async fn reopen(&self, tenant_id: Uuid, conversation_id: Uuid) -> Result<Option<Conversation>, AppError> {
        let mut state = self.state.lock().unwrap();
        let Some(target) = state
            .conversations
            .iter()
            .find(|c| c.id == conversation_id && c.tenant_id == tenant_id && c.is_archived)
            .cloned()
        else {
            return Ok(None);
        };

        // Mesmo efeito do índice único parcial
        let other_open = state
            .conversations
            .iter()
            .any(|c| c.id != conversation_id && c.customer_id == target.customer_id && is_open(c));
        if other_open {
            return Ok(None);
        }

        let conversation = state
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .map(|c| {
                c.is_archived = false;
                c.status = ConversationStatus::Open;
                c.unread_count = 0;
                c.updated_at = Utc::now();
                c.clone()
            });
        Ok(conversation)
    }

    async fn create_open(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        channel_id: Uuid,
    ) -> Result<Option<Conversation>, AppError> {
        let mut state = self.state.lock().unwrap();
        if state
            .conversations
            .iter()
            .any(|c| c.tenant_id == tenant_id && c.customer_id == customer_id && is_open(c))
        {
            return Ok(None);
        }
        let conversation = new_conversation(tenant_id, customer_id, channel_id);
        state.conversations.push(conversation.clone());
        Ok(Some(conversation))
    }

    async fn record_inbound(&self, tenant_id: Uuid, conversation_id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        self.record_inbound_sync(tenant_id, conversation_id, at);
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert(&self, message: NewMessage) -> Result<Message, AppError> {
        if self.fail_message_insert.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(sqlx::Error::PoolTimedOut));
        }
        let now = Utc::now();
        let stored = Message {
            id: Uuid::new_v4(),
            tenant_id: message.tenant_id,
            conversation_id: message.conversation_id,
            customer_id: message.customer_id,
            user_id: None,
            user_name: message.user_name,
            message_type: message.message_type,
            content: message.content,
            direction: message.direction,
            status: message.status.as_str().to_string(),
            source: message.source,
            external_id: message.external_id,
            media_url: message.media_url,
            media_type: message.media_type,
            filename: message.filename,
            is_read: message.is_read,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().unwrap().messages.push(stored.clone());
        Ok(stored)
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Message>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .messages
            .iter()
            .rev()
            .find(|m| m.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn compare_and_set_status(
        &self,
        message_id: Uuid,
        expected: &str,
        status: MessageStatus,
    ) -> Result<bool, AppError> {
        let mut state = self.state.lock().unwrap();
        match state.messages.iter_mut().find(|m| m.id == message_id) {
            Some(message) if message.status == expected => {
                message.status = status.as_str().to_string();
                message.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_dispatched(&self, tenant_id: Uuid, message_id: Uuid, external_id: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state
            .messages
            .iter_mut()
            .find(|m| m.id == message_id && m.tenant_id == tenant_id)
        {
            message.external_id = Some(external_id.to_string());
            message.status = MessageStatus::Sent.as_str().to_string();
        }
        Ok(())
    }

    async fn mark_failed(&self, tenant_id: Uuid, message_id: Uuid) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state
            .messages
            .iter_mut()
            .find(|m| m.id == message_id && m.tenant_id == tenant_id)
        {
            message.status = MessageStatus::Failed.as_str().to_string();
        }
        Ok(())
    }

    async fn fail_if_undispatched(&self, tenant_id: Uuid, message_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.lock().unwrap();
        match state
            .messages
            .iter_mut()
            .find(|m| m.id == message_id && m.tenant_id == tenant_id)
        {
            Some(message) if message.status == MessageStatus::Sent.as_str() && message.external_id.is_none() => {
                message.status = MessageStatus::Failed.as_str().to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl CreditStore for MemoryStore {
    async fn find_credits(&self, tenant_id: Uuid) -> Result<Option<AiCredits>, AppError> {
        Ok(self.credits(tenant_id))
    }

    async fn deduct(&self, entry: NewCreditTransaction) -> Result<bool, AppError> {
        let mut state = self.state.lock().unwrap();
        if self.fail_ledger_insert.load(Ordering::SeqCst) {
            return Err(AppError::InternalServerError(anyhow::anyhow!("falha simulada no livro-razão")));
        }

        let Some(credits) = state.credits.get_mut(&entry.tenant_id) else {
            return Ok(false);
        };
        if credits.remaining_credits < entry.amount {
            return Ok(false);
        }
        credits.remaining_credits -= entry.amount;
        credits.used_credits += entry.amount;

        state.ledger.push(AiCreditTransaction {
            id: Uuid::new_v4(),
            tenant_id: entry.tenant_id,
            user_id: entry.user_id,
            kind: entry.kind,
            amount: entry.amount,
            description: entry.description,
            created_at: Utc::now(),
        });
        Ok(true)
    }
}

// ---
// IA roteirizada
// ---

#[derive(Debug, Clone, Copy)]
pub enum AiBehavior {
    Reply(&'static str),
    Empty,
    Fail,
    Panic,
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiCall {
    Text { text: String, conversation_id: Uuid },
    Image { url: String },
    Audio { url: String },
}

pub struct ScriptedAi {
    behavior: AiBehavior,
    pub calls: Mutex<Vec<AiCall>>,
}

impl ScriptedAi {
    pub fn new(behavior: AiBehavior) -> Self {
        Self { behavior, calls: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> Vec<AiCall> {
        self.calls.lock().unwrap().clone()
    }

    async fn respond(&self, call: AiCall) -> Result<String, AiError> {
        self.calls.lock().unwrap().push(call);
        match self.behavior {
            AiBehavior::Reply(text) => Ok(text.to_string()),
            AiBehavior::Empty => Ok(String::new()),
            AiBehavior::Fail => Err(AiError::EmptyCompletion),
            AiBehavior::Panic => panic!("agente da IA explodiu"),
            AiBehavior::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl AiOrchestrator for ScriptedAi {
    async fn process_message_with_conversation(
        &self,
        _tenant_id: Uuid,
        _phone: &str,
        text: &str,
        conversation_id: Uuid,
    ) -> Result<String, AiError> {
        self.respond(AiCall::Text { text: text.into(), conversation_id }).await
    }

    async fn process_image_message(
        &self,
        _tenant_id: Uuid,
        _phone: &str,
        media_url: &str,
        _message_id: Uuid,
    ) -> Result<String, AiError> {
        self.respond(AiCall::Image { url: media_url.into() }).await
    }

    async fn process_audio_message(
        &self,
        _tenant_id: Uuid,
        _phone: &str,
        media_url: &str,
        _message_id: Uuid,
    ) -> Result<String, AiError> {
        self.respond(AiCall::Audio { url: media_url.into() }).await
    }
}

// ---
// Despachante que grava os envios
// ---

#[derive(Debug, Clone, Copy)]
pub enum DispatchBehavior {
    Accept,
    Reject,
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentText {
    pub session: String,
    pub phone: String,
    pub text: String,
}

pub struct RecordingDispatcher {
    behavior: DispatchBehavior,
    counter: AtomicUsize,
    sent: Mutex<Vec<SentText>>,
}

impl RecordingDispatcher {
    pub fn new(behavior: DispatchBehavior) -> Self {
        Self {
            behavior,
            counter: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<SentText> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageDispatcher for RecordingDispatcher {
    async fn send_text(&self, session: &str, phone: &str, text: &str) -> Result<String, DispatchError> {
        self.sent.lock().unwrap().push(SentText {
            session: session.into(),
            phone: phone.into(),
            text: text.into(),
        });
        match self.behavior {
            DispatchBehavior::Accept => {
                let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(format!("ext-{}", n))
            }
            DispatchBehavior::Reject => Err(DispatchError::UnexpectedStatus {
                status: 500,
                body: "erro".into(),
            }),
            DispatchBehavior::Hang => std::future::pending().await,
        }
    }
}

// ---
// Montagem do pipeline completo
// ---

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub hub: RealtimeHub,
    pub ai: Arc<ScriptedAi>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub service: WebhookService,
}

impl Harness {
    pub fn new(ai: AiBehavior, dispatch: DispatchBehavior) -> Self {
        Self::build(ai, dispatch, Duration::from_secs(5), true)
    }

    pub fn with_timeout(ai: AiBehavior, dispatch: DispatchBehavior, timeout: Duration) -> Self {
        Self::build(ai, dispatch, timeout, true)
    }

    pub fn without_ai() -> Self {
        Self::build(AiBehavior::Empty, DispatchBehavior::Accept, Duration::from_secs(5), false)
    }

    fn build(ai: AiBehavior, dispatch: DispatchBehavior, timeout: Duration, ai_configured: bool) -> Self {
        let store = Arc::new(MemoryStore::default());
        let hub = RealtimeHub::new(64);
        let scripted = Arc::new(ScriptedAi::new(ai));
        let dispatcher = Arc::new(RecordingDispatcher::new(dispatch));

        let service = WebhookService::new(
            TenantService::new(store.clone(), store.clone()),
            ConversationService::new(store.clone(), store.clone(), store.clone()),
            MessageService::new(store.clone(), store.clone(), Arc::new(hub.clone())),
            CreditService::new(store.clone()),
            dispatcher.clone(),
            ai_configured.then(|| scripted.clone() as Arc<dyn AiOrchestrator>),
            timeout,
        );

        Self {
            store,
            hub,
            ai: scripted,
            dispatcher,
            service,
        }
    }

    pub fn state(&self) -> AppState {
        AppState {
            jwt_secret: TEST_JWT_SECRET.to_string(),
            webhook_service: self.service.clone(),
            realtime_hub: self.hub.clone(),
        }
    }
}

/// Token do painel assinado com o segredo informado, válido por uma hora.
pub fn token_for(tenant_id: Uuid, secret: &str) -> String {
    let claims = RealtimeClaims {
        sub: Uuid::new_v4(),
        tenant_id,
        exp: (Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref())).unwrap()
}

pub fn inbound_text(session: &str, body: &str) -> InboundMessage {
    InboundMessage {
        session: session.into(),
        tenant_hint: None,
        source: MessageSource::Whatsapp,
        external_id: Some(format!("wamid-{}", Uuid::new_v4())),
        from: "5511999998888@c.us".into(),
        from_me: false,
        body: body.into(),
        message_type: MessageType::Text,
        media_url: None,
        mime_type: None,
        filename: None,
    }
}
