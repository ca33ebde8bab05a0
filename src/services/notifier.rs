// src/services/notifier.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Canal de notificações em tempo real para os painéis dos tenants.
/// Envio é "fire and forget": ninguém conectado não é erro.
pub trait Notifier: Send + Sync {
    fn broadcast_to_tenant(&self, tenant_id: Uuid, event_type: &str, data: Value);

    /// Eventos vindos de webhooks vão embrulhados em "webhook_notification".
    fn broadcast_webhook_notification(&self, tenant_id: Uuid, webhook_type: &str, data: Value) {
        let wrapped = json!({
            "webhook_type": webhook_type,
            "data": data,
            "timestamp": Utc::now(),
        });
        self.broadcast_to_tenant(tenant_id, "webhook_notification", wrapped);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RealtimeEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: Uuid,
}

impl RealtimeEvent {
    pub fn new(tenant_id: Uuid, event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            timestamp: Utc::now(),
            tenant_id,
        }
    }
}

/// Hub em memória. Cada conexão WebSocket assina o broadcast e filtra pelo próprio tenant.
#[derive(Clone)]
pub struct RealtimeHub {
    sender: broadcast::Sender<RealtimeEvent>,
}

impl RealtimeHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.sender.subscribe()
    }

    pub fn connected_clients(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Notifier for RealtimeHub {
    fn broadcast_to_tenant(&self, tenant_id: Uuid, event_type: &str, data: Value) {
        let event = RealtimeEvent::new(tenant_id, event_type, data);
        if self.sender.send(event).is_err() {
            tracing::debug!(%tenant_id, event_type, "Nenhum cliente conectado, notificação descartada");
        }
    }
}
