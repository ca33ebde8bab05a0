// src/services/conversation_memory.rs

use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Histórico recente por (tenant, telefone), usado como contexto da IA.
/// Vive só em memória; um restart começa do zero.
pub struct ConversationMemory {
    max_turns: usize,
    turns: Mutex<HashMap<(Uuid, String), VecDeque<ChatTurn>>>,
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns: max_turns.max(1),
            turns: Mutex::new(HashMap::new()),
        }
    }

    pub async fn history(&self, tenant_id: Uuid, phone: &str) -> Vec<ChatTurn> {
        let turns = self.turns.lock().await;
        turns
            .get(&(tenant_id, phone.to_string()))
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn append(&self, tenant_id: Uuid, phone: &str, new_turns: impl IntoIterator<Item = ChatTurn>) {
        let mut turns = self.turns.lock().await;
        let history = turns.entry((tenant_id, phone.to_string())).or_default();
        history.extend(new_turns);
        while history.len() > self.max_turns {
            history.pop_front();
        }
    }
}
