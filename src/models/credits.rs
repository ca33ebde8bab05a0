// src/models/credits.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// Saldo de créditos de IA de um tenant (um registro por tenant)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AiCredits {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub total_credits: i32,
    pub used_credits: i32,
    pub remaining_credits: i32,
    pub updated_at: DateTime<Utc>,
}

// Mapeia o CREATE TYPE credit_transaction_type do banco
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "credit_transaction_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CreditTransactionType {
    Add,
    Use,
    Refund,
}

// Livro-razão dos créditos
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AiCreditTransaction {
    pub id: Uuid,
    pub tenant_id: Uuid,
    // NULL para transações automáticas do sistema
    pub user_id: Option<Uuid>,
    #[sqlx(rename = "type")]
    pub kind: CreditTransactionType,
    pub amount: i32,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCreditTransaction {
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
    pub kind: CreditTransactionType,
    pub amount: i32,
    pub description: String,
}
