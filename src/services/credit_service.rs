// src/services/credit_service.rs

use std::sync::Arc;

use crate::{
    db::stores::CreditStore,
    models::{
        credits::{CreditTransactionType, NewCreditTransaction},
        tenancy::Tenant,
    },
};

const AUTO_DEDUCTION_DESCRIPTION: &str = "Desconto automático por mensagem processada pela IA";

#[derive(Clone)]
pub struct CreditService {
    credits: Arc<dyn CreditStore>,
}

impl CreditService {
    pub fn new(credits: Arc<dyn CreditStore>) -> Self {
        Self { credits }
    }

    /// Verifica e desconta o custo de uma resposta da IA.
    ///
    /// - custo zero: liberado sem tocar no saldo
    /// - sem registro de créditos ou saldo insuficiente: bloqueado
    /// - qualquer erro de banco também bloqueia (nada é descontado pela metade)
    pub async fn check_and_deduct(&self, tenant: &Tenant) -> bool {
        let cost = tenant.cost_per_message;
        if cost <= 0 {
            return true;
        }

        let credits = match self.credits.find_credits(tenant.id).await {
            Ok(Some(credits)) => credits,
            Ok(None) => {
                tracing::warn!(tenant_id = %tenant.id, "Tenant sem registro de créditos de IA");
                return false;
            }
            Err(e) => {
                tracing::error!(tenant_id = %tenant.id, "Erro ao consultar créditos: {}", e);
                return false;
            }
        };

        if credits.remaining_credits < cost {
            tracing::warn!(
                tenant_id = %tenant.id,
                remaining = credits.remaining_credits,
                cost,
                "💸 Créditos insuficientes"
            );
            return false;
        }

        let entry = NewCreditTransaction {
            tenant_id: tenant.id,
            user_id: None,
            kind: CreditTransactionType::Use,
            amount: cost,
            description: AUTO_DEDUCTION_DESCRIPTION.to_string(),
        };

        match self.credits.deduct(entry).await {
            Ok(true) => {
                tracing::info!(tenant_id = %tenant.id, cost, "Créditos descontados");
                true
            }
            // Outro webhook consumiu o saldo entre a consulta e o desconto
            Ok(false) => {
                tracing::warn!(tenant_id = %tenant.id, cost, "💸 Saldo acabou durante o desconto");
                false
            }
            Err(e) => {
                tracing::error!(tenant_id = %tenant.id, "Falha ao descontar créditos: {}", e);
                false
            }
        }
    }
}

/// Texto enviado ao cliente quando a IA não pode responder por falta de créditos.
pub fn unavailable_message(tenant: &Tenant) -> String {
    let phone = format_store_phone(tenant.store_phone.as_deref().unwrap_or_default());
    format!(
        "Nosso atendimento automático está indisponível no momento, você pode tentar ligar para nossa loja no telefone {}, ou aguardar nosso atendimento humano, obrigado pela compreensão.",
        phone
    )
}

// 11 dígitos: (DD) DDDDD-DDDD | 10 dígitos: (DD) DDDD-DDDD
fn format_store_phone(phone: &str) -> String {
    let phone = phone.trim();
    if phone.is_empty() {
        return "não informado".to_string();
    }
    if !phone.chars().all(|c| c.is_ascii_digit()) {
        return phone.to_string();
    }

    match phone.len() {
        11 => format!("({}) {}-{}", &phone[..2], &phone[2..7], &phone[7..]),
        10 => format!("({}) {}-{}", &phone[..2], &phone[2..6], &phone[6..]),
        _ => phone.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryStore;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn zero_cost_bypasses_credits() {
        let store = Arc::new(MemoryStore::default());
        let tenant = store.add_tenant("active", 0);
        let service = CreditService::new(store.clone());

        // Nem precisa de registro de créditos
        assert!(service.check_and_deduct(&tenant).await);
        assert_eq!(store.ledger_len(), 0);
    }

    #[tokio::test]
    async fn deducts_and_writes_ledger() {
        let store = Arc::new(MemoryStore::default());
        let tenant = store.add_tenant("active", 2);
        store.set_credits(tenant.id, 10);
        let service = CreditService::new(store.clone());

        assert!(service.check_and_deduct(&tenant).await);

        let credits = store.credits(tenant.id).unwrap();
        assert_eq!(credits.remaining_credits, 8);
        assert_eq!(credits.used_credits, 2);
        assert_eq!(store.ledger_len(), 1);
        let entry = store.ledger_entry(0).unwrap();
        assert_eq!(entry.kind, CreditTransactionType::Use);
        assert_eq!(entry.amount, 2);
        assert!(entry.user_id.is_none());
        assert_eq!(entry.description, AUTO_DEDUCTION_DESCRIPTION);
    }

    #[tokio::test]
    async fn insufficient_or_missing_credits_block() {
        let store = Arc::new(MemoryStore::default());
        let broke = store.add_tenant("active", 5);
        store.set_credits(broke.id, 4);
        let without_record = store.add_tenant("active", 1);
        let service = CreditService::new(store.clone());

        assert!(!service.check_and_deduct(&broke).await);
        assert!(!service.check_and_deduct(&without_record).await);
        assert_eq!(store.credits(broke.id).unwrap().remaining_credits, 4);
        assert_eq!(store.ledger_len(), 0);
    }

    #[tokio::test]
    async fn ledger_failure_leaves_balance_untouched() {
        let store = Arc::new(MemoryStore::default());
        let tenant = store.add_tenant("active", 1);
        store.set_credits(tenant.id, 3);
        store.fail_ledger_insert.store(true, Ordering::SeqCst);
        let service = CreditService::new(store.clone());

        assert!(!service.check_and_deduct(&tenant).await);

        let credits = store.credits(tenant.id).unwrap();
        assert_eq!(credits.remaining_credits, 3);
        assert_eq!(credits.used_credits, 0);
        assert_eq!(store.ledger_len(), 0);
    }

    #[tokio::test]
    async fn concurrent_deductions_never_overdraw() {
        let store = Arc::new(MemoryStore::default());
        let tenant = store.add_tenant("active", 1);
        store.set_credits(tenant.id, 3);
        let service = CreditService::new(store.clone());

        let mut handles = Vec::new();
        for _ in 0..10 {
            let service = service.clone();
            let tenant = tenant.clone();
            handles.push(tokio::spawn(async move { service.check_and_deduct(&tenant).await }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 3);
        assert_eq!(store.credits(tenant.id).unwrap().remaining_credits, 0);
        assert_eq!(store.ledger_len(), 3);
    }

    #[test]
    fn formats_store_phone() {
        assert_eq!(format_store_phone("11987654321"), "(11) 98765-4321");
        assert_eq!(format_store_phone("1132165498"), "(11) 3216-5498");
        assert_eq!(format_store_phone(""), "não informado");
        assert_eq!(format_store_phone("0800 123"), "0800 123");
    }

    #[test]
    fn unavailable_message_mentions_phone() {
        let store = MemoryStore::default();
        let mut tenant = store.add_tenant("active", 1);
        tenant.store_phone = Some("11987654321".into());

        let text = unavailable_message(&tenant);
        assert!(text.contains("(11) 98765-4321"));
        assert!(text.starts_with("Nosso atendimento automático está indisponível"));

        tenant.store_phone = None;
        assert!(unavailable_message(&tenant).contains("não informado"));
    }
}
