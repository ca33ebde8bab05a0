pub mod ai_orchestrator;
pub mod conversation_memory;
pub mod conversation_service;
pub mod credit_service;
pub mod dispatcher;
pub mod message_service;
pub mod notifier;
pub mod tenancy_service;
pub mod webhook_service;
