pub mod stores;
pub mod tenancy_repo;
pub use tenancy_repo::TenantRepository;
pub mod channel_repo;
pub use channel_repo::ChannelRepository;
pub mod customer_repo;
pub use customer_repo::CustomerRepository;
pub mod conversation_repo;
pub use conversation_repo::ConversationRepository;
pub mod message_repo;
pub use message_repo::MessageRepository;
pub mod credits_repo;

pub use credits_repo::CreditsRepository;
