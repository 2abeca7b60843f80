//! Repository layer for data access

pub mod activities;
pub mod api_keys;
pub mod campaigns;
pub mod contacts;
pub mod deliveries;
pub mod drafts;
pub mod owners;
pub mod templates;

// Re-export concrete PostgreSQL implementations
pub use activities::DbActivityRepository;
pub use api_keys::DbApiKeyRepository;
pub use campaigns::DbCampaignRepository;
pub use contacts::DbContactRepository;
pub use deliveries::DbDeliveryRecordRepository;
pub use drafts::DbDraftRepository;
pub use owners::DbOwnerRepository;
pub use templates::DbTemplateRepository;

// Re-export repository traits
pub use activities::ActivityRepository;
pub use api_keys::ApiKeyRepository;
pub use campaigns::CampaignRepository;
pub use contacts::ContactRepository;
pub use deliveries::DeliveryRecordRepository;
pub use drafts::DraftRepository;
pub use owners::OwnerRepository;
pub use templates::TemplateRepository;

// Re-export API key types
pub use api_keys::{ApiKey, ApiKeyId, CreateApiKey};
