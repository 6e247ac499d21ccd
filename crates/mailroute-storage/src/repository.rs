//! Repository layer for data access

pub mod accounts;
pub mod email_logs;
pub mod link_mappings;
pub mod rules;
pub mod settings;

// Re-export concrete repository implementations with simple names
pub use accounts::DbAccountRepository as AccountRepository;
pub use email_logs::DbEmailLogRepository as EmailLogRepository;
pub use link_mappings::DbLinkMappingRepository as LinkMappingRepository;
pub use rules::DbRuleRepository as RuleRepository;
pub use settings::DbSettingsRepository as SettingsRepository;

// Re-export repository traits
pub use accounts::AccountRepository as AccountRepositoryTrait;
pub use email_logs::EmailLogRepository as EmailLogRepositoryTrait;
pub use link_mappings::LinkMappingRepository as LinkMappingRepositoryTrait;
pub use rules::RuleRepository as RuleRepositoryTrait;
pub use settings::SettingsRepository as SettingsRepositoryTrait;

pub use email_logs::LogStats;
