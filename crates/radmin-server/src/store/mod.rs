pub mod db;
pub mod model;
pub mod queries;
pub mod schema;
pub mod webhooks;

#[cfg(test)]
mod tests;

pub use db::{DatabaseConfig, DatabaseType, Store, StoreError};
pub use model::{
    AccountingRecord, AttributeRow, DailyUsage, ExportRow, Mutation, NewUser, Stats, UserRows,
    UserSummary, UserUpdate,
};
pub use webhooks::{
    FileRegistry, MemoryRegistry, NewWebhook, RegistryError, WebhookRepository,
    WebhookSubscription,
};
