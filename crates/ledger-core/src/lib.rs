pub mod auth;
pub mod config;
pub mod database;
pub mod tenancy;
pub mod utils;

pub use config::Settings;
pub use database::{DbPool, Repository};
pub use tenancy::{TenantRecord, TenantScope};
pub use utils::error::DomainError;
