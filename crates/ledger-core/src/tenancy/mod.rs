pub mod scope;

pub use scope::{TenantRecord, TenantScope};
