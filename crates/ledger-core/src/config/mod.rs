pub mod settings;

pub use settings::{BootstrapConfig, DatabaseConfig, Settings};
