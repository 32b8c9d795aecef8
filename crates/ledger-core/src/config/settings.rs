use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use validator::ValidateEmail;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
    #[serde(default = "default_pool_timeout")]
    pub pool_timeout_seconds: u64,
}

fn default_pool_max_size() -> u32 {
    10
}

fn default_pool_timeout() -> u64 {
    30
}

/// Credentials for the one-time AdminMaster bootstrap.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BootstrapConfig {
    pub admin_email: String,
    pub admin_password: String,
}

impl Settings {
    pub fn load() -> Result<Self> {
        // Load from environment first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Load from config file
            .add_source(File::with_name("config/settings").required(false))
            // Override with environment variables (prefix: APP)
            // Example: APP_DATABASE__URL=postgres://...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;

        settings.validate()?;

        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("database.url must not be empty");
        }

        if self.database.pool_max_size == 0 {
            anyhow::bail!("database.pool_max_size must be at least 1");
        }

        if !self.bootstrap.admin_email.validate_email() {
            anyhow::bail!(
                "bootstrap.admin_email is not a valid email address: {:?}",
                self.bootstrap.admin_email
            );
        }

        if self.bootstrap.admin_password.len() < 8 {
            anyhow::bail!("bootstrap.admin_password must be at least 8 characters");
        }

        Ok(())
    }
}
