//! Bootstrap command.
//!
//! Non-interactive: connects, migrates, and ensures the system-wide
//! AdminMaster account exists. Safe to run on every deploy.

use tracing::{info, warn};

use ledger_core::config::Settings;
use ledger_core::database::{DbPool, NewUser, Repository, UserRole};
use ledger_core::utils::error::DomainError;
use ledger_core::utils::logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init_logger()?;

    info!("loading settings");
    let settings = Settings::load()?;

    info!("connecting to database");
    let pool = DbPool::new(&settings.database).await?;

    info!("applying migrations");
    pool.run_migrations().await?;

    let repository = Repository::new(pool.clone());
    ensure_bootstrap_admin(&repository, &settings).await?;

    pool.close().await;
    Ok(())
}

async fn ensure_bootstrap_admin(
    repository: &Repository,
    settings: &Settings,
) -> anyhow::Result<()> {
    let email = &settings.bootstrap.admin_email;

    if let Some(existing) = repository.find_user_by_email(email).await? {
        warn!(user = %existing.id, email = %email, "admin already exists, no action taken");
        return Ok(());
    }

    let request = NewUser {
        email: email.clone(),
        password: settings.bootstrap.admin_password.clone(),
        role: UserRole::AdminMaster,
        tenant_id: None,
        whatsapp_number: None,
    };

    match repository.create_user(None, request).await {
        Ok(user) => {
            info!(user = %user.id, email = %user.email, "bootstrap admin created");
            warn!("change the bootstrap admin password in production");
            Ok(())
        }
        // Lost a race against a concurrent bootstrap; the admin exists.
        Err(DomainError::Conflict { .. }) => {
            warn!(email = %email, "bootstrap admin already present");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
