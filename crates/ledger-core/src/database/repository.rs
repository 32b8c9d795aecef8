use sqlx::Postgres;
use sqlx::Transaction as SqlxTransaction;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use super::models::{
    new_record_id, Category, Installment, InstallmentStatus, NewCategory, NewInstallment,
    NewSubcategory, NewTenant, NewTransaction, NewUser, Subcategory, Tenant, TenantStatus,
    TenantUpdate, Transaction, TransactionKind, User, UserRole,
};
use super::DbPool;
use crate::auth::PasswordService;
use crate::tenancy::TenantScope;
use crate::utils::cnpj::clean_cnpj;
use crate::utils::error::{map_constraint_violation, DomainError};

/// Serializes the one-time bootstrap existence check across processes.
const BOOTSTRAP_ADVISORY_LOCK_KEY: i64 = 0x4c45_4447_4552;

pub struct Repository {
    pool: DbPool,
}

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    // ==================== Tenants ====================

    /// Onboards a tenant. Administrative operation: only AdminMaster may
    /// create tenants.
    pub async fn create_tenant(
        &self,
        actor: &User,
        new_tenant: NewTenant,
    ) -> Result<Tenant, DomainError> {
        if !actor.is_master() {
            return Err(DomainError::Unauthorized(
                "tenant onboarding is restricted to ADMIN_MASTER".to_string(),
            ));
        }
        new_tenant.validate()?;

        let tenant = sqlx::query_as::<_, Tenant>(
            r#"INSERT INTO tenants
                   (id, name, cnpj, plan, billing_day_weekly, billing_day_monthly)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING *"#,
        )
        .bind(new_record_id())
        .bind(&new_tenant.name)
        .bind(clean_cnpj(&new_tenant.cnpj))
        .bind(new_tenant.plan)
        .bind(new_tenant.billing_day_weekly)
        .bind(new_tenant.billing_day_monthly)
        .fetch_one(self.pool.get_pool())
        .await
        .map_err(|e| map_constraint_violation(e, &[("tenants_cnpj_key", "cnpj")]))?;

        info!(tenant = %tenant.id, name = %tenant.name, "tenant onboarded");
        Ok(tenant)
    }

    pub async fn get_tenant(&self, actor: &User, tenant_id: Uuid) -> Result<Tenant, DomainError> {
        if !actor.is_master() && actor.tenant_id != Some(tenant_id) {
            return Err(DomainError::Unauthorized(
                "users may only read their own tenant".to_string(),
            ));
        }

        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(self.pool.get_pool())
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("tenant {tenant_id}")))
    }

    pub async fn list_tenants(&self, actor: &User) -> Result<Vec<Tenant>, DomainError> {
        if !actor.is_master() {
            return Err(DomainError::Unauthorized(
                "listing all tenants is restricted to ADMIN_MASTER".to_string(),
            ));
        }

        let tenants = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants ORDER BY name")
            .fetch_all(self.pool.get_pool())
            .await?;
        Ok(tenants)
    }

    pub async fn update_tenant(
        &self,
        actor: &User,
        tenant_id: Uuid,
        update: TenantUpdate,
    ) -> Result<Tenant, DomainError> {
        if !actor.is_master() {
            return Err(DomainError::Unauthorized(
                "tenant updates are restricted to ADMIN_MASTER".to_string(),
            ));
        }
        update.validate()?;

        sqlx::query_as::<_, Tenant>(
            r#"UPDATE tenants
               SET name = COALESCE($2, name),
                   plan = COALESCE($3, plan),
                   status = COALESCE($4, status),
                   billing_day_weekly = COALESCE($5, billing_day_weekly),
                   billing_day_monthly = COALESCE($6, billing_day_monthly),
                   updated_at = now()
               WHERE id = $1
               RETURNING *"#,
        )
        .bind(tenant_id)
        .bind(update.name)
        .bind(update.plan)
        .bind(update.status)
        .bind(update.billing_day_weekly)
        .bind(update.billing_day_monthly)
        .fetch_optional(self.pool.get_pool())
        .await?
        .ok_or_else(|| DomainError::NotFound(format!("tenant {tenant_id}")))
    }

    /// Soft-deactivates a tenant. Rows are never hard-deleted so the
    /// referential history of its records survives.
    pub async fn deactivate_tenant(
        &self,
        actor: &User,
        tenant_id: Uuid,
    ) -> Result<Tenant, DomainError> {
        if !actor.is_master() {
            return Err(DomainError::Unauthorized(
                "tenant deactivation is restricted to ADMIN_MASTER".to_string(),
            ));
        }

        let tenant = sqlx::query_as::<_, Tenant>(
            r#"UPDATE tenants
               SET status = $2, updated_at = now()
               WHERE id = $1
               RETURNING *"#,
        )
        .bind(tenant_id)
        .bind(TenantStatus::Inactive)
        .fetch_optional(self.pool.get_pool())
        .await?
        .ok_or_else(|| DomainError::NotFound(format!("tenant {tenant_id}")))?;

        info!(tenant = %tenant.id, "tenant deactivated");
        Ok(tenant)
    }

    // ==================== Users ====================

    /// Creates a user inside one atomic transaction.
    ///
    /// The first user ever created in an empty system is promoted to
    /// AdminMaster with no tenant, whatever was requested. The check runs
    /// under an advisory lock, so two concurrent bootstrap attempts
    /// serialize and the loser receives a conflict.
    ///
    /// After bootstrap:
    /// - an unauthenticated request is always a conflict, whatever it asks
    ///   for (unauthenticated creation only exists as the bootstrap);
    /// - a tenant-less AdminMaster account requires an AdminMaster actor;
    /// - any other role must name exactly one tenant;
    /// - a Manager may only create non-admin users inside its own tenant.
    pub async fn create_user(
        &self,
        actor: Option<&User>,
        new_user: NewUser,
    ) -> Result<User, DomainError> {
        new_user.validate()?;

        let email = new_user.email.trim().to_lowercase();
        let password_hash = PasswordService::hash(&new_user.password)?;

        let mut tx = self.pool.get_pool().begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(BOOTSTRAP_ADVISORY_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let populated: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users)")
            .fetch_one(&mut *tx)
            .await?;

        let (role, tenant_id) = if !populated {
            info!(email = %email, "empty system: promoting first user to ADMIN_MASTER");
            (UserRole::AdminMaster, None)
        } else {
            self.resolve_user_creation(&mut tx, actor, &new_user).await?
        };

        let user = sqlx::query_as::<_, User>(
            r#"INSERT INTO users
                   (id, email, password_hash, role, tenant_id, whatsapp_number)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING *"#,
        )
        .bind(new_record_id())
        .bind(&email)
        .bind(&password_hash)
        .bind(role)
        .bind(tenant_id)
        .bind(&new_user.whatsapp_number)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            map_constraint_violation(
                e,
                &[
                    ("users_email_key", "email"),
                    ("users_whatsapp_number_key", "whatsapp_number"),
                ],
            )
        })?;

        tx.commit().await?;

        debug!(user = %user.id, role = ?user.role, "user created");
        Ok(user)
    }

    /// Role/tenant resolution for the post-bootstrap paths of
    /// [`Repository::create_user`]. Runs inside the caller's transaction.
    async fn resolve_user_creation(
        &self,
        tx: &mut SqlxTransaction<'_, Postgres>,
        actor: Option<&User>,
        new_user: &NewUser,
    ) -> Result<(UserRole, Option<Uuid>), DomainError> {
        // On a populated system an unauthenticated request can only be a
        // bootstrap attempt that lost the race, whatever role it asked for.
        let actor = match actor {
            Some(a) => a,
            None => {
                return Err(DomainError::conflict(
                    "role",
                    "bootstrap administrator already exists",
                ));
            }
        };

        let (role, tenant_id) = match (new_user.role, new_user.tenant_id) {
            (UserRole::AdminMaster, Some(_)) => {
                return Err(DomainError::validation(
                    "tenant_id",
                    "ADMIN_MASTER accounts cannot belong to a tenant",
                ));
            }
            (UserRole::AdminMaster, None) => {
                if !actor.is_master() {
                    return Err(DomainError::Unauthorized(
                        "only an ADMIN_MASTER can create tenant-less administrator accounts"
                            .to_string(),
                    ));
                }
                (UserRole::AdminMaster, None)
            }
            (_, None) => {
                return Err(DomainError::validation(
                    "tenant_id",
                    "non-administrator users must belong to a tenant",
                ));
            }
            (role, Some(tenant_id)) => {
                match actor.role {
                    UserRole::AdminMaster => {}
                    UserRole::Manager => {
                        if actor.tenant_id != Some(tenant_id) {
                            return Err(DomainError::Unauthorized(
                                "managers may only create users inside their own tenant"
                                    .to_string(),
                            ));
                        }
                    }
                    UserRole::Operator => {
                        return Err(DomainError::Unauthorized(
                            "operators cannot create users".to_string(),
                        ));
                    }
                }
                (role, Some(tenant_id))
            }
        };

        if let Some(tenant_id) = tenant_id {
            let status: Option<TenantStatus> =
                sqlx::query_scalar("SELECT status FROM tenants WHERE id = $1")
                    .bind(tenant_id)
                    .fetch_optional(&mut **tx)
                    .await?;
            match status {
                None => {
                    return Err(DomainError::validation(
                        "tenant_id",
                        "tenant does not exist",
                    ));
                }
                Some(TenantStatus::Inactive) => {
                    return Err(DomainError::validation(
                        "tenant_id",
                        "tenant is deactivated",
                    ));
                }
                Some(TenantStatus::Active) => {}
            }
        }

        Ok((role, tenant_id))
    }

    /// Identity-layer lookup used by authentication and the bootstrap
    /// binary; email is the login key, so this runs before any tenant
    /// scope exists.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DomainError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email.trim().to_lowercase())
            .fetch_optional(self.pool.get_pool())
            .await?;
        Ok(user)
    }

    pub async fn list_users(&self, scope: &TenantScope) -> Result<Vec<User>, DomainError> {
        let users = match scope {
            TenantScope::Tenant(tenant_id) => {
                sqlx::query_as::<_, User>(
                    "SELECT * FROM users WHERE tenant_id = $1 ORDER BY email",
                )
                .bind(tenant_id)
                .fetch_all(self.pool.get_pool())
                .await?
            }
            TenantScope::CrossTenant { .. } => {
                sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY email")
                    .fetch_all(self.pool.get_pool())
                    .await?
            }
        };
        Ok(users)
    }

    // ==================== Categories ====================

    pub async fn create_category(
        &self,
        scope: &TenantScope,
        new_category: NewCategory,
    ) -> Result<Category, DomainError> {
        let tenant_id = scope.require_tenant()?;
        new_category.validate()?;

        let category = sqlx::query_as::<_, Category>(
            r#"INSERT INTO categories (id, tenant_id, name, kind)
               VALUES ($1, $2, $3, $4)
               RETURNING *"#,
        )
        .bind(new_record_id())
        .bind(tenant_id)
        .bind(&new_category.name)
        .bind(new_category.kind)
        .fetch_one(self.pool.get_pool())
        .await
        .map_err(|e| map_constraint_violation(e, &[("categories_tenant_id_name_key", "name")]))?;

        Ok(category)
    }

    pub async fn get_category(
        &self,
        scope: &TenantScope,
        category_id: Uuid,
    ) -> Result<Category, DomainError> {
        let category = match scope {
            TenantScope::Tenant(tenant_id) => {
                sqlx::query_as::<_, Category>(
                    "SELECT * FROM categories WHERE id = $1 AND tenant_id = $2",
                )
                .bind(category_id)
                .bind(tenant_id)
                .fetch_optional(self.pool.get_pool())
                .await?
            }
            TenantScope::CrossTenant { .. } => {
                sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1")
                    .bind(category_id)
                    .fetch_optional(self.pool.get_pool())
                    .await?
            }
        };

        category.ok_or_else(|| DomainError::NotFound(format!("category {category_id}")))
    }

    pub async fn list_categories(
        &self,
        scope: &TenantScope,
    ) -> Result<Vec<Category>, DomainError> {
        let categories = match scope {
            TenantScope::Tenant(tenant_id) => {
                sqlx::query_as::<_, Category>(
                    "SELECT * FROM categories WHERE tenant_id = $1 ORDER BY kind, name",
                )
                .bind(tenant_id)
                .fetch_all(self.pool.get_pool())
                .await?
            }
            TenantScope::CrossTenant { .. } => {
                sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY kind, name")
                    .fetch_all(self.pool.get_pool())
                    .await?
            }
        };
        Ok(categories)
    }

    pub async fn delete_category(
        &self,
        scope: &TenantScope,
        category_id: Uuid,
    ) -> Result<(), DomainError> {
        let tenant_id = scope.require_tenant()?;

        let result = sqlx::query("DELETE FROM categories WHERE id = $1 AND tenant_id = $2")
            .bind(category_id)
            .bind(tenant_id)
            .execute(self.pool.get_pool())
            .await
            .map_err(|e| map_constraint_violation(e, &[]))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("category {category_id}")));
        }
        Ok(())
    }

    // ==================== Subcategories ====================

    pub async fn create_subcategory(
        &self,
        scope: &TenantScope,
        new_subcategory: NewSubcategory,
    ) -> Result<Subcategory, DomainError> {
        let tenant_id = scope.require_tenant()?;
        new_subcategory.validate()?;

        let mut tx = self.pool.get_pool().begin().await?;

        let owned: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM categories WHERE id = $1 AND tenant_id = $2)",
        )
        .bind(new_subcategory.category_id)
        .bind(tenant_id)
        .fetch_one(&mut *tx)
        .await?;
        if !owned {
            return Err(DomainError::validation(
                "category_id",
                "category not found for this tenant",
            ));
        }

        let subcategory = sqlx::query_as::<_, Subcategory>(
            r#"INSERT INTO subcategories (id, tenant_id, category_id, name)
               VALUES ($1, $2, $3, $4)
               RETURNING *"#,
        )
        .bind(new_record_id())
        .bind(tenant_id)
        .bind(new_subcategory.category_id)
        .bind(&new_subcategory.name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            map_constraint_violation(e, &[("subcategories_tenant_id_category_id_name_key", "name")])
        })?;

        tx.commit().await?;
        Ok(subcategory)
    }

    pub async fn list_subcategories(
        &self,
        scope: &TenantScope,
        category_id: Uuid,
    ) -> Result<Vec<Subcategory>, DomainError> {
        let subcategories = match scope {
            TenantScope::Tenant(tenant_id) => {
                sqlx::query_as::<_, Subcategory>(
                    r#"SELECT * FROM subcategories
                       WHERE category_id = $1 AND tenant_id = $2
                       ORDER BY name"#,
                )
                .bind(category_id)
                .bind(tenant_id)
                .fetch_all(self.pool.get_pool())
                .await?
            }
            TenantScope::CrossTenant { .. } => {
                sqlx::query_as::<_, Subcategory>(
                    "SELECT * FROM subcategories WHERE category_id = $1 ORDER BY name",
                )
                .bind(category_id)
                .fetch_all(self.pool.get_pool())
                .await?
            }
        };
        Ok(subcategories)
    }

    pub async fn delete_subcategory(
        &self,
        scope: &TenantScope,
        subcategory_id: Uuid,
    ) -> Result<(), DomainError> {
        let tenant_id = scope.require_tenant()?;

        let result = sqlx::query("DELETE FROM subcategories WHERE id = $1 AND tenant_id = $2")
            .bind(subcategory_id)
            .bind(tenant_id)
            .execute(self.pool.get_pool())
            .await
            .map_err(|e| map_constraint_violation(e, &[]))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!(
                "subcategory {subcategory_id}"
            )));
        }
        Ok(())
    }

    // ==================== Transactions ====================

    pub async fn create_transaction(
        &self,
        scope: &TenantScope,
        new_transaction: NewTransaction,
    ) -> Result<Transaction, DomainError> {
        let tenant_id = scope.require_tenant()?;
        new_transaction.validate()?;
        validate_transaction_shape(
            new_transaction.kind,
            new_transaction.category_id,
            new_transaction.subcategory_id,
        )?;

        // Hierarchy check and insert share one transaction so the
        // referenced rows cannot change underneath the check.
        let mut tx = self.pool.get_pool().begin().await?;

        if let Some(category_id) = new_transaction.category_id {
            let owned: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM categories WHERE id = $1 AND tenant_id = $2)",
            )
            .bind(category_id)
            .bind(tenant_id)
            .fetch_one(&mut *tx)
            .await?;
            if !owned {
                return Err(DomainError::validation(
                    "category_id",
                    "category not found for this tenant",
                ));
            }
        }

        if let Some(subcategory_id) = new_transaction.subcategory_id {
            let nested: bool = sqlx::query_scalar(
                r#"SELECT EXISTS (
                       SELECT 1 FROM subcategories
                       WHERE id = $1 AND category_id = $2 AND tenant_id = $3
                   )"#,
            )
            .bind(subcategory_id)
            .bind(new_transaction.category_id)
            .bind(tenant_id)
            .fetch_one(&mut *tx)
            .await?;
            if !nested {
                return Err(DomainError::validation(
                    "subcategory_id",
                    "subcategory does not belong to the given category",
                ));
            }
        }

        let transaction = sqlx::query_as::<_, Transaction>(
            r#"INSERT INTO transactions
                   (id, tenant_id, description, kind, amount_cents, category_id,
                    subcategory_id, supplier, competence_date)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               RETURNING *"#,
        )
        .bind(new_record_id())
        .bind(tenant_id)
        .bind(&new_transaction.description)
        .bind(new_transaction.kind)
        .bind(new_transaction.amount_cents)
        .bind(new_transaction.category_id)
        .bind(new_transaction.subcategory_id)
        .bind(&new_transaction.supplier)
        .bind(new_transaction.competence_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(transaction)
    }

    pub async fn get_transaction(
        &self,
        scope: &TenantScope,
        transaction_id: Uuid,
    ) -> Result<Transaction, DomainError> {
        let transaction = match scope {
            TenantScope::Tenant(tenant_id) => {
                sqlx::query_as::<_, Transaction>(
                    "SELECT * FROM transactions WHERE id = $1 AND tenant_id = $2",
                )
                .bind(transaction_id)
                .bind(tenant_id)
                .fetch_optional(self.pool.get_pool())
                .await?
            }
            TenantScope::CrossTenant { .. } => {
                sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
                    .bind(transaction_id)
                    .fetch_optional(self.pool.get_pool())
                    .await?
            }
        };

        transaction.ok_or_else(|| DomainError::NotFound(format!("transaction {transaction_id}")))
    }

    pub async fn list_transactions(
        &self,
        scope: &TenantScope,
    ) -> Result<Vec<Transaction>, DomainError> {
        let transactions = match scope {
            TenantScope::Tenant(tenant_id) => {
                sqlx::query_as::<_, Transaction>(
                    r#"SELECT * FROM transactions
                       WHERE tenant_id = $1
                       ORDER BY competence_date DESC, created_at DESC"#,
                )
                .bind(tenant_id)
                .fetch_all(self.pool.get_pool())
                .await?
            }
            TenantScope::CrossTenant { .. } => {
                sqlx::query_as::<_, Transaction>(
                    "SELECT * FROM transactions ORDER BY competence_date DESC, created_at DESC",
                )
                .fetch_all(self.pool.get_pool())
                .await?
            }
        };
        Ok(transactions)
    }

    // ==================== Installments ====================

    pub async fn add_installment(
        &self,
        scope: &TenantScope,
        transaction_id: Uuid,
        new_installment: NewInstallment,
    ) -> Result<Installment, DomainError> {
        let tenant_id = scope.require_tenant()?;
        new_installment.validate()?;

        let mut tx = self.pool.get_pool().begin().await?;

        let owned: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM transactions WHERE id = $1 AND tenant_id = $2)",
        )
        .bind(transaction_id)
        .bind(tenant_id)
        .fetch_one(&mut *tx)
        .await?;
        if !owned {
            return Err(DomainError::NotFound(format!(
                "transaction {transaction_id}"
            )));
        }

        let installment = sqlx::query_as::<_, Installment>(
            r#"INSERT INTO installments
                   (id, tenant_id, transaction_id, due_date, amount_cents)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING *"#,
        )
        .bind(new_record_id())
        .bind(tenant_id)
        .bind(transaction_id)
        .bind(new_installment.due_date)
        .bind(new_installment.amount_cents)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(installment)
    }

    pub async fn list_installments(
        &self,
        scope: &TenantScope,
        transaction_id: Uuid,
    ) -> Result<Vec<Installment>, DomainError> {
        let installments = match scope {
            TenantScope::Tenant(tenant_id) => {
                sqlx::query_as::<_, Installment>(
                    r#"SELECT * FROM installments
                       WHERE transaction_id = $1 AND tenant_id = $2
                       ORDER BY due_date"#,
                )
                .bind(transaction_id)
                .bind(tenant_id)
                .fetch_all(self.pool.get_pool())
                .await?
            }
            TenantScope::CrossTenant { .. } => {
                sqlx::query_as::<_, Installment>(
                    "SELECT * FROM installments WHERE transaction_id = $1 ORDER BY due_date",
                )
                .bind(transaction_id)
                .fetch_all(self.pool.get_pool())
                .await?
            }
        };
        Ok(installments)
    }

    /// Settles an installment. Overpayment beyond the net amount is
    /// recorded as penalty; underpayment replaces the net amount
    /// (negotiated discount).
    ///
    /// The status check and the update run in one transaction with the
    /// row locked, so two concurrent settlements serialize and the
    /// second one hits the already-paid conflict.
    pub async fn mark_installment_paid(
        &self,
        scope: &TenantScope,
        installment_id: Uuid,
        payment_date: chrono::NaiveDate,
        paid_amount_cents: Option<i64>,
    ) -> Result<Installment, DomainError> {
        let tenant_id = scope.require_tenant()?;

        let mut tx = self.pool.get_pool().begin().await?;

        let installment = sqlx::query_as::<_, Installment>(
            "SELECT * FROM installments WHERE id = $1 AND tenant_id = $2 FOR UPDATE",
        )
        .bind(installment_id)
        .bind(tenant_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DomainError::NotFound(format!("installment {installment_id}")))?;

        if installment.status == InstallmentStatus::Paid {
            return Err(DomainError::conflict(
                "status",
                "installment is already paid",
            ));
        }

        let (amount_cents, penalty_cents) = settle_amounts(
            installment.amount_cents,
            installment.penalty_cents,
            paid_amount_cents,
        )?;

        // The status predicate backstops the row lock.
        let updated = sqlx::query_as::<_, Installment>(
            r#"UPDATE installments
               SET payment_date = $3,
                   amount_cents = $4,
                   penalty_cents = $5,
                   status = $6,
                   updated_at = now()
               WHERE id = $1 AND tenant_id = $2 AND status = $7
               RETURNING *"#,
        )
        .bind(installment_id)
        .bind(tenant_id)
        .bind(payment_date)
        .bind(amount_cents)
        .bind(penalty_cents)
        .bind(InstallmentStatus::Paid)
        .bind(InstallmentStatus::Pending)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DomainError::conflict("status", "installment is already paid"))?;

        tx.commit().await?;

        debug!(installment = %updated.id, "installment settled");
        Ok(updated)
    }
}

/// Expenses carry the full category/subcategory hierarchy; revenues
/// carry neither.
fn validate_transaction_shape(
    kind: TransactionKind,
    category_id: Option<Uuid>,
    subcategory_id: Option<Uuid>,
) -> Result<(), DomainError> {
    match kind {
        TransactionKind::Expense => {
            if category_id.is_none() {
                return Err(DomainError::validation(
                    "category_id",
                    "category is required for expenses",
                ));
            }
            if subcategory_id.is_none() {
                return Err(DomainError::validation(
                    "subcategory_id",
                    "subcategory is required for expenses",
                ));
            }
            Ok(())
        }
        TransactionKind::Revenue => {
            if category_id.is_some() || subcategory_id.is_some() {
                return Err(DomainError::validation(
                    "category_id",
                    "revenues must not carry a category",
                ));
            }
            Ok(())
        }
    }
}

/// Splits a settlement into net amount and penalty.
fn settle_amounts(
    amount_cents: i64,
    penalty_cents: i64,
    paid_amount_cents: Option<i64>,
) -> Result<(i64, i64), DomainError> {
    match paid_amount_cents {
        Some(paid) if paid <= 0 => Err(DomainError::validation(
            "paid_amount_cents",
            "paid amount must be positive",
        )),
        Some(paid) if paid >= amount_cents => Ok((amount_cents, paid - amount_cents)),
        Some(paid) => Ok((paid, 0)),
        None => Ok((amount_cents, penalty_cents)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::new_record_id;

    #[test]
    fn expense_requires_full_hierarchy() {
        assert!(matches!(
            validate_transaction_shape(TransactionKind::Expense, None, None),
            Err(DomainError::Validation { field, .. }) if field == "category_id"
        ));
        assert!(matches!(
            validate_transaction_shape(TransactionKind::Expense, Some(new_record_id()), None),
            Err(DomainError::Validation { field, .. }) if field == "subcategory_id"
        ));
        assert!(validate_transaction_shape(
            TransactionKind::Expense,
            Some(new_record_id()),
            Some(new_record_id()),
        )
        .is_ok());
    }

    #[test]
    fn revenue_rejects_categorization() {
        assert!(matches!(
            validate_transaction_shape(TransactionKind::Revenue, Some(new_record_id()), None),
            Err(DomainError::Validation { field, .. }) if field == "category_id"
        ));
        assert!(matches!(
            validate_transaction_shape(TransactionKind::Revenue, None, Some(new_record_id())),
            Err(DomainError::Validation { field, .. }) if field == "category_id"
        ));
        assert!(validate_transaction_shape(TransactionKind::Revenue, None, None).is_ok());
    }

    #[test]
    fn settlement_overpayment_becomes_penalty() {
        assert_eq!(settle_amounts(10_000, 0, Some(10_500)).unwrap(), (10_000, 500));
    }

    #[test]
    fn settlement_underpayment_is_a_discount() {
        assert_eq!(settle_amounts(10_000, 0, Some(9_000)).unwrap(), (9_000, 0));
    }

    #[test]
    fn settlement_without_amount_keeps_existing_values() {
        assert_eq!(settle_amounts(10_000, 250, None).unwrap(), (10_000, 250));
    }

    #[test]
    fn settlement_rejects_non_positive_payment() {
        assert!(settle_amounts(10_000, 0, Some(0)).is_err());
        assert!(settle_amounts(10_000, 0, Some(-5)).is_err());
    }
}
