use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::tenancy::scope::TenantRecord;
use crate::utils::cnpj::{format_cnpj, validate_cnpj_field};

pub type TenantId = Uuid;

/// Mints an opaque primary key.
///
/// Ids are drawn from the UUIDv4 random space, never from a counter, so
/// adjacent records cannot be guessed from one another.
pub fn new_record_id() -> Uuid {
    Uuid::new_v4()
}

static WHATSAPP_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{10,15}$").expect("whatsapp number regex"));

// ==================== Tenants ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "tenant_plan", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantPlan {
    Basic,
    Pro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "tenant_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantStatus {
    Active,
    Inactive,
}

/// A store/company. Root aggregate of the multi-tenant model: every
/// business record is owned by exactly one tenant for its entire
/// lifecycle, and tenants are soft-deactivated rather than deleted.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    /// Stored as bare digits, check-digit-validated at write time.
    pub cnpj: String,
    pub plan: TenantPlan,
    pub status: TenantStatus,
    /// 0 = Sunday .. 6 = Saturday.
    pub billing_day_weekly: i32,
    /// Day of month, 1-31.
    pub billing_day_monthly: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn cnpj_formatted(&self) -> String {
        format_cnpj(&self.cnpj)
    }

    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewTenant {
    #[validate(length(min = 1, max = 255, message = "name is required"))]
    pub name: String,
    #[validate(custom(function = validate_cnpj_field, message = "invalid CNPJ"))]
    pub cnpj: String,
    pub plan: TenantPlan,
    #[validate(range(min = 0, max = 6, message = "weekly billing day must be 0-6"))]
    pub billing_day_weekly: i32,
    #[validate(range(min = 1, max = 31, message = "monthly billing day must be 1-31"))]
    pub billing_day_monthly: i32,
}

/// Partial update; `None` fields keep their current value. The CNPJ is
/// immutable after onboarding.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct TenantUpdate {
    #[validate(length(min = 1, max = 255, message = "name is required"))]
    pub name: Option<String>,
    pub plan: Option<TenantPlan>,
    pub status: Option<TenantStatus>,
    #[validate(range(min = 0, max = 6, message = "weekly billing day must be 0-6"))]
    pub billing_day_weekly: Option<i32>,
    #[validate(range(min = 1, max = 31, message = "monthly billing day must be 1-31"))]
    pub billing_day_monthly: Option<i32>,
}

// ==================== Users ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    AdminMaster,
    Manager,
    Operator,
}

/// An account. AdminMaster is system-wide and carries no tenant; every
/// other role belongs to exactly one tenant.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub tenant_id: Option<TenantId>,
    pub whatsapp_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_master(&self) -> bool {
        self.role == UserRole::AdminMaster
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewUser {
    #[validate(email(message = "invalid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
    pub role: UserRole,
    pub tenant_id: Option<TenantId>,
    #[validate(regex(
        path = *WHATSAPP_NUMBER_RE,
        message = "whatsapp number must be 10-15 digits"
    ))]
    pub whatsapp_number: Option<String>,
}

// ==================== Categories ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "category_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CategoryKind {
    Fixed,
    Variable,
    Investment,
    Stock,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub name: String,
    pub kind: CategoryKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantRecord for Category {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn owner(&self) -> TenantId {
        self.tenant_id
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewCategory {
    #[validate(length(min = 1, max = 255, message = "name is required"))]
    pub name: String,
    pub kind: CategoryKind,
}

/// Second level of the expense hierarchy; always nested under one
/// category of the same tenant.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Subcategory {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub category_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantRecord for Subcategory {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn owner(&self) -> TenantId {
        self.tenant_id
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewSubcategory {
    pub category_id: Uuid,
    #[validate(length(min = 1, max = 255, message = "name is required"))]
    pub name: String,
}

// ==================== Transactions ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Revenue,
    Expense,
}

/// The accrual side of the ledger: when the economic fact happened,
/// independent of cash movement. Cash movement lives in [`Installment`].
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub description: Option<String>,
    pub kind: TransactionKind,
    pub amount_cents: i64,
    pub category_id: Option<Uuid>,
    pub subcategory_id: Option<Uuid>,
    pub supplier: Option<String>,
    pub competence_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantRecord for Transaction {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn owner(&self) -> TenantId {
        self.tenant_id
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewTransaction {
    pub description: Option<String>,
    pub kind: TransactionKind,
    #[validate(range(min = 1, message = "amount must be positive"))]
    pub amount_cents: i64,
    pub category_id: Option<Uuid>,
    pub subcategory_id: Option<Uuid>,
    pub supplier: Option<String>,
    pub competence_date: NaiveDate,
}

// ==================== Installments ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "installment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstallmentStatus {
    Pending,
    Paid,
}

/// The cash side of the ledger: one due/paid slice of a transaction.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Installment {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub transaction_id: Uuid,
    pub due_date: NaiveDate,
    pub payment_date: Option<NaiveDate>,
    pub amount_cents: i64,
    pub penalty_cents: i64,
    pub status: InstallmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Installment {
    /// Net amount plus penalties.
    pub fn total_cents(&self) -> i64 {
        self.amount_cents + self.penalty_cents
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status == InstallmentStatus::Pending && today > self.due_date
    }
}

impl TenantRecord for Installment {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn owner(&self) -> TenantId {
        self.tenant_id
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewInstallment {
    pub due_date: NaiveDate,
    #[validate(range(min = 1, message = "amount must be positive"))]
    pub amount_cents: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::TenantScope;
    use chrono::Utc;

    #[test]
    fn record_ids_are_not_sequential() {
        let ids: Vec<u128> = (0..8).map(|_| new_record_id().as_u128()).collect();

        let diffs: Vec<i128> = ids
            .windows(2)
            .map(|w| w[1] as i128 - w[0] as i128)
            .collect();

        // No fixed increment between consecutively minted ids.
        assert!(diffs.windows(2).any(|d| d[0] != d[1]));
        assert!(diffs.iter().all(|&d| d != 1));
    }

    #[test]
    fn new_user_rejects_malformed_email() {
        let new_user = NewUser {
            email: "not-an-email".to_string(),
            password: "long enough password".to_string(),
            role: UserRole::Operator,
            tenant_id: Some(new_record_id()),
            whatsapp_number: None,
        };
        assert!(new_user.validate().is_err());
    }

    #[test]
    fn new_user_rejects_bad_whatsapp_number() {
        let new_user = NewUser {
            email: "operator@example.com".to_string(),
            password: "long enough password".to_string(),
            role: UserRole::Operator,
            tenant_id: Some(new_record_id()),
            whatsapp_number: Some("+55 41 9999-9999".to_string()),
        };
        assert!(new_user.validate().is_err());

        let new_user = NewUser {
            whatsapp_number: Some("5541999999999".to_string()),
            ..new_user
        };
        assert!(new_user.validate().is_ok());
    }

    #[test]
    fn new_tenant_rejects_invalid_cnpj_and_billing_days() {
        let new_tenant = NewTenant {
            name: "Padaria Central".to_string(),
            cnpj: "11222333000199".to_string(),
            plan: TenantPlan::Basic,
            billing_day_weekly: 1,
            billing_day_monthly: 5,
        };
        assert!(new_tenant.validate().is_err());

        let new_tenant = NewTenant {
            cnpj: "11.222.333/0001-81".to_string(),
            ..new_tenant
        };
        assert!(new_tenant.validate().is_ok());

        let new_tenant = NewTenant {
            billing_day_monthly: 32,
            ..new_tenant
        };
        assert!(new_tenant.validate().is_err());
    }

    #[test]
    fn installment_overdue_and_totals() {
        let installment = Installment {
            id: new_record_id(),
            tenant_id: new_record_id(),
            transaction_id: new_record_id(),
            due_date: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
            payment_date: None,
            amount_cents: 10_000,
            penalty_cents: 250,
            status: InstallmentStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(installment.total_cents(), 10_250);
        assert!(installment.is_overdue(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()));
        assert!(!installment.is_overdue(NaiveDate::from_ymd_opt(2025, 1, 5).unwrap()));

        let paid = Installment {
            status: InstallmentStatus::Paid,
            payment_date: NaiveDate::from_ymd_opt(2025, 1, 7),
            ..installment
        };
        assert!(!paid.is_overdue(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()));
    }

    #[test]
    fn tenant_record_ownership_follows_scope() {
        let tenant_id = new_record_id();
        let category = Category {
            id: new_record_id(),
            tenant_id,
            name: "Aluguel".to_string(),
            kind: CategoryKind::Fixed,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(category.owned_by(&TenantScope::Tenant(tenant_id)));
        assert!(!category.owned_by(&TenantScope::Tenant(new_record_id())));
    }
}
