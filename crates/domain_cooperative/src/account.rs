//! Chart of accounts
//!
//! Accounts form a tree per branch through `parent_account_id`. Besides the
//! tenant topics, a mutation on a child account is also published under
//! `account.<event>.parent_account.<parent_id>` so listeners can follow a
//! whole subtree.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use core_kernel::{BranchId, OrganizationId};
use infra_registry::{
    project_many, project_one, Association, AssociationKind, Audit, DeletePolicy, Dispatcher,
    Entity, FieldValue, FromField, Record, Registry, RegistryConfig, RegistryError, Schema,
    StorageError, Store, TopicScope,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::CoopError;
use crate::ids::AccountId;

pub static ACCOUNT_SCHEMA: Schema = Schema {
    name: "account",
    table: "accounts",
    columns: &[
        "organization_id",
        "branch_id",
        "parent_account_id",
        "code",
        "name",
        "kind",
    ],
    unique: &[],
    associations: &[
        Association {
            name: "ParentAccount",
            kind: AssociationKind::BelongsTo {
                foreign_key: "parent_account_id",
            },
            target: schema,
        },
        Association {
            name: "ChildAccounts",
            kind: AssociationKind::HasMany {
                foreign_key: "parent_account_id",
            },
            target: schema,
        },
        Association {
            name: "Organization",
            kind: AssociationKind::BelongsTo {
                foreign_key: "organization_id",
            },
            target: crate::organization::schema,
        },
        Association {
            name: "Branch",
            kind: AssociationKind::BelongsTo {
                foreign_key: "branch_id",
            },
            target: crate::branch::schema,
        },
    ],
    delete_policy: DeletePolicy::Hard,
};

fn schema() -> &'static Schema {
    &ACCOUNT_SCHEMA
}

/// Accounting classification of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    #[default]
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Asset => "asset",
            AccountKind::Liability => "liability",
            AccountKind::Equity => "equity",
            AccountKind::Revenue => "revenue",
            AccountKind::Expense => "expense",
        }
    }

    /// True for accounts reported on the balance sheet
    pub fn is_balance_sheet(&self) -> bool {
        matches!(
            self,
            AccountKind::Asset | AccountKind::Liability | AccountKind::Equity
        )
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountKind {
    type Err = CoopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asset" => Ok(AccountKind::Asset),
            "liability" => Ok(AccountKind::Liability),
            "equity" => Ok(AccountKind::Equity),
            "revenue" => Ok(AccountKind::Revenue),
            "expense" => Ok(AccountKind::Expense),
            other => Err(CoopError::validation(format!("unknown account kind '{}'", other))),
        }
    }
}

impl From<AccountKind> for FieldValue {
    fn from(kind: AccountKind) -> Self {
        FieldValue::Text(kind.as_str().to_string())
    }
}

impl FromField for AccountKind {
    fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub organization_id: OrganizationId,
    pub branch_id: BranchId,
    pub parent_account_id: Option<AccountId>,
    pub code: String,
    pub name: String,
    pub kind: AccountKind,
    pub audit: Audit,
    pub parent_account: Option<Box<Account>>,
    pub child_accounts: Vec<Account>,
}

impl Account {
    pub fn new(
        organization_id: OrganizationId,
        branch_id: BranchId,
        code: impl Into<String>,
        name: impl Into<String>,
        kind: AccountKind,
    ) -> Self {
        Self {
            organization_id,
            branch_id,
            code: code.into(),
            name: name.into(),
            kind,
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent: AccountId) -> Self {
        self.parent_account_id = Some(parent);
        self
    }
}

impl Entity for Account {
    type Id = AccountId;

    fn schema() -> &'static Schema {
        &ACCOUNT_SCHEMA
    }

    fn id(&self) -> AccountId {
        self.id
    }

    fn set_id(&mut self, id: AccountId) {
        self.id = id;
    }

    fn audit(&self) -> &Audit {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut Audit {
        &mut self.audit
    }

    fn organization_id(&self) -> Option<OrganizationId> {
        Some(self.organization_id)
    }

    fn branch_id(&self) -> Option<BranchId> {
        Some(self.branch_id)
    }

    fn topic_scopes(&self) -> Vec<TopicScope> {
        self.parent_account_id
            .map(|parent| TopicScope::new("parent_account", parent))
            .into_iter()
            .collect()
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("id", self.id)
            .with("organization_id", self.organization_id)
            .with("branch_id", self.branch_id)
            .with("parent_account_id", self.parent_account_id)
            .with("code", self.code.as_str())
            .with("name", self.name.as_str())
            .with("kind", self.kind);
        self.audit.write(&mut record);
        record
    }

    fn from_record(record: &Record) -> Result<Self, StorageError> {
        Ok(Self {
            id: record.get("id")?,
            organization_id: record.get("organization_id")?,
            branch_id: record.get("branch_id")?,
            parent_account_id: record.get("parent_account_id")?,
            code: record.get("code")?,
            name: record.get("name")?,
            kind: record.get("kind")?,
            audit: Audit::read(record)?,
            parent_account: record.nested("ParentAccount")?,
            child_accounts: record.nested_many("ChildAccounts")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAccountRequest {
    pub organization_id: OrganizationId,
    pub branch_id: BranchId,
    pub parent_account_id: Option<AccountId>,
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub kind: AccountKind,
}

impl CreateAccountRequest {
    pub fn into_entity(self) -> Result<Account, CoopError> {
        self.validate()?;
        Ok(Account {
            parent_account_id: self.parent_account_id,
            ..Account::new(
                self.organization_id,
                self.branch_id,
                self.code,
                self.name,
                self.kind,
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub organization_id: OrganizationId,
    pub branch_id: BranchId,
    pub code: String,
    pub name: String,
    pub kind: AccountKind,
    pub parent_account: Option<Box<AccountResponse>>,
    pub child_accounts: Vec<AccountResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn account_response(account: &Account) -> AccountResponse {
    AccountResponse {
        id: account.uuid(),
        organization_id: account.organization_id,
        branch_id: account.branch_id,
        code: account.code.clone(),
        name: account.name.clone(),
        kind: account.kind,
        parent_account: project_one(account.parent_account.as_deref(), account_response).map(Box::new),
        child_accounts: project_many(&account.child_accounts, account_response),
        created_at: account.audit.created_at,
        updated_at: account.audit.updated_at,
    }
}

pub type AccountRegistry = Registry<Account, AccountResponse>;

pub fn registry(
    store: Arc<dyn Store>,
    dispatcher: Arc<dyn Dispatcher>,
) -> Result<AccountRegistry, RegistryError> {
    RegistryConfig::new(store, dispatcher, account_response)
        .preload("ParentAccount")
        .build()
}
