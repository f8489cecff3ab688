//! Invitation codes
//!
//! A branch hands out codes that prospective members use to join. Each
//! code has an expiration instant and a bounded number of uses. Redeeming
//! is a read-modify-write on `current_use` and runs under a row lock so
//! concurrent redemptions can never push the counter past `max_use`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use core_kernel::{BranchId, OperationContext, OrganizationId};
use infra_registry::{
    project_one, Association, AssociationKind, Audit, DeletePolicy, Dispatcher, Entity, Filter,
    FilterSet, Record, Registry, RegistryConfig, RegistryError, Schema, SortSet, StorageError,
    Store, Transaction,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::branch::{branch_response, Branch, BranchResponse};
use crate::error::CoopError;
use crate::ids::InvitationCodeId;
use crate::organization::Organization;

pub static INVITATION_CODE_SCHEMA: Schema = Schema {
    name: "invitation_code",
    table: "invitation_codes",
    columns: &[
        "organization_id",
        "branch_id",
        "code",
        "description",
        "max_use",
        "current_use",
        "expiration_date",
    ],
    unique: &["code"],
    associations: &[
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

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvitationCode {
    pub id: InvitationCodeId,
    pub organization_id: OrganizationId,
    pub branch_id: BranchId,
    pub code: String,
    pub description: String,
    pub max_use: i64,
    pub current_use: i64,
    pub expiration_date: DateTime<Utc>,
    pub audit: Audit,
    pub organization: Option<Box<Organization>>,
    pub branch: Option<Box<Branch>>,
}

impl InvitationCode {
    pub fn new(
        organization_id: OrganizationId,
        branch_id: BranchId,
        code: impl Into<String>,
        max_use: i64,
        expiration_date: DateTime<Utc>,
    ) -> Self {
        Self {
            organization_id,
            branch_id,
            code: code.into(),
            max_use,
            expiration_date,
            ..Self::default()
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiration_date
    }

    pub fn remaining_uses(&self) -> i64 {
        (self.max_use - self.current_use).max(0)
    }

    /// Checks expiry first, then the use counter
    pub fn ensure_usable(&self, now: DateTime<Utc>) -> Result<(), CoopError> {
        if self.is_expired_at(now) {
            return Err(CoopError::InvitationExpired {
                code: self.code.clone(),
                expired_at: self.expiration_date,
            });
        }
        if self.current_use >= self.max_use {
            return Err(CoopError::MaxUsesReached {
                code: self.code.clone(),
                max_use: self.max_use,
            });
        }
        Ok(())
    }
}

impl Entity for InvitationCode {
    type Id = InvitationCodeId;

    fn schema() -> &'static Schema {
        &INVITATION_CODE_SCHEMA
    }

    fn id(&self) -> InvitationCodeId {
        self.id
    }

    fn set_id(&mut self, id: InvitationCodeId) {
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

    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("id", self.id)
            .with("organization_id", self.organization_id)
            .with("branch_id", self.branch_id)
            .with("code", self.code.as_str())
            .with("description", self.description.as_str())
            .with("max_use", self.max_use)
            .with("current_use", self.current_use)
            .with("expiration_date", self.expiration_date);
        self.audit.write(&mut record);
        record
    }

    fn from_record(record: &Record) -> Result<Self, StorageError> {
        Ok(Self {
            id: record.get("id")?,
            organization_id: record.get("organization_id")?,
            branch_id: record.get("branch_id")?,
            code: record.get("code")?,
            description: record.get("description")?,
            max_use: record.get("max_use")?,
            current_use: record.get("current_use")?,
            expiration_date: record.get("expiration_date")?,
            audit: Audit::read(record)?,
            organization: record.nested("Organization")?,
            branch: record.nested("Branch")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateInvitationCodeRequest {
    pub organization_id: OrganizationId,
    pub branch_id: BranchId,
    #[validate(length(min = 4, max = 32))]
    pub code: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub description: String,
    #[validate(range(min = 1))]
    pub max_use: i64,
    pub expiration_date: DateTime<Utc>,
}

impl CreateInvitationCodeRequest {
    pub fn into_entity(self) -> Result<InvitationCode, CoopError> {
        self.validate()?;
        Ok(InvitationCode {
            description: self.description,
            ..InvitationCode::new(
                self.organization_id,
                self.branch_id,
                self.code,
                self.max_use,
                self.expiration_date,
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvitationCodeResponse {
    pub id: Uuid,
    pub organization_id: OrganizationId,
    pub branch_id: BranchId,
    pub code: String,
    pub description: String,
    pub max_use: i64,
    pub current_use: i64,
    pub remaining_uses: i64,
    pub expiration_date: DateTime<Utc>,
    pub branch: Option<BranchResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn invitation_code_response(invitation: &InvitationCode) -> InvitationCodeResponse {
    InvitationCodeResponse {
        id: invitation.uuid(),
        organization_id: invitation.organization_id,
        branch_id: invitation.branch_id,
        code: invitation.code.clone(),
        description: invitation.description.clone(),
        max_use: invitation.max_use,
        current_use: invitation.current_use,
        remaining_uses: invitation.remaining_uses(),
        expiration_date: invitation.expiration_date,
        branch: project_one(invitation.branch.as_deref(), branch_response),
        created_at: invitation.audit.created_at,
        updated_at: invitation.audit.updated_at,
    }
}

pub type InvitationCodeRegistry = Registry<InvitationCode, InvitationCodeResponse>;

pub fn registry(
    store: Arc<dyn Store>,
    dispatcher: Arc<dyn Dispatcher>,
) -> Result<InvitationCodeRegistry, RegistryError> {
    RegistryConfig::new(store, dispatcher, invitation_code_response)
        .preloads(["Organization", "Branch"])
        .build()
}

fn by_code(code: &str) -> FilterSet {
    FilterSet::new().and(Filter::eq("code", code))
}

fn invalid_code(code: &str, error: RegistryError) -> CoopError {
    if error.is_not_found() {
        CoopError::InvalidCode(code.to_string())
    } else {
        CoopError::Registry(error)
    }
}

/// Checks that `code` exists, has not expired and has uses left
///
/// Nothing is written; the counter is only advanced by [`redeem`].
#[instrument(skip(registry, ctx))]
pub async fn verify(
    registry: &InvitationCodeRegistry,
    ctx: &OperationContext,
    code: &str,
) -> Result<InvitationCode, CoopError> {
    let invitation = registry
        .arr_find_one(ctx, by_code(code), SortSet::new(), &[])
        .await
        .map_err(|e| invalid_code(code, e))?;
    invitation.ensure_usable(Utc::now())?;
    Ok(invitation)
}

/// Consumes one use of `code` in its own transaction
///
/// The row is locked before the counter is checked, so concurrent
/// redemptions are serialized. A rejected redemption rolls back and sends
/// no notification.
#[instrument(skip(registry, ctx))]
pub async fn redeem(
    registry: &InvitationCodeRegistry,
    ctx: &OperationContext,
    code: &str,
) -> Result<InvitationCode, CoopError> {
    let mut tx = registry.start_transaction(ctx).await?;
    match redeem_with_tx(registry, ctx, &mut tx, code).await {
        Ok(redeemed) => {
            if let Err(error) = tx.commit().await {
                return Err(error.with_committed(redeemed).into());
            }
            info!(
                code,
                current_use = redeemed.current_use,
                max_use = redeemed.max_use,
                "Invitation code redeemed"
            );
            Ok(redeemed)
        }
        Err(error) => {
            if let Err(rollback_error) = tx.rollback().await {
                warn!(code, error = %rollback_error, "Rollback failed");
            }
            Err(error)
        }
    }
}

/// Consumes one use of `code` inside a caller-owned transaction
///
/// The lock is held until the caller commits or rolls back `tx`.
pub async fn redeem_with_tx(
    registry: &InvitationCodeRegistry,
    ctx: &OperationContext,
    tx: &mut Transaction,
    code: &str,
) -> Result<InvitationCode, CoopError> {
    let found = registry
        .arr_find_one_with_tx(ctx, tx, by_code(code), SortSet::new(), &[])
        .await
        .map_err(|e| invalid_code(code, e))?;

    let mut locked = registry.get_by_id_lock(ctx, tx, found.id).await?;
    locked.ensure_usable(Utc::now())?;
    locked.current_use += 1;

    let id = locked.id;
    Ok(registry.update_by_id_with_tx(ctx, tx, id, locked).await?)
}
