//! Member profiles
//!
//! A cooperative member registered at one branch. Profiles are soft
//! deleted so historical postings keep a valid reference.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use core_kernel::{BranchId, OrganizationId};
use infra_registry::{
    project_one, Association, AssociationKind, Audit, DeletePolicy, Dispatcher, Entity, FieldValue,
    FromField, Record, Registry, RegistryConfig, RegistryError, Schema, SoftDelete, StorageError,
    Store,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::branch::{branch_response, Branch, BranchResponse};
use crate::error::CoopError;
use crate::ids::MemberProfileId;
use crate::organization::{organization_response, Organization, OrganizationResponse};

pub static MEMBER_PROFILE_SCHEMA: Schema = Schema {
    name: "member_profile",
    table: "member_profiles",
    columns: &[
        "organization_id",
        "branch_id",
        "first_name",
        "last_name",
        "passbook",
        "status",
        "share_capital",
    ],
    unique: &[],
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
    delete_policy: DeletePolicy::Soft,
};

/// Membership lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    #[default]
    Pending,
    Active,
    Suspended,
    Closed,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Pending => "pending",
            MemberStatus::Active => "active",
            MemberStatus::Suspended => "suspended",
            MemberStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberStatus {
    type Err = CoopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MemberStatus::Pending),
            "active" => Ok(MemberStatus::Active),
            "suspended" => Ok(MemberStatus::Suspended),
            "closed" => Ok(MemberStatus::Closed),
            other => Err(CoopError::validation(format!("unknown member status '{}'", other))),
        }
    }
}

impl From<MemberStatus> for FieldValue {
    fn from(status: MemberStatus) -> Self {
        FieldValue::Text(status.as_str().to_string())
    }
}

impl FromField for MemberStatus {
    fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberProfile {
    pub id: MemberProfileId,
    pub organization_id: OrganizationId,
    pub branch_id: BranchId,
    pub first_name: String,
    pub last_name: String,
    pub passbook: String,
    pub status: MemberStatus,
    pub share_capital: Decimal,
    pub audit: Audit,
    pub deletion: SoftDelete,
    pub organization: Option<Box<Organization>>,
    pub branch: Option<Box<Branch>>,
}

impl MemberProfile {
    pub fn new(
        organization_id: OrganizationId,
        branch_id: BranchId,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        passbook: impl Into<String>,
    ) -> Self {
        Self {
            organization_id,
            branch_id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            passbook: passbook.into(),
            ..Self::default()
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active && !self.deletion.is_deleted()
    }
}

impl Entity for MemberProfile {
    type Id = MemberProfileId;

    fn schema() -> &'static Schema {
        &MEMBER_PROFILE_SCHEMA
    }

    fn id(&self) -> MemberProfileId {
        self.id
    }

    fn set_id(&mut self, id: MemberProfileId) {
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
            .with("first_name", self.first_name.as_str())
            .with("last_name", self.last_name.as_str())
            .with("passbook", self.passbook.as_str())
            .with("status", self.status)
            .with("share_capital", self.share_capital);
        self.audit.write(&mut record);
        self.deletion.write(&mut record);
        record
    }

    fn from_record(record: &Record) -> Result<Self, StorageError> {
        Ok(Self {
            id: record.get("id")?,
            organization_id: record.get("organization_id")?,
            branch_id: record.get("branch_id")?,
            first_name: record.get("first_name")?,
            last_name: record.get("last_name")?,
            passbook: record.get("passbook")?,
            status: record.get("status")?,
            share_capital: record.get("share_capital")?,
            audit: Audit::read(record)?,
            deletion: SoftDelete::read(record)?,
            organization: record.nested("Organization")?,
            branch: record.nested("Branch")?,
        })
    }
}

fn validate_non_negative(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_negative() {
        return Err(ValidationError::new("negative_amount"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateMemberProfileRequest {
    pub organization_id: OrganizationId,
    pub branch_id: BranchId,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(length(min = 1, max = 50))]
    pub passbook: String,
    #[serde(default)]
    #[validate(custom(function = "validate_non_negative"))]
    pub share_capital: Decimal,
}

impl CreateMemberProfileRequest {
    pub fn into_entity(self) -> Result<MemberProfile, CoopError> {
        self.validate()?;
        Ok(MemberProfile {
            share_capital: self.share_capital,
            ..MemberProfile::new(
                self.organization_id,
                self.branch_id,
                self.first_name,
                self.last_name,
                self.passbook,
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberProfileResponse {
    pub id: Uuid,
    pub organization_id: OrganizationId,
    pub branch_id: BranchId,
    pub full_name: String,
    pub passbook: String,
    pub status: MemberStatus,
    pub share_capital: Decimal,
    pub organization: Option<OrganizationResponse>,
    pub branch: Option<BranchResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn member_profile_response(member: &MemberProfile) -> MemberProfileResponse {
    MemberProfileResponse {
        id: member.uuid(),
        organization_id: member.organization_id,
        branch_id: member.branch_id,
        full_name: member.full_name(),
        passbook: member.passbook.clone(),
        status: member.status,
        share_capital: member.share_capital,
        organization: project_one(member.organization.as_deref(), organization_response),
        branch: project_one(member.branch.as_deref(), branch_response),
        created_at: member.audit.created_at,
        updated_at: member.audit.updated_at,
    }
}

pub type MemberProfileRegistry = Registry<MemberProfile, MemberProfileResponse>;

pub fn registry(
    store: Arc<dyn Store>,
    dispatcher: Arc<dyn Dispatcher>,
) -> Result<MemberProfileRegistry, RegistryError> {
    RegistryConfig::new(store, dispatcher, member_profile_response)
        .preloads(["Organization", "Branch.Organization"])
        .build()
}
