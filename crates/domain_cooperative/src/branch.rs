//! Branches
//!
//! A physical or logical office of an organization. Members, accounts and
//! invitation codes are all partitioned by branch.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use core_kernel::{BranchId, OrganizationId};
use infra_registry::{
    project_one, Association, AssociationKind, Audit, DeletePolicy, Dispatcher, Entity, Record,
    Registry, RegistryConfig, RegistryError, Schema, StorageError, Store,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::CoopError;
use crate::organization::{organization_response, Organization, OrganizationResponse};

pub static BRANCH_SCHEMA: Schema = Schema {
    name: "branch",
    table: "branches",
    columns: &["organization_id", "name", "code", "address"],
    unique: &[],
    associations: &[Association {
        name: "Organization",
        kind: AssociationKind::BelongsTo {
            foreign_key: "organization_id",
        },
        target: crate::organization::schema,
    }],
    delete_policy: DeletePolicy::Hard,
};

pub(crate) fn schema() -> &'static Schema {
    &BRANCH_SCHEMA
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Branch {
    pub id: BranchId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub code: String,
    pub address: String,
    pub audit: Audit,
    pub organization: Option<Box<Organization>>,
}

impl Branch {
    pub fn new(organization_id: OrganizationId, name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            organization_id,
            name: name.into(),
            code: code.into(),
            ..Self::default()
        }
    }
}

impl Entity for Branch {
    type Id = BranchId;

    fn schema() -> &'static Schema {
        &BRANCH_SCHEMA
    }

    fn id(&self) -> BranchId {
        self.id
    }

    fn set_id(&mut self, id: BranchId) {
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

    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("id", self.id)
            .with("organization_id", self.organization_id)
            .with("name", self.name.as_str())
            .with("code", self.code.as_str())
            .with("address", self.address.as_str());
        self.audit.write(&mut record);
        record
    }

    fn from_record(record: &Record) -> Result<Self, StorageError> {
        Ok(Self {
            id: record.get("id")?,
            organization_id: record.get("organization_id")?,
            name: record.get("name")?,
            code: record.get("code")?,
            address: record.get("address")?,
            audit: Audit::read(record)?,
            organization: record.nested("Organization")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBranchRequest {
    pub organization_id: OrganizationId,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub address: String,
}

impl CreateBranchRequest {
    pub fn into_entity(self) -> Result<Branch, CoopError> {
        self.validate()?;
        Ok(Branch {
            address: self.address,
            ..Branch::new(self.organization_id, self.name, self.code.to_uppercase())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchResponse {
    pub id: Uuid,
    pub organization_id: OrganizationId,
    pub name: String,
    pub code: String,
    pub address: String,
    pub organization: Option<OrganizationResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn branch_response(branch: &Branch) -> BranchResponse {
    BranchResponse {
        id: branch.uuid(),
        organization_id: branch.organization_id,
        name: branch.name.clone(),
        code: branch.code.clone(),
        address: branch.address.clone(),
        organization: project_one(branch.organization.as_deref(), organization_response),
        created_at: branch.audit.created_at,
        updated_at: branch.audit.updated_at,
    }
}

pub type BranchRegistry = Registry<Branch, BranchResponse>;

pub fn registry(
    store: Arc<dyn Store>,
    dispatcher: Arc<dyn Dispatcher>,
) -> Result<BranchRegistry, RegistryError> {
    RegistryConfig::new(store, dispatcher, branch_response)
        .preload("Organization")
        .build()
}
