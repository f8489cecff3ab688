//! Organizations
//!
//! The tenant root. Every other cooperative record is scoped to exactly one
//! organization.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use core_kernel::OrganizationId;
use infra_registry::{
    project_many, Association, AssociationKind, Audit, DeletePolicy, Dispatcher, Entity, Record,
    Registry, RegistryConfig, RegistryError, Schema, StorageError, Store,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::branch::{branch_response, Branch, BranchResponse};
use crate::error::CoopError;

pub static ORGANIZATION_SCHEMA: Schema = Schema {
    name: "organization",
    table: "organizations",
    columns: &["name", "email", "is_private"],
    unique: &[],
    associations: &[Association {
        name: "Branches",
        kind: AssociationKind::HasMany {
            foreign_key: "organization_id",
        },
        target: crate::branch::schema,
    }],
    delete_policy: DeletePolicy::Hard,
};

pub(crate) fn schema() -> &'static Schema {
    &ORGANIZATION_SCHEMA
}

/// A cooperative tenant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub email: String,
    pub is_private: bool,
    pub audit: Audit,
    /// Loaded with the `Branches` association
    pub branches: Vec<Branch>,
}

impl Organization {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            ..Self::default()
        }
    }
}

impl Entity for Organization {
    type Id = OrganizationId;

    fn schema() -> &'static Schema {
        &ORGANIZATION_SCHEMA
    }

    fn id(&self) -> OrganizationId {
        self.id
    }

    fn set_id(&mut self, id: OrganizationId) {
        self.id = id;
    }

    fn audit(&self) -> &Audit {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut Audit {
        &mut self.audit
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("id", self.id)
            .with("name", self.name.as_str())
            .with("email", self.email.as_str())
            .with("is_private", self.is_private);
        self.audit.write(&mut record);
        record
    }

    fn from_record(record: &Record) -> Result<Self, StorageError> {
        Ok(Self {
            id: record.get("id")?,
            name: record.get("name")?,
            email: record.get("email")?,
            is_private: record.get("is_private")?,
            audit: Audit::read(record)?,
            branches: record.nested_many("Branches")?,
        })
    }
}

/// Request to register an organization
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrganizationRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    pub is_private: bool,
}

impl CreateOrganizationRequest {
    /// Validates the request and builds an unsaved organization
    pub fn into_entity(self) -> Result<Organization, CoopError> {
        self.validate()?;
        Ok(Organization {
            is_private: self.is_private,
            ..Organization::new(self.name, self.email)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrganizationResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub is_private: bool,
    pub branches: Vec<BranchResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn organization_response(organization: &Organization) -> OrganizationResponse {
    OrganizationResponse {
        id: organization.uuid(),
        name: organization.name.clone(),
        email: organization.email.clone(),
        is_private: organization.is_private,
        branches: project_many(&organization.branches, branch_response),
        created_at: organization.audit.created_at,
        updated_at: organization.audit.updated_at,
    }
}

pub type OrganizationRegistry = Registry<Organization, OrganizationResponse>;

/// Builds the organization registry
///
/// Branches are not loaded by default; pass `"Branches"` as an extra
/// eager-load path when a caller needs them.
pub fn registry(
    store: Arc<dyn Store>,
    dispatcher: Arc<dyn Dispatcher>,
) -> Result<OrganizationRegistry, RegistryError> {
    RegistryConfig::new(store, dispatcher, organization_response).build()
}
