//! Test entities for the registry's own unit tests
//!
//! `Widget` is tenant scoped, soft deleted and owns many `Gadget`s.
//! `Gadget` is hard deleted and belongs to a widget, which also gives it an
//! extra `widget` topic scope.

use std::fmt;

use core_kernel::{BranchId, EntityId, OrganizationId};
use serde::Serialize;
use uuid::Uuid;

use crate::entity::{Association, AssociationKind, Audit, DeletePolicy, Entity, Schema, SoftDelete};
use crate::error::StorageError;
use crate::topic::TopicScope;
use crate::value::{FieldValue, FromField, Record};

macro_rules! fixture_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(Uuid);

        impl EntityId for $name {
            fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            fn generate() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for FieldValue {
            fn from(id: $name) -> Self {
                FieldValue::id(id)
            }
        }

        impl FromField for $name {
            fn from_field(value: &FieldValue) -> Option<Self> {
                Uuid::from_field(value).map(Self)
            }
        }
    };
}

fixture_id!(WidgetId);
fixture_id!(GadgetId);

pub static WIDGET_SCHEMA: Schema = Schema {
    name: "widget",
    table: "widgets",
    columns: &["organization_id", "branch_id", "name", "code", "size"],
    unique: &["code"],
    associations: &[Association {
        name: "Parts",
        kind: AssociationKind::HasMany {
            foreign_key: "widget_id",
        },
        target: gadget_schema,
    }],
    delete_policy: DeletePolicy::Soft,
};

pub static GADGET_SCHEMA: Schema = Schema {
    name: "gadget",
    table: "gadgets",
    columns: &["widget_id", "label"],
    unique: &[],
    associations: &[Association {
        name: "Widget",
        kind: AssociationKind::BelongsTo {
            foreign_key: "widget_id",
        },
        target: widget_schema,
    }],
    delete_policy: DeletePolicy::Hard,
};

fn widget_schema() -> &'static Schema {
    &WIDGET_SCHEMA
}

fn gadget_schema() -> &'static Schema {
    &GADGET_SCHEMA
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Widget {
    pub id: WidgetId,
    pub organization_id: Option<OrganizationId>,
    pub branch_id: Option<BranchId>,
    pub name: String,
    pub code: String,
    pub size: i64,
    pub audit: Audit,
    pub deletion: SoftDelete,
    pub parts: Vec<Gadget>,
}

impl Widget {
    pub fn new(name: &str, code: &str, size: i64) -> Self {
        Self {
            name: name.to_string(),
            code: code.to_string(),
            size,
            ..Self::default()
        }
    }

    pub fn scoped(mut self, organization_id: OrganizationId, branch_id: BranchId) -> Self {
        self.organization_id = Some(organization_id);
        self.branch_id = Some(branch_id);
        self
    }
}

impl Entity for Widget {
    type Id = WidgetId;

    fn schema() -> &'static Schema {
        &WIDGET_SCHEMA
    }

    fn id(&self) -> WidgetId {
        self.id
    }

    fn set_id(&mut self, id: WidgetId) {
        self.id = id;
    }

    fn audit(&self) -> &Audit {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut Audit {
        &mut self.audit
    }

    fn organization_id(&self) -> Option<OrganizationId> {
        self.organization_id
    }

    fn branch_id(&self) -> Option<BranchId> {
        self.branch_id
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("id", self.id)
            .with("organization_id", self.organization_id)
            .with("branch_id", self.branch_id)
            .with("name", self.name.as_str())
            .with("code", self.code.as_str())
            .with("size", self.size);
        self.audit.write(&mut record);
        self.deletion.write(&mut record);
        record
    }

    fn from_record(record: &Record) -> Result<Self, StorageError> {
        Ok(Self {
            id: record.get("id")?,
            organization_id: record.get("organization_id")?,
            branch_id: record.get("branch_id")?,
            name: record.get("name")?,
            code: record.get("code")?,
            size: record.get("size")?,
            audit: Audit::read(record)?,
            deletion: SoftDelete::read(record)?,
            parts: record.nested_many("Parts")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gadget {
    pub id: GadgetId,
    pub widget_id: Option<WidgetId>,
    pub label: String,
    pub audit: Audit,
    pub widget: Option<Box<Widget>>,
}

impl Gadget {
    pub fn new(widget_id: WidgetId, label: &str) -> Self {
        Self {
            widget_id: Some(widget_id),
            label: label.to_string(),
            ..Self::default()
        }
    }
}

impl Entity for Gadget {
    type Id = GadgetId;

    fn schema() -> &'static Schema {
        &GADGET_SCHEMA
    }

    fn id(&self) -> GadgetId {
        self.id
    }

    fn set_id(&mut self, id: GadgetId) {
        self.id = id;
    }

    fn audit(&self) -> &Audit {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut Audit {
        &mut self.audit
    }

    fn topic_scopes(&self) -> Vec<TopicScope> {
        self.widget_id
            .map(|id| TopicScope::new("widget", id))
            .into_iter()
            .collect()
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("id", self.id)
            .with("widget_id", self.widget_id)
            .with("label", self.label.as_str());
        self.audit.write(&mut record);
        record
    }

    fn from_record(record: &Record) -> Result<Self, StorageError> {
        Ok(Self {
            id: record.get("id")?,
            widget_id: record.get("widget_id")?,
            label: record.get("label")?,
            audit: Audit::read(record)?,
            widget: record.nested("Widget")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetResponse {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub part_labels: Vec<String>,
}

pub fn widget_response(widget: &Widget) -> WidgetResponse {
    WidgetResponse {
        id: widget.uuid(),
        name: widget.name.clone(),
        code: widget.code.clone(),
        part_labels: widget.parts.iter().map(|p| p.label.clone()).collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GadgetResponse {
    pub id: Uuid,
    pub label: String,
    pub widget: Option<WidgetResponse>,
}

pub fn gadget_response(gadget: &Gadget) -> GadgetResponse {
    GadgetResponse {
        id: gadget.uuid(),
        label: gadget.label.clone(),
        widget: crate::projector::project_one(gadget.widget.as_deref(), widget_response),
    }
}
