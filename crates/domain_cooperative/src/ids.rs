//! Identifiers of the cooperative entities
//!
//! Tenant and actor ids live in `core_kernel`; the ids below belong to this
//! domain and carry their own record conversions.

use std::fmt;

use core_kernel::EntityId;
use infra_registry::{FieldValue, FromField};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! cooperative_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Returns the identifier prefix for display
            pub fn prefix() -> &'static str {
                $prefix
            }
        }

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
                write!(f, "{}-{}", $prefix, self.0)
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

cooperative_id!(MemberProfileId, "MBR");
cooperative_id!(AccountId, "ACC");
cooperative_id!(InvitationCodeId, "INV");
