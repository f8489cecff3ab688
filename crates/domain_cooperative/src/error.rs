//! Cooperative domain errors
//!
//! Registry failures pass through unchanged inside [`CoopError::Registry`];
//! the remaining variants are business rule violations raised by the domain
//! modules themselves.

use chrono::{DateTime, Utc};
use infra_registry::RegistryError;
use thiserror::Error;

/// Errors that can occur in the cooperative domain
#[derive(Debug, Error)]
pub enum CoopError {
    /// Storage, locking, transaction or notification failure
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The invitation code is past its expiration date
    #[error("Invitation code {code} expired at {expired_at}")]
    InvitationExpired {
        code: String,
        expired_at: DateTime<Utc>,
    },

    /// Every allowed use of the invitation code has been consumed
    #[error("Invitation code {code} reached its maximum of {max_use} uses")]
    MaxUsesReached { code: String, max_use: i64 },

    /// No invitation code matches the given value
    #[error("Invalid invitation code: {0}")]
    InvalidCode(String),

    /// A request failed validation before reaching the registry
    #[error("Validation failed: {0}")]
    Validation(String),
}

impl CoopError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoopError::Validation(message.into())
    }

    /// The wrapped registry error, if any
    pub fn registry(&self) -> Option<&RegistryError> {
        match self {
            CoopError::Registry(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.registry().is_some_and(RegistryError::is_not_found)
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, CoopError::InvitationExpired { .. })
    }

    pub fn is_max_uses_reached(&self) -> bool {
        matches!(self, CoopError::MaxUsesReached { .. })
    }

    pub fn is_invalid_code(&self) -> bool {
        matches!(self, CoopError::InvalidCode(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, CoopError::Validation(_))
    }
}

impl From<validator::ValidationErrors> for CoopError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errors)| {
                let codes: Vec<&str> = errors.iter().map(|e| &*e.code).collect();
                format!("{} ({})", field, codes.join(", "))
            })
            .collect();
        fields.sort();
        CoopError::Validation(fields.join("; "))
    }
}
