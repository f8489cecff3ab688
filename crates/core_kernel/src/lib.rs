//! Core Kernel - Foundational types for the cooperative back office
//!
//! This crate provides the building blocks shared by the registry and every
//! domain module:
//! - Strongly-typed identifiers for tenants and actors, and the `EntityId` trait
//! - The per-call operation context (actor, correlation id, deadline)
//! - Temporal helpers used to build reporting ranges

pub mod context;
pub mod identifiers;
pub mod temporal;

pub use context::OperationContext;
pub use identifiers::{BranchId, EntityId, OrganizationId, UserId};
pub use temporal::{month_range, TemporalError};
