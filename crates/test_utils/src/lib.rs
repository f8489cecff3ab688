//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! cooperative back-office test suite.
//!
//! # Modules
//!
//! - `dispatcher`: A dispatcher that records every notification
//! - `fixtures`: Pre-built tenants, actors and contexts
//! - `database`: PostgreSQL container management for integration tests
//! - `assertions`: Assertion helpers for registry results and topics
//! - `generators`: Property-based test data generators

pub mod assertions;
pub mod database;
pub mod dispatcher;
pub mod fixtures;
pub mod generators;

pub use assertions::*;
pub use database::*;
pub use dispatcher::*;
pub use fixtures::*;
pub use generators::*;
