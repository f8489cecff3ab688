//! Cooperative Domain - Back-Office Entities
//!
//! This crate defines the entities of a multi-tenant cooperative back office
//! on top of the generic registry in `infra_registry`. Every entity belongs
//! to an organization and, below that, usually to a branch; mutations
//! publish topics scoped to both so listeners can follow a single tenant.
//!
//! # Entities
//!
//! - **Organization**: the top-level tenant
//! - **Branch**: an office of an organization
//! - **MemberProfile**: a cooperative member, soft deleted
//! - **Account**: a node of the per-branch chart of accounts
//! - **InvitationCode**: a bounded-use code for onboarding members
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_cooperative::{invitation_code, Registries};
//!
//! let registries = Registries::new(store, dispatcher)?;
//! let redeemed = invitation_code::redeem(&registries.invitation_codes, &ctx, "JOIN-2024").await?;
//! assert!(redeemed.current_use <= redeemed.max_use);
//! ```

pub mod account;
pub mod branch;
pub mod config;
pub mod error;
pub mod ids;
pub mod invitation_code;
pub mod member_profile;
pub mod organization;
pub mod registries;
pub mod seed;

pub use account::{Account, AccountKind, AccountRegistry, AccountResponse, CreateAccountRequest};
pub use branch::{Branch, BranchRegistry, BranchResponse, CreateBranchRequest};
pub use config::SeedConfig;
pub use error::CoopError;
pub use ids::{AccountId, InvitationCodeId, MemberProfileId};
pub use invitation_code::{
    CreateInvitationCodeRequest, InvitationCode, InvitationCodeRegistry, InvitationCodeResponse,
};
pub use member_profile::{
    CreateMemberProfileRequest, MemberProfile, MemberProfileRegistry, MemberProfileResponse,
    MemberStatus,
};
pub use organization::{
    CreateOrganizationRequest, Organization, OrganizationRegistry, OrganizationResponse,
};
pub use registries::Registries;
pub use seed::{
    seed_default_accounts, seed_default_accounts_with_tx, seed_organization, DefaultAccount,
    OrganizationSeed, SeedReport, DEFAULT_CHART,
};
