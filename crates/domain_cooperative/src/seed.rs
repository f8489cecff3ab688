//! Idempotent seeding
//!
//! A new branch starts with a default chart of accounts. Seeding checks for
//! existing accounts first and does nothing when any are found, so it is
//! safe to run on every deployment.

use core_kernel::{BranchId, OperationContext, OrganizationId};
use infra_registry::{Filter, FilterSet, RegistryError, SortSet, Transaction};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, instrument};
use validator::Validate;

use crate::account::{Account, AccountKind};
use crate::branch::Branch;
use crate::error::CoopError;
use crate::ids::AccountId;
use crate::organization::Organization;
use crate::registries::Registries;

/// One entry of the default chart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultAccount {
    pub code: &'static str,
    pub name: &'static str,
    pub kind: AccountKind,
    /// Code of the parent entry, which always appears earlier in the chart
    pub parent: Option<&'static str>,
}

const fn entry(
    code: &'static str,
    name: &'static str,
    kind: AccountKind,
    parent: Option<&'static str>,
) -> DefaultAccount {
    DefaultAccount {
        code,
        name,
        kind,
        parent,
    }
}

/// The chart every new branch receives
pub const DEFAULT_CHART: &[DefaultAccount] = &[
    entry("1000", "Assets", AccountKind::Asset, None),
    entry("1010", "Cash on Hand", AccountKind::Asset, Some("1000")),
    entry("1020", "Cash in Bank", AccountKind::Asset, Some("1000")),
    entry("1100", "Loans Receivable", AccountKind::Asset, Some("1000")),
    entry("2000", "Liabilities", AccountKind::Liability, None),
    entry("2010", "Savings Deposits", AccountKind::Liability, Some("2000")),
    entry("2020", "Time Deposits", AccountKind::Liability, Some("2000")),
    entry("3000", "Equity", AccountKind::Equity, None),
    entry("3010", "Share Capital", AccountKind::Equity, Some("3000")),
    entry("3020", "Retained Earnings", AccountKind::Equity, Some("3000")),
    entry("4000", "Revenue", AccountKind::Revenue, None),
    entry("4010", "Interest Income on Loans", AccountKind::Revenue, Some("4000")),
    entry("4020", "Service Fees", AccountKind::Revenue, Some("4000")),
    entry("5000", "Expenses", AccountKind::Expense, None),
    entry("5010", "Interest Expense on Deposits", AccountKind::Expense, Some("5000")),
    entry("5020", "Salaries and Wages", AccountKind::Expense, Some("5000")),
];

/// What a seeding run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub organization_id: Option<OrganizationId>,
    pub branch_id: Option<BranchId>,
    pub organization_created: bool,
    pub branch_created: bool,
    pub accounts_created: usize,
}

impl SeedReport {
    /// True when the run found everything already in place
    pub fn is_noop(&self) -> bool {
        !self.organization_created && !self.branch_created && self.accounts_created == 0
    }
}

/// Organization and first branch to seed
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct OrganizationSeed {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 255))]
    pub branch_name: String,
    #[validate(length(min = 1, max = 32))]
    pub branch_code: String,
}

fn tenant_filters(organization_id: OrganizationId, branch_id: BranchId) -> FilterSet {
    FilterSet::new()
        .and(Filter::eq("organization_id", organization_id))
        .and(Filter::eq("branch_id", branch_id))
}

/// Creates the default chart for a branch unless it already has accounts
///
/// Runs in its own transaction; either the whole chart is created or none
/// of it.
#[instrument(skip(ctx, registries))]
pub async fn seed_default_accounts(
    ctx: &OperationContext,
    registries: &Registries,
    organization_id: OrganizationId,
    branch_id: BranchId,
) -> Result<usize, CoopError> {
    let mut tx = registries.start_transaction(ctx).await?;
    let outcome = seed_default_accounts_with_tx(ctx, registries, &mut tx, organization_id, branch_id).await;
    Ok(tx.finish(outcome).await?)
}

/// Creates the default chart inside a caller-owned transaction
///
/// Returns the number of accounts created, zero when the branch already
/// had accounts.
pub async fn seed_default_accounts_with_tx(
    ctx: &OperationContext,
    registries: &Registries,
    tx: &mut Transaction,
    organization_id: OrganizationId,
    branch_id: BranchId,
) -> Result<usize, RegistryError> {
    let existing = registries
        .accounts
        .count_with_tx(ctx, tx, tenant_filters(organization_id, branch_id))
        .await?;
    if existing >= 1 {
        info!(existing, "Accounts already seeded");
        return Ok(0);
    }

    let mut created: HashMap<&'static str, AccountId> = HashMap::new();
    for default in DEFAULT_CHART {
        let mut account = Account::new(
            organization_id,
            branch_id,
            default.code,
            default.name,
            default.kind,
        );
        if let Some(parent) = default.parent {
            let parent_id = created.get(parent).copied().ok_or_else(|| {
                RegistryError::configuration(format!(
                    "default account {} lists unknown parent {}",
                    default.code, parent
                ))
            })?;
            account = account.with_parent(parent_id);
        }
        let account = registries.accounts.create_with_tx(ctx, tx, account).await?;
        created.insert(default.code, account.id);
    }

    info!(accounts = created.len(), "Default chart of accounts seeded");
    Ok(created.len())
}

/// Ensures an organization, its branch and the branch's chart exist
///
/// Existing rows are matched by organization name and branch code and
/// reused. Everything happens in one transaction.
#[instrument(skip(ctx, registries, seed), fields(organization = %seed.name, branch = %seed.branch_code))]
pub async fn seed_organization(
    ctx: &OperationContext,
    registries: &Registries,
    seed: &OrganizationSeed,
) -> Result<SeedReport, CoopError> {
    seed.validate()?;
    let mut tx = registries.start_transaction(ctx).await?;
    let outcome = seed_organization_with_tx(ctx, registries, &mut tx, seed).await;
    let report = tx.finish(outcome).await?;
    info!(
        organization_created = report.organization_created,
        branch_created = report.branch_created,
        accounts_created = report.accounts_created,
        "Seeding finished"
    );
    Ok(report)
}

async fn seed_organization_with_tx(
    ctx: &OperationContext,
    registries: &Registries,
    tx: &mut Transaction,
    seed: &OrganizationSeed,
) -> Result<SeedReport, RegistryError> {
    let mut report = SeedReport::default();

    let by_name = FilterSet::new().and(Filter::eq("name", seed.name.as_str()));
    let organization = match registries
        .organizations
        .arr_find_one_with_tx(ctx, tx, by_name, SortSet::new(), &[])
        .await
    {
        Ok(existing) => existing,
        Err(error) if error.is_not_found() => {
            report.organization_created = true;
            registries
                .organizations
                .create_with_tx(ctx, tx, Organization::new(seed.name.as_str(), seed.email.as_str()))
                .await?
        }
        Err(error) => return Err(error),
    };

    let by_code = FilterSet::new()
        .and(Filter::eq("organization_id", organization.id))
        .and(Filter::eq("code", seed.branch_code.as_str()));
    let branch = match registries
        .branches
        .arr_find_one_with_tx(ctx, tx, by_code, SortSet::new(), &[])
        .await
    {
        Ok(existing) => existing,
        Err(error) if error.is_not_found() => {
            report.branch_created = true;
            let branch = Branch::new(organization.id, seed.branch_name.as_str(), seed.branch_code.as_str());
            registries.branches.create_with_tx(ctx, tx, branch).await?
        }
        Err(error) => return Err(error),
    };

    report.organization_id = Some(organization.id);
    report.branch_id = Some(branch.id);
    report.accounts_created =
        seed_default_accounts_with_tx(ctx, registries, tx, organization.id, branch.id).await?;
    Ok(report)
}
