//! Seeder configuration

use serde::Deserialize;

use crate::seed::OrganizationSeed;

/// Settings for the `coop-seed` binary
///
/// Loaded from `SEED_*` environment variables; the database settings are
/// read separately through `infra_registry::StoreConfig`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SeedConfig {
    pub organization_name: String,
    pub organization_email: String,
    pub branch_name: String,
    pub branch_code: String,
    pub log_level: String,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            organization_name: "Demo Cooperative".to_string(),
            organization_email: "admin@demo.coop".to_string(),
            branch_name: "Main Branch".to_string(),
            branch_code: "MAIN".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl SeedConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(config::Environment::with_prefix("SEED"))
    }

    pub fn from_source<S>(source: S) -> Result<Self, config::ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let defaults = Self::default();
        config::Config::builder()
            .set_default("organization_name", defaults.organization_name)?
            .set_default("organization_email", defaults.organization_email)?
            .set_default("branch_name", defaults.branch_name)?
            .set_default("branch_code", defaults.branch_code)?
            .set_default("log_level", defaults.log_level)?
            .add_source(source)
            .build()?
            .try_deserialize()
    }

    /// The organization and branch this configuration describes
    pub fn organization(&self) -> OrganizationSeed {
        OrganizationSeed {
            name: self.organization_name.clone(),
            email: self.organization_email.clone(),
            branch_name: self.branch_name.clone(),
            branch_code: self.branch_code.clone(),
        }
    }
}
