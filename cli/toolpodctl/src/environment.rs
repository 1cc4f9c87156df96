//! Ambient identity read from the process environment.
//!
//! Read once at startup and handed to the composer as a `ComposeContext`;
//! nothing below the front end touches the environment.

use toolpod_manifest::ComposeContext;

use crate::error::CliError;

/// Prefix of tool account user names (`tools.<tenant>`).
const TOOL_ACCOUNT_PREFIX: &str = "tools.";

/// Tenant identity and home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub home: String,
    pub tenant: String,
}

impl Environment {
    /// Read from the process environment.
    ///
    /// `tenant` overrides the tenant derived from `$USER`.
    pub fn from_env(tenant: Option<String>) -> Result<Self, CliError> {
        Self::from_lookup(tenant, |key| std::env::var(key).ok())
    }

    /// Resolve using an arbitrary variable lookup.
    pub fn from_lookup<F>(tenant: Option<String>, lookup: F) -> Result<Self, CliError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = lookup("HOME")
            .filter(|h| !h.is_empty())
            .ok_or(CliError::MissingEnvironment("HOME"))?;

        let tenant = match tenant.filter(|t| !t.trim().is_empty()) {
            Some(tenant) => tenant.trim().to_string(),
            None => lookup("USER")
                .map(|user| {
                    user.strip_prefix(TOOL_ACCOUNT_PREFIX)
                        .unwrap_or(user.as_str())
                        .to_string()
                })
                .filter(|t| !t.is_empty())
                .ok_or(CliError::MissingEnvironment("USER"))?,
        };

        Ok(Self { home, tenant })
    }

    /// Composer context for this identity.
    pub fn compose_context(&self) -> ComposeContext {
        ComposeContext::new(&self.tenant, self.home.clone())
    }
}
