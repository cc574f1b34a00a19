//! # Command Line Interface
//!
//! Operator commands for inspecting tenant secrets.

use crate::errors::Result;
use crate::secrets::{SecretService, SecretValue, SecretsError};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tenant-secrets")]
#[command(about = "Inspect tenant secrets stored in Vault")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (YAML, TOML or JSON)
    #[arg(short, long, env = "TENANT_SECRETS_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// List tenants that have secrets
    List,

    /// Print a single secret value
    Get {
        /// Tenant identifier
        tenant: String,

        /// Secret key, e.g. DATABASE_HOST
        key: String,
    },

    /// Print a tenant's secrets as JSON
    Show {
        /// Tenant identifier
        tenant: String,

        /// Keys to include (all keys when omitted)
        keys: Vec<String>,
    },
}

/// Execute `command` against `service`, writing results to `out`.
pub async fn run_command<W: Write>(
    service: &SecretService,
    command: &Commands,
    out: &mut W,
) -> Result<()> {
    match command {
        Commands::List => {
            let mut tenants = service.list().await?;
            tenants.sort();
            for tenant in tenants {
                writeln!(out, "{}", tenant)?;
            }
        }
        Commands::Get { tenant, key } => {
            let value = service.get_secret(tenant, key).await?.ok_or_else(|| {
                SecretsError::not_found(format!("secret '{}' for tenant '{}'", key, tenant))
            })?;
            writeln!(out, "{}", value.to_plain_string())?;
        }
        Commands::Show { tenant, keys } => {
            let secrets: BTreeMap<String, SecretValue> = if keys.is_empty() {
                service.get_bundle(tenant).await?.into_iter().collect()
            } else {
                service.get_secrets(tenant, keys.as_slice()).await?.into_iter().collect()
            };
            let rendered = serde_json::to_string_pretty(&secrets).map_err(SecretsError::from)?;
            writeln!(out, "{}", rendered)?;
        }
    }
    Ok(())
}
