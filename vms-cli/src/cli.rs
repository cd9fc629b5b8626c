//! CLI argument parsing definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Inspect visitor-management access rules", long_about = None)]
pub struct Cli {
    /// Path to RBAC configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decide whether a principal may perform an action on a resource
    Check {
        #[command(flatten)]
        principal: PrincipalArgs,

        /// Resource name (dashboard, users, access-control, visitors, analytics, settings)
        #[arg(long, value_name = "NAME")]
        resource: String,

        /// Action: read or write
        #[arg(long, value_name = "ACTION", default_value = "read")]
        action: String,
    },

    /// Show the sidebar and allowed actions for a principal
    Nav {
        #[command(flatten)]
        principal: PrincipalArgs,
    },

    /// List the rules loaded from configuration
    Rules,

    /// Validate a configuration file and exit
    ValidateConfig,
}

#[derive(Args)]
pub struct PrincipalArgs {
    /// Principal role: admin, company or receptionist
    #[arg(long, value_name = "ROLE")]
    pub role: String,

    /// Principal id
    #[arg(long, value_name = "ID")]
    pub id: String,

    /// Owning company id (required for receptionists)
    #[arg(long, value_name = "ID")]
    pub company: Option<String>,
}
