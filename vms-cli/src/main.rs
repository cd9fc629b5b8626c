use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use vms_rbac::{
    Action, ConfigLoader, InMemoryRuleRepository, PolicyEvaluator, Principal, RbacConfig,
    Role, RuleDto, RuleStore, SessionGuard, UserId,
};

mod cli;

use cli::{Cli, Commands, PrincipalArgs};

/// Initialize tracing with environment variable override support.
/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_tracing(log_level: Option<&String>) -> Result<()> {
    let env_filter = match log_level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level '{}', falling back to 'info'", level);
            EnvFilter::new("info")
        }),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    debug!("Tracing initialized");
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<RbacConfig> {
    let config = ConfigLoader::new().load(path).with_context(|| match path {
        Some(path) => format!("Failed to load config from {}", path.display()),
        None => "Failed to load config from environment".to_string(),
    })?;
    debug!(seed_rules = config.seed_rules.len(), "Configuration loaded");
    Ok(config)
}

fn parse_principal(args: &PrincipalArgs) -> Result<Principal> {
    let role: Role = args.role.parse().context("Invalid --role")?;
    let principal = Principal::from_parts(
        UserId::new(args.id.as_str()),
        role,
        args.company.as_deref().map(UserId::new),
    )
    .context("Invalid principal")?;
    Ok(principal)
}

async fn build_guard(config: &RbacConfig) -> Result<SessionGuard> {
    let repository = Arc::new(InMemoryRuleRepository::new());
    let store = RuleStore::seeded(repository, config)
        .await
        .context("Failed to seed rule store")?;
    let evaluator = PolicyEvaluator::new(store).with_audit(config.audit_decisions);
    Ok(SessionGuard::new(evaluator))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_ref())?;

    let config = load_config(cli.config.as_ref())?;

    match &cli.command {
        Commands::Check {
            principal,
            resource,
            action,
        } => {
            let principal = parse_principal(principal)?;
            let action: Action = action.parse().context("Invalid --action")?;
            let guard = build_guard(&config).await?;

            let decision = guard.authorize(Some(&principal), resource, action).await;
            print_json(&decision)?;
        }
        Commands::Nav { principal } => {
            let principal = parse_principal(principal)?;
            let guard = build_guard(&config).await?;

            let access = guard.screen_access(Some(&principal)).await?;
            print_json(&access)?;
        }
        Commands::Rules => {
            let guard = build_guard(&config).await?;
            let rules: Vec<RuleDto> = guard
                .evaluator()
                .store()
                .list()
                .await
                .iter()
                .map(RuleDto::from)
                .collect();
            print_json(&rules)?;
        }
        Commands::ValidateConfig => {
            info!(
                rules = config.seed_rules.len(),
                refresh_interval = config.snapshot.refresh_interval.as_secs(),
                max_staleness = config.snapshot.max_staleness.as_secs(),
                fetch_timeout = config.snapshot.fetch_timeout.as_secs(),
                "Configuration is valid"
            );
            println!("Configuration is valid ({} seed rules)", config.seed_rules.len());
        }
    }

    Ok(())
}
