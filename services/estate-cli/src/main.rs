//! Estate CLI
//!
//! Command-line front end for the estate API:
//! 1. Loads config (file, env overlay) and the persisted credential pair
//! 2. Restores the session before protected commands
//! 3. Runs one command and prints its result as JSON on stdout
//!
//! Logs go to stderr as JSON, quiet by default (`LOG_LEVEL=debug` for more).

mod config;
mod metrics;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use estate_auth::{FileCredentialStore, RegisterRequest};
use estate_client::{ApiClient, AuthSessionManager, NewHolding, SearchFilters};

use crate::config::Config;

/// Env var read for the password before falling back to stdin
const PASSWORD_ENV: &str = "ESTATE_PASSWORD";

#[derive(Debug, Parser)]
#[command(name = "estate", version, about = "Command-line client for the estate API")]
struct Cli {
    /// Config file (default: $ESTATE_CONFIG, then ./estate.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print Prometheus metrics to stderr on exit
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in; the password is read from ESTATE_PASSWORD or stdin
    Login { email: String },
    /// Create an account and log in
    Register {
        email: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Show the logged-in user
    Whoami,
    /// End the session
    Logout,
    /// Search properties
    Search {
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        max_price: Option<u64>,
        #[arg(long)]
        min_score: Option<f64>,
        #[arg(long)]
        page: Option<u32>,
    },
    /// Show one property
    Property { id: u64 },
    /// Manage the portfolio
    Portfolio {
        #[command(subcommand)]
        action: PortfolioCommand,
    },
}

#[derive(Debug, Subcommand)]
enum PortfolioCommand {
    List,
    Add {
        property_id: u64,
        /// Price paid
        #[arg(long)]
        price: Option<u64>,
    },
    Remove { id: u64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let prometheus = if cli.metrics {
        Some(metrics::install_recorder()?)
    } else {
        None
    };

    let source = Config::resolve_path(cli.config.as_deref());
    let config = Config::load_from(&source)
        .with_context(|| format!("failed to load config from {}", source.path.display()))?;
    debug!(path = %source.path.display(), base_url = %config.api.base_url, "config loaded");

    let credentials_path = config.credentials_path();
    let store = FileCredentialStore::load(credentials_path.clone()).with_context(|| {
        format!(
            "failed to load credentials from {}",
            credentials_path.display()
        )
    })?;
    let client = ApiClient::new(&config.client_config(), Arc::new(store))
        .context("failed to build API client")?;

    let result = run(&client, cli.command).await;

    if let Some(handle) = prometheus {
        eprint!("{}", handle.render());
    }
    result
}

async fn run(client: &ApiClient, command: Command) -> Result<()> {
    let session: AuthSessionManager<Value> = client.session();

    match command {
        Command::Login { email } => {
            let password = read_password()?;
            let profile = session.login(&email, &password).await?;
            info!("logged in");
            print_json(&profile)
        }
        Command::Register { email, name } => {
            let request = RegisterRequest {
                email,
                password: read_password()?.into(),
                name,
            };
            let profile = session.register(&request).await?;
            print_json(&profile)
        }
        Command::Whoami => {
            let profile = require_session(&session).await?;
            print_json(&profile)
        }
        Command::Logout => {
            session.logout().await;
            print_json(&serde_json::json!({"logged_out": true}))
        }
        Command::Search {
            city,
            max_price,
            min_score,
            page,
        } => {
            require_session(&session).await?;
            let filters = SearchFilters {
                city,
                max_price,
                min_score,
                page,
            };
            print_json(&client.properties().search(&filters).await?)
        }
        Command::Property { id } => {
            require_session(&session).await?;
            print_json(&client.properties().get(id).await?)
        }
        Command::Portfolio { action } => {
            require_session(&session).await?;
            let portfolio = client.portfolio();
            match action {
                PortfolioCommand::List => print_json(&portfolio.list().await?),
                PortfolioCommand::Add { property_id, price } => {
                    let holding = NewHolding {
                        property: property_id,
                        purchase_price: price,
                    };
                    print_json(&portfolio.add(&holding).await?)
                }
                PortfolioCommand::Remove { id } => {
                    portfolio.remove(id).await?;
                    print_json(&serde_json::json!({"removed": id}))
                }
            }
        }
    }
}

/// Restore the persisted session, failing when there is none.
async fn require_session(session: &AuthSessionManager<Value>) -> Result<Value> {
    match session
        .restore_session()
        .await
        .context("failed to restore session")?
    {
        Some(profile) => Ok(profile),
        None => bail!("not logged in, run `estate login <email>` first"),
    }
}

fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    eprint!("Password: ");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']).to_owned();
    if password.is_empty() {
        bail!("empty password; set {PASSWORD_ENV} or pipe it on stdin");
    }
    Ok(password)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{out}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_search_filters() {
        let cli = Cli::try_parse_from([
            "estate",
            "search",
            "--city",
            "Porto",
            "--max-price",
            "250000",
            "--min-score",
            "7.5",
        ])
        .unwrap();
        match cli.command {
            Command::Search {
                city,
                max_price,
                min_score,
                page,
            } => {
                assert_eq!(city.as_deref(), Some("Porto"));
                assert_eq!(max_price, Some(250_000));
                assert_eq!(min_score, Some(7.5));
                assert!(page.is_none());
            }
            other => panic!("expected search, got {other:?}"),
        }
    }

    #[test]
    fn parses_portfolio_add_with_global_config() {
        let cli = Cli::try_parse_from([
            "estate",
            "portfolio",
            "add",
            "42",
            "--price",
            "199000",
            "--config",
            "/etc/estate.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/estate.toml")));
        match cli.command {
            Command::Portfolio {
                action: PortfolioCommand::Add { property_id, price },
            } => {
                assert_eq!(property_id, 42);
                assert_eq!(price, Some(199_000));
            }
            other => panic!("expected portfolio add, got {other:?}"),
        }
    }

    #[test]
    fn login_requires_email() {
        assert!(Cli::try_parse_from(["estate", "login"]).is_err());
    }
}
