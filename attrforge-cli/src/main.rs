//! attrforge CLI
//!
//! Operator tool over the attrforge core: fetch tokens, resolve client
//! secrets, run authenticated queries and try out key case conversion.
//!
//! # Usage
//!
//! ```bash
//! # Print a bearer token for the API client
//! attrforge token
//!
//! # Token status of the identity-provider admin account, as JSON
//! attrforge token --secondary --format json
//!
//! # Look up a client's secret through the identity provider
//! attrforge client-secret eda
//!
//! # Authenticated GET with query filters
//! attrforge get /apps/vmware.eda.nokia.com/v1/instances -q namespace=eda
//!
//! # Case conversion
//! attrforge case camel pool_ipv4
//! ```
//!
//! Settings come from `--config`, the default config file and the
//! `BASE_URL`, `REALM`, `CLIENT_ID`, ... environment variables.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use attrforge_core::{ApiClient, CaseConverter, ClientConfig, GrantKind, Params};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "attrforge")]
#[command(about = "Attribute marshalling and credential tooling for the EDA API")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the per-user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Obtain an access token
    Token {
        /// Use the identity-provider admin credential instead of the API client
        #[arg(long)]
        secondary: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Resolve a client secret through the identity provider
    ClientSecret {
        /// Client identifier (e.g., eda)
        client_id: String,
    },

    /// Authenticated GET request
    Get {
        /// Request path, relative to the base URL
        path: String,

        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },

    /// Convert a name between snake_case and lowerCamelCase
    Case {
        /// Target casing
        #[arg(value_enum)]
        to: Casing,

        /// Name to convert
        name: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum Casing {
    Camel,
    Snake,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Token { secondary, format } => {
            let kind = if secondary {
                GrantKind::Secondary
            } else {
                GrantKind::Primary
            };
            get_token(cli.config, kind, format).await
        }
        Commands::ClientSecret { client_id } => client_secret(cli.config, &client_id).await,
        Commands::Get { path, query } => get(cli.config, &path, query).await,
        Commands::Case { to, name } => {
            convert_case(to, &name);
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<ClientConfig> {
    ClientConfig::load(path.as_deref()).with_context(|| match path {
        Some(path) => format!("Failed to load configuration from {:?}", path),
        None => "Failed to load configuration".to_string(),
    })
}

async fn connect(path: Option<PathBuf>) -> Result<ApiClient> {
    let config = load_config(path)?;
    tracing::debug!(base_url = %config.base_url, realm = %config.realm, "connecting");
    ApiClient::connect(&config)
        .await
        .with_context(|| format!("Failed to connect to {}", config.base_url))
}

async fn get_token(config: Option<PathBuf>, kind: GrantKind, format: Format) -> Result<()> {
    let client = connect(config).await?;
    let credentials = client.credentials();
    let token = credentials
        .get_access_token(kind)
        .await
        .with_context(|| format!("Failed to obtain {} token", kind))?;

    match format {
        Format::Text => println!("{}", token.expose()),
        Format::Json => {
            let info = credentials.token_info(kind).await;
            let output = serde_json::json!({
                "access_token": token.expose(),
                "info": info,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

async fn client_secret(config: Option<PathBuf>, client_id: &str) -> Result<()> {
    let client = connect(config).await?;
    let secret = client
        .credentials()
        .resolve_client_secret(client_id)
        .await
        .with_context(|| format!("Failed to resolve secret for client {}", client_id))?;
    println!("{}", secret.expose());
    Ok(())
}

async fn get(config: Option<PathBuf>, path: &str, query: Vec<(String, String)>) -> Result<()> {
    let client = connect(config).await?;
    let query: Params = query.into_iter().collect();
    let body = client
        .get_by_query(path, &Params::new(), &query)
        .await
        .with_context(|| format!("GET {} failed", path))?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn convert_case(to: Casing, name: &str) {
    let converter = CaseConverter::standard();
    let converted = match to {
        Casing::Camel => converter.to_lower_camel(name),
        Casing::Snake => converter.to_separated(name),
    };
    println!("{}", converted);
}

fn parse_key_value(raw: &str) -> Result<(String, String)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("expected key=value, got '{}'", raw);
    };
    if key.is_empty() {
        bail!("empty key in '{}'", raw);
    }
    Ok((key.to_string(), value.to_string()))
}
