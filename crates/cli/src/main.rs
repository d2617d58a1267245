//! apclient command line entry point.

use std::{
    io::{self, Read as _},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use apclient_common::{Config, KeyAlgorithm, generate_keypair};
use apclient_federation::{
    C2S, ClientConfig, FederationClient, SharedTransport, authorize, http_client,
};
use apclient_vocab::{Iri, Item};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "apclient")]
#[command(about = "Fetch and submit ActivityPub documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file. Without it `config/default.toml` and
    /// `config/$APCLIENT_ENV.toml` are read when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Dereference an IRI and print the document.
    Fetch {
        iri: String,

        /// Authorize as this actor (C2S) instead of signing.
        #[arg(long = "as", value_name = "ACTOR")]
        as_actor: Option<String>,
    },

    /// Submit a document to an inbox or outbox.
    Submit {
        target: String,

        /// JSON document to send, `-` for standard input.
        file: PathBuf,

        /// Authorize as this actor (C2S) instead of signing.
        #[arg(long = "as", value_name = "ACTOR")]
        as_actor: Option<String>,
    },

    /// Obtain a C2S token for an actor and print it.
    Authorize { actor: String },

    /// Generate a signing key pair.
    Keygen {
        #[arg(long, default_value = "rsa")]
        algorithm: KeyAlgorithm,

        /// Where to write the private key. The public key goes to stdout.
        #[arg(long)]
        out: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "apclient=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    };
    config.context("Failed to load configuration")
}

fn base(config: &Config) -> Result<SharedTransport> {
    Ok(Arc::new(http_client(&config.http)?))
}

async fn session(config: &Config, actor: &str) -> Result<C2S> {
    let client = ClientConfig::from_config(&config.http, &config.oauth);
    let session = authorize(base(config)?, actor, client)
        .await
        .with_context(|| format!("Failed to authorize as {actor}"))?;
    Ok(session)
}

/// Signed client from configuration, or one carrying a C2S token.
async fn client(config: &Config, as_actor: Option<&str>) -> Result<FederationClient> {
    let Some(actor) = as_actor else {
        return Ok(FederationClient::from_config(config).await?);
    };
    let session = session(config, actor).await?;
    let client = FederationClient::builder()
        .base(base(config)?)
        .http(config.http.clone())
        .cache(config.cache.clone())
        .dump_dir(config.debug.dump_dir.clone())
        .session(&session)
        .build()?;
    Ok(client)
}

fn print_item(item: &Item) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(item)?);
    Ok(())
}

async fn read_document(path: &Path) -> Result<Item> {
    let body = if path == Path::new("-") {
        let mut body = Vec::new();
        io::stdin().read_to_end(&mut body)?;
        body
    } else {
        tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?
    };
    Ok(apclient_vocab::decode(&body)?)
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Fetch { iri, as_actor } => {
            let config = load_config(cli.config.as_deref())?;
            let client = client(&config, as_actor.as_deref()).await?;
            match client.dereference(&Iri::from(iri.as_str())).await? {
                Some(item) => print_item(&item)?,
                None => info!(iri = %iri, "Empty response"),
            }
        }
        Command::Submit {
            target,
            file,
            as_actor,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let item = read_document(&file).await?;
            let client = client(&config, as_actor.as_deref()).await?;
            let submitted = client.submit(&Iri::from(target.as_str()), &item).await?;
            if let Some(location) = &submitted.location {
                info!(location = %location, "Submitted");
            }
            if let Some(item) = &submitted.item {
                print_item(item)?;
            }
        }
        Command::Authorize { actor } => {
            let config = load_config(cli.config.as_deref())?;
            let session = session(&config, &actor).await?;
            let token = session.token();
            let output = json!({
                "actor": session.id().as_str(),
                "access_token": token.access_token,
                "token_type": token.token_type,
                "refresh_token": token.refresh_token,
                "expires_at": token.expires_at,
                "proxy": session.proxy().map(Iri::as_str),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Keygen { algorithm, out } => {
            let keypair = generate_keypair(algorithm)?;
            tokio::fs::write(&out, &keypair.private_key_pem)
                .await
                .with_context(|| format!("Failed to write {}", out.display()))?;
            info!(algorithm = %algorithm, path = %out.display(), "Wrote private key");
            print!("{}", keypair.public_key_pem);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);
    run(cli).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_submit_as_actor() {
        let cli = Cli::try_parse_from([
            "apclient",
            "submit",
            "https://example.com/~jd/outbox",
            "note.json",
            "--as",
            "example.com/~jd",
        ])
        .unwrap();
        match cli.command {
            Command::Submit {
                target,
                file,
                as_actor,
            } => {
                assert_eq!(target, "https://example.com/~jd/outbox");
                assert_eq!(file, PathBuf::from("note.json"));
                assert_eq!(as_actor.as_deref(), Some("example.com/~jd"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_keygen_algorithm() {
        let cli = Cli::try_parse_from([
            "apclient",
            "keygen",
            "--algorithm",
            "ed25519",
            "--out",
            "key.pem",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Keygen {
                algorithm: KeyAlgorithm::Ed25519,
                ..
            }
        ));
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from([
            "apclient",
            "fetch",
            "https://example.com/notes/1",
            "--config",
            "local.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("local.toml")));
    }
}
