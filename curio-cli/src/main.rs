//! Curio CLI
//!
//! Command-line interface for the curated feed and its resolvers.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use curio_api::{ApiConfig, ApiServer, AppState};
use curio_feed::HydrateSource;
use curio_gateway::MetadataClient;

/// Curio - curated feed aggregation
#[derive(Parser)]
#[command(name = "curio")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON-RPC endpoint for ledger reads
    #[arg(long, global = true, env = "CURIO_RPC_URL")]
    rpc_url: Option<String>,

    /// JSON file backing the durable cache
    #[arg(long, global = true, env = "CURIO_STORE_PATH")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load feed pages and print the items
    Feed {
        /// Number of windows to load
        #[arg(short, long, default_value = "1")]
        pages: usize,
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve display names for addresses
    Identity {
        /// Addresses to resolve
        #[arg(required = true)]
        addresses: Vec<String>,
    },

    /// Resolve the author of a contract
    Owner {
        /// Contract address
        contract: String,
    },

    /// Fetch and parse a metadata document
    Metadata {
        /// Document URI (ipfs://, ar://, https://, data:)
        uri: String,
    },

    /// Run the API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3001")]
        port: u16,
        /// Bind address
        #[arg(short, long, default_value = "0.0.0.0")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "curio=debug,info"
    } else {
        "curio=info,warn"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ApiConfig::from_env();
    if let Some(url) = cli.rpc_url {
        config.rpc_url = url;
    }
    if cli.store.is_some() {
        config.store_path = cli.store;
    }

    match cli.command {
        Commands::Feed { pages, json } => cmd_feed(config, pages, json).await,
        Commands::Identity { addresses } => cmd_identity(config, &addresses).await,
        Commands::Owner { contract } => cmd_owner(config, &contract).await,
        Commands::Metadata { uri } => cmd_metadata(config, &uri).await,
        Commands::Serve { port, bind } => cmd_serve(config, port, &bind).await,
    }
}

async fn build_state(config: ApiConfig) -> Result<AppState> {
    AppState::from_config(config)
        .await
        .context("Failed to initialise services")
}

/// Load feed windows
async fn cmd_feed(config: ApiConfig, pages: usize, json: bool) -> Result<()> {
    println!("{}", "🖼️  Loading feed...".cyan().bold());

    let state = build_state(config).await?;
    let feed = &state.feed;

    match feed.hydrate().await {
        HydrateSource::Restored => println!("   Restored saved feed state"),
        HydrateSource::Fetched => println!("   Fetched {} candidates", feed.snapshot().total),
    }

    let pb = ProgressBar::new(pages as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    for _ in 0..pages {
        if !feed.has_more() {
            break;
        }
        let report = feed.load_more().await;
        debug!(?report, "Window loaded");
        pb.set_message(format!("{} items", feed.len()));
        pb.inc(1);
    }
    pb.finish_with_message("done");

    let retry = feed.process_failures().await;
    if !retry.skipped && retry.retried > 0 {
        println!(
            "   {} {} recovered, {} still pending",
            "Retried failures:".dimmed(),
            retry.recovered,
            retry.pending
        );
    }

    state.flush().await;

    let snapshot = feed.snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    if snapshot.items.is_empty() {
        println!("\n{}", "⚠️  No items loaded.".yellow());
    } else {
        println!("\n{} {} item(s):", "✅".green(), snapshot.items.len());
        for item in &snapshot.items {
            println!("   {} {}", item.name.bold(), format!("by {}", item.author_display_name).dimmed());
            println!("      {}", item.image_url.dimmed());
        }
    }

    println!(
        "\n   {} {}/{}",
        "Cursor:".dimmed(),
        snapshot.cursor,
        snapshot.total
    );
    if snapshot.pending_failures > 0 {
        println!("   {} {}", "Pending failures:".yellow(), snapshot.pending_failures);
    }

    Ok(())
}

/// Resolve display names
async fn cmd_identity(config: ApiConfig, addresses: &[String]) -> Result<()> {
    println!("{} {} address(es)", "🔍 Resolving".cyan().bold(), addresses.len());

    let state = build_state(config).await?;
    let names = state.identities.resolve_many(addresses).await;
    state.flush().await;

    let mut rows: Vec<_> = names.into_iter().collect();
    rows.sort();
    for (address, name) in rows {
        println!("   {} {}", address.dimmed(), name.green());
    }

    Ok(())
}

/// Resolve contract author
async fn cmd_owner(config: ApiConfig, contract: &str) -> Result<()> {
    println!("{} {}", "🔍 Resolving owner of:".cyan().bold(), contract);

    let state = build_state(config).await?;
    let owner = state
        .owners
        .resolve_owner(contract)
        .await
        .context("Failed to resolve owner")?;
    let name = state.identities.resolve_one(&owner).await;
    state.flush().await;

    println!("\n{}", "✅ Owner:".green().bold());
    println!("   {} {}", "Address:".yellow(), owner);
    println!("   {} {}", "Name:".dimmed(), name);

    Ok(())
}

/// Fetch metadata
async fn cmd_metadata(config: ApiConfig, uri: &str) -> Result<()> {
    println!("{} {}", "📄 Fetching:".cyan().bold(), uri);

    let client = MetadataClient::with_config(config.gateway_config())?;
    let metadata = client
        .fetch_metadata(uri)
        .await
        .context("Failed to fetch metadata")?;

    println!("{}", serde_json::to_string_pretty(&metadata)?);
    if let Some(image) = metadata.image.as_deref() {
        println!("\n   {} {}", "Display image:".dimmed(), client.display_image_url(image));
    }

    Ok(())
}

/// Run API server
async fn cmd_serve(config: ApiConfig, port: u16, bind: &str) -> Result<()> {
    println!("{}", "🚀 Starting Curio API server...".cyan().bold());
    println!("   {} http://{}:{}", "Listening on:".green(), bind, port);
    println!("   {} http://{}:{}/health", "Health check:".dimmed(), bind, port);
    println!("\n   Press Ctrl+C to stop.\n");

    let server = ApiServer::new(build_state(config).await?);

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    server.run(addr).await?;

    Ok(())
}
