//! Command-line interface for gemscribe.
//!
//! Drives the extraction workflow against an already-running,
//! already-authenticated browser: discover conversations through the search
//! page, extract them into raw/markdown/metadata artifacts, and analyze
//! what has been persisted.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use gemscribe::analysis::{self, Analyzer};
use gemscribe::extraction::{
    ExtractorConfig, ExtractorService, HandleKind, Locator, OutcomeStatus,
};
use gemscribe::server::AppState;
use gemscribe::start_server;

/// gemscribe - conversation history extraction over a live browser session
#[derive(Parser, Debug)]
#[command(name = "gemscribe")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Discover conversations through the site's search page
    Search {
        /// Query entered into the search input
        query: String,

        /// Maximum number of entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// List previously extracted conversations
    List,

    /// Extract a conversation by its address
    Extract {
        /// Conversation address
        url: String,

        /// Title override for artifact naming
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Discover by query and extract the first matching conversations
    Flow {
        /// Query entered into the search input
        query: String,

        /// How many discovered conversations to extract
        #[arg(short = 'n', long, default_value_t = 2)]
        count: usize,
    },

    /// Analyze previously extracted conversations
    Analyze {
        /// Emit the summary as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show or initialize configuration
    Config {
        /// Write a default config file instead of showing the current one
        #[arg(long)]
        init: bool,
    },

    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "GEMINI_SERVER_PORT")]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    let config = ExtractorConfig::load(cli.config.as_deref())
        .context("could not resolve configuration")?;

    match cli.command {
        Commands::Search { query, limit } => search(config, &query, limit).await,
        Commands::List => list(&config),
        Commands::Extract { url, title } => extract(config, &url, title.as_deref()).await,
        Commands::Flow { query, count } => flow(config, &query, count).await,
        Commands::Analyze { json } => analyze(&config, json),
        Commands::Config { init } => show_or_init_config(&config, cli.config.as_deref(), init),
        Commands::Serve { port } => serve(config, port).await,
    }
}

/// Run discovery and print the listing.
async fn search(config: ExtractorConfig, query: &str, limit: usize) -> anyhow::Result<()> {
    let service = ExtractorService::new(config);
    let handles = service.discover(Some(query)).await?;

    if handles.is_empty() {
        println!("No entries found for '{query}'.");
        println!("An empty result can also mean the site's markup changed.");
        return Ok(());
    }

    println!("Found {} entries for '{query}':", handles.len());
    for (index, handle) in handles.iter().take(limit).enumerate() {
        let tag = match handle.kind {
            HandleKind::Conversation => "conversation",
            HandleKind::Gem => "gem",
        };
        println!("  {}. [{tag}] {}", index + 1, handle.title);
        if let Locator::Url(url) = &handle.locator {
            println!("      {url}");
        }
    }
    Ok(())
}

/// Print previously extracted conversations.
fn list(config: &ExtractorConfig) -> anyhow::Result<()> {
    let extracts = analysis::list_extracts(&config.extraction.output_dir)?;

    if extracts.is_empty() {
        println!(
            "No extracted conversations in {}.",
            config.extraction.output_dir.display()
        );
        return Ok(());
    }

    println!("{} extracted conversations:", extracts.len());
    for entry in &extracts {
        println!(
            "  {}  {:>4} messages  {}",
            entry.extracted_at.format("%Y-%m-%d %H:%M:%S"),
            entry.message_count,
            entry.title,
        );
    }
    Ok(())
}

/// Extract one conversation and report its outcome.
async fn extract(config: ExtractorConfig, url: &str, title: Option<&str>) -> anyhow::Result<()> {
    let service = ExtractorService::new(config);
    let outcome = service.extract_url(url, title).await?;

    print_outcome_status(outcome.status);
    println!("{}", outcome.message);
    if let Some(artifacts) = &outcome.artifacts {
        println!("  raw:      {}", artifacts.raw_html.display());
        if let Some(markdown) = &artifacts.markdown {
            println!("  markdown: {}", markdown.display());
        }
        println!("  metadata: {}", artifacts.metadata.display());
    }
    Ok(())
}

/// Discover and extract a batch, reporting per-item outcomes.
async fn flow(config: ExtractorConfig, query: &str, count: usize) -> anyhow::Result<()> {
    let service = ExtractorService::new(config);
    let batch = service.run_flow(query, count).await?;

    if batch.attempted == 0 {
        println!("No conversations matched '{query}'.");
        return Ok(());
    }

    for item in &batch.items {
        print_outcome_status(item.status);
        println!("{}: {}", item.title, item.message);
    }
    println!(
        "Extracted {} of {} attempted conversations.",
        batch.succeeded, batch.attempted
    );
    Ok(())
}

/// Analyze persisted artifacts and print the summary.
fn analyze(config: &ExtractorConfig, json: bool) -> anyhow::Result<()> {
    let analyzer = Analyzer::new(config.extraction.output_dir.clone())?;
    let (summary, _stats) = analyzer.analyze_all()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Conversation analysis");
    println!("  conversations:      {}", summary.total_conversations);
    println!("  skipped files:      {}", summary.skipped_files);
    println!("  messages:           {}", summary.total_messages);
    println!("  user messages:      {}", summary.total_user_messages);
    println!("  assistant messages: {}", summary.total_assistant_messages);
    println!(
        "  avg per conversation: {:.1}",
        summary.avg_messages_per_conversation
    );

    if !summary.top_technical_terms.is_empty() {
        println!("  top technical terms:");
        for (term, count) in &summary.top_technical_terms {
            println!("    {term}: {count}");
        }
    }
    if !summary.top_topics.is_empty() {
        println!("  top topics:");
        for (topic, count) in &summary.top_topics {
            println!("    {topic}: {count}");
        }
    }
    if !summary.patterns.is_empty() {
        println!("  patterns:");
        for (pattern, count) in &summary.patterns {
            println!("    {pattern}: {count}");
        }
    }
    Ok(())
}

/// Show the resolved configuration, or write a default config file.
fn show_or_init_config(
    config: &ExtractorConfig,
    config_path: Option<&std::path::Path>,
    init: bool,
) -> anyhow::Result<()> {
    if init {
        let path = config_path
            .map(std::path::Path::to_path_buf)
            .unwrap_or_else(|| {
                PathBuf::from(gemscribe::extraction::config::DEFAULT_CONFIG_FILE)
            });
        ExtractorConfig::default().save(&path)?;
        println!("Default configuration written to {}.", path.display());
        return Ok(());
    }

    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

/// Start the HTTP server with the resolved configuration.
async fn serve(config: ExtractorConfig, port: Option<u16>) -> anyhow::Result<()> {
    let state = AppState::with_config(config);
    let port = port.unwrap_or_else(start_server::get_port);
    gemscribe::server::run_server(state, port)
        .await
        .map_err(|e| anyhow::anyhow!("server error: {e}"))
}

/// Print a one-word status prefix for an outcome.
fn print_outcome_status(status: OutcomeStatus) {
    match status {
        OutcomeStatus::Success => print!("[ok] "),
        OutcomeStatus::LowConfidence => print!("[low-confidence] "),
        OutcomeStatus::Failed => print!("[failed] "),
    }
}
