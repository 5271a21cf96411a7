//! Polystore CLI - Command line interface for provider operations.
//!
//! Providers are declared in a JSON registry configuration. Every path
//! argument takes the form `NAME:PATH`, where `NAME` is a registered
//! provider and `PATH` is relative to its root.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use polystore_storage::{
    ProviderKind, ProviderRegistry, ProviderSpec, RegistryConfig, StorageProvider,
};
use polystore_transfer::{
    format_size, DirectoryTreeWalker, HtmlTreeRenderer, TextTreeRenderer, TransferEngine,
    TransferSummary, TreeRenderer,
};

#[derive(Parser)]
#[command(name = "polystore")]
#[command(about = "Polystore - Copy, move and inspect data across storage providers")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Registry configuration file (JSON).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered providers.
    Providers,

    /// Copy a file between providers.
    Copy {
        /// Source as NAME:PATH.
        source: String,

        /// Destination as NAME:PATH.
        destination: String,
    },

    /// Move a file between providers.
    Move {
        /// Source as NAME:PATH.
        source: String,

        /// Destination as NAME:PATH.
        destination: String,
    },

    /// Recursively copy a file or directory.
    Mirror {
        /// Source as NAME:PATH.
        source: String,

        /// Destination as NAME:PATH.
        destination: String,

        /// Only copy files whose name matches this glob.
        #[arg(short, long, default_value = "*")]
        pattern: String,

        /// Copy the directory structure only.
        #[arg(long)]
        skip_files: bool,
    },

    /// Print a directory tree with sizes.
    Tree {
        /// Directory as NAME:PATH (default path: root).
        target: String,

        /// Render nested HTML lists instead of text.
        #[arg(long)]
        html: bool,

        /// Show directories only.
        #[arg(long)]
        skip_files: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let registry = load_registry(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Providers => cmd_providers(&registry),

        Commands::Copy {
            source,
            destination,
        } => cmd_copy(&registry, &source, &destination).await,

        Commands::Move {
            source,
            destination,
        } => cmd_move(&registry, &source, &destination).await,

        Commands::Mirror {
            source,
            destination,
            pattern,
            skip_files,
        } => cmd_mirror(&registry, &source, &destination, &pattern, skip_files).await,

        Commands::Tree {
            target,
            html,
            skip_files,
        } => cmd_tree(&registry, &target, html, skip_files).await,
    }
}

/// Default configuration location under the user's config directory.
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("polystore").join("providers.json"))
}

/// Build the registry from `--config`, the default file, or a single
/// `local` provider rooted at the working directory.
async fn load_registry(explicit: Option<&Path>) -> Result<ProviderRegistry> {
    let config = match explicit {
        Some(path) => RegistryConfig::load(path)
            .await
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => match default_config_path().filter(|path| path.exists()) {
            Some(path) => RegistryConfig::load(&path)
                .await
                .with_context(|| format!("Failed to load configuration {}", path.display()))?,
            None => {
                info!("No configuration found, using working directory as 'local'");
                RegistryConfig {
                    providers: vec![ProviderSpec {
                        name: "local".to_string(),
                        kind: ProviderKind::Local,
                        root: Some(PathBuf::from(".")),
                        lifetime: Default::default(),
                        behaviors: Vec::new(),
                    }],
                    ..RegistryConfig::default()
                }
            }
        },
    };

    ProviderRegistry::from_config(&config).context("Failed to build provider registry")
}

/// Split `NAME:PATH` and resolve the provider.
fn resolve_target(
    registry: &ProviderRegistry,
    target: &str,
) -> Result<(Arc<dyn StorageProvider>, String)> {
    let (name, path) = target.split_once(':').unwrap_or((target, ""));
    let provider = registry
        .resolve(name)
        .with_context(|| format!("Unknown provider in '{}'", target))?;
    Ok((provider, path.to_string()))
}

fn print_summary(summary: &TransferSummary) {
    if summary.was_skipped() {
        println!("Nothing to do: source was skipped");
        return;
    }
    println!(
        "{} of {} item(s), {}",
        summary.items_processed,
        summary.total_items,
        format_size(summary.bytes_processed)
    );
}

/// List registered providers.
fn cmd_providers(registry: &ProviderRegistry) -> Result<()> {
    let names = registry.names();
    if names.is_empty() {
        println!("(no providers registered)");
        return Ok(());
    }

    for name in names {
        let lifetime = registry
            .lifetime_of(&name)
            .map(|lifetime| lifetime.to_string())
            .unwrap_or_default();
        let composed = registry
            .resolve(&name)
            .with_context(|| format!("Failed to build provider '{}'", name))?;
        println!("{:<16} {:<10} {}", name, lifetime, composed.name());
    }
    Ok(())
}

/// Copy a single file.
async fn cmd_copy(registry: &ProviderRegistry, source: &str, destination: &str) -> Result<()> {
    info!("Copying {} to {}", source, destination);

    let (src, source_path) = resolve_target(registry, source)?;
    let (dst, destination_path) = resolve_target(registry, destination)?;

    let summary = TransferEngine::new()
        .copy_file(src.as_ref(), dst.as_ref(), &source_path, &destination_path)
        .await
        .context("Copy failed")?;

    print_summary(&summary);
    Ok(())
}

/// Move a single file.
async fn cmd_move(registry: &ProviderRegistry, source: &str, destination: &str) -> Result<()> {
    info!("Moving {} to {}", source, destination);

    let (src, source_path) = resolve_target(registry, source)?;
    let (dst, destination_path) = resolve_target(registry, destination)?;

    let summary = TransferEngine::new()
        .move_file(src.as_ref(), dst.as_ref(), &source_path, &destination_path)
        .await
        .context("Move failed")?;

    print_summary(&summary);
    Ok(())
}

/// Recursively copy a directory tree, stopping cleanly on Ctrl-C.
async fn cmd_mirror(
    registry: &ProviderRegistry,
    source: &str,
    destination: &str,
    pattern: &str,
    skip_files: bool,
) -> Result<()> {
    info!("Mirroring {} to {}", source, destination);

    let (src, source_path) = resolve_target(registry, source)?;
    let (dst, destination_path) = resolve_target(registry, destination)?;

    let engine = TransferEngine::new().with_progress(|report| {
        tracing::debug!(
            files = report.files_processed,
            total = report.total_files.unwrap_or_default(),
            bytes = report.bytes_processed,
            "Progress"
        );
    });

    let token = engine.cancellation_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, finishing current item");
            token.cancel();
        }
    });

    let summary = engine
        .deep_copy(
            src.as_ref(),
            dst.as_ref(),
            &source_path,
            &destination_path,
            skip_files,
            pattern,
        )
        .await
        .context("Mirror failed")?;

    print_summary(&summary);
    Ok(())
}

/// Print a directory tree.
async fn cmd_tree(
    registry: &ProviderRegistry,
    target: &str,
    html: bool,
    skip_files: bool,
) -> Result<()> {
    let (provider, path) = resolve_target(registry, target)?;

    let mut renderer: Box<dyn TreeRenderer + Send> = if html {
        Box::new(HtmlTreeRenderer::new())
    } else {
        Box::new(TextTreeRenderer::new())
    };

    DirectoryTreeWalker::new()
        .render_directory(provider.as_ref(), renderer.as_mut(), &path, skip_files)
        .await
        .context("Failed to render directory tree")?;

    print!("{}", renderer.to_text());
    if html {
        println!();
    }
    Ok(())
}
