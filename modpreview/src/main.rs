use std::collections::BTreeMap;
use std::path::PathBuf;
use clap::{Parser, Subcommand};
use anyhow::{Context, Result};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modpreview::{watch, PreviewConfig, PreviewContext};
use modpreview_loader::{Loader, LoaderSession, SessionSlot};

#[derive(Parser)]
#[command(name = "modpreview")]
#[command(about = "Incremental previews of game mod assets", long_about = None)]
struct Cli {
    /// Game installation directory (overrides MODPREVIEW_GAME_ROOT)
    #[arg(long)]
    game_root: Option<PathBuf>,

    /// Mod directory searched before the game; repeat for several mods
    #[arg(long = "mod-root")]
    mod_roots: Vec<PathBuf>,

    /// Recompute everything instead of reusing unchanged results
    #[arg(long, global = true)]
    force: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Preview the technology trees of a technology file
    Techtree {
        /// Technology file, relative to the search roots
        file: String,
    },

    /// Preview the world map
    Worldmap {
        /// Show supply areas instead of railways and supply nodes
        #[arg(long)]
        supply_area: bool,
    },

    /// Resolve sprites by name
    Sprite {
        /// Sprite names, e.g. GFX_tech_infantry
        #[arg(required = true)]
        names: Vec<String>,

        /// Gfx files searched in order
        #[arg(long = "gfx", required = true)]
        gfx_files: Vec<String>,
    },

    /// Reload a technology tree on an interval and report what changed
    Watch {
        /// Technology file, relative to the search roots
        file: String,

        /// Stop after this many rounds
        #[arg(long)]
        rounds: Option<usize>,
    },
}

fn build_config(cli: &Cli) -> Result<PreviewConfig> {
    let mut config = PreviewConfig::from_env().context("Failed to read configuration from environment")?;

    if let Some(root) = &cli.game_root {
        config.game_root = root.clone();
    }
    if !cli.mod_roots.is_empty() {
        config.mod_roots = cli.mod_roots.clone();
    }
    if let Commands::Worldmap { supply_area: true } = cli.command {
        config.enable_supply_area = true;
    }

    Ok(config)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize logging; stdout carries the JSON output
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "modpreview=info,modpreview_loader=info".into())
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let context = PreviewContext::new(config);

    match cli.command {
        Commands::Techtree { ref file } => {
            let loader = context.technology_tree_loader(file);
            let result = loader
                .load(&LoaderSession::new(cli.force))
                .await
                .with_context(|| format!("Failed to load technology file {}", file))?;
            print_json(&*result)?;
        }

        Commands::Worldmap { .. } => {
            let loader = context.world_map_loader();
            let result = loader
                .load(&LoaderSession::new(cli.force))
                .await
                .context("Failed to load world map")?;
            print_json(&*result)?;
        }

        Commands::Sprite { ref names, ref gfx_files } => {
            let sprites = context.sprites().sprites(names, gfx_files).await?;
            let by_name: BTreeMap<&str, _> = names.iter().map(String::as_str).zip(sprites).collect();
            print_json(&by_name)?;
        }

        Commands::Watch { ref file, rounds } => {
            let loader = context.technology_tree_loader(file);
            let slot = SessionSlot::new();
            let interval = context.config().poll_interval;

            tokio::select! {
                _ = watch(&loader, &slot, interval, rounds, cli.force, |report| {
                    if let Err(e) = print_json(&report) {
                        tracing::error!("Failed to print report: {}", e);
                    }
                }) => {}
                _ = tokio::signal::ctrl_c() => {
                    slot.cancel_current();
                    tracing::info!("Stopped watching {}", file);
                }
            }
        }
    }

    Ok(())
}
