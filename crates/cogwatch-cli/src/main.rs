//! Command-line interface for cogwatch.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cogwatch_core::config::{env_flag, env_vars, WatcherConfig};
use cogwatch_core::extension::{discover, identifier_from_path, LifecycleManager, MemoryHost};
use cogwatch_core::logging::init_tracing;

/// cogwatch - Hot-reload lifecycle manager for bot extensions.
#[derive(Parser, Debug)]
#[command(name = "cogwatch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// TOML configuration file. Without it, COGWATCH_* environment variables apply.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Watched root, relative to the base directory, with forward slashes.
    #[arg(short, long, global = true)]
    root: Option<String>,

    /// Base directory the root is resolved against.
    #[arg(short, long, global = true)]
    dir: Option<PathBuf>,

    /// File extension of extension sources, without the dot.
    #[arg(short, long, global = true)]
    ext: Option<String>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json_logs: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Print the extension identifier for each path.
    Resolve {
        /// Paths of extension source files.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// List the extensions found under the root.
    Scan {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Watch the root with an in-memory host until Ctrl-C, then print statuses.
    Watch {
        /// Load every discovered extension on startup.
        #[arg(long)]
        preload: bool,
        /// Only watch in debug builds.
        #[arg(long)]
        debug: bool,
        /// Print the final statuses as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let level = if args.verbose {
        "debug".to_string()
    } else {
        config.log_level.clone()
    };
    let json_logging = args.json_logs || env_flag(env_vars::LOG_JSON).unwrap_or(false);
    init_tracing(&level, json_logging)?;
    tracing::debug!(?config, "Loaded configuration");

    match args.command {
        Command::Resolve { paths } => resolve(&config, &paths),
        Command::Scan { json } => scan(&config, json),
        Command::Watch {
            preload,
            debug,
            json,
        } => run_watch(watch_config(config, preload, debug), json).await,
    }
}

/// Build the configuration: file or environment first, then command-line overrides.
fn load_config(args: &Args) -> Result<WatcherConfig> {
    let mut config = match &args.config {
        Some(path) => WatcherConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => WatcherConfig::from_env(),
    };

    if let Some(root) = &args.root {
        config.root = root.clone();
    }
    if let Some(dir) = &args.dir {
        config.base_dir = dir.clone();
    }
    if let Some(ext) = &args.ext {
        config.file_extension = ext.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Merge the `watch` flags into the configuration. A flag can switch a
/// setting on but never off.
fn watch_config(config: WatcherConfig, preload: bool, debug: bool) -> WatcherConfig {
    let preload = config.preload || preload;
    let debug = config.debug || debug;
    config.with_preload(preload).with_debug(debug)
}

fn resolve(config: &WatcherConfig, paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        let id = identifier_from_path(path, config.root_name())
            .with_context(|| format!("Cannot resolve {}", path.display()))?;
        println!("{}", id);
    }
    Ok(())
}

fn scan(config: &WatcherConfig, json: bool) -> Result<()> {
    let found = discover(
        &config.root_dir(),
        config.root_name(),
        &config.file_extension,
    )?;

    if json {
        let entries: Vec<serde_json::Value> = found
            .iter()
            .map(|(path, id)| serde_json::json!({ "id": id, "path": path }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if found.is_empty() {
        println!("No extensions found in {}", config.root_dir().display());
        return Ok(());
    }
    for (path, id) in &found {
        println!("{:<32} {}", id.as_str(), path.display());
    }
    Ok(())
}

async fn run_watch(config: WatcherConfig, json: bool) -> Result<()> {
    let host = Arc::new(MemoryHost::new());
    let manager = LifecycleManager::new(config, host)?;

    let handle = tokio::select! {
        handle = manager.start() => handle,
        _ = tokio::signal::ctrl_c() => {
            manager.shutdown();
            None
        }
    };

    if let Some(handle) = handle {
        tokio::signal::ctrl_c().await?;
        handle.shutdown().await?;
    }

    let records = manager.list_statuses().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        for record in &records {
            println!("{:<32} {}", record.id.as_str(), record.status);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_flags_keep_configured_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cogwatch.toml");
        std::fs::write(&path, "root = \"cogs\"\ndebug = true\npreload = true\n").unwrap();
        let config = WatcherConfig::from_toml_file(&path).unwrap();

        let merged = watch_config(config, false, false);
        assert!(merged.debug);
        assert!(merged.preload);

        let merged = watch_config(WatcherConfig::new("cogs").with_debug(false), true, true);
        assert!(merged.debug);
        assert!(merged.preload);
    }
}
