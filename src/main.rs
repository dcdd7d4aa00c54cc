use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use remotemap::{
    Config, ConfigAccounts, DiscoveryProber, GitScanner, GitUrl, HttpMetadataLoader, MappingSet,
    ReconcilerService,
};

#[derive(Parser)]
#[command(name = "remotemap")]
#[command(about = "Repository-to-hosting-server mapping reconciler")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Reconcile once and print the known mappings
    Map {
        /// Skip discovery probing for unmatched remotes
        #[arg(long)]
        no_probe: bool,
    },

    /// Run the reconciler as a long-lived service
    Run,

    /// Probe one remote URL for a self-hosted server
    Probe {
        /// Remote URL, e.g. https://git.example.com/team/proj.git
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config_path = cli.config.clone();

    match cli.command {
        Commands::Init { force } => cmd_init(config_path, force),
        Commands::Map { no_probe } => cmd_map(load_config(config_path)?, no_probe).await,
        Commands::Run => cmd_run(load_config(config_path.clone())?, config_path).await,
        Commands::Probe { url } => cmd_probe(load_config(config_path)?, &url).await,
    }
}

fn load_config(path: Option<std::path::PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_file(&path),
        None => Config::load_or_default(),
    }
}

fn cmd_init(path: Option<std::path::PathBuf>, force: bool) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if path.exists() && !force {
        return Err(anyhow!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        ));
    }

    Config::default().save_to_file(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn build_service(
    config: &Config,
) -> Result<(ReconcilerService<HttpMetadataLoader>, Arc<ConfigAccounts>)> {
    let accounts = Arc::new(ConfigAccounts::new(config.accounts.clone()));
    let scanner = Arc::new(GitScanner::new(config.expanded_roots()));
    let loader = HttpMetadataLoader::new(&config.probe)?;
    let service = ReconcilerService::new(config, accounts.clone(), scanner, loader);
    Ok((service, accounts))
}

async fn cmd_map(config: Config, no_probe: bool) -> Result<()> {
    let mappings = if no_probe {
        let accounts = Arc::new(ConfigAccounts::new(config.accounts.clone()));
        let scanner = Arc::new(GitScanner::new(config.expanded_roots()));
        let mut reconciler =
            remotemap::Reconciler::new(config.default_server(), accounts, scanner);
        reconciler.recompute().await?;
        reconciler.known().clone()
    } else {
        let (mut service, _accounts) = build_service(&config)?;
        service.run_once().await?
    };

    print_mappings(&mappings);
    Ok(())
}

async fn cmd_run(config: Config, config_path: Option<std::path::PathBuf>) -> Result<()> {
    let rescan_secs = config.rescan_interval_secs()?;
    let (mut service, accounts) = build_service(&config)?;
    let handle = service.handle();

    // Periodic rescan stands in for repository and account change
    // notifications: re-read the config for account edits, then trigger.
    let rescan_handle = handle.clone();
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(Duration::from_secs(rescan_secs.max(1)));
        loop {
            timer.tick().await;
            match load_config(config_path.clone()) {
                Ok(fresh) => {
                    accounts.replace(fresh.accounts);
                    rescan_handle.accounts_changed();
                }
                Err(e) => warn!("Config reload failed, keeping current accounts: {:#}", e),
            }
            rescan_handle.repositories_changed();
        }
    });

    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for ctrl-c");
        info!("Ctrl+C received, shutting down");
        shutdown_handle.shutdown();
    });

    info!("remotemap service running (rescan every {}s)", rescan_secs);
    service.run().await
}

async fn cmd_probe(config: Config, url: &str) -> Result<()> {
    let url = GitUrl::parse(url).context("Invalid remote URL")?;
    let loader = HttpMetadataLoader::new(&config.probe)?;
    let prober = DiscoveryProber::new(loader, config.probe.alt_port);

    match prober.probe(&url).await {
        Some(server) => {
            println!("Server found: {}", server);
            Ok(())
        }
        None => Err(anyhow!("No server answered for host {}", url.host)),
    }
}

fn print_mappings(mappings: &MappingSet) {
    if mappings.is_empty() {
        println!("No known repository mappings.");
        return;
    }

    println!("{} known mapping(s):", mappings.len());
    for mapping in mappings.iter() {
        println!(
            "  {}  {} ({})  ->  {}",
            mapping.server,
            mapping.repository.display(),
            mapping.remote_name,
            mapping.remote_url
        );
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    Ok(())
}
