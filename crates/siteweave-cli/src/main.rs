//! siteweave CLI - Administer the app registry of a siteweave node

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use siteweave_apps::{
    AppConfig, AppManager, DbAppStore, LocalAppRegistry, RemoteAppId, RemoteAppView, SocketMode,
};
use siteweave_cli::config::NodeConfig;
use siteweave_cli::handler::DetachedHandler;

/// siteweave - Local and remote app registry of a tunnel node
#[derive(Parser, Debug)]
#[command(name = "siteweave")]
#[command(about = "Manage the apps a siteweave node exposes and consumes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Node config file (default: discover siteweave.yml upwards from the current directory)
    #[arg(short, long, env = "SITEWEAVE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding siteweave.db (overrides database.url)
    #[arg(long, env = "SITEWEAVE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starter node config file
    Init {
        /// Where to write the file
        #[arg(default_value = "siteweave.yml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Reconcile configured remote apps with the database and print the registry
    Reconcile,

    /// Local services exposed to remote sites
    Local {
        #[command(subcommand)]
        command: LocalCommands,
    },

    /// Remote site services offered on local sockets
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },
}

#[derive(Subcommand, Debug)]
enum LocalCommands {
    /// List local exposed app names
    List,

    /// Show one local exposed app as JSON
    Show { app_name: String },
}

#[derive(Subcommand, Debug)]
enum RemoteCommands {
    /// List remote apps and whether they are listening
    List,

    /// Show one remote app as JSON
    Show { id: RemoteAppId },

    /// Register a remote app (it starts listening once its site connects)
    Add {
        /// Site that hosts the app
        #[arg(long)]
        site: String,

        /// App name announced by the site
        #[arg(long)]
        app: String,

        /// Local listening socket (host:port or a unix socket path)
        #[arg(long)]
        local_socket: String,

        /// Socket of the app at the remote site
        #[arg(long)]
        app_socket: String,

        /// Socket mode (single, range)
        #[arg(long, default_value = "single", value_parser = ["single", "range"])]
        mode: String,
    },

    /// Delete a remote app created with `remote add`
    Delete { id: RemoteAppId },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Init { path, force } => handle_init(path, force),
        Commands::Reconcile => {
            let manager = open_manager(cli.config, cli.data_dir).await?;
            handle_reconcile(&manager)
        }
        Commands::Local { command } => {
            let manager = open_manager(cli.config, cli.data_dir).await?;
            handle_local_command(&manager, command)
        }
        Commands::Remote { command } => {
            let manager = open_manager(cli.config, cli.data_dir).await?;
            handle_remote_command(&manager, command).await
        }
    }
}

fn handle_init(path: PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file {:?} already exists (use --force to overwrite)",
            path
        );
    }

    std::fs::write(&path, NodeConfig::template())
        .with_context(|| format!("Failed to write config file: {:?}", path))?;
    println!("Created {}", path.display());
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<NodeConfig> {
    match path {
        Some(path) => NodeConfig::load(&path),
        None => match NodeConfig::discover()? {
            Some((path, config)) => {
                debug!("Using config file {:?}", path);
                Ok(config)
            }
            None => anyhow::bail!("No siteweave.yml found (create one with: siteweave init)"),
        },
    }
}

async fn open_manager(config_path: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<AppManager> {
    let config = load_config(config_path)?;

    let database_url = match data_dir {
        Some(dir) => siteweave_db::get_database_url(&dir),
        None => config.database_url(),
    };
    info!("Opening database {}", database_url);

    let db = siteweave_db::connect(&database_url)
        .await
        .with_context(|| format!("Failed to connect to database {}", database_url))?;
    siteweave_db::migrate(&db)
        .await
        .context("Failed to run database migrations")?;

    let local_apps = LocalAppRegistry::from_configs(&config.local_exposed_apps)
        .context("Invalid local exposed apps")?;

    AppManager::new(
        Arc::new(DbAppStore::new(db)),
        local_apps,
        &config.remote_apps,
        Arc::new(DetachedHandler),
    )
    .await
    .context("Failed to reconcile remote apps")
}

fn handle_reconcile(manager: &AppManager) -> Result<()> {
    let report = manager.startup_report();
    println!(
        "Reconciled remote apps: {} kept, {} inserted, {} pruned",
        report.kept.len(),
        report.inserted.len(),
        report.pruned.len()
    );
    if !report.pruned.is_empty() {
        println!("  Pruned ids: {:?}", report.pruned);
    }
    println!();

    let instances = manager.remote_apps().snapshot();
    if instances.is_empty() {
        println!("No remote apps registered");
        return Ok(());
    }

    println!("Registered remote apps ({})", instances.len());
    for instance in instances {
        let config = instance.config();
        println!(
            "  [{}] {}@{} on {} -> {}",
            instance.id(),
            config.app_name,
            config.site_name,
            config.local_socket,
            config.app_socket
        );
    }
    Ok(())
}

fn handle_local_command(manager: &AppManager, command: LocalCommands) -> Result<()> {
    match command {
        LocalCommands::List => {
            let apps = manager.list_local_exposed_apps();
            if apps.is_empty() {
                println!("No local exposed apps configured");
                return Ok(());
            }

            println!("Local exposed apps ({})", apps.len());
            for app in apps {
                println!("  {}", app.app_name);
            }
            Ok(())
        }
        LocalCommands::Show { app_name } => {
            let view = manager.show_local_exposed_app(&app_name)?;
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
    }
}

async fn handle_remote_command(manager: &AppManager, command: RemoteCommands) -> Result<()> {
    match command {
        RemoteCommands::List => {
            let apps = manager.list_remote_apps().await?;
            if apps.is_empty() {
                println!("No remote apps registered");
                println!("Add one with: siteweave remote add --site <site> --app <app> --local-socket <socket> --app-socket <socket>");
                return Ok(());
            }

            println!("Remote apps ({})", apps.len());
            println!();
            for app in &apps {
                print_remote_app(app);
            }
            Ok(())
        }
        RemoteCommands::Show { id } => {
            let view = manager.show_remote_app(id).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        RemoteCommands::Add {
            site,
            app,
            local_socket,
            app_socket,
            mode,
        } => {
            let mut config = AppConfig::new(site, app, local_socket, app_socket);
            if mode == "range" {
                config.mode = SocketMode::Range;
            }

            let view = manager.add_remote_app(config, false).await?;
            println!(
                "Added remote app {} ({}@{})",
                view.record.id, view.record.config.app_name, view.record.config.site_name
            );
            Ok(())
        }
        RemoteCommands::Delete { id } => {
            manager.delete_remote_app(id).await?;
            println!("Deleted remote app {}", id);
            Ok(())
        }
    }
}

fn print_remote_app(app: &RemoteAppView) {
    let config = &app.record.config;
    let status = if app.active { "listening" } else { "idle" };
    let origin = if app.record.from_config { "config" } else { "api" };

    println!("  [{}] {} at {} ({}, {})", app.record.id, config.app_name, config.site_name, status, origin);
    println!("    Local socket: {}", config.local_socket);
    println!("    App socket:   {}", config.app_socket);
    if config.mode == SocketMode::Range {
        println!("    Mode: range");
    }
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Failed to initialize logging filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}
