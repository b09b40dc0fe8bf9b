//! CLI entry point for the SLAM discovery daemon.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use slam_core::{Network, NetworkId};
use slam_inventory::{InventoryClient, InventoryStore};

use slam_discover::adapters::HostnameSource;
use slam_discover::arp::ArpProbe;
use slam_discover::config::DiscoverConfig;
use slam_discover::mdns::MdnsCache;
use slam_discover::netbios::NetbiosProbe;
use slam_discover::network::{NetworkProbe, NetworkSource};
use slam_discover::notify::{self, StoreSink};
use slam_discover::reconcile::{EngineSettings, Reconciler};
use slam_discover::resolve::HostnameResolver;
use slam_discover::scanner::NmapScanner;
use slam_discover::scheduler::PassScheduler;
use slam_discover::stream::{scan_stream, ScanMode};

#[derive(Parser)]
#[command(name = "slam")]
#[command(about = "Simple Local Area Monitor: device discovery and asset tracking")]
struct Cli {
    /// Config file prefix (default: slam).
    #[arg(short, long, default_value = "slam", global = true)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the background liveness and port loops until Ctrl-C.
    Daemon,
    /// Run one interactive pass and print its records as JSON lines.
    Scan {
        #[arg(short, long, value_enum, default_value = "discover")]
        mode: ScanMode,
    },
    /// List every network seen so far.
    Networks,
    /// List the devices recorded for a network.
    Devices {
        /// Network identity (e.g. the Wi-Fi SSID).
        #[arg(short, long)]
        network: String,
    },
    /// Show or manage notifications.
    Notifications {
        #[command(subcommand)]
        action: Option<NotificationAction>,
    },
}

#[derive(Subcommand, Clone, Copy)]
enum NotificationAction {
    List,
    /// Mark every unread notification as read.
    MarkRead,
    /// Delete all notifications.
    Clear,
}

#[derive(Serialize)]
struct NetworkListing<'a> {
    #[serde(flatten)]
    network: &'a Network,
    current: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let config = load_discover_config(&cli.config)?;

    let store = InventoryClient::connect(&config.store_config()).await?;
    let store: Arc<dyn InventoryStore> = Arc::new(store);
    let network: Arc<dyn NetworkSource> = Arc::new(NetworkProbe::new(config.network.clone()));

    match cli.command {
        Command::Daemon => {
            let (engine, mdns) = build_engine(&config, store).await?;
            let scheduler = PassScheduler::new(config, engine, network);

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Shutdown requested");
                }
                on_signal.cancel();
            });

            scheduler.run(cancel).await;
            mdns.stop();
        }
        Command::Scan { mode } => {
            let (engine, mdns) = build_engine(&config, store).await?;
            let mut events = Box::pin(scan_stream(engine, network, mode));
            while let Some(event) = events.next().await {
                println!("{}", serde_json::to_string(&event)?);
            }
            mdns.stop();
        }
        Command::Networks => {
            let current = network.current().await.map(|ctx| ctx.identity);
            for row in store.list_networks().await? {
                let listing = NetworkListing {
                    current: current.as_ref() == Some(&row.identity),
                    network: &row,
                };
                println!("{}", serde_json::to_string(&listing)?);
            }
        }
        Command::Devices { network } => {
            let identity = NetworkId::parse(&network)?;
            if store.get_network(&identity).await?.is_none() {
                anyhow::bail!("Network {identity} has never been seen");
            }
            store.ensure_partition(&identity).await?;
            for device in store.list_records(&identity).await? {
                println!("{}", serde_json::to_string(&device)?);
            }
        }
        Command::Notifications { action } => {
            let retry = config.retry_policy();
            match action.unwrap_or(NotificationAction::List) {
                NotificationAction::List => {
                    for n in store.list_notifications().await? {
                        println!("{}", serde_json::to_string(&n)?);
                    }
                }
                NotificationAction::MarkRead => {
                    let marked = notify::mark_all_read(store.as_ref(), &retry).await?;
                    tracing::info!(marked, "Notifications marked read");
                }
                NotificationAction::Clear => {
                    let deleted = notify::clear_all(store.as_ref(), &retry).await?;
                    tracing::info!(deleted, "Notifications deleted");
                }
            }
        }
    }

    Ok(())
}

/// Wire the scanning tools, resolution chain and sink into an engine.
async fn build_engine(
    config: &DiscoverConfig,
    store: Arc<dyn InventoryStore>,
) -> anyhow::Result<(Arc<Reconciler>, Arc<MdnsCache>)> {
    let scanner = Arc::new(NmapScanner::new(&config.nmap_path));
    let version = scanner.verify_installation().await?;
    tracing::info!(nmap_version = %version.lines().next().unwrap_or_default().trim(), "Nmap verified");

    let mdns = Arc::new(MdnsCache::new(config.mdns.unique_service_types()));
    if config.mdns.enabled {
        if let Err(e) = mdns.start() {
            tracing::warn!(error = %e, "mDNS listener unavailable, continuing without it");
        }
    }

    let netbios = Arc::new(NetbiosProbe::new(scanner.clone(), config.netbios_timeout()));
    let fallbacks: Vec<Arc<dyn HostnameSource>> = vec![netbios, mdns.clone()];
    let resolver = HostnameResolver::new(Arc::new(ArpProbe::new(&config.arp_scan_path)), fallbacks);
    let sink = Arc::new(StoreSink::new(store.clone(), config.retry_policy()));

    let engine = Reconciler::new(store, scanner, resolver, sink, EngineSettings::from(config));
    Ok((Arc::new(engine), mdns))
}

fn load_discover_config(file_prefix: &str) -> anyhow::Result<DiscoverConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("SLAM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.get::<DiscoverConfig>("discover") {
        Ok(c) => Ok(c),
        Err(config::ConfigError::NotFound(_)) => Ok(DiscoverConfig::default()),
        Err(e) => Err(e.into()),
    }
}
