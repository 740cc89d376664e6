use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::time::{interval_at, Instant, Interval};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wifilamp_core::{AppConfig, LogFormat, LoggingConfig};
use wifilamp_discovery::{
    BrowserNotification, BrowserObserver, BrowserService, ChannelObserver, Device,
    DeviceClassifier, PrefixClassifier, Record,
};

/// WiFiLamp - discover WiFiLamp devices on the local network
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "WIFILAMP_CONFIG")]
    config: Option<PathBuf>,

    /// Override the DNS-SD service type
    #[arg(long)]
    service_type: Option<String>,

    /// Override the search domain
    #[arg(long)]
    domain: Option<String>,

    /// Restart the search every N seconds
    #[arg(long)]
    refresh_secs: Option<u64>,

    /// Browse for N seconds, print the devices found and exit
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Emit JSON lines instead of text
    #[arg(long)]
    json: bool,

    /// Override the log level
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Serialize)]
struct DeviceEvent<'a> {
    event: &'a str,
    device: &'a Device,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::from_config_builder(args.config.as_deref())
        .context("Failed to load configuration")?;

    if let Some(service_type) = &args.service_type {
        config.browser.service_type = service_type.clone();
    }
    if let Some(domain) = &args.domain {
        config.browser.domain = domain.clone();
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    config.validate().context("Invalid configuration")?;

    init_tracing(&config.logging)?;

    let classifier = PrefixClassifier::from_config(&config.classifier);

    let (observer, notifications) = ChannelObserver::new();
    let observer: Arc<dyn BrowserObserver> = Arc::new(observer);

    let service = BrowserService::mdns(&config.browser, Arc::downgrade(&observer))
        .context("Failed to start discovery")?;
    service.start_search()?;

    info!(
        service_type = %config.browser.service_type,
        domain = %config.browser.domain,
        "Browsing for devices (Ctrl-C to stop)"
    );

    let mut refresh = args.refresh_secs.filter(|s| *s > 0).map(|secs| {
        let period = Duration::from_secs(secs);
        interval_at(Instant::now() + period, period)
    });

    let deadline = async {
        match args.duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Shutting down");
                break;
            }
            _ = &mut deadline => break,
            _ = tick(&mut refresh) => {
                info!("Refreshing search");
                service.refresh()?;
            }
            notification = notifications.recv() => match notification {
                Ok(notification) => report(&notification, &classifier, args.json)?,
                Err(_) => {
                    warn!("Browser notifications closed");
                    break;
                }
            },
        }
    }

    if args.duration_secs.is_some() {
        print_devices(&service.records(), &classifier, args.json)?;
    }

    service.shutdown().await;
    Ok(())
}

/// Waits for the next refresh tick, or forever when refreshing is off.
async fn tick(refresh: &mut Option<Interval>) {
    match refresh {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let level = logging.parse_level()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }

    Ok(())
}

fn report(
    notification: &BrowserNotification,
    classifier: &dyn DeviceClassifier,
    json: bool,
) -> Result<()> {
    let (event, record) = match notification {
        BrowserNotification::StartedSearching => {
            info!("Search started");
            return Ok(());
        }
        BrowserNotification::SearchFailed(details) => {
            warn!(error = ?details, "Search failed to start");
            return Ok(());
        }
        BrowserNotification::FoundRecord(record) => ("found", record),
        BrowserNotification::RemovedRecord(record) => ("removed", record),
    };

    let device = Device::from_record(record, classifier);
    if json {
        println!("{}", serde_json::to_string(&DeviceEvent { event, device: &device })?);
    } else {
        let marker = if event == "found" { '+' } else { '-' };
        println!(
            "{} {:<10} {:<24} {:<12} {}",
            marker, device.kind, device.name, device.identifier, device.local_network_url
        );
    }

    Ok(())
}

fn print_devices(records: &[Record], classifier: &dyn DeviceClassifier, json: bool) -> Result<()> {
    let devices: Vec<Device> = records
        .iter()
        .map(|record| Device::from_record(record, classifier))
        .collect();

    if json {
        println!("{}", serde_json::to_string(&devices)?);
        return Ok(());
    }

    println!("{} device(s)", devices.len());
    for device in &devices {
        println!(
            "  {:<10} {:<24} {:<12} {}",
            device.kind, device.name, device.identifier, device.local_network_url
        );
    }

    Ok(())
}
