//! The `outofband` subcommand: one-shot batch collection over explicit
//! asset IDs, or the long-running condition-driven worker.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use asset_model::{Asset, Component, Device, StoreKind};
use collector::{stdout_output, BmcQueryor, DeviceCollector, HttpQueryor, MockQueryor};
use shared_config::Config;
use worker::Worker;

#[derive(clap::Args)]
pub struct Args {
    /// Inventory store backend: fleetdb, csv or mock.
    #[arg(long, env = "ASSAYER_STORE")]
    store: Option<String>,

    /// Collect inventory for this comma separated list of asset IDs.
    #[arg(long, value_delimiter = ',')]
    asset_ids: Vec<String>,

    /// Run as a worker listening for conditions on the stream.
    #[arg(long)]
    worker: bool,

    /// The facility code this instance is associated with.
    #[arg(long, env = "ASSAYER_FACILITY")]
    facility_code: Option<String>,

    /// Number of worker replicas coordinating over the lease store.
    #[arg(long, short = 'r')]
    replica_count: Option<usize>,

    /// Periodic fleet sweep interval, e.g. 6h, 30m, 900s.
    #[arg(long, value_parser = parse_duration)]
    collect_interval: Option<Duration>,

    /// Upper bound on the jitter added to the sweep interval.
    #[arg(long, value_parser = parse_duration)]
    collect_splay: Option<Duration>,

    /// CSV file with BMC credentials, for the csv store backend.
    #[arg(long)]
    csv_file: Option<String>,

    /// Bound on concurrent collection tasks.
    #[arg(long)]
    concurrency: Option<usize>,
}

pub async fn run(args: Args) -> anyhow::Result<()> {
    let cfg = build_config(&args);
    init_tracing(&cfg.log_level);

    // Exactly one mode must be selected.
    match (args.worker, args.asset_ids.is_empty()) {
        (true, false) => bail!("--worker and --asset-ids are mutually exclusive"),
        (false, true) => bail!("either --asset-ids or --worker is required"),
        _ => {}
    }

    let repository = asset_store::new_repository(&cfg.store_kind, &cfg)
        .context("store construction failed")?;
    let queryor = build_queryor(&cfg)?;
    let device_collector = Arc::new(DeviceCollector::new(
        Arc::clone(&repository),
        queryor,
        cfg.facility_code.clone(),
    ));

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("termination signal received");
            signal_cancel.cancel();
        }
    });

    if args.worker {
        Worker::new(&cfg, repository, device_collector)
            .run(cancel)
            .await
            .context("worker failed")?;
        return Ok(());
    }

    let output = stdout_output();
    for asset_id in &args.asset_ids {
        if cancel.is_cancelled() {
            break;
        }

        let mut asset = Asset::new(asset_id);
        if let Err(e) = device_collector
            .collect_outofband(&cancel, &mut asset, &output)
            .await
        {
            tracing::warn!(asset_id = %asset_id, error = %e, "collection failed");
        }
    }

    Ok(())
}

fn build_config(args: &Args) -> Config {
    let mut cfg = Config::from_env();

    if let Some(store) = &args.store {
        cfg.store_kind = store.clone();
    }
    if let Some(facility) = &args.facility_code {
        cfg.facility_code = facility.clone();
    }
    if let Some(replicas) = args.replica_count {
        cfg.replica_count = replicas;
    }
    if let Some(interval) = args.collect_interval {
        cfg.collect_interval = interval;
    }
    if let Some(splay) = args.collect_splay {
        cfg.collect_splay = splay;
    }
    if let Some(csv_file) = &args.csv_file {
        cfg.csv_file = csv_file.clone();
    }
    if let Some(concurrency) = args.concurrency {
        cfg.concurrency = concurrency;
    }

    cfg
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// The mock store pairs with a canned queryor so the pipeline can be
/// exercised without any BMC reachable; the real backends query the
/// out-of-band collaborator over HTTP.
fn build_queryor(cfg: &Config) -> anyhow::Result<Arc<dyn BmcQueryor>> {
    let kind = StoreKind::from_str(&cfg.store_kind)?;

    if kind == StoreKind::Mock {
        return Ok(Arc::new(MockQueryor::with_device(sample_device())));
    }

    Ok(Arc::new(HttpQueryor::new().context("bmc queryor setup failed")?))
}

fn sample_device() -> Device {
    Device {
        vendor: "mockvendor".to_string(),
        model: "mockmodel".to_string(),
        serial: "mockserial".to_string(),
        components: vec![Component {
            slug: "bios".to_string(),
            serial: "0".to_string(),
            vendor: "mockvendor".to_string(),
            model: "mockmodel".to_string(),
            versioned_attributes: r#"{"firmware":{"installed":"1.0.0"}}"#.to_string(),
        }],
    }
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let (number, unit) = value.split_at(value.len().saturating_sub(1));
    let count: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration: {value}"))?;
    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return Err(format!("invalid duration unit: {value}")),
    };

    Ok(Duration::from_secs(count * multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_parse_with_and_without_units() {
        assert_eq!(parse_duration("900").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration("6h").unwrap(), Duration::from_secs(21600));
        assert!(parse_duration("6w").is_err());
        assert!(parse_duration("").is_err());
    }
}
