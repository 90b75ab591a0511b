use anyhow::{bail, Context, Result};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use abduction_monitor::config::Config;
use abduction_monitor::export;
use abduction_monitor::patient::PatientCode;
use abduction_monitor::pose::ReplaySource;
use abduction_monitor::runtime::{self, MonitorSession};

const CONFIG_PATH: &str = "config.toml";

struct Args {
    replay: String,
    config: String,
    patient: Option<PatientCode>,
}

fn parse_args() -> Result<Args> {
    // Usage: abduction-monitor <replay.jsonl> [--config path] [--patient code]
    let mut args = std::env::args().skip(1);
    let mut replay = None;
    let mut config = CONFIG_PATH.to_string();
    let mut patient = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config = args.next().context("--config needs a path")?;
            }
            "--patient" => {
                let code = args.next().context("--patient needs a code")?;
                patient = Some(PatientCode::parse(&code)?);
            }
            _ if replay.is_none() => replay = Some(arg),
            other => bail!("unexpected argument: {}", other),
        }
    }

    match replay {
        Some(replay) => Ok(Args { replay, config, patient }),
        None => bail!("usage: abduction-monitor <replay.jsonl> [--config path] [--patient code]"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("abduction_monitor=info")),
        )
        .init();

    let args = parse_args()?;
    let config = Config::load_or_default(&args.config);

    info!("Abduction monitor {}", env!("MONITOR_BUILD_VERSION"));
    info!(
        "Smoothing: {:?}, midline: {:?}, zones: {}/{}/{}°",
        config.smoothing.strategy,
        config.pose.midline,
        config.zones.safe_min_deg,
        config.zones.safe_max_deg,
        config.zones.warning_max_deg
    );
    info!("Sampler: {:?}", config.sampler);

    let source = ReplaySource::open(&args.replay)
        .with_context(|| format!("failed to load {}", args.replay))?;
    info!("Replay: {} frames from {}", source.remaining(), args.replay);

    let session = MonitorSession::new(&config, args.patient.clone());
    let dataset = runtime::record_session(source, &config, session, |status, readout| {
        debug!(
            "[{:?}] avg {} (L {} / R {}) {}",
            status,
            readout.average,
            readout.left,
            readout.right,
            readout.message
        );
        if let Some(tilt) = &readout.tilt_warning {
            debug!("{}", tilt);
        }
    })
    .await?;

    if dataset.is_empty() {
        info!("No usable frames were captured");
    }
    let path = export::write_dataset(&dataset, &config.export, args.patient.as_ref())?;
    println!("{}", path.display());
    Ok(())
}
