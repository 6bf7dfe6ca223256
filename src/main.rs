use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::Parser;
use crossbeam::channel;
use log::{error, info, warn};
use serde_json::json;
use uwb_tracker_rs::fix_log::{self, RecordedFix};
use uwb_tracker_rs::{FilterConfig, LocationData, TickOutcome, TrackingSession};

/// Replay a recorded UWB fix log through a tracking session
#[derive(Parser, Debug)]
struct Args {
    /// Path to a fix log (.json, .jsonl, optionally .gz)
    #[arg(long)]
    log: PathBuf,

    /// Filter configuration JSON; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write estimates here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Override the process noise scale
    #[arg(long)]
    acceleration_variance: Option<f64>,

    /// Pace delivery by the recorded timestamps
    #[arg(long, default_value_t = false)]
    realtime: bool,

    /// Dead-reckon gaps between fixes longer than this [s]
    #[arg(long, default_value = "0.5")]
    gap_threshold: f64,
}

fn write_estimate(
    out: &mut dyn Write,
    timestamp: f64,
    kind: &str,
    estimate: LocationData,
    quality_factor: Option<u8>,
) -> anyhow::Result<()> {
    let line = json!({
        "timestamp": timestamp,
        "kind": kind,
        "estimate": estimate,
        "display": estimate.european_notation(),
        "quality_factor": quality_factor,
    });
    writeln!(out, "{}", line)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match args.config.as_ref() {
        Some(path) => FilterConfig::from_json_file(path)?,
        None => FilterConfig::default(),
    };
    if let Some(variance) = args.acceleration_variance {
        config = config.with_acceleration_variance(variance);
    }
    let dt = config.time_delta;

    let fixes = fix_log::load_fixes(&args.log)?;
    info!("Loaded {} fixes from {}", fixes.len(), args.log.display());

    let mut out: Box<dyn Write> = match args.output.as_ref() {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    let session = TrackingSession::new(config)?;
    session.start()?;

    // Producer stands in for the ranging collaborator
    let (tx, rx) = channel::bounded::<RecordedFix>(64);
    let realtime = args.realtime;
    let producer = thread::spawn(move || {
        let mut previous: Option<f64> = None;
        for fix in fixes {
            if realtime {
                if let Some(prev) = previous {
                    let wait = (fix.timestamp - prev).max(0.0);
                    thread::sleep(Duration::from_secs_f64(wait));
                }
            }
            previous = Some(fix.timestamp);
            if tx.send(fix).is_err() {
                break;
            }
        }
    });

    let mut last_timestamp: Option<f64> = None;
    for fix in rx.iter() {
        if let Some(prev) = last_timestamp {
            let gap = fix.timestamp - prev;
            if gap > args.gap_threshold {
                let steps = fix_log::gap_steps(gap, dt);
                warn!(
                    "{:.2}s gap before t={:.2}, dead reckoning {} steps",
                    gap, fix.timestamp, steps
                );
                for step in 1..=steps {
                    if let Some(estimate) = session.dead_reckon()? {
                        let t = prev + step as f64 * dt;
                        write_estimate(&mut *out, t, "dead_reckoned", estimate, None)?;
                    }
                }
            }
        }
        last_timestamp = Some(fix.timestamp);

        let quality = Some(fix.quality_factor);
        match session.process_fix(&fix.raw(), fix.quality_factor) {
            Ok(TickOutcome::Seeded(estimate)) => {
                write_estimate(&mut *out, fix.timestamp, "seeded", estimate, quality)?
            }
            Ok(TickOutcome::Updated(estimate)) => {
                write_estimate(&mut *out, fix.timestamp, "updated", estimate, quality)?
            }
            Ok(TickOutcome::PredictedOnly(estimate)) => {
                write_estimate(&mut *out, fix.timestamp, "predicted_only", estimate, None)?
            }
            Ok(TickOutcome::Ignored) => {}
            Err(e) if e.is_recoverable() => warn!("t={:.2}: {}", fix.timestamp, e),
            Err(e) => return Err(e.into()),
        }
    }

    if producer.join().is_err() {
        error!("Fix producer thread panicked");
    }
    out.flush()?;

    let stats = session.stop()?;
    info!("Session summary: {}", serde_json::to_string(&stats)?);
    Ok(())
}
