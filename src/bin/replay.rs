use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use crossbeam::channel;
use flate2::read::GzDecoder;
use road_bump_rs::{
    BumpEvent, DetectionConfig, DetectionSession, LocationFix, LocationProvider,
    ManualSensorSource, RawSample, SampleTrace, SharedLocation,
};
use serde::Deserialize;
use serde_json::json;

const STANDARD_GRAVITY: f64 = 9.80665;

#[derive(Parser, Debug)]
struct Args {
    /// Path to a drive log (*.json or *.json.gz)
    #[arg(long)]
    log: PathBuf,

    /// Detection config JSON (defaults when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Accelerometer values in the log are m/s^2 rather than g
    #[arg(long, default_value_t = false)]
    mps2: bool,

    /// Print the trace of every sample as a JSON line
    #[arg(long, default_value_t = false)]
    trace: bool,
}

#[derive(Deserialize)]
struct AccelData {
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Deserialize)]
struct GpsData {
    latitude: f64,
    longitude: f64,
    speed: f64,
}

#[derive(Deserialize)]
struct Reading {
    /// Seconds
    timestamp: f64,
    accel: Option<AccelData>,
    gps: Option<GpsData>,
}

#[derive(Deserialize)]
struct LogFile {
    readings: Vec<Reading>,
}

fn load_log(path: &Path) -> anyhow::Result<LogFile> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let gz = GzDecoder::new(file);
        let reader = BufReader::new(gz);
        Ok(serde_json::from_reader(reader)?)
    } else {
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => DetectionConfig::from_json_file(path)?,
        None => DetectionConfig::default(),
    };
    let log = load_log(&args.log)?;
    let scale = if args.mps2 { 1.0 / STANDARD_GRAVITY } else { 1.0 };

    let source = ManualSensorSource::new();
    let feed = source.feed();
    let location = SharedLocation::new();
    let session = DetectionSession::new(source);
    let (event_tx, event_rx) = channel::unbounded::<BumpEvent>();

    let trace_sink = if args.trace {
        Some(Box::new(|trace: &SampleTrace| {
            if let Ok(line) = serde_json::to_string(&json!({ "trace": trace })) {
                println!("{}", line);
            }
        }) as road_bump_rs::TraceSink)
    } else {
        None
    };

    let provider: Arc<dyn LocationProvider> = Arc::new(location.clone());
    session.start_traced(config, provider, event_tx, trace_sink)?;

    let mut accel_count = 0u64;
    let mut gps_count = 0u64;
    let mut events = Vec::new();

    for r in &log.readings {
        if let Some(gps) = r.gps.as_ref() {
            location.update(LocationFix::new(gps.latitude, gps.longitude, gps.speed));
            gps_count += 1;
        }
        if let Some(acc) = r.accel.as_ref() {
            feed.push(RawSample::new(
                acc.x * scale,
                acc.y * scale,
                acc.z * scale,
                r.timestamp * 1000.0,
            ));
            accel_count += 1;
        }

        while let Ok(event) = event_rx.try_recv() {
            println!("{}", serde_json::to_string(&json!({ "event": event }))?);
            events.push(event);
        }
    }

    session.stop()?;
    let stats = session.stats()?;
    let max_severity = events.iter().map(|e| e.severity).fold(0.0, f64::max);

    let summary = json!({
        "summary": {
            "log": args.log.display().to_string(),
            "readings": log.readings.len(),
            "accel_samples": accel_count,
            "gps_fixes": gps_count,
            "events": events.len(),
            "max_severity": max_severity,
            "stats": stats,
        }
    });
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
