use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use crossbeam::channel;
use road_bump_rs::sensors::{synthetic_accel_loop, synthetic_gps_loop, RoadProfile};
use road_bump_rs::{
    BumpEvent, ChannelSensorSource, DetectionConfig, DetectionSession, LocationProvider,
    SharedLocation,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::{interval, Duration, Instant};

#[derive(Parser, Debug)]
#[command(about = "Road bump detector - live run against simulated sensors", long_about = None)]
struct Args {
    /// Duration in seconds (0 = continuous)
    #[arg(value_name = "SECONDS", default_value = "30")]
    duration: u64,

    /// Detection config JSON (defaults when omitted)
    #[arg(long)]
    config: Option<String>,

    /// Simulated vehicle speed (mph)
    #[arg(long, default_value = "25.0")]
    speed_mph: f64,

    /// Milliseconds between simulated potholes
    #[arg(long, default_value = "4000.0")]
    pothole_every_ms: f64,

    /// Directory for the session summary (skipped when omitted)
    #[arg(long)]
    output_dir: Option<String>,
}

#[derive(Serialize)]
struct SessionSummary {
    started: String,
    config: DetectionConfig,
    events: Vec<BumpEvent>,
    stats: road_bump_rs::DetectorStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => DetectionConfig::from_json_file(path)?,
        None => DetectionConfig::default(),
    };

    println!("[{}] Road Bump Detector Starting", ts_now());
    println!("  Duration: {} seconds (0=continuous)", args.duration);
    println!("  Speed: {:.1} mph", args.speed_mph);
    println!(
        "  Threshold: {:.2} g, cooldown {:.0} ms",
        config.base_threshold_g, config.cooldown_ms
    );

    let (sample_tx, source) = ChannelSensorSource::bounded(512);
    let (event_tx, event_rx) = channel::bounded::<BumpEvent>(64);
    let location = SharedLocation::new();

    let profile = RoadProfile {
        pothole_every_ms: args.pothole_every_ms,
        ..RoadProfile::default()
    };
    let accel_task = tokio::spawn(synthetic_accel_loop(
        sample_tx,
        config.sample_interval_ms,
        profile,
    ));
    let gps_task = tokio::spawn(synthetic_gps_loop(
        location.clone(),
        args.speed_mph / road_bump_rs::sensor_receiver::MPS_TO_MPH,
        Duration::from_secs(1),
    ));

    let session = DetectionSession::new(source);
    let provider: Arc<dyn LocationProvider> = Arc::new(location);
    session.start(config.clone(), provider, event_tx)?;

    let started = ts_now();
    let start_time = Instant::now();
    let mut events = Vec::new();
    let mut poll = interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            _ = poll.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                println!("[{}] Interrupted, stopping...", ts_now());
                break;
            }
        }

        while let Ok(event) = event_rx.try_recv() {
            println!(
                "[{}] BUMP severity {:.1} at ({:.5}, {:.5}) {:.1} mph",
                ts_now(),
                event.severity,
                event.latitude,
                event.longitude,
                road_bump_rs::sensor_receiver::mps_to_mph(event.speed_mps)
            );
            events.push(event);
        }

        if args.duration > 0 && start_time.elapsed().as_secs() >= args.duration {
            println!("[{}] Duration reached, stopping...", ts_now());
            break;
        }
    }

    session.stop()?;
    accel_task.abort();
    gps_task.abort();

    let stats = session.stats()?;
    println!(
        "[{}] Done: {} samples, {} candidates, {} events ({} in cooldown)",
        ts_now(),
        stats.samples_seen,
        stats.candidates,
        stats.events_emitted,
        stats.cooldown_suppressions
    );

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)?;
        let filename = format!("{}/bumps_{}.json", dir, ts_now_clean());
        let summary = SessionSummary {
            started,
            config,
            events,
            stats,
        };
        std::fs::write(&filename, serde_json::to_string_pretty(&summary)?)?;
        println!("[{}] Saved session to {}", ts_now(), filename);
    }

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
