use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

use efis_rs::efis::{AutopilotCommand, EfisConfig, EfisEvent};
use efis_rs::live_status::LiveStatus;
use efis_rs::sim::{self, SimAircraft};

#[derive(Parser, Debug)]
#[command(name = "efis_sim")]
#[command(about = "EFIS core flown against a simulated aircraft", long_about = None)]
struct Args {
    /// Simulated seconds to fly (0 = until Ctrl-C)
    #[arg(long, value_name = "SECONDS", default_value = "300")]
    duration: f64,

    /// JSON config (main loop interval, autopilot gains)
    #[arg(long)]
    config: Option<PathBuf>,

    /// AHRS tunables file, overrides the config
    #[arg(long)]
    ahrs_constants: Option<PathBuf>,

    /// Use the device's own attitude solution instead of the complementary filter
    #[arg(long)]
    cooked: bool,

    /// Pace ticks at the main loop interval instead of running flat out
    #[arg(long)]
    realtime: bool,

    /// Tick at which the autopilot is engaged
    #[arg(long, default_value = "100")]
    engage_at: u64,

    #[arg(long, default_value = "360")]
    start_heading: f64,

    #[arg(long, default_value = "3000")]
    start_altitude: f64,

    /// Heading to fly once engaged
    #[arg(long, default_value = "90")]
    heading: u32,

    /// Track this VOR radial outbound instead of flying a heading
    #[arg(long, conflicts_with = "ils")]
    vor: Option<u32>,

    /// Couple to the ILS down to this MDA instead of flying a heading
    #[arg(long)]
    ils: Option<i32>,

    #[arg(long, default_value = "4000")]
    altitude: i32,

    #[arg(long, default_value = "80")]
    climb: u32,

    #[arg(long, default_value = "120")]
    descent: u32,

    #[arg(long, default_value = "60")]
    min_airspeed: u32,

    #[arg(long, default_value = "130")]
    max_airspeed: u32,

    /// Output directory
    #[arg(long, default_value = "efis_sim_sessions")]
    output_dir: String,

    /// Simulated seconds between status snapshots
    #[arg(long, default_value = "2")]
    status_every: f64,
}

#[derive(Serialize)]
struct FlightOutput {
    trace: Vec<LiveStatus>,
    stats: Stats,
}

#[derive(Serialize)]
struct Stats {
    ticks: u64,
    simulated_seconds: f64,
    autopilot_updates: u64,
    skipped_cycles: u64,
    instrument_faults: u64,
    final_heading: f64,
    final_altitude: f64,
    final_airspeed: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    anyhow::ensure!((1..=360).contains(&args.heading), "heading {} out of range", args.heading);
    if let Some(radial) = args.vor {
        anyhow::ensure!((1..=360).contains(&radial), "radial {} out of range", radial);
    }
    anyhow::ensure!(
        args.min_airspeed > 10 && args.max_airspeed > 40 && args.min_airspeed < args.max_airspeed,
        "bad airspeed limits {}..{}",
        args.min_airspeed,
        args.max_airspeed
    );
    anyhow::ensure!(args.duration >= 0.0 && args.status_every > 0.0, "durations must be positive");

    let mut config = match &args.config {
        Some(path) => EfisConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => EfisConfig::default(),
    };
    if args.ahrs_constants.is_some() {
        config.ahrs_constants = args.ahrs_constants.clone();
    }
    let interval_us = config.main_loop_interval_us;
    let dt = f64::from(interval_us) / 1_000_000.0;

    println!("[{}] EFIS sim starting", ts_now());
    println!("  Duration: {} s simulated (0=continuous)", args.duration);
    println!("  Main loop: {} us", interval_us);
    println!("  AHRS: {}", if args.cooked { "cooked" } else { "complementary" });
    println!("  Realtime: {}", args.realtime);
    println!("  Output Dir: {}", args.output_dir);

    std::fs::create_dir_all(&args.output_dir)?;

    let aircraft = SimAircraft::new(args.start_altitude, args.start_heading).shared();
    let mut efis = sim::build(config, &aircraft, args.cooked);
    let duty = efis.configure()?;
    println!("[{}] Duty cycles: {:?}", ts_now(), duty);

    let mut ticker = interval(Duration::from_micros(u64::from(interval_us)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let total_ticks = (args.duration / dt).round() as u64;
    let status_ticks = ((args.status_every / dt).round() as u64).max(1);
    let status_path = format!("{}/live_status.json", args.output_dir);
    let start = Utc::now();
    let mut trace = Vec::new();
    let mut skipped_cycles = 0u64;
    let mut instrument_faults = 0u64;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    let mut tick = 0u64;
    while total_ticks == 0 || tick < total_ticks {
        if stop.load(Ordering::SeqCst) {
            println!("[{}] Interrupted, stopping...", ts_now());
            break;
        }
        if args.realtime {
            ticker.tick().await;
        }
        if let Ok(mut a) = aircraft.lock() {
            a.step(dt);
        }

        for event in efis.tick()? {
            match event {
                EfisEvent::AttitudeValidity { good } => {
                    println!("[{}] t={:.1}s attitude {}", ts_now(), tick as f64 * dt, if good { "valid" } else { "INVALID" });
                }
                EfisEvent::FlightPhase { flying } => {
                    println!("[{}] t={:.1}s {}", ts_now(), tick as f64 * dt, if flying { "flying" } else { "on ground" });
                }
                EfisEvent::InstrumentFault { instrument, error } => {
                    instrument_faults += 1;
                    println!("[{}] {} fault: {}", ts_now(), instrument, error);
                }
                EfisEvent::AutopilotCycleSkipped(_) => skipped_cycles += 1,
            }
        }

        if tick == args.engage_at {
            engage(&mut efis, &args);
        }

        if tick % status_ticks == 0 {
            let uptime = Utc::now().signed_duration_since(start).num_milliseconds() as f64 / 1000.0;
            let status = LiveStatus::from_snapshot(&efis.snapshot(), uptime);
            let _ = status.save(&status_path);
            trace.push(status);
        }
        tick += 1;
    }

    let snapshot = efis.snapshot();
    let (final_heading, final_altitude, final_airspeed) = match aircraft.lock() {
        Ok(a) => (a.heading_deg(), a.altitude_ft, a.airspeed_kt),
        Err(_) => (0.0, 0.0, 0.0),
    };
    let output = FlightOutput {
        stats: Stats {
            ticks: snapshot.tick,
            simulated_seconds: snapshot.tick as f64 * dt,
            autopilot_updates: snapshot.autopilot.updates,
            skipped_cycles,
            instrument_faults,
            final_heading,
            final_altitude,
            final_airspeed,
        },
        trace,
    };
    let filename = format!("{}/flight_{}_final.json", args.output_dir, ts_now_clean());
    let json = serde_json::to_string_pretty(&output)?;
    std::fs::write(&filename, json)?;
    println!("[{}] Final save: {} snapshots to {}", ts_now(), output.trace.len(), filename);

    println!("\n=== Final Stats ===");
    println!("Simulated: {:.1} s ({} ticks)", output.stats.simulated_seconds, output.stats.ticks);
    println!("Autopilot updates: {} ({} skipped)", output.stats.autopilot_updates, skipped_cycles);
    println!(
        "Aircraft: hdg {:.1} alt {:.0} ft ias {:.1} kt",
        final_heading, final_altitude, final_airspeed
    );
    println!(
        "EFIS:     hdg {:.1} alt {} ft ias {} kt attitude {}",
        snapshot.attitude.heading_deg(),
        snapshot.altitude.altitude,
        snapshot.airspeed.knots,
        if snapshot.attitude.good { "valid" } else { "invalid" }
    );

    Ok(())
}

fn engage(efis: &mut efis_rs::efis::Efis, args: &Args) {
    let lateral = match (args.vor, args.ils) {
        (Some(radial), _) => AutopilotCommand::SetVor { radial, heading: radial },
        (None, Some(mda)) => AutopilotCommand::SetIls { mda, descent_airspeed: 0 },
        (None, None) => AutopilotCommand::SetHeading(args.heading),
    };
    let mut commands = vec![
        AutopilotCommand::SetAirspeedLimits {
            min: args.min_airspeed,
            max: args.max_airspeed,
        },
        AutopilotCommand::EnableAutoCoordination,
    ];
    if args.ils.is_none() {
        commands.push(AutopilotCommand::SetAltitude {
            altitude: args.altitude,
            climb_airspeed: args.climb,
            descent_airspeed: args.descent,
        });
    }
    commands.push(lateral);

    for command in commands {
        match efis.command(command) {
            Ok(()) => println!("[{}] Autopilot: {:?}", ts_now(), command),
            Err(e) => println!("[{}] Autopilot rejected {:?}: {}", ts_now(), command, e),
        }
    }
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
