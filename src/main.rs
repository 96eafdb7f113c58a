use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use driver_station::bridge::{self, Bridge, DEFAULT_BRIDGE_ADDR};
use driver_station::input::NoDevices;
use driver_station::link::ssh::{SshConnector, SystemPinger};
use driver_station::link::{SessionConfig, SessionContext};
use driver_station::settings::JsonSettings;
use driver_station::udp::ROBOT_PORT;
use driver_station::{DriverStation, StationConfig, StationEvent};

const LOOP_PERIOD: Duration = Duration::from_millis(10);
const PUBLISH_PERIOD: Duration = Duration::from_millis(40);

#[derive(Parser, Debug)]
#[command(name = "driver-station")]
#[command(about = "Drive a robot over SSH and UDP, with a WebSocket UI bridge")]
struct Args {
    /// Settings file
    #[arg(long, default_value = "driver-station.json")]
    settings: PathBuf,

    /// Companion script pushed to the robot
    #[arg(long, default_value = "DS.sh")]
    script: PathBuf,

    /// WebSocket bridge bind address
    #[arg(long, default_value = DEFAULT_BRIDGE_ADDR)]
    bridge: String,

    /// UDP port of the robot program
    #[arg(long, default_value_t = ROBOT_PORT)]
    robot_port: u16,

    /// Robot to connect to at start-up, instead of the saved one
    #[arg(short, long)]
    robot: Option<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    log::info!("Starting driver station, settings in {}", args.settings.display());

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let settings = JsonSettings::open(&args.settings)?;
    let context = SessionContext {
        connector: Arc::new(SshConnector),
        pinger: Arc::new(SystemPinger),
        config: Arc::new(SessionConfig {
            script_path: args.script,
            ..SessionConfig::default()
        }),
    };
    let config = StationConfig {
        robot_port: args.robot_port,
        ..StationConfig::default()
    };
    let mut station = DriverStation::new(Box::new(settings), Box::new(NoDevices), context, config)?;
    station.subscribe(|event| match event {
        StationEvent::ConnectionFailed { reason, message } => log::warn!("Connection failed ({}): {}", reason, message),
        StationEvent::ConnectionLost { host, reason } => log::warn!("Connection to {} lost: {}", host, reason),
        _ => {}
    });

    let bridge = Bridge::start(&args.bridge)?;

    if let Some(address) = args.robot.or_else(|| station.saved_address()) {
        log::info!("Connecting to {}", address);
        station.add_address(&address);
        station.connect(&address);
    }

    let mut last_publish: Option<Instant> = None;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        for command in bridge.commands() {
            bridge::apply_command(&mut station, command, now);
        }
        station.tick(now);

        if last_publish.is_none_or(|t| now.duration_since(t) >= PUBLISH_PERIOD) {
            bridge.publish(&station.snapshot(now));
            last_publish = Some(now);
        }
        thread::sleep(LOOP_PERIOD);
    }

    station.shutdown(Instant::now());
    log::info!("Driver station stopped");
    Ok(())
}
