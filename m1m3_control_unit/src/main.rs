//! # M1M3 Control Unit
//!
//! Outer-loop control core driving a simulated mirror cell.
//!
//! Commands arrive as JSON lines on stdin
//! (`{"topic": "MTM1M3_command_start", "commandId": 1, "settingsToApply": "Default"}`);
//! acknowledgments and events leave as JSON lines on stdout. Logs go to
//! stderr.
//!
//! Three threads: the subscriber decodes stdin, the worker executes
//! commands and cycles, the clock requests one cycle per period.

use clap::Parser;
use m1m3_common::config::LogLevel;
use m1m3_common::consts::DEFAULT_SETTINGS_PROFILE;
use m1m3_common::geometry::MirrorGeometry;
use m1m3_common::state::AckCode;
use m1m3_control_unit::command::codec::{self, DecodeError};
use m1m3_control_unit::command::{Command, CommandController, CommandEnvelope, StartPayload};
use m1m3_control_unit::config::{load_config, CellConfig, TransportKind};
use m1m3_control_unit::cycle::{
    rt_lock_memory, rt_setup_thread, CycleBarrier, OuterLoopClock, SystemTimeSource,
};
use m1m3_control_unit::model::Model;
use m1m3_control_unit::publisher::{JsonLinesPublisher, Publisher};
use m1m3_control_unit::state::Context;
use m1m3_control_unit::transport::{IlcTransport, SimulatedTransport};
use std::io::BufRead;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// M1M3 Control Unit: outer-loop mirror support control
#[derive(Parser, Debug)]
#[command(name = "m1m3_control_unit")]
#[command(version)]
#[command(about = "Outer-loop force and position control for the M1M3 mirror support")]
struct Args {
    /// Path to the cell configuration TOML. Built-in defaults when absent.
    #[arg(default_value = "config/m1m3.toml")]
    config: PathBuf,

    /// Directory of settings profiles (overrides the config file).
    #[arg(long, value_name = "DIR")]
    settings_dir: Option<PathBuf>,

    /// CPU core to pin the clock and worker threads to (default: 1).
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority (default: 80).
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Stop after N outer-loop cycles (0 = run until interrupted).
    #[arg(long, default_value_t = 0)]
    cycles: u64,

    /// Boot and start with the configured default profile.
    #[arg(long)]
    auto_start: bool,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    // Loaded before tracing: the file picks the default log level.
    let found = args.config.exists();
    let mut config = if found {
        match load_config(&args.config) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("FATAL: {e}");
                process::exit(1);
            }
        }
    } else {
        CellConfig::default()
    };
    if let Some(dir) = &args.settings_dir {
        config.settings_dir = Some(dir.clone());
    }

    setup_tracing(&args, config.shared.log_level);

    info!("M1M3 Control Unit v{} starting...", env!("CARGO_PKG_VERSION"));
    if !found {
        warn!(
            "Config file '{}' not found, using built-in defaults",
            args.config.display()
        );
    }

    if let Err(e) = run(&args, &config) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("M1M3 Control Unit shutdown complete");
}

fn run(args: &Args, config: &CellConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Config OK: service={}, cycle_time={}µs, settings_dir={:?}",
        config.shared.service_name, config.cycle_time_us, config.settings_dir,
    );

    rt_lock_memory()?;

    let publisher: Arc<dyn Publisher> = Arc::new(JsonLinesPublisher::new(
        std::io::stdout(),
        config.publish_cycle_data,
    ));
    let transport: Box<dyn IlcTransport> = match config.transport {
        TransportKind::Simulated => {
            let (transport, _handle) = SimulatedTransport::new();
            Box::new(transport)
        }
    };
    let model = Model::new(
        config.model_options(),
        Arc::new(MirrorGeometry::default()),
        transport,
        publisher.clone(),
        Arc::new(SystemTimeSource),
    );

    let barrier = Arc::new(CycleBarrier::new());
    let controller = Arc::new(CommandController::new(publisher.clone(), barrier.clone()));
    if args.auto_start {
        enqueue_auto_start(&controller, config);
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    let b = barrier.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
        b.shutdown();
    })?;

    spawn_subscriber(controller.clone(), publisher);

    let worker = {
        let controller = controller.clone();
        let running = running.clone();
        let (cpu, prio) = (args.cpu_core, args.rt_priority);
        thread::Builder::new()
            .name("m1m3-worker".to_string())
            .spawn(move || {
                if let Err(e) = rt_setup_thread(cpu, prio) {
                    warn!("Worker RT setup failed: {e}");
                }
                let mut ctx = Context::new(model);
                controller.run(&mut ctx, &running);
            })?
    };

    let clock = {
        let barrier = barrier.clone();
        let running = running.clone();
        let (cpu, prio, cycles) = (args.cpu_core, args.rt_priority, args.cycles);
        let period = config.cycle_time();
        thread::Builder::new()
            .name("m1m3-clock".to_string())
            .spawn(move || {
                if let Err(e) = rt_setup_thread(cpu, prio) {
                    warn!("Clock RT setup failed: {e}");
                }
                let mut clock = OuterLoopClock::new(barrier, period);
                clock.run(&running, cycles)
            })?
    };
    info!(
        "Outer loop running (period={:?}, cpu_core={}, priority={})",
        config.cycle_time(),
        args.cpu_core,
        args.rt_priority
    );

    let stats = clock.join().map_err(|_| "clock thread panicked")?;
    running.store(false, Ordering::SeqCst);
    barrier.shutdown();
    worker.join().map_err(|_| "worker thread panicked")?;

    info!("Cycle statistics: {stats}");
    eprintln!("{stats}");
    Ok(())
}

fn enqueue_auto_start(controller: &CommandController, config: &CellConfig) {
    let profile = if config.default_profile.is_empty() {
        DEFAULT_SETTINGS_PROFILE.to_string()
    } else {
        config.default_profile.clone()
    };
    info!(profile = %profile, "Auto-start requested");
    controller.enqueue(CommandEnvelope::new(0, Command::Boot));
    controller.enqueue(CommandEnvelope::new(
        0,
        Command::Start(StartPayload {
            settings_to_apply: profile,
        }),
    ));
}

/// Decode stdin lines into the command queue until EOF.
///
/// The thread is detached: a blocked stdin read must not hold up shutdown.
fn spawn_subscriber(controller: Arc<CommandController>, publisher: Arc<dyn Publisher>) {
    let spawned = thread::Builder::new()
        .name("m1m3-subscriber".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("stdin read failed: {e}");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match codec::decode(&line) {
                    Ok(envelope) => controller.enqueue(envelope),
                    Err(e) => report_decode_error(&*publisher, &e),
                }
            }
            debug!("Subscriber reached end of input");
        });
    if let Err(e) = spawned {
        error!("Failed to spawn subscriber: {e}");
    }
}

fn report_decode_error(publisher: &dyn Publisher, e: &DecodeError) {
    warn!("Dropping message: {e}");
    if let Some(id) = e.command_id() {
        publisher.ack(id, AckCode::Failed, &e.to_string());
    }
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, log_level: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        log_level.as_level()
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }
}
