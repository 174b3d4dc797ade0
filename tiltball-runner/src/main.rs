use clap::Parser;
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use glam::Vec3;
use hdrhistogram::Histogram;
use log::{debug, error, info, trace, warn};
use tiltball_config::{load_config, Config, FrameFormat as ConfigFrameFormat};
use tiltball_motion::{MotionController, MotionParams, PointBody};
use tiltball_telemetry::{FrameFormat, LineSource, SerialLink};

use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the telemetry/motion configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,
}

fn main() {
    env_logger::init();

    let args = Args::parse();

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {:?}", e);
            process::exit(1);
        }
    };
    info!("using configuration from {}", args.config.display());

    let shutdown = shutdown_channel();
    run(&config, &shutdown);
}

/// Ctrl+C flips a bounded channel; the simulation loop polls it between
/// ticks. The handler thread shares nothing else with the loop.
fn shutdown_channel() -> Receiver<()> {
    let (tx, rx) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })
    .expect("failed to set Ctrl+C handler");
    rx
}

fn run(config: &Config, shutdown: &Receiver<()>) {
    let format = frame_format(config.serial.format);

    // A failed open is reported once and the loop runs anyway; the link
    // stays disabled for the lifetime of the process (no reconnection).
    let mut link = match SerialLink::open(
        &config.serial.port_name,
        config.serial.baud_rate,
        Duration::from_millis(config.serial.read_timeout_ms),
    ) {
        Ok(link) => link,
        Err(e) => {
            error!("{}", e);
            SerialLink::disabled()
        }
    };

    let params = MotionParams {
        jump_velocity: config.motion.jump_velocity,
        ground_restitution: config.motion.ground_restitution,
        ground_epsilon: config.motion.ground_epsilon,
        axis_scale: config.motion.axis_scale,
    };
    let mut controller = MotionController::new(params, config.motion.ground_height);
    let start_height = config.motion.ground_height.unwrap_or(0.0);
    let mut body = PointBody::new(Vec3::new(0.0, start_height, 0.0));

    let frame_duration = Duration::from_secs_f64(1.0 / config.framerate as f64);
    let dt = frame_duration.as_secs_f32();

    // Tick durations in microseconds, reported at shutdown.
    let mut tick_times = Histogram::<u64>::new(3).expect("failed to create histogram");

    info!(
        "running at {} Hz on {} ({})",
        config.framerate,
        config.serial.port_name,
        if link.is_open() { "link open" } else { "link disabled" },
    );

    loop {
        match shutdown.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        let frame_start = Instant::now();

        step(&mut link, format, &mut controller, &mut body, config.motion.gravity, dt);

        let elapsed = frame_start.elapsed();
        let _ = tick_times.record(elapsed.as_micros() as u64);

        // Frame Rate Control
        if elapsed < frame_duration {
            spin_sleep::sleep(frame_duration - elapsed);
        } else if config.framerate > 10 {
            // Only show warning if target framerate is high enough to matter
            warn!("frame time exceeded budget: {:?} > {:?}", elapsed, frame_duration);
        }
    }

    link.close();

    info!(
        "shutting down after {} ticks; tick time mean {:.0}us p99 {}us max {}us",
        tick_times.len(),
        tick_times.mean(),
        tick_times.value_at_quantile(0.99),
        tick_times.max(),
    );
}

/// One fixed-rate simulation step: poll the freshest line, decode it, apply
/// it to the body, then advance free fall. A missing or malformed line
/// simply means motion does not update this tick.
fn step(
    link: &mut dyn LineSource,
    format: FrameFormat,
    controller: &mut MotionController,
    body: &mut PointBody,
    gravity: f32,
    dt: f32,
) {
    if let Some(line) = link.poll_line() {
        match format.decode(&line) {
            Ok(sample) => controller.tick(body, &sample),
            Err(e) => debug!("dropping frame {:?}: {}", line, e),
        }
    }

    // Stands in for the host engine's physics step.
    body.integrate(gravity, dt);

    trace!(
        "position ({:.3}, {:.3}, {:.3}) vy {:.3}",
        body.position.x,
        body.position.y,
        body.position.z,
        body.vertical_velocity,
    );
}

fn frame_format(format: ConfigFrameFormat) -> FrameFormat {
    match format {
        ConfigFrameFormat::Tagged => FrameFormat::Tagged,
        ConfigFrameFormat::AnalogCsv => FrameFormat::AnalogCsv,
    }
}
