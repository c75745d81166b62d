use anyhow::{Context, Result};
use gatewatch_core::FeedBackend;
use gatewatch_hw::{
    lookup_board, Indicator, LockActuator, SimulatedActuator, SimulatedIndicator, SysfsLed, SysfsServo,
};
use tracing_subscriber::EnvFilter;

mod config;
mod controller;
mod hardware;
mod signals;

use config::Config;
use controller::{AccessController, Timing};
use hardware::LockHardware;
use signals::ShutdownSignals;

type DynHardware = LockHardware<Box<dyn LockActuator>, Box<dyn Indicator>>;

fn open_hardware(config: &Config) -> Result<DynHardware> {
    if config.dry_run {
        tracing::info!("dry run: using simulated lock hardware");
        return Ok(LockHardware::new(
            Box::new(SimulatedActuator::new()),
            Box::new(SimulatedIndicator::new("granted")),
            Box::new(SimulatedIndicator::new("denied")),
            config.settle,
            config.lock_angle,
        ));
    }

    let board = lookup_board(&config.board)
        .ok_or_else(|| gatewatch_hw::HwError::UnknownBoard(config.board.clone()))?;
    tracing::info!(board = %board.board.name, description = %board.board.description, "board profile");

    let servo = SysfsServo::open(
        &config.pwm_root,
        board.servo.chip,
        board.servo.channel,
        board.servo.period_ns,
    )
    .context("opening servo PWM")?;
    let granted = SysfsLed::open(&config.gpio_root, board.indicators.granted_gpio).context("opening granted LED")?;
    let denied = SysfsLed::open(&config.gpio_root, board.indicators.denied_gpio).context("opening denied LED")?;

    Ok(LockHardware::new(
        Box::new(servo),
        Box::new(granted),
        Box::new(denied),
        config.settle,
        config.lock_angle,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("gatewatch-lockd starting");
    let signals = ShutdownSignals::install();
    let config = Config::from_env();

    let feed = FeedBackend::shared_from_spec(&config.feed, config.cloud_lock_feed()).context("configuring authorization feed")?;
    tracing::info!(feed = %feed.describe(), "authorization feed ready");

    let hw = open_hardware(&config)?;
    let timing = Timing {
        poll_interval: config.poll_interval,
        dwell: config.dwell,
        feed_timeout: config.feed_timeout,
        unlock_angle: config.unlock_angle,
        lock_angle: config.lock_angle,
    };

    let mut controller = AccessController::new(feed, hw, timing);
    controller.init().await;
    tracing::info!(poll = ?config.poll_interval, dwell = ?config.dwell, "gatewatch-lockd ready");

    controller.run(signals.recv()).await;
    tracing::info!("gatewatch-lockd stopped");
    Ok(())
}
