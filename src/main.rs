use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use rotational_rig::config::{DEFAULT_BIND_ADDR, ESC_ARMING_DELAY_MS, TICK_PERIOD_MICROS};
use rotational_rig::magnetometer::MagnetometerSensor;
use rotational_rig::pwm::PwmActuator;
use rotational_rig::sim::{SimActuator, SimSensor, SimulatedRig};
use rotational_rig::{
    ActuatorMapper, BootClock, ControlConfig, ControlLoop, DutyOutput, OrientationSensor,
    RigContext, RigResult, web,
};
use tracing::{Level, error, info};

#[derive(Parser)]
#[command(name = "rotational-rig")]
#[command(about = "Rotational test rig controller with a web control surface", long_about = None)]
struct Cli {
    /// Address the web control surface listens on
    #[arg(long, default_value = DEFAULT_BIND_ADDR)]
    bind: SocketAddr,
    /// Drive the simulated rig instead of the PWM outputs and magnetometer
    #[arg(long)]
    simulate: bool,
    /// Pause between control ticks in microseconds
    #[arg(long, default_value_t = TICK_PERIOD_MICROS)]
    tick_us: u64,
    /// Sensor selector recorded with every observation
    #[arg(long, default_value_t = 0)]
    sensor: u8,
    /// How long the ESCs are held at the armed minimum before the loop starts (ms)
    #[arg(long, default_value_t = ESC_ARMING_DELAY_MS)]
    arming_ms: u64,
    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let ctx = Arc::new(RigContext::new(ControlConfig {
        sensor_selector: cli.sensor,
        ..ControlConfig::default()
    }));
    let shutdown = Arc::new(AtomicBool::new(false));
    let server = web::spawn(Arc::clone(&ctx), cli.bind, Arc::clone(&shutdown));

    let clock = BootClock::new();
    let result = if cli.simulate {
        run_simulated(&cli, ctx, &clock, &shutdown)
    } else {
        run_hardware(&cli, ctx, &clock, &shutdown)
    };

    // Stop the server whichever way the loop ended.
    shutdown.store(true, Ordering::Relaxed);
    let served = web::join(server);
    if let Err(e) = &served {
        error!(error = %e, "remote surface exited with an error");
    }

    // A loop failure wins; otherwise a server failure still fails the process.
    result.and(served)?;
    info!("shutdown complete");
    Ok(())
}

fn run_hardware(cli: &Cli, ctx: Arc<RigContext>, clock: &BootClock, shutdown: &AtomicBool) -> RigResult<()> {
    let mapper = ActuatorMapper::default();
    let actuator = PwmActuator::new(&mapper)?;
    let sensor = MagnetometerSensor::new()?;

    let mut control = ControlLoop::new(ctx, sensor, actuator, mapper);
    let result = drive(&mut control, cli, clock, shutdown);
    let disabled = control.actuator_mut().disable();
    info!("PWM outputs disabled");
    result.and(disabled)
}

fn run_simulated(cli: &Cli, ctx: Arc<RigContext>, clock: &BootClock, shutdown: &AtomicBool) -> RigResult<()> {
    info!("running against the simulated rig");
    let mapper = ActuatorMapper::default();
    let rig = SimulatedRig::default().shared();
    let sensor = SimSensor::new(Arc::clone(&rig), *clock);
    let actuator = SimActuator::new(rig, mapper);

    let mut control = ControlLoop::new(ctx, sensor, actuator, mapper);
    drive(&mut control, cli, clock, shutdown)
}

fn drive<S, A>(
    control: &mut ControlLoop<S, A>,
    cli: &Cli,
    clock: &BootClock,
    shutdown: &AtomicBool,
) -> RigResult<()>
where
    S: OrientationSensor,
    A: DutyOutput,
{
    control.arm(Duration::from_millis(cli.arming_ms))?;
    control.run(clock, Duration::from_micros(cli.tick_us), shutdown)
}
