use std::io::{self, BufRead, Write};

use rotational_rig::calibration::record_blocking;
use rotational_rig::magnetometer::MagnetometerSensor;
use rotational_rig::pwm::PwmActuator;
use rotational_rig::{
    ActuatorMapper, BootClock, CalibrationSide, CalibrationState, DriveChannel, DutyOutput,
    SensorFeed,
};
use tracing::warn;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║     Rig Reference Calibration Tool                   ║");
    println!("╚══════════════════════════════════════════════════════╝\n");

    println!("Instructions:");
    println!("1. The motors stay parked at the armed minimum throughout");
    println!("2. Move the rig to the requested position by hand and hold it");
    println!("3. Press Enter and keep it still for about two seconds\n");

    let mapper = ActuatorMapper::default();
    let mut actuator = PwmActuator::new(&mapper)?;
    let parked = mapper.parked();
    actuator.set_duty(DriveChannel::A, parked.a)?;
    actuator.set_duty(DriveChannel::B, parked.b)?;

    let mut feed = SensorFeed::new(MagnetometerSensor::new()?);
    let clock = BootClock::new();
    let mut state = CalibrationState::default();

    let stdin = io::stdin();
    for side in [CalibrationSide::Low, CalibrationSide::High] {
        print!("Move the rig to the {} position, then press Enter... ", side.to_string().to_uppercase());
        io::stdout().flush()?;
        let mut line = String::new();
        stdin.lock().read_line(&mut line)?;

        println!("Recording {side}...");
        let average = record_blocking(&mut feed, &clock);
        if feed.last_update_micros().is_none() {
            warn!(%side, "sensor never reported, recorded value is meaningless");
        }
        state.record(side, average);
        println!("  {side}: {average:.3}°\n");
    }

    println!("{:^10} | {:^10} | {:^10}", "Low", "High", "Middle");
    println!("{:-<10}-+-{:-<10}-+-{:-<10}", "", "", "");
    println!("{:>10.3} | {:>10.3} | {:>10.3}", state.low, state.high, state.middle);

    actuator.disable()?;
    Ok(())
}
