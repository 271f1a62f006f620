use clap::{value_t, App, Arg, ArgMatches};
use groundlink::config::{RelayConfig, SERIAL_CHANNEL_DEPTH};
use groundlink::{observer, serial, Ingestor, Relay, TelemetryLog};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let defaults = RelayConfig::default();
    let default_baud = defaults.serial.baud_rate.to_string();
    let default_interval = defaults.simulation.interval.as_millis().to_string();
    let default_backoff = defaults.serial.read_backoff.as_millis().to_string();
    let default_queue = defaults.observer.queue_depth.to_string();
    let default_log = defaults.log_path.display().to_string();
    let default_fixture = defaults.simulation.fixture_path.display().to_string();

    let matches = App::new("groundlink-relay")
        .version("0.1.0")
        .author("Ground Station Engineering Team")
        .about("🛰️  CanSat ground-station relay: serial telemetry to CSV and WebSocket")
        .arg(
            Arg::with_name("serial-port")
                .short("s")
                .long("serial-port")
                .value_name("PORT")
                .help("Serial port the payload radio is attached to")
                .takes_value(true)
                .default_value(serial::DEFAULT_PORT),
        )
        .arg(
            Arg::with_name("baud")
                .short("b")
                .long("baud")
                .value_name("RATE")
                .help("Serial baud rate")
                .takes_value(true)
                .default_value(&default_baud),
        )
        .arg(
            Arg::with_name("bind")
                .long("bind")
                .value_name("ADDR")
                .help("Address the observer endpoint listens on")
                .takes_value(true)
                .default_value(observer::DEFAULT_BIND_ADDR),
        )
        .arg(
            Arg::with_name("path")
                .long("path")
                .value_name("PATH")
                .help("WebSocket upgrade path")
                .takes_value(true)
                .default_value(observer::DEFAULT_PATH),
        )
        .arg(
            Arg::with_name("log")
                .short("l")
                .long("log")
                .value_name("FILE")
                .help("CSV flight log, appended to across restarts")
                .takes_value(true)
                .default_value(&default_log),
        )
        .arg(
            Arg::with_name("fixture")
                .long("fixture")
                .value_name("FILE")
                .help("Recorded flight data replayed in simulation mode")
                .takes_value(true)
                .default_value(&default_fixture),
        )
        .arg(
            Arg::with_name("interval-ms")
                .long("interval-ms")
                .value_name("MILLIS")
                .help("Delay between replayed simulation rows")
                .takes_value(true)
                .default_value(&default_interval)
                .validator(positive_millis),
        )
        .arg(
            Arg::with_name("read-backoff-ms")
                .long("read-backoff-ms")
                .value_name("MILLIS")
                .help("Pause after a failed serial read")
                .takes_value(true)
                .default_value(&default_backoff),
        )
        .arg(
            Arg::with_name("queue-depth")
                .long("queue-depth")
                .value_name("RECORDS")
                .help("Records buffered for a slow observer before dropping")
                .takes_value(true)
                .default_value(&default_queue),
        )
        .arg(
            Arg::with_name("print-config")
                .long("print-config")
                .help("Print the resolved configuration as JSON and exit"),
        )
        .get_matches();

    let config = config_from_args(&matches, defaults)?;

    if matches.is_present("print-config") {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    println!("🛰️  GroundLink Relay");
    println!("====================");

    // Both are fatal: without the link or the log there is nothing to relay.
    let link = serial::open_port(&config.serial)?;
    let log = TelemetryLog::open(&config.log_path)?;

    let relay = Relay::new(Box::new(link.writer), config.simulation.clone());

    let listener = observer::bind(&config.observer).await?;
    let server = tokio::spawn(observer::serve(
        listener,
        Arc::clone(&relay),
        config.observer.clone(),
    ));

    let (chunk_tx, chunk_rx) = mpsc::channel(SERIAL_CHANNEL_DEPTH);
    let _reader = serial::spawn_reader(link.reader, chunk_tx, config.serial.read_backoff)?;

    let ingestor = Ingestor::new(log, Arc::clone(&relay));
    info!("✅ Relay running");

    tokio::select! {
        stats = ingestor.run(chunk_rx) => {
            warn!(
                "Serial link closed: {} packets, {} records, {} invalid",
                stats.packets, stats.records, stats.invalid_packets
            );
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("🛑 Shutdown requested");
        }
    }

    server.abort();

    let status = relay.status().await;
    info!(
        "Relay stopped: {} records broadcast, {} dropped, {} simulation runs",
        status.records_broadcast, status.records_dropped, status.simulation_runs
    );

    Ok(())
}

fn positive_millis(value: String) -> Result<(), String> {
    match value.parse::<u64>() {
        Ok(0) => Err("Interval must be at least 1 ms".into()),
        Ok(_) => Ok(()),
        Err(_) => Err("Interval must be a whole number of milliseconds".into()),
    }
}

fn config_from_args(
    matches: &ArgMatches<'_>,
    mut config: RelayConfig,
) -> Result<RelayConfig, clap::Error> {
    if let Some(port) = matches.value_of("serial-port") {
        config.serial.port = port.to_string();
    }
    config.serial.baud_rate = value_t!(matches, "baud", u32)?;
    config.serial.read_backoff = Duration::from_millis(value_t!(matches, "read-backoff-ms", u64)?);

    if let Some(bind) = matches.value_of("bind") {
        config.observer.bind_addr = bind.to_string();
    }
    if let Some(path) = matches.value_of("path") {
        config.observer.path = path.to_string();
    }
    config.observer.queue_depth = value_t!(matches, "queue-depth", usize)?;

    if let Some(log) = matches.value_of("log") {
        config.log_path = PathBuf::from(log);
    }
    if let Some(fixture) = matches.value_of("fixture") {
        config.simulation.fixture_path = PathBuf::from(fixture);
    }
    config.simulation.interval = Duration::from_millis(value_t!(matches, "interval-ms", u64)?);

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_must_be_positive() {
        assert!(positive_millis("0".to_string()).is_err());
        assert!(positive_millis("abc".to_string()).is_err());
        assert!(positive_millis("1000".to_string()).is_ok());
    }
}
