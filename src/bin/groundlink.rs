use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;
use futures::{SinkExt, StreamExt};
use groundlink::command::SimCommand;
use groundlink::observer::DEFAULT_PATH;
use groundlink::telemetry::TelemetryFrame;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "2078";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("groundlink")
        .version("0.1.0")
        .author("Ground Station Engineering Team")
        .about("🛰️  GroundLink - CanSat ground-station relay client")
        .arg(
            Arg::with_name("host")
                .short("H")
                .long("host")
                .value_name("HOST")
                .help("Relay host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Relay port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("path")
                .long("path")
                .value_name("PATH")
                .help("WebSocket path on the relay")
                .takes_value(true)
                .default_value(DEFAULT_PATH)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table", "compact"])
                .default_value("table")
                .global(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable verbose output")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("monitor")
                .about("📡 Stream live telemetry from the relay")
                .long_about("Connects as the relay's observer and prints every telemetry record as it arrives. The relay serves one observer at a time; connecting takes over the slot.")
                .arg(
                    Arg::with_name("duration")
                        .short("d")
                        .long("duration")
                        .value_name("SECONDS")
                        .help("Stop after this many seconds")
                        .takes_value(true)
                        .validator(|v| match v.parse::<u64>() {
                            Ok(_) => Ok(()),
                            Err(_) => Err("Duration must be a whole number of seconds".into()),
                        }),
                ),
        )
        .subcommand(
            SubCommand::with_name("sim")
                .about("🧪 Simulation mode control")
                .subcommand(
                    SubCommand::with_name("enable")
                        .about("Arm simulation mode (SIM,EN)"),
                )
                .subcommand(
                    SubCommand::with_name("activate")
                        .about("Start replaying recorded flight data (SIM,AC)")
                        .long_about("Starts the replay injector. Only takes effect after 'sim enable'."),
                )
                .subcommand(
                    SubCommand::with_name("disable")
                        .about("Stop the replay (SIM,DS)"),
                ),
        )
        .subcommand(
            SubCommand::with_name("send")
                .about("📤 Forward a raw command to the payload")
                .arg(
                    Arg::with_name("command")
                        .help("Command text, sent verbatim (e.g. CMD,2078,CX,ON)")
                        .required(true),
                ),
        )
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse::<u16>()?;
    let path = matches.value_of("path").unwrap_or(DEFAULT_PATH);
    let format = matches.value_of("format").unwrap_or("table");
    let verbose = matches.is_present("verbose");

    let url = format!("ws://{}:{}{}", host, port, path);

    if verbose {
        println!("{}", "🛰️  GroundLink - CanSat Ground Station".bright_blue().bold());
        println!("{} {}", "Connecting to".dimmed(), url);
    }

    match matches.subcommand() {
        ("monitor", Some(sub_matches)) => {
            handle_monitor(sub_matches, &url, format, verbose).await?;
        }
        ("sim", Some(sub_matches)) => {
            handle_sim_command(sub_matches, &url, format, verbose).await?;
        }
        ("send", Some(sub_matches)) => {
            let raw = sub_matches.value_of("command").unwrap_or_default();
            send_message(&url, raw, verbose).await?;
            print_sent(raw, format);
        }
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
            println!("{}", "Quick start:".bright_green());
            println!("  {} Watch live telemetry", "groundlink monitor".bright_cyan());
            println!("  {} Arm simulation mode", "groundlink sim enable".bright_cyan());
            println!("  {} Start the replay", "groundlink sim activate".bright_cyan());
        }
    }

    Ok(())
}

async fn connect(url: &str, verbose: bool) -> Result<Socket, Box<dyn std::error::Error>> {
    let (socket, response) = connect_async(url).await?;
    if verbose {
        println!("{} {}", "Connected:".dimmed(), response.status());
    }
    Ok(socket)
}

async fn handle_monitor(matches: &ArgMatches<'_>, url: &str, format: &str, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let duration = match matches.value_of("duration") {
        Some(seconds) => Some(Duration::from_secs(seconds.parse::<u64>()?)),
        None => None,
    };

    let mut socket = connect(url, verbose).await?;
    println!("{}", "📡 Monitoring CanSat telemetry (Press Ctrl+C to stop)...".bright_blue().bold());

    if format == "table" {
        print_table_header();
    }

    let received = match duration {
        Some(limit) => {
            let outcome = tokio::time::timeout(limit, stream_records(&mut socket, format)).await;
            match outcome {
                Ok(result) => result?,
                Err(_) => {
                    let _ = socket.close(None).await;
                    None
                }
            }
        }
        None => stream_records(&mut socket, format).await?,
    };

    if verbose {
        match received {
            Some(count) => println!("{} {} records", "Relay closed the connection after".dimmed(), count),
            None => println!("{}", "Monitor duration elapsed".dimmed()),
        }
    }

    Ok(())
}

/// Print records until the relay hangs up. Returns how many arrived.
async fn stream_records(socket: &mut Socket, format: &str) -> Result<Option<u64>, Box<dyn std::error::Error>> {
    let mut count = 0;

    while let Some(message) = socket.next().await {
        match message? {
            Message::Text(line) => {
                count += 1;
                print_record(&line, format)?;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    Ok(Some(count))
}

async fn handle_sim_command(matches: &ArgMatches<'_>, url: &str, format: &str, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let command = match matches.subcommand_name() {
        Some("enable") => SimCommand::Enable,
        Some("activate") => SimCommand::Activate,
        Some("disable") => SimCommand::Disable,
        _ => {
            println!("{}", "Sim subcommand required. Use 'groundlink sim --help' for options.".yellow());
            return Ok(());
        }
    };

    send_message(url, command.as_str(), verbose).await?;
    print_sent(command.as_str(), format);
    Ok(())
}

async fn send_message(url: &str, raw: &str, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut socket = connect(url, verbose).await?;
    socket.send(Message::Text(raw.to_string())).await?;
    socket.close(None).await?;
    Ok(())
}

fn print_sent(raw: &str, format: &str) {
    match format {
        "json" => println!("{}", serde_json::json!({ "sent": raw, "status": "ok" })),
        "compact" => println!("{}", "OK".bright_green()),
        _ => {
            println!("{} {}", "✅ Sent:".bright_green(), raw.bright_white());
        }
    }
}

fn print_table_header() {
    println!("{}", "┌──────────┬───────┬────────┬──────────────────┬──────────┬────────┬────────┬──────┐".bright_white());
    println!("{}", "│ Time     │ Pkt   │ Mode   │ State            │ Altitude │ Temp   │ Volts  │ Sats │".bright_white());
    println!("{}", "├──────────┼───────┼────────┼──────────────────┼──────────┼────────┼────────┼──────┤".bright_white());
}

fn print_record(line: &str, format: &str) -> Result<(), serde_json::Error> {
    let frame = TelemetryFrame::parse(line);

    match format {
        "json" => println!("{}", serde_json::to_string(&frame)?),
        "compact" => {
            let mode = if frame.is_simulated() { "SIM".yellow() } else { "FLT".green() };
            println!(
                "[{}] {} {} | {}m | {}°C | {}V",
                frame.mission_time, mode, frame.state, frame.altitude, frame.temperature, frame.voltage
            );
        }
        _ => {
            let mode = if frame.is_simulated() {
                format!("{:<6}", "SIM").yellow()
            } else {
                format!("{:<6}", "FLIGHT").green()
            };
            println!(
                "│ {:<8} │ {:>5} │ {} │ {:<16} │ {:>8} │ {:>6} │ {:>6} │ {:>4} │",
                frame.mission_time,
                frame.packet_count,
                mode,
                frame.state.bright_cyan(),
                frame.altitude,
                frame.temperature,
                frame.voltage,
                frame.gps_sats
            );
        }
    }

    Ok(())
}
