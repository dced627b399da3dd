use clap::{App, Arg, SubCommand};
use colored::*;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8484";
const RESPONSE_WINDOW_MS: u64 = 1500;

fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

fn fresh_refid() -> String {
    format!("mcr-{:x}", now_us())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("mcrctl")
        .version("0.1.0")
        .about("Master Control Remote operator CLI - craft and send node commands")
        .arg(
            Arg::with_name("host")
                .short("h")
                .long("host")
                .value_name("HOST")
                .help("Node host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Node command port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Print raw frames")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("switch")
                .about("Send a masked switch write to a device")
                .arg(
                    Arg::with_name("device")
                        .help("Target device identity (e.g. ow-2911223344556677)")
                        .required(true),
                )
                .arg(
                    Arg::with_name("mask")
                        .help("Bit positions to change (integer)")
                        .required(true)
                        .validator(|v| v.parse::<u8>().map(|_| ()).map_err(|e| e.to_string())),
                )
                .arg(
                    Arg::with_name("state")
                        .help("Target bit values (integer)")
                        .required(true)
                        .validator(|v| v.parse::<u8>().map(|_| ()).map_err(|e| e.to_string())),
                ),
        )
        .subcommand(SubCommand::with_name("heartbeat").about("Liveness round-trip"))
        .subcommand(SubCommand::with_name("timesync").about("Offer the server clock to the node"))
        .subcommand(
            SubCommand::with_name("name")
                .about("Assign a display name to a device")
                .arg(Arg::with_name("device").required(true))
                .arg(Arg::with_name("name").required(true)),
        )
        .subcommand(SubCommand::with_name("status").about("Dump the node's device table"))
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST).to_string();
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT).to_string();
    let verbose = matches.is_present("verbose");
    let mtime = now_us() / 1_000_000;

    let payload = match matches.subcommand() {
        ("switch", Some(sub)) => {
            let mask: u8 = sub.value_of("mask").unwrap().parse()?;
            let state: u8 = sub.value_of("state").unwrap().parse()?;
            serde_json::json!({
                "device": sub.value_of("device").unwrap(),
                "cmd": "set_switch",
                "mask": mask,
                "state": state,
                "refid": fresh_refid(),
                "mtime": mtime,
            })
            .to_string()
        }
        ("heartbeat", _) => serde_json::json!({
            "cmd": "heartbeat",
            "refid": fresh_refid(),
            "mtime": mtime,
        })
        .to_string(),
        ("timesync", _) => serde_json::json!({
            "cmd": "time_sync",
            "refid": fresh_refid(),
            "mtime": mtime,
        })
        .to_string(),
        ("name", Some(sub)) => serde_json::json!({
            "device": sub.value_of("device").unwrap(),
            "cmd": "set_name",
            "name": sub.value_of("name").unwrap(),
            "refid": fresh_refid(),
            "mtime": mtime,
        })
        .to_string(),
        ("status", _) => "status".to_string(),
        _ => {
            eprintln!("{}", "no subcommand given, try --help".yellow());
            return Ok(());
        }
    };

    let stream = TcpStream::connect(format!("{}:{}", host, port)).await?;
    let (reader, mut writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);

    if verbose {
        println!("{} {}", ">>".dimmed(), payload);
    }
    writer.write_all(payload.as_bytes()).await?;
    writer.write_all(b"\n").await?;

    // Drain whatever the node says inside the response window; reports and
    // the ack for our refid share one stream.
    let deadline = time::Instant::now() + Duration::from_millis(RESPONSE_WINDOW_MS);
    let mut line = String::new();
    loop {
        line.clear();
        let remaining = deadline.saturating_duration_since(time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match time::timeout(remaining, buf_reader.read_line(&mut line)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(_)) => print_response(line.trim(), verbose),
            Ok(Err(e)) => {
                eprintln!("{} {}", "read error:".red(), e);
                break;
            }
        }
    }

    Ok(())
}

fn print_response(raw: &str, verbose: bool) {
    if raw.is_empty() {
        return;
    }
    if verbose {
        println!("{} {}", "<<".dimmed(), raw);
        return;
    }

    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => {
            if let Some(ack) = value.get("ack").and_then(serde_json::Value::as_bool) {
                let refid = value
                    .get("refid")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("-");
                if ack {
                    let latency = value
                        .get("latency_us")
                        .and_then(serde_json::Value::as_u64)
                        .unwrap_or(0);
                    println!("{} {} ({} us)", "ACK".green().bold(), refid, latency);
                } else {
                    let reason = value
                        .get("reason")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or("unknown");
                    println!("{} {} ({})", "REJECTED".red().bold(), refid, reason);
                }
            } else if let Some(kind) = value.get("type").and_then(serde_json::Value::as_str) {
                println!("{} {}", kind.cyan(), value);
            } else {
                println!("{}", value);
            }
        }
        Err(_) => println!("{}", raw),
    }
}
