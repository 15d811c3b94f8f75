use std::process::ExitCode;
use std::time::Duration;

use robolink_ipc::commands::ANY_KIND;
use robolink_ipc::{ClientBuilder, EventPayload, Handle, RobolinkError};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct CliConfig {
    host: Option<String>,
    port: Option<u16>,
    launch: Option<String>,
    timeout_ms: u64,
}

#[derive(Debug)]
enum Command {
    Handshake,
    Item { name: String, kind: i32 },
    Name { item: Handle },
    Pose { item: Handle },
    Joints { item: Handle },
    Busy { item: Handle },
    Wait { item: Handle, secs: u64 },
    Events { count: usize },
    Help,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            if matches!(
                err,
                RobolinkError::Connection { .. } | RobolinkError::SessionUnavailable { .. }
            ) {
                eprintln!(
                    "hint: start the station with its API enabled, or pass --launch PATH to start it automatically."
                );
            }
            if matches!(err, RobolinkError::InvalidHandle) {
                eprintln!("hint: look the item up again with `item <name>`; handles go stale when items are removed.");
            }
            if matches!(err, RobolinkError::InvalidLicense) {
                eprintln!("hint: the station refused the API call; check its license.");
            }
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<(), RobolinkError> {
    let (config, command) = parse_args()?;

    if matches!(command, Command::Help) {
        print_help();
        return Ok(());
    }

    let mut builder = ClientBuilder::new().timeout(Duration::from_millis(config.timeout_ms));
    if let Some(host) = config.host {
        builder = builder.host(host);
    }
    if let Some(port) = config.port {
        builder = builder.port(port);
    }
    if let Some(path) = config.launch {
        builder = builder.launch(path);
    }

    let client = builder.connect().await?;

    match command {
        Command::Handshake => {
            println!("address={} banner={}", client.address(), client.banner());
        }
        Command::Item { name, kind } => {
            let item = client.item(&name, kind).await?;
            if item.is_null() {
                println!("no item named `{name}`");
            } else {
                println!("item={item}");
            }
        }
        Command::Name { item } => {
            println!("name={}", client.name(item).await?);
        }
        Command::Pose { item } => {
            let pose = client.pose(item).await?;
            for row in 0..4 {
                let values = (0..4)
                    .map(|col| format!("{:>12.4}", pose.get(row, col)))
                    .collect::<Vec<_>>();
                println!("{}", values.join(" "));
            }
        }
        Command::Joints { item } => {
            let joints = client.joints(item).await?;
            let values = joints
                .as_slice()
                .iter()
                .map(|value| format!("{value:.4}"))
                .collect::<Vec<_>>();
            println!("axes={} joints=[{}]", joints.len(), values.join(", "));
        }
        Command::Busy { item } => {
            println!("busy={}", client.is_busy(item).await?);
        }
        Command::Wait { item, secs } => {
            client
                .wait_until_idle(item, Duration::from_secs(secs))
                .await?;
            println!("idle");
        }
        Command::Events { count } => {
            let mut events = client.subscribe_events().await?;
            let mut seen = 0;
            while seen < count {
                let Some(event) = events.recv().await else {
                    println!("event channel closed after {seen} events");
                    break;
                };
                seen += 1;
                match event.payload {
                    EventPayload::None => {
                        println!("[{seen}] {:?} item={}", event.kind, event.item);
                    }
                    payload => {
                        println!("[{seen}] {:?} item={} {payload:?}", event.kind, event.item);
                    }
                }
            }
        }
        Command::Help => print_help(),
    }

    Ok(())
}

fn parse_args() -> Result<(CliConfig, Command), RobolinkError> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() {
        return Ok((default_config(), Command::Help));
    }

    let mut config = default_config();
    let mut index = 0;

    while index < args.len() {
        match args[index].as_str() {
            "--host" => {
                config.host = Some(option_value(&args, index)?.to_string());
                args.drain(index..=index + 1);
            }
            "--port" => {
                let value = option_value(&args, index)?;
                config.port = Some(value.parse::<u16>().map_err(|err| config_error(format!(
                    "invalid --port value `{value}`: {err}"
                )))?);
                args.drain(index..=index + 1);
            }
            "--timeout-ms" => {
                let value = option_value(&args, index)?;
                config.timeout_ms = value.parse::<u64>().map_err(|err| {
                    config_error(format!("invalid --timeout-ms value `{value}`: {err}"))
                })?;
                args.drain(index..=index + 1);
            }
            "--launch" => {
                config.launch = Some(option_value(&args, index)?.to_string());
                args.drain(index..=index + 1);
            }
            _ => {
                index += 1;
            }
        }
    }

    if args.is_empty() {
        return Ok((config, Command::Help));
    }

    let rest = &args[1..];
    let command = match args[0].as_str() {
        "help" | "--help" | "-h" => Command::Help,
        "handshake" => Command::Handshake,
        "item" => {
            let name = rest
                .first()
                .ok_or_else(|| config_error("item needs a name".to_string()))?
                .clone();
            let kind = match rest.get(1) {
                Some(raw) => parse_int(raw, "kind")?,
                None => ANY_KIND,
            };
            Command::Item { name, kind }
        }
        "name" => Command::Name {
            item: parse_handle(rest)?,
        },
        "pose" => Command::Pose {
            item: parse_handle(rest)?,
        },
        "joints" => Command::Joints {
            item: parse_handle(rest)?,
        },
        "busy" => Command::Busy {
            item: parse_handle(rest)?,
        },
        "wait" => {
            let item = parse_handle(rest)?;
            let secs = match rest.get(2) {
                Some(raw) => raw.parse::<u64>().map_err(|err| {
                    config_error(format!("invalid wait seconds `{raw}`: {err}"))
                })?,
                None => 60,
            };
            Command::Wait { item, secs }
        }
        "events" => {
            let count = match rest.first() {
                Some(raw) => raw.parse::<usize>().map_err(|err| {
                    config_error(format!("invalid event count `{raw}`: {err}"))
                })?,
                None => 10,
            };
            Command::Events { count }
        }
        other => {
            return Err(config_error(format!("unknown command `{other}`")));
        }
    };

    Ok((config, command))
}

fn option_value(args: &[String], index: usize) -> Result<&str, RobolinkError> {
    args.get(index + 1)
        .map(String::as_str)
        .ok_or_else(|| config_error(format!("missing value for {}", args[index])))
}

/// `<id> <kind>`, with the id in decimal or `0x` hex as printed by `item`.
fn parse_handle(rest: &[String]) -> Result<Handle, RobolinkError> {
    let raw_id = rest
        .first()
        .ok_or_else(|| config_error("missing item id".to_string()))?;
    let raw_kind = rest
        .get(1)
        .ok_or_else(|| config_error("missing item kind".to_string()))?;

    let parsed = match raw_id.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw_id.parse::<u64>(),
    };
    let id = parsed.map_err(|err| config_error(format!("invalid item id `{raw_id}`: {err}")))?;

    Ok(Handle::new(id, parse_int(raw_kind, "kind")?))
}

fn parse_int(raw: &str, what: &str) -> Result<i32, RobolinkError> {
    raw.parse::<i32>()
        .map_err(|err| config_error(format!("invalid {what} `{raw}`: {err}")))
}

fn config_error(reason: String) -> RobolinkError {
    RobolinkError::Config { reason }
}

fn default_config() -> CliConfig {
    CliConfig {
        host: None,
        port: None,
        launch: None,
        timeout_ms: 1_000,
    }
}

fn print_help() {
    println!(
        "robolink-ipc-cli\n\nUSAGE:\n  cargo run --features cli --bin robolink-ipc-cli -- [--host H] [--port P] [--timeout-ms N] [--launch PATH] <command>\n\nCOMMANDS:\n  handshake                    Connect and print the READY banner\n  item <name> [kind]           Look an item up by name (kind defaults to any)\n  name <id> <kind>             Print an item's name\n  pose <id> <kind>             Print an item's pose relative to its parent\n  joints <id> <kind>           Print a robot's joint values\n  busy <id> <kind>             Print whether an item is busy\n  wait <id> <kind> [secs]      Poll until the item is idle (default 60 s)\n  events [count]               Print station events (default 10)\n  help                         Show help\n\nENVIRONMENT:\n  ROBOLINK_HOST, ROBOLINK_PORT, ROBOLINK_LAUNCH_PATH, ROBOLINK_LAUNCH_ARGS, RUST_LOG\n"
    );
}
