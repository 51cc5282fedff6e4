//! Chaino CLI - scan for devices, change bus addresses, issue raw calls

use chaino::cli::{init_logging, parse_bus_address, parse_int, CliResult, ExitCodes, OutputFormat};
use chaino::config::AppConfig;
use chaino::core::device::Device;
use chaino::core::discovery::{scan_serial, PortReport};
use chaino::core::registry::LinkRegistry;
use chaino::core::session::{ConnectionFactory, RemoteCall, StreamSession, MASTER_ADDRESS};
use chaino::core::transport::list_ports;
use chaino::{CallResult, Value};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;

/// Chaino CLI
#[derive(Parser, Debug)]
#[command(name = "chaino", version, about = "Chaino device utility", long_about = None)]
struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file (defaults to the per-user config dir)
    #[arg(long, env = "CHAINO_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Override the configured baud rate
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// Override the configured retry budget
    #[arg(long, global = true)]
    retries: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    ListPorts,

    /// Scan serial ports for Chaino master devices
    Scan,

    /// Change the bus address stored in the master device
    Change {
        /// Serial port (e.g. COM9, /dev/ttyACM0)
        port: String,
        /// New address (e.g. 0x41 or 65)
        new_addr: String,
    },

    /// Call a firmware function by number
    Call {
        /// Serial port
        port: String,
        /// Function number (decimal or 0x..)
        func: String,
        /// Arguments, sent verbatim
        args: Vec<String>,
        /// Target bus address behind the master (default: the master itself)
        #[arg(long)]
        addr: Option<String>,
    },

    /// Measure round-trip latency of who()
    Ping {
        /// Serial port
        port: String,
        /// Target bus address behind the master
        #[arg(long)]
        addr: Option<String>,
        /// Number of pings
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match load_config(&cli) {
        Ok(config) => config,
        Err(result) => return finish(&cli, &result),
    };
    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }
    if let Some(retries) = cli.retries {
        config.protocol.max_retries = retries;
    }
    if let Err(err) = config.validate() {
        return finish(&cli, &CliResult::error(ExitCodes::CONFIG_ERROR, err.to_string()));
    }

    let _guard = match init_logging(&config.logging, cli.verbose, cli.quiet) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("warning: {err:#}");
            None
        }
    };

    let factory = ConnectionFactory::new(
        Arc::new(LinkRegistry::new()),
        config.serial.clone(),
        config.protocol.session_options(),
    );

    let result = match run(&cli, &factory).await {
        Ok(result) => result,
        Err(err) => CliResult::error(ExitCodes::ERROR, format!("{err:#}")),
    };
    finish(&cli, &result)
}

fn load_config(cli: &Cli) -> Result<AppConfig, CliResult> {
    let loaded = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    loaded.map_err(|e| CliResult::error(ExitCodes::CONFIG_ERROR, e.to_string()))
}

async fn run(cli: &Cli, factory: &ConnectionFactory) -> anyhow::Result<CliResult> {
    match &cli.command {
        Commands::ListPorts => list_serial_ports(cli),
        Commands::Scan => scan(cli, factory).await,
        Commands::Change { port, new_addr } => Ok(change_address(cli, factory, port, new_addr).await),
        Commands::Call {
            port,
            func,
            args,
            addr,
        } => Ok(call(cli, factory, port, func, args, addr.as_deref()).await),
        Commands::Ping { port, addr, count } => Ok(ping(cli, factory, port, addr.as_deref(), *count).await),
    }
}

fn finish(cli: &Cli, result: &CliResult) -> ExitCode {
    match result {
        CliResult::Success(Some(msg)) if !cli.quiet => println!("{msg}"),
        CliResult::Error(_, msg) => match cli.format {
            OutputFormat::Json => eprintln!("{}", serde_json::json!({ "error": msg, "code": result.code() })),
            OutputFormat::Text => eprintln!("[ERROR] {msg}"),
        },
        _ => {}
    }
    result.to_exit_code()
}

fn list_serial_ports(cli: &Cli) -> anyhow::Result<CliResult> {
    let ports = list_ports()?;

    if ports.is_empty() {
        return Ok(CliResult::error(ExitCodes::NOT_FOUND, "No serial ports found."));
    }

    match cli.format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = ports
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.port_name,
                        "type": format!("{:?}", p.port_type)
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            for port in &ports {
                println!("{} [{:?}]", port.port_name, port.port_type);
            }
        }
    }
    Ok(CliResult::success())
}

async fn scan(cli: &Cli, factory: &ConnectionFactory) -> anyhow::Result<CliResult> {
    let reports: Vec<PortReport> = scan_serial(factory).await?;

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Text => {
            for report in &reports {
                match &report.device {
                    Some(info) => println!(
                        "Serial(\"{}\"): {} (I2C addr.: 0x{:02x})",
                        report.port, info.name, info.address
                    ),
                    None => println!("Serial(\"{}\"): Not a Chaino (master) device", report.port),
                }
            }
            if !cli.quiet {
                println!("Note: scan detects MASTER Chaino devices only.");
            }
        }
    }

    if reports.iter().any(|r| r.device.is_some()) {
        Ok(CliResult::success())
    } else {
        Ok(CliResult::error(ExitCodes::NOT_FOUND, "no Chaino master devices found"))
    }
}

async fn open_session(factory: &ConnectionFactory, port: &str, addr: Option<&str>) -> Result<StreamSession, CliResult> {
    let address = match addr {
        Some(text) => parse_bus_address(text)?,
        None => MASTER_ADDRESS,
    };
    factory.stream_session(port, address).await.map_err(CliResult::from)
}

async fn change_address(cli: &Cli, factory: &ConnectionFactory, port: &str, new_addr: &str) -> CliResult {
    let new_address = match parse_bus_address(new_addr) {
        Ok(address) => address,
        Err(result) => return result,
    };
    let session = match open_session(factory, port, None).await {
        Ok(session) => session,
        Err(result) => return result,
    };

    match Device::new(session).set_address(new_address).await {
        Ok(message) => match cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::json!({ "address": new_address, "message": message }));
                CliResult::success()
            }
            OutputFormat::Text => CliResult::success_with_message(message),
        },
        Err(err) => CliResult::error(
            ExitCodes::CALL_FAILED,
            format!("Failed to change I2C address: {err}"),
        ),
    }
}

async fn call(
    cli: &Cli,
    factory: &ConnectionFactory,
    port: &str,
    func: &str,
    args: &[String],
    addr: Option<&str>,
) -> CliResult {
    let Some(func_num) = parse_int(func).and_then(|f| u16::try_from(f).ok()) else {
        return CliResult::invalid_args(format!("invalid function number: {func}"));
    };
    let session = match open_session(factory, port, addr).await {
        Ok(session) => session,
        Err(result) => return result,
    };

    let values: Vec<Value> = args.iter().map(|a| Value::from(a.as_str())).collect();
    debug!(func_num, ?values, "calling");
    match session.call(func_num, &values).await {
        Ok(result) => {
            print_result(cli, &result, &session);
            CliResult::success()
        }
        Err(err) => CliResult::from(err),
    }
}

fn print_result(cli: &Cli, result: &CallResult, session: &StreamSession) {
    match cli.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "result": result, "stats": session.stats() })
        ),
        OutputFormat::Text => match result {
            CallResult::None => {}
            CallResult::Single(value) => println!("{value}"),
            CallResult::Multiple(values) => {
                for value in values {
                    println!("{value}");
                }
            }
        },
    }
}

async fn ping(cli: &Cli, factory: &ConnectionFactory, port: &str, addr: Option<&str>, count: u32) -> CliResult {
    let session = match open_session(factory, port, addr).await {
        Ok(session) => session,
        Err(result) => return result,
    };
    let device = Device::new(session);

    for _ in 0..count.max(1) {
        match device.ping().await {
            Ok(elapsed) => {
                let ms = elapsed.as_secs_f64() * 1000.0;
                match cli.format {
                    OutputFormat::Json => println!("{}", serde_json::json!({ "elapsed_ms": ms })),
                    OutputFormat::Text => println!("ping... elapsed time to execute who() : {ms:.3} ms"),
                }
            }
            Err(err) => return CliResult::from(err),
        }
    }

    let stats = device.session().stats();
    if cli.verbose {
        eprintln!(
            "read errors: {}, write errors: {}",
            stats.read_crc_errors, stats.write_crc_errors
        );
    }
    CliResult::success()
}
