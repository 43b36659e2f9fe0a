//! gnsslink CLI - talk to a u-blox receiver on a serial port
//!
//! Headless companion to the library for scripting and bring-up.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::bounded;
use gnsslink_core::cli::{print_exit_codes, CliResult, ExitCodes};
use gnsslink_core::core::protocol::nmea;
use gnsslink_core::core::transport::list_ports;
use gnsslink_core::{
    AppConfig, GnssDevice, GnssError, MessageId, MessageReceiver, ModuleType, Protocol,
    SerialUart, Transport,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// Receiver generation
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModuleArg {
    /// M8 and older (CFG-PRT)
    M8,
    /// M9 (CFG-VALSET)
    M9,
    /// M10 (CFG-VALSET)
    M10,
}

impl From<ModuleArg> for ModuleType {
    fn from(arg: ModuleArg) -> Self {
        match arg {
            ModuleArg::M8 => Self::M8,
            ModuleArg::M9 => Self::M9,
            ModuleArg::M10 => Self::M10,
        }
    }
}

/// On/off switch
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

/// gnsslink CLI
#[derive(Parser, Debug)]
#[command(
    name = "gnsslink",
    version,
    about = "UBX, NMEA and RTCM message exchange with u-blox GNSS receivers",
    long_about = None
)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, env = "GNSSLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Serial port name (e.g., COM3, /dev/ttyACM0)
    #[arg(short, long, env = "GNSSLINK_PORT")]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Receiver generation
    #[arg(short, long, value_enum)]
    module: Option<ModuleArg>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    ListPorts,

    /// Print received messages until interrupted
    Monitor {
        /// Message filter, e.g. ANY, UBX-01-FF, NMEA-G?GGA, RTCM-*
        #[arg(short, long, default_value = "ANY")]
        filter: String,

        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,
    },

    /// Send a UBX message and print the reply body
    Poll {
        /// Message class (hex)
        #[arg(value_parser = parse_hex_u8)]
        class: u8,

        /// Message ID (hex)
        #[arg(value_parser = parse_hex_u8)]
        id: u8,

        /// Body bytes (hex)
        #[arg(long, default_value = "")]
        body: String,

        /// Only wait for UBX-ACK-ACK/NAK
        #[arg(long)]
        ack: bool,
    },

    /// Read or change which protocols the receiver outputs
    ProtocolOut {
        #[command(subcommand)]
        action: ProtocolOutAction,
    },

    /// Print the exit code table
    ExitCodes,
}

#[derive(Subcommand, Debug)]
enum ProtocolOutAction {
    /// Show the protocols currently output
    Get,
    /// Switch one protocol on or off
    Set {
        /// ubx, nmea, rtcm or all
        protocol: Protocol,
        /// on or off
        #[arg(value_enum)]
        state: Switch,
    },
}

fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(digits, 16).map_err(|e| format!("'{s}': {e}"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    let mut config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: config: {e}");
            return ExitCode::from(ExitCodes::CONFIG_ERROR);
        }
    };
    if let Some(port) = &cli.port {
        config.serial.port.clone_from(port);
    }
    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }
    if let Some(module) = cli.module {
        config.module = module.into();
    }

    init_logging(&config, cli.verbose);

    match run(&cli, &config) {
        Ok(()) => CliResult::success().to_exit_code(),
        Err(e) => {
            let result = match e.downcast_ref::<GnssError>() {
                Some(gnss) => CliResult::from(gnss),
                None => CliResult::error(ExitCodes::ERROR, e.to_string()),
            };
            eprintln!("Error: {e:#}");
            result.to_exit_code()
        }
    }
}

fn init_logging(config: &AppConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli, config: &AppConfig) -> anyhow::Result<()> {
    match &cli.command {
        Commands::ListPorts => list(),
        Commands::ExitCodes => {
            print_exit_codes();
            Ok(())
        }
        Commands::Monitor { filter, duration } => {
            let wanted: MessageId = filter.parse()?;
            let device = open_device(config)?;
            monitor(device, wanted, *duration)
        }
        Commands::Poll {
            class,
            id,
            body,
            ack,
        } => {
            let body = hex::decode(body).context("body is not valid hex")?;
            let device = open_device(config)?;
            if *ack {
                device.send_ubx_with_ack(*class, *id, &body)?;
                println!("ACK");
            } else {
                let reply = device.send_receive_ubx_alloc(*class, *id, &body)?;
                println!(
                    "{} ({} bytes): {}",
                    MessageId::ubx(reply.class, reply.id),
                    reply.body.len(),
                    hex::encode(&reply.body)
                );
            }
            Ok(())
        }
        Commands::ProtocolOut { action } => {
            let device = open_device(config)?;
            match action {
                ProtocolOutAction::Get => {
                    println!("{}", device.get_protocol_out()?);
                }
                ProtocolOutAction::Set { protocol, state } => {
                    device.set_protocol_out(*protocol, matches!(state, Switch::On))?;
                    println!("{}", device.get_protocol_out()?);
                }
            }
            Ok(())
        }
    }
}

fn list() -> anyhow::Result<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        println!("{port}");
    }
    Ok(())
}

fn open_device(config: &AppConfig) -> anyhow::Result<GnssDevice> {
    let uart = SerialUart::open(&config.serial).map_err(GnssError::from)?;
    tracing::info!(
        "{} receiver on {} @ {} baud",
        config.module,
        config.serial.port,
        config.serial.baud_rate
    );
    Ok(GnssDevice::new(
        config.module,
        Transport::Uart(Box::new(uart)),
        config.device.clone(),
    )?)
}

fn monitor(device: GnssDevice, wanted: MessageId, duration: Option<u64>) -> anyhow::Result<()> {
    let (stop_tx, stop_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("installing Ctrl-C handler")?;

    let mut receiver = MessageReceiver::start(Arc::new(device))?;
    receiver.add_reader(
        wanted,
        Box::new(|id, frame| match nmea::sentence_body(frame) {
            Some(sentence) if matches!(id, MessageId::Nmea(_)) => println!("{id}: {sentence}"),
            _ => println!("{id} ({} bytes): {}", frame.len(), hex::encode(frame)),
        }),
    );

    match duration {
        Some(secs) => {
            let _ = stop_rx.recv_timeout(Duration::from_secs(secs));
        }
        None => {
            let _ = stop_rx.recv();
        }
    }
    receiver.stop();
    Ok(())
}
