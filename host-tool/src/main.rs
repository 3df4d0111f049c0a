use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

mod engine;
mod error;
mod image;
mod pad;
mod portscan;
mod registry;
mod serial;
mod transport;

use engine::Engine;
use registry::{Command, EraseTarget};
use serial::SerialTransport;

#[derive(Parser)]
#[command(name = "bootctl")]
#[command(about = "Host-side bootloader communication and firmware-provisioning CLI")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports and exit.
    Ports,
    /// Query bootloader version, app version, chip id, RDP level and the
    /// supported command table.
    Info(PortArgs),
    /// Run the full update handshake: SYNC → VERIFY_DEVICE_ID →
    /// SEND_BIN_SIZE → SEND_BIN_IN_PACKETS.
    Update {
        #[command(flatten)]
        port: PortArgs,
        /// Device id the bootloader expects, hex (e.g. 0x6415).
        #[arg(long, value_parser = parse_hex_u16)]
        device_id: u16,
        /// Signed firmware image to stream.
        #[arg(long)]
        bin: PathBuf,
    },
    /// Erase flash, either the whole device or a list of sectors.
    Erase {
        #[command(flatten)]
        port: PortArgs,
        /// Erase the whole device instead of individual sectors.
        #[arg(long, conflicts_with = "sectors")]
        mass: bool,
        /// Comma-separated sector indices, e.g. 2,3,4.
        #[arg(long, value_delimiter = ',')]
        sectors: Vec<u8>,
    },
    /// Jump to an application entry point.
    Jump {
        #[command(flatten)]
        port: PortArgs,
        /// Address to jump to, hex (e.g. 0x08008000).
        #[arg(long, value_parser = parse_hex_u32)]
        address: u32,
    },
    /// Sign a firmware image in place: app size, CBC-MAC signature, CRC.
    Sign {
        /// Path to the raw .bin image (mutated in place).
        path: PathBuf,
        /// Also write app_to_sign.bin / app_encrypted.bin next to `path`.
        #[arg(long)]
        keep_intermediates: bool,
    },
    /// Pad a raw .bin image with 0xFF up to a fixed flash slot size.
    Pad {
        /// Path to the .bin image (mutated in place).
        path: PathBuf,
        /// Target size, hex (default 0x10000).
        #[arg(long, value_parser = parse_hex_usize, default_value = "0x10000")]
        target_size: usize,
    },
}

#[derive(clap::Args)]
struct PortArgs {
    /// Serial port path. If omitted, auto-selects a port whose description
    /// contains "STM", falling back to an indexed prompt.
    #[arg(long)]
    port: Option<String>,

    /// Baud rate.
    #[arg(long, default_value_t = 115_200)]
    baud: u32,

    /// Per-byte read timeout, e.g. "2s", "500ms".
    #[arg(long, default_value = "2s")]
    timeout: humantime::Duration,
}

fn parse_hex(s: &str) -> Result<u64, std::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(digits) => u64::from_str_radix(digits, 16),
        None => s.parse(),
    }
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    parse_hex(s)
        .map_err(|e| e.to_string())
        .and_then(|v| u16::try_from(v).map_err(|_| format!("{s} does not fit in 16 bits")))
}

fn parse_hex_u32(s: &str) -> Result<u32, String> {
    parse_hex(s)
        .map_err(|e| e.to_string())
        .and_then(|v| u32::try_from(v).map_err(|_| format!("{s} does not fit in 32 bits")))
}

fn parse_hex_usize(s: &str) -> Result<usize, String> {
    parse_hex(s)
        .map_err(|e| e.to_string())
        .map(|v| v as usize)
}

fn open_port(args: &PortArgs) -> Result<SerialTransport> {
    let path = match &args.port {
        Some(path) => path.clone(),
        None => select_port()?,
    };

    SerialTransport::open(&path, args.baud, args.timeout.into())
        .with_context(|| format!("failed to open serial port {path}"))
}

/// Auto-selects a port by the `"STM"`-substring rule; if that finds nothing
/// or more than one candidate description matches loosely, falls back to an
/// indexed prompt over every port the OS reports.
fn select_port() -> Result<String> {
    let ports = serialport::available_ports().context("failed to enumerate serial ports")?;
    if ports.is_empty() {
        bail!("no serial ports found; pass --port explicitly");
    }

    if let Some(i) = portscan::find_by_keyword(&ports, "STM") {
        let port = &ports[i];
        println!(
            "auto-selected {} ({})",
            port.port_name,
            portscan::describe(port)
        );
        return Ok(port.port_name.clone());
    }

    println!("no port description matched \"STM\"; available ports:");
    for (i, port) in ports.iter().enumerate() {
        println!("  [{i}] {} ({})", port.port_name, portscan::describe(port));
    }

    print!("select a port by index: ");
    use std::io::Write;
    std::io::stdout().flush().ok();
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let index: usize = line.trim().parse().context("not a valid index")?;
    ports
        .get(index)
        .map(|p| p.port_name.clone())
        .with_context(|| format!("index {index} out of range"))
}

fn run_info(args: &PortArgs) -> Result<()> {
    let mut transport = open_port(args)?;
    let mut engine = Engine::new(&mut transport);

    for command in [
        Command::GetBootloaderVersion,
        Command::GetAppVersion,
        Command::GetChipId,
        Command::GetRdpLvl,
        Command::GetHelp,
    ] {
        let name = Engine::command_name(command.id() as u8);
        match engine.execute(&command) {
            Ok(response) => println!("{name}: {}", response.fields),
            Err(err) => println!("{name}: failed ({err})"),
        }
    }

    Ok(())
}

fn run_update(args: &PortArgs, device_id: u16, bin: &PathBuf) -> Result<()> {
    let image = std::fs::read(bin).with_context(|| format!("failed to read {bin:?}"))?;
    let mut transport = open_port(args)?;
    let mut engine = Engine::new(&mut transport);

    let pb = ProgressBar::new(image.len().div_ceil(bootctl_protocol::MAX_PAYLOAD) as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} packets")
            .unwrap(),
    );

    let state = engine.run_update(device_id, &image, |sent, total| {
        pb.set_length(total as u64);
        pb.set_position(sent as u64);
    })?;

    pb.finish_with_message("update complete");
    println!("session finished in state {state:?}");
    Ok(())
}

fn run_erase(args: &PortArgs, mass: bool, sectors: Vec<u8>) -> Result<()> {
    let target = if mass {
        EraseTarget::Mass
    } else if sectors.is_empty() {
        bail!("pass --mass or --sectors <n,n,...>");
    } else {
        EraseTarget::Sectors(sectors)
    };

    let mut transport = open_port(args)?;
    let mut engine = Engine::new(&mut transport);
    engine.execute(&Command::EraseFlash { target })?;
    println!("erase acknowledged");
    Ok(())
}

fn run_jump(args: &PortArgs, address: u32) -> Result<()> {
    let mut transport = open_port(args)?;
    let mut engine = Engine::new(&mut transport);
    engine.execute(&Command::JmpToAddr { address })?;
    println!("jump to 0x{address:08X} acknowledged");
    Ok(())
}

fn run_sign(path: &PathBuf, keep_intermediates: bool) -> Result<()> {
    let outcome = image::sign_in_place(path, keep_intermediates)?;
    println!(
        "signed {:?}: app_size={} crc=0x{:08X} signature={}",
        path,
        outcome.app_size,
        outcome.app_crc,
        hex::encode(outcome.signature)
    );
    Ok(())
}

fn run_pad(path: &PathBuf, target_size: usize) -> Result<()> {
    let outcome = pad::pad_to_size(path, target_size)?;
    println!(
        "padded {:?}: {} -> {} bytes (+{})",
        path, outcome.original_size, outcome.target_size, outcome.bytes_added
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ports => {
            let ports = serialport::available_ports().context("failed to enumerate serial ports")?;
            for port in &ports {
                println!("{} ({})", port.port_name, portscan::describe(port));
            }
        }
        Commands::Info(port) => run_info(&port)?,
        Commands::Update { port, device_id, bin } => run_update(&port, device_id, &bin)?,
        Commands::Erase { port, mass, sectors } => run_erase(&port, mass, sectors)?,
        Commands::Jump { port, address } => run_jump(&port, address)?,
        Commands::Sign { path, keep_intermediates } => run_sign(&path, keep_intermediates)?,
        Commands::Pad { path, target_size } => run_pad(&path, target_size)?,
    }

    Ok(())
}
