use std::fs::File;
use std::io::{BufRead, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer as _};

use atbench::config::{ConfigLoader, LoggingConfig};
use atbench::console::Console;

#[derive(Parser, Debug)]
#[command(
    name = "atbench",
    version,
    about = "Hardware validation bench for AT-speaking devices over serial and telnet links."
)]
struct Args {
    /// Configuration file (defaults to ./atbench.toml or the user config dir).
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the serial ports visible on this machine.
    List,

    /// Open an interactive console on a device, logging the session.
    Console {
        /// Serial port path or alias, or `host:port` with `--telnet`.
        target: String,

        /// Treat the target as a telnet endpoint.
        #[arg(long)]
        telnet: bool,

        /// User name sent at the telnet login prompt.
        #[arg(long, default_value = "root")]
        user: String,

        /// Baud rate for serial targets.
        #[arg(short, long)]
        baud: Option<u32>,

        /// Session log file.
        #[arg(short, long, default_value = "console.log")]
        log: PathBuf,

        /// Shell prompt marking the end of a response.
        #[arg(long, default_value = "# ")]
        prompt: String,

        /// Per-command response budget in milliseconds.
        #[arg(long, default_value_t = 5_000)]
        budget_ms: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let loader = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    let config = loader.into_config();

    init_tracing(&config.logging)?;

    match args.command {
        Command::List => list_ports(),
        Command::Console {
            target,
            telnet,
            user,
            baud,
            log,
            prompt,
            budget_ms,
        } => {
            let console = if telnet {
                Console::telnet(&target, &user, &log, prompt)?
            } else {
                let port = config.serial.resolve_port(&target);
                let baud = baud.unwrap_or(config.serial.default_baud);
                Console::serial(&port, baud, &log, prompt)?
            };
            info!(endpoint = %target, log = %log.display(), "console attached");
            run_console(console, Duration::from_millis(budget_ms))
        }
    }
}

/// Route log events to stderr at the configured level and, when a log
/// file is configured, duplicate everything at debug level into it.
fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let stream_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.clone()));
    let stream_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(stream_filter);

    let file_layer = match &logging.file {
        Some(path) => {
            let file = open_log_file(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stream_layer)
        .with(file_layer)
        .init();
    Ok(())
}

/// Open the debug log for appending, creating parent directories as needed.
fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}

fn list_ports() -> Result<(), Box<dyn std::error::Error>> {
    let ports = serialport::available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }
    for port in ports {
        match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                let product = usb.product.as_deref().unwrap_or("USB serial");
                println!("{}\t{} ({:04x}:{:04x})", port.port_name, product, usb.vid, usb.pid);
            }
            other => println!("{}\t{:?}", port.port_name, other),
        }
    }
    Ok(())
}

/// Read lines from stdin and forward them until EOF or `exit`.
fn run_console(
    mut console: Console,
    budget: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    for line in stdin.lock().lines() {
        let line = line?;
        let command = line.trim_end();
        if command == "exit" {
            break;
        }
        let response = console.send(command, true, budget)?;
        stdout.write_all(response.as_bytes())?;
        stdout.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_log_file_is_created_with_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/run/debug.log");
        drop(open_log_file(&path).unwrap());
        assert!(path.exists());

        // Reopening appends rather than truncating.
        std::fs::write(&path, "existing").unwrap();
        drop(open_log_file(&path).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "existing");
    }
}
