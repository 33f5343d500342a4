//! kafkawire - broker connectivity check
//!
//! Opens a timed socket transport to a broker, optionally sends raw bytes and
//! dumps whatever comes back as hex.

use clap::{Parser, Subcommand};
use colored::Colorize;
use kafkawire_transport::{Deadline, Transport, TransportConfig, TransportError, READ_MAX_LEN};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kafkawire")]
#[command(about = "Exchange raw bytes with a broker over the kafkawire timed socket transport")]
#[command(version)]
struct Cli {
    /// YAML config file
    #[arg(short, long, env = "KAFKAWIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Broker host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Broker port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Receive deadline per wait, in microseconds
    #[arg(long)]
    recv_timeout_us: Option<u64>,

    /// Send deadline per wait, in microseconds (also bounds connect)
    #[arg(long)]
    send_timeout_us: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open and close a connection
    Connect,

    /// Send raw bytes and optionally read a reply
    Send {
        /// Payload (UTF-8 text, or hex with --hex)
        data: String,

        /// Treat the payload as hex
        #[arg(long)]
        hex: bool,

        /// Number of reply bytes to read
        #[arg(short, long, default_value = "0")]
        read: usize,

        /// Fail if fewer than --read bytes arrive
        #[arg(long)]
        exact: bool,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<TransportError>() {
            Some(te) => eprintln!("{} [{}]: {}", "Error".red(), te.kind(), e),
            None => eprintln!("{}: {}", "Error".red(), e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&cli)?;

    match cli.command {
        Commands::Config => {
            print!("{}", serde_yaml::to_string(&config)?);
        }
        Commands::Connect => {
            config.validate()?;
            let mut transport: Transport = Transport::new(config.clone());
            transport.connect().await?;
            println!(
                "{} {}:{}",
                "Connected to".green(),
                config.host,
                config.port
            );
            transport.close().await;
        }
        Commands::Send {
            data,
            hex,
            read,
            exact,
        } => {
            config.validate()?;
            let payload = if hex {
                hex::decode(data.trim())?
            } else {
                data.into_bytes()
            };

            let mut transport: Transport = Transport::new(config);
            transport.connect().await?;

            let written = transport.write(&payload).await?;
            println!("{} {} bytes", "Sent".green(), written);

            if read > 0 {
                let reply = read_reply(&mut transport, read, exact).await;
                transport.close().await;
                let reply = reply?;
                println!("{} {} bytes", "Received".green(), reply.len());
                println!("{}", hex::encode(&reply));
            } else {
                transport.close().await;
            }
        }
    }

    Ok(())
}

async fn read_reply(
    transport: &mut Transport,
    len: usize,
    exact: bool,
) -> Result<Vec<u8>, TransportError> {
    let mut reply = Vec::with_capacity(len);
    // Larger replies are read in capped chunks.
    while reply.len() < len {
        let want = (len - reply.len()).min(READ_MAX_LEN);
        let chunk = transport.read(want, exact).await?;
        if chunk.is_empty() {
            break;
        }
        reply.extend_from_slice(&chunk);
    }
    Ok(reply)
}

fn build_config(cli: &Cli) -> Result<TransportConfig, Box<dyn std::error::Error>> {
    if let Some(ref path) = cli.config {
        tracing::debug!("Loading config from {}", path.display());
    }
    let mut config = TransportConfig::load_from(cli.config.as_deref())?;

    if let Some(ref host) = cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(us) = cli.recv_timeout_us {
        config.recv_deadline = Deadline::from(Duration::from_micros(us));
    }
    if let Some(us) = cli.send_timeout_us {
        config.send_deadline = Deadline::from(Duration::from_micros(us));
    }

    Ok(config)
}
