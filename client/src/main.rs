use clap::{ArgGroup, Parser};
use client::channel::TerminationPolicy;
use client::session::Session;
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("mode").required(true).args(["command", "interactive"])))]
struct Args {
    /// Name or IP address of the SA-MP server
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short = 'p', long, default_value = "7777")]
    port: u16,

    /// RCON password
    #[arg(short = 'w', long)]
    password: String,

    /// Execute a single command and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Inactivity timeout in milliseconds
    #[arg(short = 't', long, default_value = "150")]
    timeout: u64,

    /// Run in interactive mode
    #[arg(short = 'i', long)]
    interactive: bool,

    /// Treat an empty response fragment as end of stream instead of an
    /// empty line (matches servers that send an explicit terminator)
    #[arg(long)]
    end_on_empty: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let policy = if args.end_on_empty {
        TerminationPolicy::EndOnEmpty
    } else {
        TerminationPolicy::InactivityOnly
    };

    info!("Connecting to {}:{}", args.host, args.port);
    let mut session = Session::connect(
        &args.host,
        args.port,
        &args.password,
        Duration::from_millis(args.timeout),
        policy,
    )
    .await?;

    if let Some(command) = args.command {
        session.run_once(&command).await?;
    } else {
        println!("SA-MP RCON {}\n", env!("CARGO_PKG_VERSION"));
        session.run_interactive().await?;
    }

    Ok(())
}
