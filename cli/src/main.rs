//! nmapkit CLI - Run nmap and read its results
//!
//! A command-line front end for scanning hosts, listing interfaces,
//! reading saved XML reports, and managing scanner defaults.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "nmapkit")]
#[command(author, version, about = "Run nmap and read its results")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List network interfaces and routes
    #[command(alias = "if")]
    Interfaces,

    /// Scan one or more targets
    Scan {
        /// Hosts, networks or ranges
        #[arg(required = true)]
        targets: Vec<String>,

        /// Ports to scan, e.g. 22,80,1000-2000
        #[arg(short, long, conflicts_with = "top_ports")]
        ports: Option<String>,

        /// Scan the N most common ports
        #[arg(long)]
        top_ports: Option<u32>,

        /// Detect service versions
        #[arg(long)]
        service: bool,

        /// Detect the operating system
        #[arg(long)]
        os: bool,

        /// Timing template (0-5)
        #[arg(short = 'T', value_parser = clap::value_parser!(u8).range(0..=5))]
        timing: Option<u8>,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Parse a saved XML report
    Parse {
        /// Path to the report
        file: PathBuf,
    },

    /// Show the nmap binary in use and its version
    Tool,

    /// Manage scanner defaults
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Use this nmap binary (omit to search PATH again)
    SetBinary { path: Option<PathBuf> },
    /// Milliseconds between SIGTERM and SIGKILL
    SetGrace { millis: u64 },
    /// Default run timeout in seconds (omit to clear)
    SetTimeout { secs: Option<u64> },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "nmapkit_core=debug,info",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Interfaces => {
            commands::interfaces::run(cli.json).await?;
        }
        Commands::Scan {
            targets,
            ports,
            top_ports,
            service,
            os,
            timing,
            timeout,
        } => {
            let args = commands::scan::ScanArgs {
                targets,
                ports,
                top_ports,
                service,
                os,
                timing,
                timeout,
            };
            commands::scan::run(args, cli.json).await?;
        }
        Commands::Parse { file } => {
            commands::parse::run(&file, cli.json).await?;
        }
        Commands::Tool => {
            commands::tool::run(cli.json).await?;
        }
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => commands::config::show(cli.json).await?,
            ConfigAction::SetBinary { path } => commands::config::set_binary(path).await?,
            ConfigAction::SetGrace { millis } => commands::config::set_grace(millis).await?,
            ConfigAction::SetTimeout { secs } => commands::config::set_timeout(secs).await?,
        },
    }

    Ok(())
}
