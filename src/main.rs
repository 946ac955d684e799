//! siemapp command line
//!
//! ```text
//! siemapp [--config PATH] [--logfile PATH] [--noindex] run <usecase> [--nofilter] [--dump] [--notify]
//! siemapp [--config PATH] find <usecase> [--gte EXPR] [--lte EXPR]
//! ```
//!
//! Environment variables:
//! - SIEMAPP_ES_URL: Elasticsearch URL, overrides the configuration file
//! - RUST_LOG: Log filter (default: siemapp=info)

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use siemapp::{
    AlertStore, Config, DirectoryLoader, ElasticClient, Notifier, RunOptions, Runner, TimeBound,
    UsecaseLoader,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Elasticsearch usecase alerting tool
#[derive(Parser, Debug)]
#[command(name = "siemapp", version, about = "SOC ELK alerting tool")]
struct Cli {
    /// Tool configuration file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Also write logs to this file
    #[arg(long)]
    logfile: Option<PathBuf>,

    /// Do not use the write-back index (no persistence, no threshold filtering)
    #[arg(long)]
    noindex: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a usecase
    Run {
        /// Usecase name (definition file name without extension)
        usecase: String,
        /// Raise every match, skipping threshold filtering
        #[arg(long)]
        nofilter: bool,
        /// Print raised alerts to stdout
        #[arg(long)]
        dump: bool,
        /// Send raised alerts to the syslog collector
        #[arg(long)]
        notify: bool,
    },
    /// Print the alerts a usecase already raised
    Find {
        usecase: String,
        #[arg(long, default_value = "now-1d/d")]
        gte: TimeBound,
        #[arg(long, default_value = "now")]
        lte: TimeBound,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_logging(cli.logfile.as_deref());

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            tracing::error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(logfile: Option<&Path>) -> Option<WorkerGuard> {
    let (file_layer, guard) = match logfile {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "siemapp.log".into());
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "siemapp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Initializing");
    let config = Config::load(&cli.config)?;

    let client = ElasticClient::new(&config.elasticsearch)?;
    tracing::info!("  Elasticsearch: {}", client.base_url());
    tracing::info!("  Write-back index: {}", config.usecases.index);

    let loader = DirectoryLoader::new(&config.usecases.path);
    let store = AlertStore::new(&client, config.usecases.index.clone())
        .with_history_page_size(config.usecases.history_page_size);
    let notifier = Notifier::new(config.notify.host.clone(), config.notify.port);
    let runner = Runner::new(&client, store, notifier);

    match cli.command {
        Command::Run {
            usecase,
            nofilter,
            dump,
            notify,
        } => {
            let usecase = loader.load(&usecase)?;
            if cli.noindex {
                tracing::info!("Bypassing write-back index (noindex)");
            }
            let options = RunOptions {
                nofilter: nofilter || cli.noindex,
                index: !cli.noindex,
                dump,
                notify,
            };
            let mut stdout = std::io::stdout().lock();
            runner.run(usecase.as_ref(), options, &mut stdout).await?;
        }
        Command::Find { usecase, gte, lte } => {
            let usecase = loader.load(&usecase)?;
            for alert in runner.find(usecase.as_ref(), &gte, &lte).await? {
                println!("{}", alert.to_wire_line());
            }
        }
    }
    Ok(())
}
