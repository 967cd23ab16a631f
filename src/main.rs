mod channels;
mod config;
mod history;
mod jokes;
mod pipeline;
mod scheduler;

use std::fs::OpenOptions;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use channels::slack::SlackChannel;
use history::{HistoryStore, Ledger};
use jokes::http::HttpJokeSource;
use jokes::{Fetcher, Origin};
use pipeline::{ExecutionMode, Pipeline};

#[derive(Parser)]
#[command(
    name = "jokebot",
    version,
    about = "Posts a fresh joke to a Slack channel on a schedule"
)]
struct Cli {
    #[arg(short, long, default_value = "~/.jokebot/config.toml")]
    config: String,
    /// Slack bot token
    #[arg(long, env = "SLACK_BOT_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,
    /// Slack channel ID
    #[arg(long, env = "SLACK_CHANNEL_ID", global = true)]
    channel: Option<String>,
    /// batch-once posts a single joke and exits with its status
    #[arg(
        long,
        value_enum,
        env = "JOKEBOT_MODE",
        default_value = "continuous",
        global = true
    )]
    mode: ExecutionMode,
    /// Cron expression overriding [schedule] cron
    #[arg(long, env = "JOKEBOT_SCHEDULE", global = true)]
    schedule: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Post a joke now, then keep posting on schedule (or exit in batch mode)
    Run,
    /// Create ~/.jokebot/ with a default config.toml
    Init,
    /// Print recently posted jokes, oldest first
    History,
    /// Fetch a joke without posting it
    Fetch,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let mut cfg = config::load(&cli.config)?;
    if cli.token.is_some() {
        cfg.slack.bot_token = cli.token;
    }
    if cli.channel.is_some() {
        cfg.slack.channel = cli.channel;
    }
    if let Some(expr) = cli.schedule {
        cfg.schedule.cron = expr;
    }
    init_tracing(cfg.log.file.as_deref());

    let store = HistoryStore::new(cfg.history.path.clone(), cfg.history.capacity);
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let mode = cli.mode;
            let channel = SlackChannel::new(&cfg.slack)?;
            let fetcher = Fetcher::from_config(
                Box::new(HttpJokeSource::new(&cfg.jokes)?),
                &cfg.jokes,
            );
            tracing::info!("jokebot {} starting ({mode:?})", env!("CARGO_PKG_VERSION"));
            let pipeline = Pipeline::new(fetcher, Box::new(channel), store);
            return pipeline.run(mode, &cfg.schedule).await;
        }
        Commands::Init => {
            let path = config::init_config_dir().await?;
            tracing::info!("Initialized {}", path.display());
        }
        Commands::History => {
            let ledger = store.load();
            eprintln!("{}", history_summary(&ledger));
            for joke in ledger.iter() {
                println!("{joke}");
            }
        }
        Commands::Fetch => {
            let fetcher = Fetcher::from_config(
                Box::new(HttpJokeSource::new(&cfg.jokes)?),
                &cfg.jokes,
            );
            let fetched = fetcher.fetch(&store.load()).await;
            match fetched.origin {
                Origin::Remote { attempt } => eprintln!("(remote, attempt {attempt})"),
                Origin::Fallback { tally } => eprintln!(
                    "(fallback: {} offensive, {} blank, {} duplicate, {} failed)",
                    tally.offensive, tally.blank, tally.duplicate, tally.failed
                ),
            }
            println!("{}", fetched.text);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn history_summary(ledger: &Ledger) -> String {
    if ledger.is_empty() {
        "No jokes posted yet".to_string()
    } else {
        format!("{} of {} remembered jokes", ledger.len(), ledger.capacity())
    }
}

/// Console logging plus an optional append-only file sink.
fn init_tracing(log_file: Option<&Path>) {
    let file_layer = log_file.and_then(|path| match open_log_file(path) {
        Ok(file) => Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        ),
        Err(e) => {
            eprintln!("Cannot open log file {}: {e}", path.display());
            None
        }
    });

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
}

fn open_log_file(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
