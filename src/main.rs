use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use clipgit::clipboard::SystemClipboard;
use clipgit::git::{ensure_working_copy, EnvFileCredentials, GitGateway, GitManager};
use clipgit::settings::{self, Settings};
use clipgit::sync::{HistoryMode, SyncEngine, SyncPolicy};
use clipgit::{crypto, logger};

#[derive(Parser)]
#[command(name = "clipgit")]
#[command(about = "Share clipboard text between machines through a git remote", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the clipboard and the remote until interrupted
    Watch(WatchArgs),

    /// Configure persisted defaults
    Config {
        /// Seconds between pulls
        #[arg(long)]
        poll_interval: Option<u64>,

        /// Path to the env file holding USERNAME= and PASSWORD=
        #[arg(long)]
        env_file: Option<PathBuf>,

        /// Write mode used when no mode flag is passed to `watch`
        #[arg(long, value_enum)]
        history_mode: Option<HistoryMode>,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },

    /// Decrypt a payload file written with --encryption-pw
    Decrypt {
        /// File from the repository
        #[arg(short, long)]
        file: PathBuf,

        /// Encryption password
        #[arg(short, long)]
        password: String,
    },
}

#[derive(Args)]
struct WatchArgs {
    /// Path to the Git repository
    #[arg(short, long)]
    repo: PathBuf,

    /// Polling interval in seconds [default: 30]
    #[arg(short, long)]
    poll_interval: Option<u64>,

    /// Disable history mode: overwrite clip.txt and force-push
    #[arg(short, long)]
    no_history: bool,

    /// Append entries to a single clipboard.txt (overrides --no-history)
    #[arg(long)]
    single_file: bool,

    /// Path to the .env file
    #[arg(short, long)]
    env_file: Option<PathBuf>,

    /// Password for clipboard encryption (empty disables encryption)
    #[arg(long, default_value = "")]
    encryption_pw: String,

    /// Only pull changes from the repository; do not monitor the clipboard
    #[arg(long)]
    pull_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logger::init_logger()?;
    if let Err(e) = logger::rotate_log_if_needed() {
        log::warn!("Failed to rotate log file: {e:#}");
    }

    match cli.command {
        Commands::Watch(args) => watch(args).await?,
        Commands::Config {
            poll_interval,
            env_file,
            history_mode,
            show,
        } => {
            if show {
                settings::show_settings()?;
            } else {
                settings::update_settings(poll_interval, env_file, history_mode)?;
            }
        }
        Commands::Decrypt { file, password } => {
            let payload = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let plaintext = crypto::try_decrypt(&payload, &password)
                .with_context(|| format!("Failed to decrypt {}", file.display()))?;
            println!("{plaintext}");
        }
    }

    Ok(())
}

async fn watch(args: WatchArgs) -> Result<()> {
    ensure_working_copy(&args.repo)?;
    let branch = GitManager::open(&args.repo)?.current_branch()?;

    let stored = Settings::load()?;
    let history_mode = if args.single_file || args.no_history {
        HistoryMode::from_flags(args.no_history, args.single_file)
    } else {
        stored.history_mode.unwrap_or_default()
    };
    let env_file = args.env_file.or_else(|| stored.env_file.clone());

    let policy = SyncPolicy {
        history_mode,
        encryption_password: Some(args.encryption_pw),
        poll_interval_secs: args
            .poll_interval
            .unwrap_or_else(|| stored.poll_interval_secs()),
        pull_only: args.pull_only,
    };

    print_banner(&args.repo, &branch, &policy, env_file.as_ref());
    logger::log_to_file(&format!(
        "Watching {} on {} (mode: {}, pull-only: {})",
        args.repo.display(),
        branch,
        policy.history_mode,
        policy.pull_only
    ))?;

    let credentials = Arc::new(EnvFileCredentials::new(env_file));
    let gateway = GitGateway::new(&args.repo, credentials);
    let clipboard = Arc::new(SystemClipboard::new()?);

    let engine = Arc::new(SyncEngine::new(
        policy,
        Box::new(gateway),
        clipboard.clone(),
        clipboard,
    ));

    let token = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupt received, shutting down");
            token.cancel();
        }
    });

    engine.run().await;
    logger::log_to_file("Watch stopped")?;

    Ok(())
}

fn print_banner(
    repo: &std::path::Path,
    branch: &str,
    policy: &SyncPolicy,
    env_file: Option<&PathBuf>,
) {
    println!("{}", "Starting clipboard monitor...".cyan().bold());
    println!("  {} {}", "Repository:".cyan(), repo.display());
    println!("  {} {}", "Branch:".cyan(), branch);
    println!("  {} {} seconds", "Poll interval:".cyan(), policy.poll_interval_secs);
    println!("  {} {}", "History mode:".cyan(), policy.history_mode);
    println!(
        "  {} {}",
        "Env file path:".cyan(),
        env_file
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!(
        "  {} {}",
        "Encryption enabled:".cyan(),
        policy.encryption_enabled()
    );
    println!("  {} {}", "Pull only mode:".cyan(), policy.pull_only);
    println!("{}", "Press Ctrl+C to exit".dimmed());
}
