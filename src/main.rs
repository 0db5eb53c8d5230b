//! # Clipcast — Scheduler Daemon & Operator CLI
//!
//! Runs the per-account posting scheduler and the content pipeline,
//! plus a few operator commands against the shared store.
//!
//! Usage:
//!   clipcast run                         # Start scheduler daemon
//!   clipcast run-due                     # One pass over due accounts
//!   clipcast trigger <slug>              # Run the pipeline for one account
//!   clipcast publish-approved            # Post items approved while detached
//!   clipcast accounts                    # List accounts

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use clipcast_core::config::{ClipcastConfig, StagesConfig};
use clipcast_core::error::ClipcastError;
use clipcast_core::status::ContentStatus;
use clipcast_core::types::{Account, Content};
use clipcast_gateway::TelegramApi;
use clipcast_pipeline::{HttpStage, Pipeline, ReviewMode, ReviewNotifier, Stage, StageSet};
use clipcast_scheduler::SchedulerEngine;
use clipcast_store::Store;

#[derive(Parser)]
#[command(
    name = "clipcast",
    version,
    about = "🎬 Clipcast — multi-tenant content pipeline & posting scheduler"
)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "~/.clipcast/config.toml")]
    config: String,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the scheduler daemon (refresh loop + posting timers)
    Run,
    /// Fire every due account once and exit
    RunDue,
    /// Run the pipeline for one account now
    Trigger { slug: String },
    /// Post every item approved while the scheduler was detached
    PublishApproved,
    /// List accounts
    Accounts,
}

/// Bridges the pipeline's review notification to the Telegram channel.
struct TelegramNotifier {
    api: TelegramApi,
    chat_id: i64,
}

#[async_trait::async_trait]
impl ReviewNotifier for TelegramNotifier {
    async fn review_requested(
        &self,
        account: &Account,
        content: &Content,
    ) -> clipcast_core::error::Result<()> {
        self.api
            .send_review_request(self.chat_id, account, content)
            .await
    }
}

fn build_stages(config: &StagesConfig) -> Result<StageSet> {
    let endpoints = [
        ("idea", &config.idea_url),
        ("prompts", &config.prompts_url),
        ("videos", &config.videos_url),
        ("compose", &config.compose_url),
        ("publish", &config.publish_url),
    ];
    for (name, url) in &endpoints {
        if url.is_empty() {
            anyhow::bail!("stage '{name}' has no URL configured under [stages]");
        }
    }
    let stage = |i: usize| -> Arc<dyn Stage> {
        Arc::new(HttpStage::new(endpoints[i].0, endpoints[i].1))
    };
    Ok(StageSet {
        idea: stage(0),
        prompts: stage(1),
        videos: stage(2),
        compose: stage(3),
        publish: stage(4),
    })
}

fn build_pipeline(config: &ClipcastConfig, store: Arc<Store>) -> Result<Pipeline> {
    let mut pipeline = Pipeline::new(store, build_stages(&config.stages)?);

    if !config.telegram.bot_token.is_empty() && config.telegram.review_chat_id != 0 {
        pipeline = pipeline.with_notifier(Arc::new(TelegramNotifier {
            api: TelegramApi::new(&config.telegram.bot_token),
            chat_id: config.telegram.review_chat_id,
        }));
    } else {
        tracing::warn!("No review channel configured; items will sit in pending_review");
    }

    let review = match config.review.mode.as_str() {
        "poll" => ReviewMode::Poll {
            interval: std::time::Duration::from_secs(config.review.poll_interval_secs),
            timeout: std::time::Duration::from_secs(config.review.timeout_secs),
        },
        "detached" => ReviewMode::Detached,
        other => {
            tracing::warn!("Unknown review.mode '{other}', using detached");
            ReviewMode::Detached
        }
    };
    Ok(pipeline.with_review(review))
}

async fn publish_approved(store: &Arc<Store>, pipeline: &Pipeline) -> Result<usize> {
    let approved = store.content_by_status(ContentStatus::Approved)?;
    let mut posted = 0;
    for content in approved {
        let account = store.get_account(&content.account_id)?;
        match pipeline.publish(&account, content).await {
            Ok(content) => {
                store.record_success(&account.id, content.posted_at)?;
                posted += 1;
            }
            Err(e) => {
                tracing::error!("Publish failed for account '{}': {e}", account.slug);
                store.record_failure(&account.id, &e.to_string())?;
            }
        }
    }
    Ok(posted)
}

fn print_accounts(store: &Store) -> Result<()> {
    let accounts = store.all_accounts()?;
    if accounts.is_empty() {
        println!("No accounts.");
        return Ok(());
    }
    println!(
        "{:<20} {:<8} {:<10} {:<22} LAST ERROR",
        "SLUG", "ACTIVE", "FAILURES", "LAST POST"
    );
    for a in accounts {
        println!(
            "{:<20} {:<8} {:<10} {:<22} {}",
            a.slug,
            a.is_active,
            a.consecutive_failures,
            a.last_post_at
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "never".into()),
            a.last_error.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "clipcast=debug"
    } else {
        "clipcast=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config_path = shellexpand::tilde(&cli.config).into_owned();
    let config = if Path::new(&config_path).exists() {
        ClipcastConfig::load_from(Path::new(&config_path))?
    } else {
        ClipcastConfig::default()
    };

    let db_path = shellexpand::tilde(&config.store.db_path).into_owned();
    let store = Arc::new(Store::open(Path::new(&db_path))?);

    match cli.command {
        Command::Run => {
            let pipeline = Arc::new(build_pipeline(&config, store.clone())?);
            let engine = SchedulerEngine::new(store, pipeline, config.scheduler.max_failures);
            println!("🎬 Clipcast scheduler v{}", env!("CARGO_PKG_VERSION"));
            tokio::select! {
                _ = engine.run(std::time::Duration::from_secs(config.scheduler.refresh_interval_secs)) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutting down scheduler");
                }
            }
        }
        Command::RunDue => {
            let pipeline = Arc::new(build_pipeline(&config, store.clone())?);
            let engine = SchedulerEngine::new(store, pipeline, config.scheduler.max_failures);
            let attempted = engine.run_due().await;
            println!("Attempted {attempted} due account(s).");
        }
        Command::Trigger { slug } => {
            let pipeline = Arc::new(build_pipeline(&config, store.clone())?);
            let account = match store.get_account_by_slug(&slug) {
                Ok(account) => account,
                Err(ClipcastError::AccountNotFound(_)) => {
                    anyhow::bail!("no account with slug '{slug}'");
                }
                Err(e) => return Err(e.into()),
            };
            let engine = SchedulerEngine::new(store, pipeline, config.scheduler.max_failures);
            engine.fire(&account.id).await;
        }
        Command::PublishApproved => {
            let pipeline = build_pipeline(&config, store.clone())?;
            let posted = publish_approved(&store, &pipeline).await?;
            println!("Posted {posted} approved item(s).");
        }
        Command::Accounts => print_accounts(&store)?,
    }

    Ok(())
}
