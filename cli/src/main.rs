//! bizpass CLI - admin commands and the reconciliation daemon.
//!
//! Every subcommand opens the shared SQLite database configured in
//! `~/.bizpass/config.toml` (or `--config`), builds one [`BusinessService`]
//! and runs a single operation against it. `maintain` keeps running the
//! subscription sweep until Ctrl-C.
//!
//! ```text
//! main() -> init_tracing() -> load_config() -> build_service() -> command
//! ```

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use bizpass_config::BizpassConfig;
use bizpass_core::{
    AccessPolicy, BusinessService, ServiceSettings, TracingNotifier, run_reconcile_loop,
};
use bizpass_payments::provider_from_config;
use bizpass_store::{Store, StoreOptions};
use bizpass_types::{
    Clock, OwnerRequestId, PaymentEventId, PlaceId, SystemClock, TgUserId, Tier, plan_title,
};

#[derive(Parser)]
#[command(name = "bizpass")]
#[command(about = "Entitlement and payment lifecycle engine for the business directory")]
struct Cli {
    /// Config file (defaults to ~/.bizpass/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and schema if missing
    Init,
    /// Run one subscription sweep and print what changed
    Reconcile {
        /// Override the configured grace period
        #[arg(long)]
        grace_days: Option<u32>,
    },
    /// Run the subscription sweep periodically until Ctrl-C
    Maintain,
    /// Approve a pending owner request
    Approve {
        #[arg(long)]
        actor: i64,
        #[arg(long)]
        request: i64,
    },
    /// Reject a pending owner request
    Reject {
        #[arg(long)]
        actor: i64,
        #[arg(long)]
        request: i64,
    },
    /// Force a place onto a tier
    SetTier {
        #[arg(long)]
        actor: i64,
        #[arg(long)]
        place: i64,
        /// free, light, pro (premium) or partner
        #[arg(long, value_parser = parse_tier)]
        tier: Tier,
        #[arg(long, default_value_t = 1)]
        months: u32,
    },
    /// Rotate claim tokens for one place, or for every place
    RotateTokens {
        #[arg(long)]
        actor: i64,
        #[arg(long)]
        place: Option<i64>,
    },
    /// Refund a successful payment and reset the place to free
    Refund {
        #[arg(long)]
        actor: i64,
        /// Ledger id of the `payment_succeeded` event
        #[arg(long)]
        event: i64,
        #[arg(long)]
        reason: Option<String>,
    },
}

fn parse_tier(raw: &str) -> Result<Tier, String> {
    Tier::parse_loose(raw).map_err(|err| err.to_string())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No writable log file: fall back to stderr so operators still see errors.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file() -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.bizpass/logs/bizpass.log
    if let Some(data_dir) = bizpass_config::default_data_dir() {
        candidates.push(data_dir.join("logs").join("bizpass.log"));
    }

    // Fallback: ./.bizpass/logs/bizpass.log
    candidates.push(PathBuf::from(".bizpass").join("logs").join("bizpass.log"));

    candidates
}

fn load_config(path: Option<&Path>) -> Result<BizpassConfig> {
    match path {
        Some(path) => BizpassConfig::load_from(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(BizpassConfig::load()
            .context("failed to load config")?
            .unwrap_or_default()),
    }
}

fn build_service(config: &BizpassConfig) -> Result<BusinessService> {
    let db_path = config
        .database_path()
        .context("cannot determine database path: no home directory")?;
    let store = Store::open(&db_path, StoreOptions::from(config))
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "Database opened");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let provider = provider_from_config(config.provider(), Arc::clone(&clock));
    let access = Arc::new(AccessPolicy::from_config(config));

    Ok(
        BusinessService::new(Arc::new(store), provider, clock, access)
            .with_notifier(Arc::new(TracingNotifier))
            .with_settings(ServiceSettings::from(config)),
    )
}

async fn maintain(service: BusinessService, config: &BizpassConfig) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let service = Arc::new(service);
    let handle = tokio::spawn(run_reconcile_loop(
        service,
        config.reconcile_interval(),
        shutdown_rx,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested");
    let _ = shutdown_tx.send(true);
    handle.await.context("reconciliation loop task failed")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let service = build_service(&config)?;

    match cli.command {
        Commands::Init => {
            println!("Database ready ({} provider)", service.provider_name());
        }
        Commands::Reconcile { grace_days } => {
            let stats = tokio::task::spawn_blocking(move || {
                service.reconcile_subscriptions(grace_days)
            })
            .await
            .context("sweep task failed")??;
            println!(
                "scanned={} active_to_past_due={} past_due_to_free={} canceled_to_free={} failed={}",
                stats.scanned,
                stats.active_to_past_due,
                stats.past_due_to_free,
                stats.canceled_to_free,
                stats.failed
            );
        }
        Commands::Maintain => maintain(service, &config).await?,
        Commands::Approve { actor, request } => {
            let approved = service
                .approve_owner_request(TgUserId::new(actor), OwnerRequestId::new(request))?;
            println!(
                "Approved request {} for place {}",
                approved.id, approved.place_id
            );
        }
        Commands::Reject { actor, request } => {
            let rejected = service
                .reject_owner_request(TgUserId::new(actor), OwnerRequestId::new(request))?;
            println!(
                "Rejected request {} for place {}",
                rejected.id, rejected.place_id
            );
        }
        Commands::SetTier {
            actor,
            place,
            tier,
            months,
        } => {
            let sub = service.admin_set_subscription_tier(
                TgUserId::new(actor),
                PlaceId::new(place),
                tier,
                months,
            )?;
            println!(
                "Place {} is now on {} ({}), expires {}",
                sub.place_id,
                plan_title(sub.tier),
                sub.status,
                sub.expires_at
                    .map_or_else(|| "never".to_string(), bizpass_types::format_timestamp)
            );
        }
        Commands::RotateTokens { actor, place } => match place {
            Some(place) => {
                let token = service.rotate_claim_token(TgUserId::new(actor), PlaceId::new(place))?;
                println!("Place {}: new claim token {}", token.place_id, token.token);
            }
            None => {
                let stats = service.bulk_rotate_claim_tokens(TgUserId::new(actor))?;
                println!(
                    "Rotated {} of {} places ({} failed)",
                    stats.rotated, stats.total_places, stats.failed
                );
            }
        },
        Commands::Refund {
            actor,
            event,
            reason,
        } => {
            let outcome = service.admin_mark_payment_refund(
                TgUserId::new(actor),
                PaymentEventId::new(event),
                reason.as_deref(),
            )?;
            if outcome.duplicate {
                println!("Payment {event} was already refunded");
            } else {
                println!("Payment {event} refunded; place reset to free");
            }
        }
    }

    Ok(())
}
