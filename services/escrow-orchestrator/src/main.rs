//! Boots every component named in spec.md §5 ("Concurrency model") and
//! §2's component table: Postgres + Redis connections, the bot fleet, the
//! trade engine and its background workers, the Axum HTTP + `/ws` surface,
//! then waits for `ctrl_c` and drains everything through one
//! `CancellationToken`.

mod error;
mod http;
mod state;
mod ws;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use escrow_audit::FraudFlagger;
use escrow_config::{Secrets, Settings};
use escrow_engine::{EngineConfig, IdempotencyGuard, ListingStore, Reconciler, Scheduler, TradeEngine, TradeStore};
use escrow_fleet::{BotWorker, FleetConfig, FleetManager};
use escrow_kv::{KvStore, RedisKv};
use escrow_notify::{Notifier, PushRegistry};
use escrow_ratelimit::{RateLimitConfig, RateLimiter};
use escrow_store::{BotRepository, PgListingStore, PgNotificationStore, PgRiskStore, PgTradeStore, PgWalletStore, SecretBox};
use escrow_wallet::WalletLedger;
use steam_mobile::SteamAuthenticator;
use steam_trading::{SteamClient, SteamTradeClient};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use state::AppState;

#[derive(Parser, Debug)]
#[clap(name = "escrow-orchestrator", about = "Escrow trade orchestrator: HTTP + /ws, worker pool, reconciler, bot fleet")]
struct Cli {
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs the HTTP server and every background worker. Default if no
    /// subcommand is given.
    Serve,
    /// Seals a new bot account's secrets and inserts its row, without
    /// bringing the service up.
    RegisterBot {
        #[clap(long)]
        steam_id: u64,
        #[clap(long)]
        account_name: String,
        #[clap(long)]
        password: String,
        #[clap(long)]
        totp_shared_secret: String,
        #[clap(long)]
        identity_secret: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .json()
        .init();

    let settings = Arc::new(Settings::load().context("loading configuration")?);
    let secrets = Secrets::from_env().context("loading secrets from environment")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings, secrets).await,
        Command::RegisterBot {
            steam_id,
            account_name,
            password,
            totp_shared_secret,
            identity_secret,
        } => {
            let pool = escrow_store::connect(&secrets.database_url).await.context("connecting to postgres")?;
            let secret_box = SecretBox::from_hex_key(&secrets.bot_secret_key).context("loading bot secret key")?;
            let repo = BotRepository::new(pool, secret_box);
            repo.register(
                &escrow_types::BotSecrets {
                    account_name,
                    password,
                    totp_shared_secret,
                    identity_secret,
                },
                steam_id,
            )
            .await
            .context("registering bot")?;
            info!(steam_id, "bot registered");
            Ok(())
        }
    }
}

async fn serve(settings: Arc<Settings>, secrets: Secrets) -> anyhow::Result<()> {
    let pool = escrow_store::connect(&secrets.database_url).await.context("connecting to postgres")?;
    let kv: Arc<dyn KvStore> = Arc::new(RedisKv::connect(&secrets.redis_url).context("connecting to redis")?);
    let secret_box = SecretBox::from_hex_key(&secrets.bot_secret_key).context("loading bot secret key")?;

    let rate_limiter = Arc::new(RateLimiter::new(
        kv.clone(),
        RateLimitConfig {
            capacity: settings.steam_rate_limit_per_minute,
            window: Duration::from_secs(60),
        },
    ));

    let bot_repo = BotRepository::new(pool.clone(), secret_box);
    let loaded = bot_repo.load_fleet().await.context("loading bot fleet")?;
    if loaded.is_empty() {
        warn!("no bots registered; trades requiring bot custody cannot be fulfilled until `register-bot` is run");
    }
    let workers: Vec<Arc<BotWorker>> = loaded
        .into_iter()
        .map(|(bot, bot_secrets)| {
            let authenticator = Arc::new(SteamAuthenticator::new(bot.steam_id, bot_secrets.clone(), Some(secrets.steam_web_api_key.clone())));
            let client: Arc<dyn SteamClient> = Arc::new(SteamTradeClient::new(authenticator, rate_limiter.clone()));
            BotWorker::new(bot, bot_secrets, client)
        })
        .collect();

    let fleet = Arc::new(FleetManager::new(
        workers,
        kv.clone(),
        FleetConfig {
            session_ttl: Duration::from_secs(settings.bot_session_ttl_hours as u64 * 3600),
            probe_interval: Duration::from_secs(settings.bot_probe_interval_seconds),
        },
    ));
    for (steam_id, result) in fleet.initialize_all().await {
        if let Err(err) = result {
            warn!(steam_id, error = %err, "bot failed to come online at startup");
        }
    }

    let wallet = WalletLedger::new(Arc::new(PgWalletStore::new(pool.clone())));
    let flagger = Arc::new(FraudFlagger::new(Arc::new(PgRiskStore::new(pool.clone())), settings.risk_review_threshold));
    let notifier = Arc::new(Notifier::new(Arc::new(PgNotificationStore::new(pool.clone())), Arc::new(PushRegistry::new())));
    let idempotency = IdempotencyGuard::new(kv.clone(), Duration::from_secs(settings.idempotency_key_ttl_hours as u64 * 3600));

    let trades: Arc<dyn TradeStore> = Arc::new(PgTradeStore::new(pool.clone()));
    let listings: Arc<dyn ListingStore> = Arc::new(PgListingStore::new(pool.clone()));

    let engine = Arc::new(TradeEngine::new(
        trades.clone(),
        listings.clone(),
        wallet.clone(),
        fleet.clone(),
        notifier.clone(),
        flagger.clone(),
        idempotency,
        EngineConfig {
            trade_timeout: settings.trade_timeout(),
            await_leg_timeout: settings.await_leg_timeout(),
            max_retries: settings.max_retries as i32,
            fee_percent: settings.platform_fee_percent,
        },
    ));

    let cancel = CancellationToken::new();
    let (scheduler, mut workers_join_set) = Scheduler::spawn(engine.clone(), settings.worker_pool_size as usize, 1024, cancel.clone());

    let reconciler_handle = Reconciler::new(trades.clone(), scheduler, 100).spawn(
        Duration::from_secs(settings.reconciler_interval_seconds),
        cancel.clone(),
    );
    let prober_handle = fleet.clone().spawn_prober(cancel.clone());
    let sweeper_handle = notifier.clone().spawn_sweeper(Duration::from_secs(settings.notification_sweep_interval_seconds), cancel.clone());

    let state = AppState {
        engine,
        wallet,
        fleet,
        notifier,
        listings,
        pool,
        settings: settings.clone(),
    };

    let app = http::router()
        .route("/ws", axum::routing::get(ws::upgrade))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&settings.http_bind_addr).await.context("binding http listener")?;
    info!(addr = %settings.http_bind_addr, "escrow-orchestrator listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await
        .context("http server error")?;

    cancel.cancel();
    while workers_join_set.join_next().await.is_some() {}
    let _ = reconciler_handle.await;
    let _ = prober_handle.await;
    let _ = sweeper_handle.await;

    info!("escrow-orchestrator shut down cleanly");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
    cancel.cancel();
}
