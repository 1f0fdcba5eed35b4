use anyhow::Context;
use bond_core::{BondConfig, PairKey, RandomSource, SeededRandom, Sentiment, ThreadRandom};
use bond_gateway::{AppState, GatewayServer};
use bond_memory::{
    AdminAction, AdminParams, AdministrativeOverride, AffectionUpdateService, SqliteBondStore, StatsQuery,
    DEFAULT_HISTORY_LIMIT,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "bond", author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "bond.toml", env = "BOND_CONFIG")]
    config: String,

    /// Path to the relationship database (overrides config)
    #[arg(long)]
    db: Option<String>,

    /// Seed the delta draw for reproducible runs (overrides config)
    #[arg(long)]
    seed: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply one classified turn
    Update {
        subject: String,
        counterpart: String,
        /// POSITIVE, NEUTRAL or NEGATIVE
        sentiment: String,
        /// Message text to keep in the audit trail
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Show current stats for a pair
    Stats { subject: String, counterpart: String },

    /// Show the audit trail for a pair, newest first
    History {
        subject: String,
        counterpart: String,
        #[arg(short, long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: u32,
    },

    /// Apply an administrative override
    Admin {
        subject: String,
        counterpart: String,
        /// setStage, setAffection, applyImpact, jumpTo, resetRelationshipOnly, simulateTimeGap
        action: String,
        #[arg(long)]
        stage: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        affection: Option<i64>,
        #[arg(long, allow_hyphen_values = true)]
        impact: Option<i64>,
        #[arg(long)]
        target: Option<String>,
        #[arg(long)]
        hours: Option<u32>,
    },

    /// Run the HTTP gateway
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Expose /dev/relationship
        #[arg(long)]
        enable_admin: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = BondConfig::load_or_default(&args.config);
    if let Some(db) = args.db {
        config.store.db_path = db;
    }
    if let Some(seed) = args.seed {
        config.progression.seed = Some(seed);
    }

    info!("Opening relationship store at {}", config.store.db_path);
    let store = Arc::new(
        SqliteBondStore::with_config(&config.store)
            .await
            .with_context(|| format!("Failed to open store at {}", config.store.db_path))?,
    );
    let random: Arc<dyn RandomSource> = match config.progression.seed {
        Some(seed) => {
            info!("Using seeded delta draws (seed {})", seed);
            Arc::new(SeededRandom::new(seed))
        }
        None => Arc::new(ThreadRandom),
    };

    match args.command {
        Command::Update {
            subject,
            counterpart,
            sentiment,
            message,
        } => {
            let key = PairKey::new(subject, counterpart)?;
            let sentiment: Sentiment = sentiment.parse()?;
            let mut service = AffectionUpdateService::new(store.clone())
                .with_random(random)
                .record_message_content(config.progression.record_message_content);
            if config.progression.record_history {
                service = service.with_audit(store.clone());
            }
            print_json(&service.update(&key, sentiment, message.as_deref()).await?)?;
        }
        Command::Stats { subject, counterpart } => {
            let key = PairKey::new(subject, counterpart)?;
            print_json(&StatsQuery::new(store.clone()).get(&key).await?)?;
        }
        Command::History {
            subject,
            counterpart,
            limit,
        } => {
            let key = PairKey::new(subject, counterpart)?;
            let service = AffectionUpdateService::new(store.clone()).with_audit(store.clone());
            print_json(&service.history(&key, limit).await?)?;
        }
        Command::Admin {
            subject,
            counterpart,
            action,
            stage,
            affection,
            impact,
            target,
            hours,
        } => {
            let key = PairKey::new(subject, counterpart)?;
            let params = AdminParams {
                stage,
                affection,
                impact,
                target,
                hours,
            };
            let action = AdminAction::from_request(&action, &params)?;
            print_json(&AdministrativeOverride::new(store.clone()).apply(&key, action).await?)?;
        }
        Command::Serve {
            host,
            port,
            enable_admin,
        } => {
            let gateway = &config.gateway;
            let host = host.unwrap_or_else(|| gateway.host.clone());
            let port = port.unwrap_or(gateway.port);
            let audit = config
                .progression
                .record_history
                .then(|| store.clone() as Arc<dyn bond_core::AuditSink>);
            let state = AppState::new(
                store.clone(),
                audit,
                random,
                config.progression.record_message_content,
                enable_admin || gateway.admin_enabled,
            );
            let handle = GatewayServer::new(state, &host, port).start();
            tokio::select! {
                res = handle => res.context("Gateway task failed")?,
                _ = tokio::signal::ctrl_c() => info!("Shutting down"),
            }
        }
    }

    store.close().await;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
