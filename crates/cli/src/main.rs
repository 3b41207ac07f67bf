mod verify;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use outreach_core::config::EngineConfig;
use outreach_orchestration::CampaignService;
use outreach_persistence::PgStore;
use outreach_provider::WhatsAppClient;
use outreach_queue::QueueProcessor;
use outreach_ratelimit::RateController;
use outreach_scheduler::SchedulerService;
use outreach_server::Gateway;
use outreach_webhook::WebhookProcessor;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};
use uuid::Uuid;

const VERSION: &str = "0.1.0";

#[derive(Parser)]
#[command(name = "outreach")]
#[command(version = VERSION)]
#[command(about = "Campaign Send Engine — WhatsApp Cloud API outbound campaigns")]
struct Cli {
    /// Path to a JSON config file; falls back to defaults + OUTREACH_* env vars.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API: webhook ingestion, campaign/notification endpoints,
    /// and the queue processor loop, until SIGTERM/SIGINT.
    Serve,
    /// Run the scheduler tick loop (scheduled-campaign start, spam-pause
    /// expiry) until SIGTERM/SIGINT.
    Scheduler,
    /// Campaign lifecycle operations.
    Campaign {
        #[command(subcommand)]
        action: CampaignActions,
    },
    /// Sender credential operations.
    Sender {
        #[command(subcommand)]
        action: SenderActions,
    },
}

#[derive(Subcommand)]
enum CampaignActions {
    /// Create a campaign from a contacts CSV file.
    Create {
        #[arg(long)]
        sender_id: Uuid,
        #[arg(long)]
        name: String,
        /// Comma-separated template names, applied round-robin in this order.
        #[arg(long, value_delimiter = ',')]
        templates: Vec<String>,
        #[arg(long)]
        contacts_csv: PathBuf,
        /// RFC3339 start time; omit to start immediately.
        #[arg(long)]
        scheduled_start_time: Option<String>,
    },
    Stop {
        id: Uuid,
    },
    Resume {
        id: Uuid,
    },
    Delete {
        id: Uuid,
    },
    RetryFailed {
        id: Uuid,
    },
    Stats {
        id: Uuid,
    },
}

#[derive(Subcommand)]
enum SenderActions {
    /// Probe a sender's credential against the WhatsApp Cloud API.
    Verify {
        #[arg(long)]
        api_base: String,
        #[arg(long)]
        access_credential: String,
        #[arg(long)]
        phone_number_id: String,
    },
}

fn init_logging() -> tracing_appender::non_blocking::WorkerGuard {
    let log_dir = PathBuf::from("logs");
    let (non_blocking, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "outreach.log"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()));

    tracing_subscriber::registry().with(stdout_layer).with(file_layer).init();

    guard
}

async fn shutdown_signal() {
    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_logging();
    let cli = Cli::parse();

    let config = EngineConfig::load(cli.config).map_err(|e| anyhow::anyhow!("failed to load config: {e}"))?;

    // Every subcommand needs the database; fail fast with a non-zero exit
    // if it isn't reachable rather than limping into a broken tick loop.
    let store = match PgStore::new(&config.database_url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "failed to connect to persistence store");
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Serve => run_serve(store, config).await?,
        Commands::Scheduler => run_scheduler(store, config).await?,
        Commands::Campaign { action } => run_campaign(store, config, action).await?,
        Commands::Sender { action } => run_sender(action).await?,
    }

    Ok(())
}

async fn run_serve(store: Arc<PgStore>, config: EngineConfig) -> Result<()> {
    let client = Arc::new(WhatsAppClient::new(
        "https://graph.facebook.com/v19.0",
        Duration::from_secs(config.provider_timeout_seconds),
    ));
    let rates = Arc::new(RateController::new(config.rate_adjust_sample_size));
    let campaigns = Arc::new(CampaignService::new(
        store.clone(),
        config.phone_country_prefix.clone(),
        config.phone_total_digits,
    ));
    let webhook = Arc::new(WebhookProcessor::new(store.clone()));

    let processor = QueueProcessor::new(store.clone(), client, rates, config.clone());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let processor_handle = tokio::spawn(async move { processor.run(shutdown_rx).await });

    let gateway = Gateway::new(
        store,
        campaigns,
        webhook,
        config.webhook_verify_token.clone(),
        config.server_auth_token.clone(),
        config.server_port,
    );
    let gateway_handle = tokio::spawn(async move {
        if let Err(e) = gateway.start().await {
            error!(error = %e, "gateway exited");
        }
    });

    info!(port = config.server_port, "outreach serve started");
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    gateway_handle.abort();
    let _ = processor_handle.await;
    info!("outreach serve shut down");
    Ok(())
}

async fn run_scheduler(store: Arc<PgStore>, config: EngineConfig) -> Result<()> {
    let scheduler = SchedulerService::new(store, config.scheduler_tick_seconds);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    info!("outreach scheduler started");
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    let _ = handle.await;
    info!("outreach scheduler shut down");
    Ok(())
}

async fn run_campaign(store: Arc<PgStore>, config: EngineConfig, action: CampaignActions) -> Result<()> {
    let campaigns = CampaignService::new(store, config.phone_country_prefix, config.phone_total_digits);

    match action {
        CampaignActions::Create {
            sender_id,
            name,
            templates,
            contacts_csv,
            scheduled_start_time,
        } => {
            let csv_bytes = std::fs::read(&contacts_csv)?;
            let scheduled_start_time = scheduled_start_time
                .map(|s| chrono::DateTime::parse_from_rfc3339(&s))
                .transpose()?
                .map(|d| d.with_timezone(&chrono::Utc));
            let campaign = campaigns
                .create(sender_id, name, templates, &csv_bytes, scheduled_start_time)
                .await?;
            println!("created campaign {} (status: {:?})", campaign.id, campaign.status);
        }
        CampaignActions::Stop { id } => {
            campaigns.stop(id).await?;
            println!("stopped campaign {id}");
        }
        CampaignActions::Resume { id } => {
            campaigns.resume(id).await?;
            println!("resumed campaign {id}");
        }
        CampaignActions::Delete { id } => {
            campaigns.delete(id).await?;
            println!("deleted campaign {id}");
        }
        CampaignActions::RetryFailed { id } => {
            let retried = campaigns.retry_failed(id).await?;
            println!("requeued {retried} failed rows for campaign {id}");
        }
        CampaignActions::Stats { id } => {
            let stats = campaigns.stats(id).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}

async fn run_sender(action: SenderActions) -> Result<()> {
    match action {
        SenderActions::Verify {
            api_base,
            access_credential,
            phone_number_id,
        } => match verify::verify_sender_credential(&api_base, &access_credential, &phone_number_id).await {
            Ok(msg) => println!("{msg}"),
            Err(e) => {
                eprintln!("sender verification failed: {e}");
                std::process::exit(1);
            }
        },
    }
    Ok(())
}
