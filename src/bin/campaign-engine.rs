//! Campaign engine CLI
//!
//! Operator control surface over the engine. Exit codes: 0 success, 1 input
//! error, 2 downstream error.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use campaign_engine::agents::AnalysisPipeline;
use campaign_engine::connectors::chat::ChatClient;
use campaign_engine::connectors::mailer::MailPlatformClient;
use campaign_engine::connectors::model::ModelClient;
use campaign_engine::engine::{CampaignEngine, CreateCampaignRequest};
use campaign_engine::error::{EngineError, EngineResult};
use campaign_engine::metrics::collector::MetricsCollector;
use campaign_engine::notify::Notifier;
use campaign_engine::orchestrator::StageOrchestrator;
use campaign_engine::queue::{JobScheduler, JobWorker};
use campaign_engine::schedule::{ScheduleId, Stage};
use campaign_engine::state::CampaignStore;
use campaign_engine::timebase::{SysClock, Timebase};
use campaign_engine::verification::Verifier;
use campaign_engine::EngineConfig;

#[derive(Parser)]
#[command(name = "campaign-engine")]
#[command(about = "Automated email-campaign lifecycle engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables override it
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a campaign: three rounds, five stage jobs each
    Create {
        /// Campaign name (natural key)
        campaign_name: String,
        /// Prefix for per-round list names
        #[arg(long)]
        list_id_prefix: String,
        /// Message subject
        #[arg(long)]
        subject: String,
        /// Sender display name
        #[arg(long)]
        sender_name: String,
        /// Sender address
        #[arg(long)]
        sender_email: String,
        /// Total recipients to split across the rounds
        #[arg(long)]
        total_recipients: u64,
        /// Mail-platform list ids, one per round
        #[arg(long, num_args = 3, value_names = ["ROUND1", "ROUND2", "ROUND3"])]
        list_ids: Vec<u64>,
        /// Draft prepared ahead of time
        #[arg(long)]
        draft_id: Option<u64>,
        /// Earliest instant to schedule from (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<String>,
    },

    /// Show all rounds of a campaign
    Status {
        /// Campaign name
        campaign_name: String,
    },

    /// Run pre-flight verification for a round
    Preflight {
        /// Schedule id
        schedule_id: String,
    },

    /// Launch a round now
    Launch {
        /// Schedule id
        schedule_id: String,
        /// Launch even when pre-flight has not marked the round ready
        #[arg(long)]
        skip_preflight: bool,
    },

    /// Run wrap-up collection for a round
    Wrapup {
        /// Schedule id
        schedule_id: String,
    },

    /// Cancel a round's pending jobs and block it
    Cancel {
        /// Schedule id
        schedule_id: String,
        /// Reason, recorded in the engine log
        #[arg(long)]
        reason: String,
    },

    /// Unblock a round for re-verification
    Unblock {
        /// Schedule id
        schedule_id: String,
    },

    /// Show per-stage job states for a round
    Jobs {
        /// Schedule id
        schedule_id: String,
    },

    /// Move a round to a new launch slot
    Reschedule {
        /// Schedule id
        schedule_id: String,
        /// New launch instant (RFC 3339 or YYYY-MM-DD); normalized to the
        /// next eligible Tue/Thu 09:15 UTC slot
        #[arg(long)]
        launch_at: String,
    },

    /// List dead-lettered jobs awaiting operator action
    DeadLetters,

    /// List stages whose last notification attempt failed
    FailedLogs,

    /// Run the job worker until interrupted
    Serve,
}

struct Wiring {
    engine: CampaignEngine,
    store: Arc<CampaignStore>,
    scheduler: Arc<JobScheduler>,
    orchestrator: Arc<StageOrchestrator>,
    clock: Arc<dyn Timebase>,
}

fn wire(config: &EngineConfig) -> EngineResult<Wiring> {
    let clock: Arc<dyn Timebase> = Arc::new(SysClock);
    let store = Arc::new(CampaignStore::open(&config.storage.path)?);

    let mailer = Arc::new(MailPlatformClient::new(&config.mailer)?);
    let chat = Arc::new(ChatClient::new(&config.chat)?);
    let model = Arc::new(ModelClient::new(&config.model)?);

    let pipeline = Arc::new(AnalysisPipeline::new(model));
    let verifier = Arc::new(Verifier::new(store.clone(), mailer.clone(), pipeline.clone()));
    let collector = Arc::new(MetricsCollector::new(
        store.clone(),
        mailer.clone(),
        pipeline,
        clock.clone(),
    ));
    let notifier = Arc::new(Notifier::new(
        store.clone(),
        chat,
        config.chat.channel.clone(),
        clock.clone(),
    ));
    let scheduler = Arc::new(JobScheduler::new(
        store.database(),
        config.offsets,
        clock.clone(),
    ));
    let orchestrator = Arc::new(StageOrchestrator::new(
        store.clone(),
        verifier,
        collector,
        notifier,
        mailer,
        scheduler.clone(),
        config.offsets,
        clock.clone(),
    ));
    let engine = CampaignEngine::new(
        store.clone(),
        scheduler.clone(),
        orchestrator.clone(),
        clock.clone(),
    );

    Ok(Wiring {
        engine,
        store,
        scheduler,
        orchestrator,
        clock,
    })
}

fn parse_instant(raw: &str) -> EngineResult<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(date) = raw.parse::<NaiveDate>() {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    Err(EngineError::InvalidInput {
        reason: format!("'{}' is not an RFC 3339 instant or a date", raw),
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> EngineResult<()> {
    let rendered = serde_json::to_string_pretty(value).map_err(|e| EngineError::Internal {
        message: format!("failed to render output: {}", e),
    })?;
    println!("{}", rendered);
    Ok(())
}

async fn run(cli: Cli) -> EngineResult<()> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::load_from_env()?,
    };
    let wiring = wire(&config)?;

    match cli.command {
        Commands::Create {
            campaign_name,
            list_id_prefix,
            subject,
            sender_name,
            sender_email,
            total_recipients,
            list_ids,
            draft_id,
            start_date,
        } => {
            let external_list_ids: [u64; 3] =
                list_ids
                    .try_into()
                    .map_err(|_| EngineError::InvalidInput {
                        reason: "exactly three list ids are required".into(),
                    })?;
            let start_date = start_date.as_deref().map(parse_instant).transpose()?;
            let schedules = wiring.engine.create_campaign(&CreateCampaignRequest {
                campaign_name,
                list_id_prefix,
                subject,
                sender_name,
                sender_email,
                total_recipients,
                external_list_ids,
                external_draft_id: draft_id,
                start_date,
            })?;
            print_json(&schedules)
        }

        Commands::Status { campaign_name } => {
            let rounds = wiring.engine.campaign_status(&campaign_name)?;
            print_json(&rounds)
        }

        Commands::Preflight { schedule_id } => {
            let id = ScheduleId::parse_str(&schedule_id)?;
            let outcome = wiring.engine.run_stage(Stage::Preflight, id).await?;
            println!("{:?}", outcome);
            Ok(())
        }

        Commands::Launch {
            schedule_id,
            skip_preflight,
        } => {
            let id = ScheduleId::parse_str(&schedule_id)?;
            let outcome = wiring.engine.launch(id, skip_preflight).await?;
            println!("{:?}", outcome);
            Ok(())
        }

        Commands::Wrapup { schedule_id } => {
            let id = ScheduleId::parse_str(&schedule_id)?;
            let outcome = wiring.engine.run_stage(Stage::Wrapup, id).await?;
            println!("{:?}", outcome);
            Ok(())
        }

        Commands::Cancel {
            schedule_id,
            reason,
        } => {
            let id = ScheduleId::parse_str(&schedule_id)?;
            let schedule = wiring.engine.cancel(id, &reason)?;
            print_json(&schedule)
        }

        Commands::Unblock { schedule_id } => {
            let id = ScheduleId::parse_str(&schedule_id)?;
            let schedule = wiring.engine.unblock(id)?;
            print_json(&schedule)
        }

        Commands::Jobs { schedule_id } => {
            let id = ScheduleId::parse_str(&schedule_id)?;
            let status = wiring.engine.job_status(id)?;
            let rendered: std::collections::BTreeMap<String, _> = status
                .into_iter()
                .map(|(stage, job)| (stage.to_string(), job))
                .collect();
            print_json(&rendered)
        }

        Commands::Reschedule {
            schedule_id,
            launch_at,
        } => {
            let id = ScheduleId::parse_str(&schedule_id)?;
            let schedule = wiring.engine.reschedule(id, parse_instant(&launch_at)?)?;
            print_json(&schedule)
        }

        Commands::DeadLetters => {
            let dead = wiring.engine.dead_letters()?;
            print_json(&dead)
        }

        Commands::FailedLogs => {
            let failed = wiring.engine.failed_logs_needing_retry()?;
            print_json(&failed)
        }

        Commands::Serve => {
            let worker = JobWorker::new(
                wiring.scheduler.clone(),
                wiring.orchestrator.clone(),
                wiring.store.clone(),
                wiring.clock.clone(),
            );
            let handle = worker.start();
            tracing::info!("job worker running; press ctrl-c to stop");
            tokio::signal::ctrl_c()
                .await
                .map_err(|e| EngineError::Internal {
                    message: format!("signal handler failed: {}", e),
                })?;
            handle.shutdown().await;
            Ok(())
        }
    }
}

fn exit_code_for(error: &EngineError) -> i32 {
    match error {
        EngineError::InvalidInput { .. }
        | EngineError::CampaignExists { .. }
        | EngineError::CampaignNotFound { .. }
        | EngineError::ScheduleNotFound { .. }
        | EngineError::NotReady { .. }
        | EngineError::NotLaunched { .. }
        | EngineError::InvalidTransition { .. }
        | EngineError::Config { .. } => 1,
        _ => 2,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        eprintln!("error: {}", error);
        std::process::exit(exit_code_for(&error));
    }
}
