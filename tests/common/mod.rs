//! Shared harness for the integration suites: the full engine wired against
//! deterministic fakes and a manual clock.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::path::Path;
use std::sync::Arc;

use campaign_engine::agents::AnalysisPipeline;
use campaign_engine::connectors::testing::{FakeChatPoster, FakeLanguageModel, FakeMailPlatform};
use campaign_engine::engine::{CampaignEngine, CreateCampaignRequest};
use campaign_engine::metrics::collector::MetricsCollector;
use campaign_engine::notify::Notifier;
use campaign_engine::orchestrator::StageOrchestrator;
use campaign_engine::queue::worker::WorkerHandle;
use campaign_engine::queue::{JobScheduler, JobWorker};
use campaign_engine::schedule::CampaignSchedule;
use campaign_engine::scheduling::StageOffsets;
use campaign_engine::state::CampaignStore;
use campaign_engine::timebase::{ManualClock, Timebase};
use campaign_engine::verification::Verifier;

/// Full engine over fakes
pub struct Harness {
    pub engine: CampaignEngine,
    pub store: Arc<CampaignStore>,
    pub scheduler: Arc<JobScheduler>,
    pub orchestrator: Arc<StageOrchestrator>,
    pub mailer: Arc<FakeMailPlatform>,
    pub chat: Arc<FakeChatPoster>,
    pub clock: Arc<ManualClock>,
}

/// 2025-10-01 is a Wednesday; round 1 lands on Thursday 2025-10-02.
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap()
}

/// Model fake that answers every agent with valid JSON
pub fn scripted_model() -> FakeLanguageModel {
    FakeLanguageModel::with_handler(|prompt| {
        let response = if prompt.contains("deliverability analyst") {
            r#"{"healthScore": 88, "grade": "B", "engagementRate": 60.2,
                "riskFactors": [], "recommendation": "send",
                "estimatedDeliverability": 97.0}"#
        } else if prompt.contains("Grade the delivery performance") {
            r#"{"grade": "A", "score": 93, "metricAssessments": [],
                "patterns": [], "issues": [], "recommendations": ["keep going"]}"#
        } else if prompt.contains("Compare two rounds") {
            r#"{"trend": "stable", "metricChanges": [], "prediction": null}"#
        } else if prompt.contains("lead analyst") {
            r#"{"executiveSummary": "Round looks healthy.",
                "overallHealth": {"score": 88, "status": "healthy", "trend": "stable"},
                "recommendations": [{"priority": "low", "action": "monitor"}],
                "warnings": [], "opportunities": [], "nextRoundStrategy": "hold course"}"#
        } else {
            r#"{"headline": "Analyst report", "summary": ["ok"], "insights": [],
                "recommendations": ["monitor"], "warnings": [], "nextSteps": []}"#
        };
        Ok(response.to_string())
    })
}

fn build(db: sled::Db) -> Harness {
    let clock = Arc::new(ManualClock::new(start()));
    let clock_dyn: Arc<dyn Timebase> = clock.clone();

    let store = Arc::new(CampaignStore::new(db.clone()));
    let mailer = Arc::new(FakeMailPlatform::new());
    let chat = Arc::new(FakeChatPoster::new());
    let pipeline = Arc::new(AnalysisPipeline::new(Arc::new(scripted_model())));

    let verifier = Arc::new(Verifier::new(store.clone(), mailer.clone(), pipeline.clone()));
    let collector = Arc::new(MetricsCollector::new(
        store.clone(),
        mailer.clone(),
        pipeline,
        clock_dyn.clone(),
    ));
    let notifier = Arc::new(Notifier::new(
        store.clone(),
        chat.clone(),
        "#campaigns".into(),
        clock_dyn.clone(),
    ));
    let scheduler = Arc::new(JobScheduler::new(
        db,
        StageOffsets::default(),
        clock_dyn.clone(),
    ));
    let orchestrator = Arc::new(StageOrchestrator::new(
        store.clone(),
        verifier,
        collector,
        notifier,
        mailer.clone(),
        scheduler.clone(),
        StageOffsets::default(),
        clock_dyn.clone(),
    ));
    let engine = CampaignEngine::new(
        store.clone(),
        scheduler.clone(),
        orchestrator.clone(),
        clock_dyn,
    );

    Harness {
        engine,
        store,
        scheduler,
        orchestrator,
        mailer,
        chat,
        clock,
    }
}

/// Harness over a throwaway database
pub fn harness() -> Harness {
    let db = sled::Config::new()
        .temporary(true)
        .open()
        .expect("temporary sled db");
    build(db)
}

/// Harness over a database at `path`, for restart scenarios
pub fn harness_at<P: AsRef<Path>>(path: P) -> Harness {
    let db = sled::open(path).expect("sled db at path");
    build(db)
}

/// Start the job worker for a harness
pub fn start_worker(harness: &Harness) -> WorkerHandle {
    let clock: Arc<dyn Timebase> = harness.clock.clone();
    JobWorker::new(
        harness.scheduler.clone(),
        harness.orchestrator.clone(),
        harness.store.clone(),
        clock,
    )
    .start()
}

/// The E2E "Q4" campaign: 3529 recipients from 2025-10-01
pub fn create_q4(harness: &Harness) -> Vec<CampaignSchedule> {
    harness
        .engine
        .create_campaign(&CreateCampaignRequest {
            campaign_name: "Q4".into(),
            list_id_prefix: "q4-list".into(),
            subject: "Quarterly update".into(),
            sender_name: "Ops".into(),
            sender_email: "ops@example.com".into(),
            total_recipients: 3529,
            external_list_ids: [11, 12, 13],
            external_draft_id: Some(501),
            start_date: Some(start()),
        })
        .expect("campaign creation")
}

/// Poll until `predicate` holds or the wait budget runs out
pub async fn wait_until<F: Fn() -> bool>(predicate: F, what: &str) {
    for _ in 0..500 {
        if predicate() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}
