//! Pure renderers: schedule + stage data → chat message blocks
//!
//! No message composition beyond slotting data into the fixed block
//! templates. Rates are rounded here, at display time only.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::metrics::collector::CollectionOutcome;
use crate::schedule::CampaignSchedule;
use crate::verification::{PreFlightResult, ReadinessStatus};

fn header(text: String) -> Value {
    json!({ "type": "header", "text": { "type": "plain_text", "text": text } })
}

fn section(text: String) -> Value {
    json!({ "type": "section", "text": { "type": "mrkdwn", "text": text } })
}

fn bullet_section(title: &str, lines: &[String]) -> Option<Value> {
    if lines.is_empty() {
        return None;
    }
    let body = lines
        .iter()
        .map(|line| format!("• {}", line))
        .collect::<Vec<_>>()
        .join("\n");
    Some(section(format!("*{}*\n{}", title, body)))
}

fn round_context(schedule: &CampaignSchedule) -> Value {
    section(format!(
        "*{}* — round {}/3 · {} recipients ({}) · launches {} UTC",
        schedule.campaign_name,
        schedule.round_number,
        schedule.recipient_count,
        schedule.recipient_range,
        schedule.scheduled_date.format("%Y-%m-%d %H:%M"),
    ))
}

/// Pre-launch announcement, posted 21 hours before launch
pub fn prelaunch(schedule: &CampaignSchedule) -> (Value, String) {
    let blocks = json!([
        header(format!("📅 Campaign round scheduled: {}", schedule.campaign_name)),
        round_context(schedule),
        section(format!(
            "Subject: _{}_\nSender: {} <{}>\nList: {}",
            schedule.subject, schedule.sender_name, schedule.sender_email, schedule.list_name
        )),
    ]);
    let fallback = format!(
        "Round {}/3 of {} launches {} UTC",
        schedule.round_number,
        schedule.campaign_name,
        schedule.scheduled_date.format("%Y-%m-%d %H:%M")
    );
    (blocks, fallback)
}

fn readiness_emoji(status: ReadinessStatus) -> &'static str {
    match status {
        ReadinessStatus::Ready => "✅",
        ReadinessStatus::Warning => "⚠️",
        ReadinessStatus::Blocked => "🛑",
    }
}

/// Pre-flight verification report, posted 3 h 15 m before launch
pub fn preflight(schedule: &CampaignSchedule, result: &PreFlightResult) -> (Value, String) {
    let mut blocks = vec![
        header(format!(
            "{} Pre-flight: {} round {}",
            readiness_emoji(result.status),
            schedule.campaign_name,
            schedule.round_number
        )),
        round_context(schedule),
        section(format!("Verdict: *{:?}*", result.status)),
    ];

    let issue_lines: Vec<String> = result
        .issues
        .iter()
        .map(|issue| format!("[{:?}] {}", issue.severity, issue.message))
        .collect();
    if let Some(block) = bullet_section("Issues", &issue_lines) {
        blocks.push(block);
    }

    if let Some(analysis) = &result.ai_analysis {
        blocks.push(section(format!(
            "List quality score: {:.0}/100",
            analysis.list_quality_score
        )));
        if let Some(block) = bullet_section("Recommendations", &analysis.recommendations) {
            blocks.push(block);
        }
        if let Some(block) = bullet_section("Warnings", &analysis.warnings) {
            blocks.push(block);
        }
    }

    let fallback = format!(
        "Pre-flight {:?} for {} round {}",
        result.status, schedule.campaign_name, schedule.round_number
    );
    (Value::Array(blocks), fallback)
}

/// Launch warning, posted 15 minutes before launch
pub fn launch_warning(schedule: &CampaignSchedule, result: &PreFlightResult) -> (Value, String) {
    let mut blocks = vec![
        header(format!(
            "⏰ Launching in 15 minutes: {} round {}",
            schedule.campaign_name, schedule.round_number
        )),
        round_context(schedule),
        section(format!(
            "Quick verification: {} {:?}",
            readiness_emoji(result.status),
            result.status
        )),
    ];
    let issue_lines: Vec<String> = result
        .issues
        .iter()
        .map(|issue| format!("[{:?}] {}", issue.severity, issue.message))
        .collect();
    if let Some(block) = bullet_section("Issues", &issue_lines) {
        blocks.push(block);
    }
    let fallback = format!(
        "{} round {} launches in 15 minutes",
        schedule.campaign_name, schedule.round_number
    );
    (Value::Array(blocks), fallback)
}

/// Launch confirmation, posted once the platform accepts the send
pub fn launch_confirmation(
    schedule: &CampaignSchedule,
    queued_count: u64,
    send_start_at: DateTime<Utc>,
) -> (Value, String) {
    let blocks = json!([
        header(format!(
            "🚀 Launched: {} round {}",
            schedule.campaign_name, schedule.round_number
        )),
        round_context(schedule),
        section(format!(
            "{} messages queued · send started {} UTC",
            queued_count,
            send_start_at.format("%H:%M:%S")
        )),
    ]);
    let fallback = format!(
        "{} round {} launched ({} queued)",
        schedule.campaign_name, schedule.round_number, queued_count
    );
    (blocks, fallback)
}

fn format_rate(rate: Option<f64>) -> String {
    match rate {
        Some(rate) => format!("{:.2}%", rate),
        None => "n/a".into(),
    }
}

/// Wrap-up report, posted 30 minutes after the observed launch
pub fn wrapup(schedule: &CampaignSchedule, outcome: &CollectionOutcome) -> (Value, String) {
    let metrics = &outcome.persisted;
    let mut blocks = vec![
        header(format!(
            "📊 Wrap-up: {} round {}",
            schedule.campaign_name, schedule.round_number
        )),
        round_context(schedule),
        section(format!(
            "Processed {} · delivered {:.2}% · bounced {:.2}% · opens {} · clicks {}",
            metrics.counters.processed,
            metrics.delivery_rate,
            metrics.bounce_rate,
            format_rate(metrics.open_rate),
            format_rate(metrics.click_rate),
        )),
    ];

    let delta_lines: Vec<String> = outcome
        .deltas
        .iter()
        .map(|d| {
            format!(
                "{}: {:+.2} pts vs previous round ({:?})",
                d.metric, d.delta, d.significance
            )
        })
        .collect();
    if let Some(block) = bullet_section("Round-over-round", &delta_lines) {
        blocks.push(block);
    }

    blocks.push(section(outcome.report.formatted.headline.clone()));
    if let Some(block) = bullet_section("Summary", &outcome.report.formatted.summary) {
        blocks.push(block);
    }
    if let Some(block) = bullet_section(
        "Recommendations",
        &outcome.report.formatted.recommendations,
    ) {
        blocks.push(block);
    }
    if let Some(block) = bullet_section("Next steps", &outcome.report.formatted.next_steps) {
        blocks.push(block);
    }

    let fallback = format!(
        "Wrap-up for {} round {}: delivery {:.2}%",
        schedule.campaign_name, schedule.round_number, metrics.delivery_rate
    );
    (Value::Array(blocks), fallback)
}
