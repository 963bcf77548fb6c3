//! Pre-flight verification
//!
//! Aggregates the draft shape check, a list snapshot, a sender-reputation
//! snapshot, and the analysis pipeline into one readiness verdict. The
//! warning-stage `quick_verify` runs the same external checks without the
//! model pipeline.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::agents::{AnalysisInputs, AnalysisMode, AnalysisPipeline, Severity};
use crate::connectors::{ListStatistics, MailPlatform, SenderReputation};
use crate::error::EngineResult;
use crate::metrics::{compute_deltas, CampaignMetrics};
use crate::schedule::{CampaignSchedule, ScheduleId};
use crate::state::CampaignStore;

/// Readiness verdict driving the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessStatus {
    /// Safe to launch
    Ready,
    /// Launchable, with reservations
    Warning,
    /// Must not launch
    Blocked,
}

/// Outcome of one individual check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// Check passed
    Pass,
    /// Check passed with reservations
    Warning,
    /// Check failed or could not be performed
    Error,
}

/// One named check with its outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutcome {
    /// Check name, e.g. "hasContent"
    pub name: String,
    /// Outcome
    pub status: CheckStatus,
    /// Optional detail
    #[serde(default)]
    pub detail: Option<String>,
}

/// A surfaced readiness issue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreFlightIssue {
    /// How bad it is
    pub severity: Severity,
    /// What is wrong
    pub message: String,
}

/// Model-backed analysis attached to a full verification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiAnalysis {
    /// List health score from the pipeline, 0-100
    pub list_quality_score: f64,
    /// Previous round metrics used for comparison, when any
    pub previous_round_metrics: Option<CampaignMetrics>,
    /// Actionable recommendations
    pub recommendations: Vec<String>,
    /// Insights
    pub insights: Vec<String>,
    /// Warnings
    pub warnings: Vec<String>,
}

/// Result of a pre-flight verification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreFlightResult {
    /// Verdict
    pub status: ReadinessStatus,
    /// Individual checks
    pub checks: Vec<CheckOutcome>,
    /// Issues, most severe first
    pub issues: Vec<PreFlightIssue>,
    /// Pipeline output; absent in quick mode
    pub ai_analysis: Option<AiAnalysis>,
}

/// Composes external checks and the analysis pipeline into readiness verdicts
pub struct Verifier {
    store: Arc<CampaignStore>,
    mailer: Arc<dyn MailPlatform>,
    pipeline: Arc<AnalysisPipeline>,
}

impl Verifier {
    /// Construct with injected collaborators
    pub fn new(
        store: Arc<CampaignStore>,
        mailer: Arc<dyn MailPlatform>,
        pipeline: Arc<AnalysisPipeline>,
    ) -> Self {
        Self {
            store,
            mailer,
            pipeline,
        }
    }

    /// Full verification: external checks plus the analysis pipeline in
    /// pre-flight mode, reusing earlier round metrics when they exist.
    pub async fn verify(&self, schedule_id: ScheduleId) -> EngineResult<PreFlightResult> {
        let schedule = self.store.get(schedule_id)?;
        let gathered = self.gather_checks(&schedule).await?;

        let (current, previous) = self.comparison_pair(&schedule)?;
        let deltas = match (&current, &previous) {
            (Some(c), Some(p)) => compute_deltas(c, p),
            _ => Vec::new(),
        };
        let inputs = AnalysisInputs {
            campaign_name: schedule.campaign_name.clone(),
            round_number: schedule.round_number,
            mode: AnalysisMode::Preflight,
            list_stats: gathered.list_stats,
            reputation: gathered.reputation,
            current_metrics: current.clone(),
            previous_metrics: previous,
            deltas,
            is_final_round: schedule.round_number == 3,
        };
        let report = self.pipeline.run(&inputs).await;

        let list_quality_score = report.list_quality.as_ref().map(|lq| lq.health_score);
        let status = decide(&gathered.checks, list_quality_score);

        let mut issues = gathered.issues;
        if let Some(score) = list_quality_score {
            if score < 50.0 {
                issues.push(PreFlightIssue {
                    severity: Severity::Critical,
                    message: format!("List quality score {:.0} is below the launch floor", score),
                });
            } else if score < 70.0 {
                issues.push(PreFlightIssue {
                    severity: Severity::Warning,
                    message: format!("List quality score {:.0} is marginal", score),
                });
            }
        }
        issues.sort_by_key(|issue| issue.severity);

        info!(
            schedule = %schedule_id,
            campaign = %schedule.campaign_name,
            round = schedule.round_number,
            status = ?status,
            "pre-flight verification complete"
        );

        Ok(PreFlightResult {
            status,
            checks: gathered.checks,
            issues,
            ai_analysis: Some(AiAnalysis {
                list_quality_score: list_quality_score.unwrap_or(0.0),
                previous_round_metrics: current,
                recommendations: report.formatted.recommendations.clone(),
                insights: report.formatted.insights.clone(),
                warnings: report.formatted.warnings.clone(),
            }),
        })
    }

    /// Lightweight verification without the model pipeline; used by the
    /// launch-warning stage.
    pub async fn quick_verify(&self, schedule_id: ScheduleId) -> EngineResult<PreFlightResult> {
        let schedule = self.store.get(schedule_id)?;
        let gathered = self.gather_checks(&schedule).await?;
        let status = decide(&gathered.checks, None);
        Ok(PreFlightResult {
            status,
            checks: gathered.checks,
            issues: gathered.issues,
            ai_analysis: None,
        })
    }

    async fn gather_checks(&self, schedule: &CampaignSchedule) -> EngineResult<Gathered> {
        let mut checks = Vec::new();
        let mut issues = Vec::new();

        match schedule.external_draft_id {
            None => {
                checks.push(CheckOutcome {
                    name: "draftAttached".into(),
                    status: CheckStatus::Error,
                    detail: Some("no draft prepared for this round".into()),
                });
                issues.push(PreFlightIssue {
                    severity: Severity::Critical,
                    message: "No mail-platform draft is attached to this round".into(),
                });
            }
            Some(draft_id) => match self.mailer.verify_readiness(draft_id).await {
                Ok(readiness) => {
                    checks.push(CheckOutcome {
                        name: "draftAttached".into(),
                        status: CheckStatus::Pass,
                        detail: None,
                    });
                    for name in readiness.checks.failed() {
                        checks.push(CheckOutcome {
                            name: name.into(),
                            status: CheckStatus::Error,
                            detail: None,
                        });
                        issues.push(PreFlightIssue {
                            severity: Severity::Critical,
                            message: format!("Draft check failed: {}", name),
                        });
                    }
                    if readiness.checks.all_passed() {
                        checks.push(CheckOutcome {
                            name: "draftShape".into(),
                            status: CheckStatus::Pass,
                            detail: None,
                        });
                    }
                    for issue in readiness.issues {
                        issues.push(PreFlightIssue {
                            severity: Severity::Warning,
                            message: issue,
                        });
                    }
                }
                // Transient platform failures propagate so the stage retries;
                // permanent ones become a failed check.
                Err(e) if e.is_retryable() => return Err(e),
                Err(e) => {
                    checks.push(CheckOutcome {
                        name: "draftAttached".into(),
                        status: CheckStatus::Error,
                        detail: Some(e.to_string()),
                    });
                    issues.push(PreFlightIssue {
                        severity: Severity::Critical,
                        message: format!("Draft could not be verified: {}", e),
                    });
                }
            },
        }

        let list_stats = match self.mailer.get_list_statistics(schedule.external_list_id).await {
            Ok(stats) => {
                let status = if stats.subscribed == 0 {
                    CheckStatus::Error
                } else if stats.total > 0
                    && (stats.recent_bounces as f64 / stats.total as f64) > 0.05
                {
                    CheckStatus::Warning
                } else {
                    CheckStatus::Pass
                };
                if status == CheckStatus::Error {
                    issues.push(PreFlightIssue {
                        severity: Severity::Critical,
                        message: "Recipient list has no subscribed contacts".into(),
                    });
                } else if status == CheckStatus::Warning {
                    issues.push(PreFlightIssue {
                        severity: Severity::Warning,
                        message: "Recent bounce ratio on the list is elevated".into(),
                    });
                }
                checks.push(CheckOutcome {
                    name: "listHealth".into(),
                    status,
                    detail: Some(format!(
                        "{} subscribed of {} total",
                        stats.subscribed, stats.total
                    )),
                });
                Some(stats)
            }
            Err(e) if e.is_retryable() => return Err(e),
            Err(e) => {
                checks.push(CheckOutcome {
                    name: "listHealth".into(),
                    status: CheckStatus::Error,
                    detail: Some(e.to_string()),
                });
                issues.push(PreFlightIssue {
                    severity: Severity::Critical,
                    message: format!("List statistics unavailable: {}", e),
                });
                None
            }
        };

        let reputation = match self.mailer.get_sender_reputation(&schedule.sender_email).await {
            Ok(reputation) => {
                let status = if reputation.score < 50.0 {
                    CheckStatus::Error
                } else if reputation.score < 70.0 {
                    CheckStatus::Warning
                } else {
                    CheckStatus::Pass
                };
                if status != CheckStatus::Pass {
                    issues.push(PreFlightIssue {
                        severity: if status == CheckStatus::Error {
                            Severity::Critical
                        } else {
                            Severity::Warning
                        },
                        message: format!("Sender reputation at {:.0}", reputation.score),
                    });
                }
                checks.push(CheckOutcome {
                    name: "senderReputation".into(),
                    status,
                    detail: Some(format!("score {:.0}, trend {:?}", reputation.score, reputation.trend)),
                });
                Some(reputation)
            }
            Err(e) if e.is_retryable() => return Err(e),
            Err(e) => {
                checks.push(CheckOutcome {
                    name: "senderReputation".into(),
                    status: CheckStatus::Error,
                    detail: Some(e.to_string()),
                });
                issues.push(PreFlightIssue {
                    severity: Severity::Critical,
                    message: format!("Sender reputation unavailable: {}", e),
                });
                None
            }
        };

        Ok(Gathered {
            checks,
            issues,
            list_stats,
            reputation,
        })
    }

    /// Metrics pair for pre-launch comparison: the current round has not
    /// launched, so round N compares N−1 against N−2.
    fn comparison_pair(
        &self,
        schedule: &CampaignSchedule,
    ) -> EngineResult<(Option<CampaignMetrics>, Option<CampaignMetrics>)> {
        if schedule.round_number <= 1 {
            return Ok((None, None));
        }
        let rounds = self.store.fetch_campaign(&schedule.campaign_name)?;
        let metrics_of = |round: u8| -> EngineResult<Option<CampaignMetrics>> {
            match rounds.iter().find(|r| r.round_number == round) {
                Some(r) => self.store.latest_metrics_for(r.id),
                None => Ok(None),
            }
        };
        let current = metrics_of(schedule.round_number - 1)?;
        let previous = if schedule.round_number >= 3 {
            metrics_of(schedule.round_number - 2)?
        } else {
            None
        };
        Ok((current, previous))
    }
}

struct Gathered {
    checks: Vec<CheckOutcome>,
    issues: Vec<PreFlightIssue>,
    list_stats: Option<ListStatistics>,
    reputation: Option<SenderReputation>,
}

/// The readiness decision rule.
///
/// Blocked on any errored check or a list-quality score under 50; warning on
/// any warned check or a score under 70; ready otherwise.
fn decide(checks: &[CheckOutcome], list_quality_score: Option<f64>) -> ReadinessStatus {
    let any_error = checks.iter().any(|c| c.status == CheckStatus::Error);
    let any_warning = checks.iter().any(|c| c.status == CheckStatus::Warning);
    let score_blocked = list_quality_score.is_some_and(|s| s < 50.0);
    let score_warning = list_quality_score.is_some_and(|s| (50.0..70.0).contains(&s));

    if any_error || score_blocked {
        ReadinessStatus::Blocked
    } else if any_warning || score_warning {
        ReadinessStatus::Warning
    } else {
        ReadinessStatus::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str, status: CheckStatus) -> CheckOutcome {
        CheckOutcome {
            name: name.into(),
            status,
            detail: None,
        }
    }

    #[test]
    fn errored_check_blocks() {
        let checks = vec![check("hasContent", CheckStatus::Error)];
        assert_eq!(decide(&checks, Some(95.0)), ReadinessStatus::Blocked);
    }

    #[test]
    fn low_score_blocks_even_with_clean_checks() {
        let checks = vec![check("draftShape", CheckStatus::Pass)];
        assert_eq!(decide(&checks, Some(49.9)), ReadinessStatus::Blocked);
    }

    #[test]
    fn marginal_score_warns() {
        let checks = vec![check("draftShape", CheckStatus::Pass)];
        assert_eq!(decide(&checks, Some(65.0)), ReadinessStatus::Warning);
        assert_eq!(decide(&checks, Some(70.0)), ReadinessStatus::Ready);
    }

    #[test]
    fn quick_mode_decides_without_score() {
        let checks = vec![
            check("draftShape", CheckStatus::Pass),
            check("listHealth", CheckStatus::Warning),
        ];
        assert_eq!(decide(&checks, None), ReadinessStatus::Warning);
        assert_eq!(
            decide(&[check("draftShape", CheckStatus::Pass)], None),
            ReadinessStatus::Ready
        );
    }
}
