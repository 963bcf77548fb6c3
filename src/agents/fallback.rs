//! Rule-based fallbacks for degraded agents
//!
//! When a model agent times out, errors, or keeps violating its response
//! shape, the pipeline substitutes these deterministic heuristics computed
//! from the raw inputs. Thresholds mirror the pre-flight decision rule.

use crate::agents::comparison::{ComparisonReport, MetricChange};
use crate::agents::delivery::{
    DeliveryAnalysisReport, DeliveryIssue, MetricAssessment, MetricBucket,
};
use crate::agents::list_quality::ListQualityReport;
use crate::agents::recommendation::{OverallHealth, PrioritizedAction, RecommendationReport};
use crate::agents::report::FormattedReport;
use crate::agents::{AnalysisInputs, AnalysisMode, Priority, Severity};
use crate::connectors::{ListStatistics, SenderReputation};
use crate::metrics::{trend_from_deltas, CampaignMetrics, MetricsDelta, Trend};

fn grade_for(score: f64) -> String {
    match score {
        s if s >= 90.0 => "A",
        s if s >= 80.0 => "B",
        s if s >= 70.0 => "C",
        s if s >= 60.0 => "D",
        _ => "F",
    }
    .to_string()
}

/// Heuristic list-quality assessment
pub fn list_quality(stats: &ListStatistics, reputation: &SenderReputation) -> ListQualityReport {
    let subscribed_pct = if stats.total == 0 {
        0.0
    } else {
        stats.subscribed as f64 / stats.total as f64 * 100.0
    };
    let blocked_pct = if stats.total == 0 {
        0.0
    } else {
        stats.blocked as f64 / stats.total as f64 * 100.0
    };
    let bounce_pct = if stats.total == 0 {
        0.0
    } else {
        stats.recent_bounces as f64 / stats.total as f64 * 100.0
    };

    let mut score = 0.6 * subscribed_pct + 0.4 * reputation.score;
    let mut risk_factors = Vec::new();
    if blocked_pct > 2.0 {
        score -= 10.0;
        risk_factors.push(format!("{:.1}% of the list is blocked", blocked_pct));
    }
    if bounce_pct > 2.0 {
        score -= 10.0;
        risk_factors.push(format!("recent bounce ratio at {:.1}%", bounce_pct));
    }
    if reputation.score < 70.0 {
        risk_factors.push(format!("sender reputation at {:.0}", reputation.score));
    }
    let score = score.clamp(0.0, 100.0);

    let recommendation = if score >= 70.0 {
        "List is healthy; proceed with the send.".to_string()
    } else if score >= 50.0 {
        "List shows wear; send with monitoring and plan a cleanup.".to_string()
    } else {
        "Hold the send and clean the list first.".to_string()
    };

    ListQualityReport {
        health_score: score,
        grade: grade_for(score),
        engagement_rate: subscribed_pct,
        risk_factors,
        recommendation,
        estimated_deliverability: (0.5 * score + 0.5 * reputation.score).clamp(0.0, 100.0),
    }
}

fn bucket_score(bucket: MetricBucket) -> f64 {
    match bucket {
        MetricBucket::Excellent => 100.0,
        MetricBucket::Good => 80.0,
        MetricBucket::Warning => 55.0,
        MetricBucket::Critical => 25.0,
    }
}

fn bucket_delivery(rate: f64) -> MetricBucket {
    match rate {
        r if r >= 98.0 => MetricBucket::Excellent,
        r if r >= 95.0 => MetricBucket::Good,
        r if r >= 90.0 => MetricBucket::Warning,
        _ => MetricBucket::Critical,
    }
}

fn bucket_bounce(rate: f64) -> MetricBucket {
    match rate {
        r if r <= 0.5 => MetricBucket::Excellent,
        r if r <= 2.0 => MetricBucket::Good,
        r if r <= 5.0 => MetricBucket::Warning,
        _ => MetricBucket::Critical,
    }
}

fn bucket_open(rate: f64) -> MetricBucket {
    match rate {
        r if r >= 25.0 => MetricBucket::Excellent,
        r if r >= 15.0 => MetricBucket::Good,
        r if r >= 10.0 => MetricBucket::Warning,
        _ => MetricBucket::Critical,
    }
}

fn bucket_click(rate: f64) -> MetricBucket {
    match rate {
        r if r >= 3.0 => MetricBucket::Excellent,
        r if r >= 1.5 => MetricBucket::Good,
        r if r >= 0.5 => MetricBucket::Warning,
        _ => MetricBucket::Critical,
    }
}

/// Heuristic delivery analysis
pub fn delivery(metrics: &CampaignMetrics) -> DeliveryAnalysisReport {
    let mut assessments = vec![
        MetricAssessment {
            metric: "deliveryRate".into(),
            value: metrics.delivery_rate,
            bucket: bucket_delivery(metrics.delivery_rate),
        },
        MetricAssessment {
            metric: "bounceRate".into(),
            value: metrics.bounce_rate,
            bucket: bucket_bounce(metrics.bounce_rate),
        },
    ];
    if let Some(open_rate) = metrics.open_rate {
        assessments.push(MetricAssessment {
            metric: "openRate".into(),
            value: open_rate,
            bucket: bucket_open(open_rate),
        });
    }
    if let Some(click_rate) = metrics.click_rate {
        assessments.push(MetricAssessment {
            metric: "clickRate".into(),
            value: click_rate,
            bucket: bucket_click(click_rate),
        });
    }

    let weights = [0.4, 0.3, 0.2, 0.1];
    let mut total_weight = 0.0;
    let mut score = 0.0;
    for (assessment, weight) in assessments.iter().zip(weights) {
        score += bucket_score(assessment.bucket) * weight;
        total_weight += weight;
    }
    let score = if total_weight > 0.0 {
        score / total_weight
    } else {
        0.0
    };

    let mut issues = Vec::new();
    for assessment in &assessments {
        match assessment.bucket {
            MetricBucket::Critical => issues.push(DeliveryIssue {
                severity: Severity::Critical,
                message: format!("{} at {:.2}% is critical", assessment.metric, assessment.value),
            }),
            MetricBucket::Warning => issues.push(DeliveryIssue {
                severity: Severity::Warning,
                message: format!(
                    "{} at {:.2}% is below expectations",
                    assessment.metric, assessment.value
                ),
            }),
            _ => {}
        }
    }
    issues.sort_by_key(|issue| issue.severity);

    let mut patterns = Vec::new();
    if metrics.counters.hard_bounces > metrics.counters.soft_bounces {
        patterns.push("hard bounces dominate bounce volume".to_string());
    }
    if metrics.counters.queued > 0 {
        patterns.push(format!(
            "{} messages still queued at collection time",
            metrics.counters.queued
        ));
    }

    let recommendations = if issues.is_empty() {
        vec!["Maintain current sending practices.".to_string()]
    } else {
        issues
            .iter()
            .map(|issue| format!("Investigate: {}", issue.message))
            .collect()
    };

    DeliveryAnalysisReport {
        grade: grade_for(score),
        score,
        metric_assessments: assessments,
        patterns,
        issues,
        recommendations,
    }
}

/// Heuristic round comparison
pub fn comparison(deltas: &[MetricsDelta], has_previous: bool) -> ComparisonReport {
    let trend = if has_previous {
        trend_from_deltas(deltas)
    } else {
        Trend::FirstRound
    };
    ComparisonReport {
        trend,
        metric_changes: deltas
            .iter()
            .map(|d| MetricChange {
                metric: d.metric.clone(),
                delta: d.delta,
                significance: d.significance,
                note: None,
            })
            .collect(),
        prediction: None,
    }
}

/// Heuristic recommendation synthesis
pub fn recommendation(
    inputs: &AnalysisInputs,
    list_quality: Option<&ListQualityReport>,
    delivery: Option<&DeliveryAnalysisReport>,
    comparison: Option<&ComparisonReport>,
) -> RecommendationReport {
    let mut scores = Vec::new();
    if let Some(lq) = list_quality {
        scores.push(lq.health_score);
    }
    if let Some(da) = delivery {
        scores.push(da.score);
    }
    let score = if scores.is_empty() {
        50.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };
    let status = if score >= 80.0 {
        "healthy"
    } else if score >= 60.0 {
        "watch"
    } else {
        "at-risk"
    };
    let trend = comparison.map(|c| c.trend).unwrap_or(Trend::FirstRound);

    let mut recommendations = Vec::new();
    let mut warnings = Vec::new();
    if let Some(da) = delivery {
        for issue in &da.issues {
            match issue.severity {
                Severity::Critical => recommendations.push(PrioritizedAction {
                    priority: Priority::Critical,
                    action: format!("Resolve before next send: {}", issue.message),
                }),
                Severity::Warning => warnings.push(issue.message.clone()),
                Severity::Info => {}
            }
        }
    }
    if let Some(lq) = list_quality {
        for risk in &lq.risk_factors {
            warnings.push(risk.clone());
        }
        if lq.health_score < 70.0 {
            recommendations.push(PrioritizedAction {
                priority: Priority::High,
                action: "Clean inactive and blocked contacts from the list.".to_string(),
            });
        }
    }
    if recommendations.is_empty() {
        recommendations.push(PrioritizedAction {
            priority: Priority::Low,
            action: "No corrective action required; keep monitoring.".to_string(),
        });
    }

    let opportunities = if trend == Trend::Improving {
        vec!["Performance is trending up; consider tightening the send window.".to_string()]
    } else {
        Vec::new()
    };

    RecommendationReport {
        executive_summary: format!(
            "Round {} of campaign {} is {} (score {:.0}).",
            inputs.round_number, inputs.campaign_name, status, score
        ),
        overall_health: OverallHealth {
            score,
            status: status.to_string(),
            trend,
        },
        recommendations,
        warnings,
        opportunities,
        next_round_strategy: if inputs.is_final_round {
            None
        } else {
            Some("Carry the current segmentation into the next round and re-verify the list 24h before launch.".to_string())
        },
    }
}

/// Deterministic report assembly
pub fn formatted(
    mode: AnalysisMode,
    list_quality: Option<&ListQualityReport>,
    delivery: Option<&DeliveryAnalysisReport>,
    comparison: Option<&ComparisonReport>,
    recommendation: &RecommendationReport,
) -> FormattedReport {
    let mut summary = Vec::new();
    match mode {
        AnalysisMode::Preflight => {
            if let Some(lq) = list_quality {
                summary.push(format!(
                    "List health {:.0}/100 (grade {}), estimated deliverability {:.0}%",
                    lq.health_score, lq.grade, lq.estimated_deliverability
                ));
            }
            summary.push(format!(
                "Overall status: {} ({:.0}/100)",
                recommendation.overall_health.status, recommendation.overall_health.score
            ));
        }
        AnalysisMode::Wrapup => {
            if let Some(da) = delivery {
                summary.push(format!(
                    "Delivery grade {} (score {:.0}/100)",
                    da.grade, da.score
                ));
            }
            if let Some(cmp) = comparison {
                summary.push(format!("Trend vs previous round: {:?}", cmp.trend));
            }
        }
    }

    let insights = delivery
        .map(|da| da.patterns.clone())
        .unwrap_or_default();

    FormattedReport {
        headline: recommendation.executive_summary.clone(),
        summary,
        insights,
        recommendations: recommendation
            .recommendations
            .iter()
            .map(|r| r.action.clone())
            .collect(),
        warnings: recommendation.warnings.clone(),
        next_steps: recommendation
            .next_round_strategy
            .clone()
            .map(|s| vec![s])
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::{DeliveryCounters, ReputationTrend};
    use crate::metrics::compute_deltas;
    use crate::schedule::ScheduleId;
    use chrono::{TimeZone, Utc};

    fn metrics(processed: u64, delivered: u64, bounced: u64) -> CampaignMetrics {
        CampaignMetrics::derive(
            ScheduleId::new(),
            1,
            DeliveryCounters {
                processed,
                delivered,
                bounced,
                hard_bounces: bounced,
                opened: delivered / 4,
                clicked: delivered / 20,
                ..Default::default()
            },
            Utc.with_ymd_and_hms(2025, 10, 2, 9, 45, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn weak_list_scores_low() {
        let report = list_quality(
            &ListStatistics {
                total: 1000,
                subscribed: 400,
                unsubscribed: 400,
                blocked: 100,
                recent_bounces: 100,
            },
            &SenderReputation {
                score: 55.0,
                trend: ReputationTrend::Declining,
            },
        );
        assert!(report.health_score < 50.0);
        assert!(!report.risk_factors.is_empty());
    }

    #[test]
    fn healthy_metrics_grade_well() {
        let report = delivery(&metrics(1000, 985, 5));
        assert!(report.score >= 80.0, "score was {}", report.score);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn poor_delivery_raises_critical_issue() {
        let report = delivery(&metrics(1000, 850, 120));
        assert!(report
            .issues
            .iter()
            .any(|i| i.severity == Severity::Critical));
    }

    #[test]
    fn declining_deltas_produce_declining_trend() {
        let previous = metrics(1000, 975, 20);
        let current = metrics(1000, 960, 35);
        let deltas = compute_deltas(&current, &previous);
        let report = comparison(&deltas, true);
        assert_eq!(report.trend, Trend::Declining);
        assert!(report.prediction.is_none());
    }

    #[test]
    fn first_round_comparison_has_no_changes() {
        let report = comparison(&[], false);
        assert_eq!(report.trend, Trend::FirstRound);
        assert!(report.metric_changes.is_empty());
    }
}
