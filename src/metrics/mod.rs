//! Campaign metrics: persisted counters, derived rates, and deltas
//!
//! One [`CampaignMetrics`] row is written per successful wrap-up collection
//! and is immutable thereafter. Counters are 64-bit; external platforms
//! overflow 32-bit ranges over time.

pub mod collector;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::connectors::DeliveryCounters;
use crate::error::{EngineError, EngineResult};
use crate::schedule::ScheduleId;

/// Persisted metrics row for one collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignMetrics {
    /// Row id
    pub id: Uuid,
    /// Schedule this row belongs to
    pub schedule_id: ScheduleId,
    /// Mail-platform campaign id the counters were fetched for
    pub external_campaign_id: u64,
    /// Raw counters
    pub counters: DeliveryCounters,
    /// delivered / processed, percent
    pub delivery_rate: f64,
    /// bounced / processed, percent
    pub bounce_rate: f64,
    /// hard bounces / processed, percent
    pub hard_bounce_rate: f64,
    /// soft bounces / processed, percent
    pub soft_bounce_rate: f64,
    /// opened / delivered, percent; `None` iff delivered = 0
    pub open_rate: Option<f64>,
    /// clicked / delivered, percent; `None` iff delivered = 0
    pub click_rate: Option<f64>,
    /// When the counters were collected
    pub collected_at: DateTime<Utc>,
    /// When the platform started the send
    pub send_start_at: Option<DateTime<Utc>>,
    /// When the platform finished the send
    pub send_end_at: Option<DateTime<Utc>>,
}

fn percent_of(count: u64, base: u64) -> f64 {
    if base == 0 {
        0.0
    } else {
        count as f64 / base as f64 * 100.0
    }
}

impl CampaignMetrics {
    /// Derive a metrics row from raw platform counters.
    ///
    /// Rates use exact division and carry full precision; rounding happens
    /// only at display time. Rejects counter sets where
    /// delivered + bounced + blocked + queued exceeds processed.
    pub fn derive(
        schedule_id: ScheduleId,
        external_campaign_id: u64,
        counters: DeliveryCounters,
        collected_at: DateTime<Utc>,
    ) -> EngineResult<Self> {
        let accounted = counters.delivered + counters.bounced + counters.blocked + counters.queued;
        if accounted > counters.processed {
            return Err(EngineError::permanent(format!(
                "mail-platform counters are inconsistent: {} accounted for out of {} processed",
                accounted, counters.processed
            )));
        }

        let (open_rate, click_rate) = if counters.delivered == 0 {
            (None, None)
        } else {
            (
                Some(percent_of(counters.opened, counters.delivered)),
                Some(percent_of(counters.clicked, counters.delivered)),
            )
        };

        Ok(Self {
            id: Uuid::new_v4(),
            schedule_id,
            external_campaign_id,
            delivery_rate: percent_of(counters.delivered, counters.processed),
            bounce_rate: percent_of(counters.bounced, counters.processed),
            hard_bounce_rate: percent_of(counters.hard_bounces, counters.processed),
            soft_bounce_rate: percent_of(counters.soft_bounces, counters.processed),
            open_rate,
            click_rate,
            collected_at,
            send_start_at: counters.send_start_at,
            send_end_at: counters.send_end_at,
            counters,
        })
    }
}

/// Magnitude of a round-over-round movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Significance {
    /// Movement below the noise floor
    None,
    /// Noticeable movement
    Minor,
    /// Movement worth flagging
    Moderate,
    /// Movement requiring attention
    Major,
}

impl Significance {
    /// Classify an absolute percentage-point delta
    pub fn from_delta(delta: f64) -> Self {
        let magnitude = delta.abs();
        if magnitude < 0.5 {
            Significance::None
        } else if magnitude < 2.0 {
            Significance::Minor
        } else if magnitude < 5.0 {
            Significance::Moderate
        } else {
            Significance::Major
        }
    }
}

/// One per-metric round-over-round comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsDelta {
    /// Metric name, e.g. "deliveryRate"
    pub metric: String,
    /// Previous round value, percent
    pub previous: f64,
    /// Current round value, percent
    pub current: f64,
    /// current − previous, percentage points
    pub delta: f64,
    /// Movement magnitude
    pub significance: Significance,
}

impl MetricsDelta {
    fn new(metric: &str, previous: f64, current: f64) -> Self {
        let delta = current - previous;
        Self {
            metric: metric.to_string(),
            previous,
            current,
            delta,
            significance: Significance::from_delta(delta),
        }
    }
}

/// Round-over-round trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    /// Delivery moving up
    Improving,
    /// No significant movement
    Stable,
    /// Delivery moving down
    Declining,
    /// No previous round to compare against
    FirstRound,
}

/// Per-metric deltas between two rounds.
///
/// Open/click deltas are emitted only when both rounds carry them.
pub fn compute_deltas(current: &CampaignMetrics, previous: &CampaignMetrics) -> Vec<MetricsDelta> {
    let mut deltas = vec![
        MetricsDelta::new("deliveryRate", previous.delivery_rate, current.delivery_rate),
        MetricsDelta::new("bounceRate", previous.bounce_rate, current.bounce_rate),
    ];
    if let (Some(prev), Some(curr)) = (previous.open_rate, current.open_rate) {
        deltas.push(MetricsDelta::new("openRate", prev, curr));
    }
    if let (Some(prev), Some(curr)) = (previous.click_rate, current.click_rate) {
        deltas.push(MetricsDelta::new("clickRate", prev, curr));
    }
    deltas
}

/// Rule-based trend from computed deltas (the no-model path)
pub fn trend_from_deltas(deltas: &[MetricsDelta]) -> Trend {
    let delivery = deltas.iter().find(|d| d.metric == "deliveryRate");
    match delivery {
        Some(d) if d.significance > Significance::None && d.delta < 0.0 => Trend::Declining,
        Some(d) if d.significance > Significance::None && d.delta > 0.0 => Trend::Improving,
        Some(_) => Trend::Stable,
        None => Trend::Stable,
    }
}
