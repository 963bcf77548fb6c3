//! Launch-slot calendar arithmetic
//!
//! Campaign rounds launch on Tuesdays and Thursdays at 09:15:00 UTC. All
//! wall-clock computation here is UTC; there is no time-zone personalization.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::schedule::Stage;

/// Launch time of day, UTC
const LAUNCH_HOUR: u32 = 9;
/// Launch minute
const LAUNCH_MINUTE: u32 = 15;

fn at_launch_time(date: NaiveDate) -> DateTime<Utc> {
    match NaiveTime::from_hms_opt(LAUNCH_HOUR, LAUNCH_MINUTE, 0) {
        Some(time) => date.and_time(time).and_utc(),
        None => unreachable!("09:15:00 is a valid time of day"),
    }
}

fn is_eligible_weekday(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Tue | Weekday::Thu)
}

/// Earliest instant `>= from` that falls on a Tuesday or Thursday at
/// 09:15:00 UTC.
///
/// If `from` is already on an eligible date at or before that day's 09:15:00
/// boundary, the boundary itself is returned; a `from` later the same day
/// rolls to the next eligible date.
pub fn next_eligible_slot(from: DateTime<Utc>) -> DateTime<Utc> {
    for day in 0..=7 {
        let date = (from + Duration::days(day)).date_naive();
        if !is_eligible_weekday(date) {
            continue;
        }
        let candidate = at_launch_time(date);
        if candidate >= from {
            return candidate;
        }
    }
    unreachable!("every seven-day window contains a Tuesday and a Thursday")
}

/// Minute offsets of each stage relative to launch T
///
/// Defaults follow the production timeline; overriding them is supported for
/// testing only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageOffsets {
    /// Pre-launch announce, minutes relative to T
    pub prelaunch_minutes: i64,
    /// Pre-flight verify, minutes relative to T
    pub preflight_minutes: i64,
    /// Launch warning, minutes relative to T
    pub launch_warning_minutes: i64,
    /// Launch confirmation, minutes relative to T
    pub launch_confirmation_minutes: i64,
    /// Wrap-up, minutes relative to T
    pub wrapup_minutes: i64,
}

impl Default for StageOffsets {
    fn default() -> Self {
        Self {
            prelaunch_minutes: -(21 * 60),
            preflight_minutes: -(3 * 60 + 15),
            launch_warning_minutes: -15,
            launch_confirmation_minutes: 0,
            wrapup_minutes: 30,
        }
    }
}

impl StageOffsets {
    /// Minute offset for one stage
    pub fn minutes_for(&self, stage: Stage) -> i64 {
        match stage {
            Stage::Prelaunch => self.prelaunch_minutes,
            Stage::Preflight => self.preflight_minutes,
            Stage::LaunchWarning => self.launch_warning_minutes,
            Stage::LaunchConfirmation => self.launch_confirmation_minutes,
            Stage::Wrapup => self.wrapup_minutes,
        }
    }

    /// Trigger instant of a stage for a round launching at `launch`
    pub fn trigger_time(&self, launch: DateTime<Utc>, stage: Stage) -> DateTime<Utc> {
        launch + Duration::minutes(self.minutes_for(stage))
    }

    /// Wrap-up trigger computed from the observed launch instant.
    ///
    /// Used when launch fires late: wrap-up always runs its offset after the
    /// send actually started, not after the planned T.
    pub fn wrapup_after(&self, observed_launch: DateTime<Utc>) -> DateTime<Utc> {
        observed_launch + Duration::minutes(self.wrapup_minutes)
    }

    /// Inverse of [`StageOffsets::wrapup_after`]: recover the observed launch
    /// instant from a wrap-up trigger time.
    pub fn launch_before_wrapup(&self, wrapup_at: DateTime<Utc>) -> DateTime<Utc> {
        wrapup_at - Duration::minutes(self.wrapup_minutes)
    }
}
