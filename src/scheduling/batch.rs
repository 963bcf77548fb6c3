//! Recipient batch partitioning
//!
//! Splits a recipient base into three contiguous 1-based ranges and places
//! each on its own eligible launch day.

use chrono::{DateTime, Duration, Utc};

use crate::error::{EngineError, EngineResult};
use crate::scheduling::calendar::next_eligible_slot;

/// Number of rounds per campaign
pub const ROUNDS_PER_CAMPAIGN: u8 = 3;

/// One partitioned batch bound to a launch slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSlot {
    /// Round number, 1..=3
    pub round: u8,
    /// Inclusive range start (1-based)
    pub range_lo: u64,
    /// Inclusive range end; `range_hi < range_lo` encodes an empty round
    pub range_hi: u64,
    /// Recipient count in this round
    pub count: u64,
    /// Launch instant assigned by the calendar
    pub scheduled_at: DateTime<Utc>,
}

impl BatchSlot {
    /// Operator-facing range label, e.g. "1-1177"
    pub fn range_label(&self) -> String {
        format!("{}-{}", self.range_lo, self.range_hi)
    }
}

/// Partition `total` recipients into three ordered batches starting at `start`.
///
/// Round 1 holds ceil(total / 3); later rounds may be empty for tiny lists but
/// are still emitted so downstream bookkeeping stays uniform. Scheduled dates
/// are strictly increasing: each subsequent round is placed from 24 hours
/// after the previous slot, which always lands it on a later eligible day.
pub fn partition(total: u64, start: DateTime<Utc>) -> EngineResult<Vec<BatchSlot>> {
    if total == 0 {
        return Err(EngineError::InvalidInput {
            reason: "recipient count must be positive".into(),
        });
    }

    let chunk = total.div_ceil(ROUNDS_PER_CAMPAIGN as u64);
    let mut slots = Vec::with_capacity(ROUNDS_PER_CAMPAIGN as usize);
    let mut slot_at = next_eligible_slot(start);

    for round in 1..=ROUNDS_PER_CAMPAIGN {
        let lo = (round as u64 - 1) * chunk + 1;
        let hi = (round as u64 * chunk).min(total);
        let count = if hi >= lo { hi - lo + 1 } else { 0 };

        slots.push(BatchSlot {
            round,
            range_lo: lo,
            range_hi: hi,
            count,
            scheduled_at: slot_at,
        });

        slot_at = next_eligible_slot(slot_at + Duration::hours(24));
    }

    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn start() -> DateTime<Utc> {
        // 2025-10-01 is a Wednesday.
        Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn three_round_schedule_for_q4() {
        let slots = partition(3529, start()).unwrap();

        let labels: Vec<String> = slots.iter().map(|s| s.range_label()).collect();
        assert_eq!(labels, vec!["1-1177", "1178-2354", "2355-3529"]);

        let dates: Vec<DateTime<Utc>> = slots.iter().map(|s| s.scheduled_at).collect();
        assert_eq!(
            dates,
            vec![
                Utc.with_ymd_and_hms(2025, 10, 2, 9, 15, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 10, 7, 9, 15, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 10, 9, 9, 15, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn balanced_split_covers_total() {
        let slots = partition(10_000, start()).unwrap();
        let labels: Vec<String> = slots.iter().map(|s| s.range_label()).collect();
        assert_eq!(labels, vec!["1-3334", "3335-6667", "6668-10000"]);
        assert_eq!(slots.iter().map(|s| s.count).sum::<u64>(), 10_000);
    }

    #[test]
    fn tiny_split_emits_empty_round() {
        let slots = partition(2, start()).unwrap();
        let labels: Vec<String> = slots.iter().map(|s| s.range_label()).collect();
        assert_eq!(labels, vec!["1-1", "2-2", "3-2"]);
        assert_eq!(
            slots.iter().map(|s| s.count).collect::<Vec<u64>>(),
            vec![1, 1, 0]
        );
        assert_eq!(slots.iter().map(|s| s.count).sum::<u64>(), 2);
    }

    #[test]
    fn zero_recipients_rejected() {
        assert!(partition(0, start()).is_err());
    }

    proptest! {
        // Property: ranges cover [1..N] exactly, disjoint and ordered, and
        // the three scheduled dates are strictly increasing on distinct days.
        #[test]
        fn partition_invariants(total in 1u64..5_000_000) {
            let slots = partition(total, start()).unwrap();
            prop_assert_eq!(slots.len(), 3);
            prop_assert_eq!(slots.iter().map(|s| s.count).sum::<u64>(), total);

            let mut next_expected = 1u64;
            for slot in &slots {
                if slot.count > 0 {
                    prop_assert_eq!(slot.range_lo, next_expected);
                    prop_assert_eq!(slot.range_hi - slot.range_lo + 1, slot.count);
                    next_expected = slot.range_hi + 1;
                } else {
                    prop_assert!(slot.range_hi < slot.range_lo);
                }
            }
            prop_assert_eq!(next_expected, total + 1);

            for pair in slots.windows(2) {
                prop_assert!(pair[0].scheduled_at < pair[1].scheduled_at);
                prop_assert_ne!(
                    pair[0].scheduled_at.date_naive(),
                    pair[1].scheduled_at.date_naive()
                );
            }
        }
    }
}
