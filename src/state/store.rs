//! Durable store for schedules, metrics, and notification logs
//!
//! sled-backed with JSON values under prefixed keys:
//!
//! - `schedule:{id}` — one [`CampaignSchedule`] per row
//! - `campaign:{name}:{round}` — natural-key index, value is the schedule id
//! - `metrics:{schedule}:{collected_at_ms}` — append-only metrics rows
//! - `log:{schedule}:{stage}:{attempt}` — append-only notification log
//!
//! Read-modify-writes on a schedule are serialized through a per-schedule
//! lock so notification-record updates are linearizable. Multi-row campaign
//! creation goes through a single atomic batch.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::metrics::CampaignMetrics;
use crate::schedule::{
    CampaignSchedule, LogStatus, NotificationLog, RoundStatus, ScheduleId, Stage,
};
use crate::state::machine;

fn ser<T: Serialize>(value: &T) -> EngineResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| EngineError::storage(format!("serialize: {}", e)))
}

fn de<T: DeserializeOwned>(bytes: &[u8]) -> EngineResult<T> {
    serde_json::from_slice(bytes).map_err(|e| EngineError::storage(format!("deserialize: {}", e)))
}

fn schedule_key(id: ScheduleId) -> String {
    format!("schedule:{}", id)
}

fn campaign_key(name: &str, round: u8) -> String {
    format!("campaign:{}:{}", name, round)
}

fn metrics_key(id: ScheduleId, collected_at_ms: i64) -> String {
    format!("metrics:{}:{:020}", id, collected_at_ms)
}

fn log_key(id: ScheduleId, stage: Stage, attempt: u32) -> String {
    format!("log:{}:{}:{:03}", id, stage, attempt)
}

/// Typed store over the engine's sled database
pub struct CampaignStore {
    db: sled::Db,
    rmw_locks: DashMap<ScheduleId, Arc<Mutex<()>>>,
    create_lock: Mutex<()>,
}

impl CampaignStore {
    /// Wrap an already-open database
    pub fn new(db: sled::Db) -> Self {
        Self {
            db,
            rmw_locks: DashMap::new(),
            create_lock: Mutex::new(()),
        }
    }

    /// Open the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let db = sled::open(path).map_err(EngineError::storage)?;
        Ok(Self::new(db))
    }

    /// Handle to the underlying database, shared with the job store
    pub fn database(&self) -> sled::Db {
        self.db.clone()
    }

    fn rmw_lock(&self, id: ScheduleId) -> Arc<Mutex<()>> {
        self.rmw_locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Atomically create all rounds of a campaign.
    ///
    /// Rejects the whole batch if the campaign name is already registered, so
    /// (campaignName, roundNumber) stays unique.
    pub fn create_campaign(&self, schedules: &[CampaignSchedule]) -> EngineResult<()> {
        let _guard = self.create_lock.lock();

        for schedule in schedules {
            let key = campaign_key(&schedule.campaign_name, schedule.round_number);
            if self
                .db
                .contains_key(key.as_bytes())
                .map_err(EngineError::storage)?
            {
                return Err(EngineError::CampaignExists {
                    name: schedule.campaign_name.clone(),
                });
            }
        }

        let mut batch = sled::Batch::default();
        for schedule in schedules {
            validate_schedule(schedule)?;
            batch.insert(schedule_key(schedule.id).as_bytes(), ser(schedule)?);
            batch.insert(
                campaign_key(&schedule.campaign_name, schedule.round_number).as_bytes(),
                schedule.id.0.as_bytes().to_vec(),
            );
        }
        self.db.apply_batch(batch).map_err(EngineError::storage)?;
        Ok(())
    }

    /// Fetch a schedule by id
    pub fn fetch(&self, id: ScheduleId) -> EngineResult<Option<CampaignSchedule>> {
        match self
            .db
            .get(schedule_key(id).as_bytes())
            .map_err(EngineError::storage)?
        {
            Some(bytes) => Ok(Some(de(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Fetch a schedule by id, failing when absent
    pub fn get(&self, id: ScheduleId) -> EngineResult<CampaignSchedule> {
        self.fetch(id)?.ok_or_else(|| EngineError::ScheduleNotFound {
            schedule_id: id.to_string(),
        })
    }

    /// All rounds of a campaign, ordered by round number
    pub fn fetch_campaign(&self, name: &str) -> EngineResult<Vec<CampaignSchedule>> {
        let prefix = format!("campaign:{}:", name);
        let mut schedules = Vec::new();
        for entry in self.db.scan_prefix(prefix.as_bytes()) {
            let (_, value) = entry.map_err(EngineError::storage)?;
            let id = ScheduleId(
                Uuid::from_slice(&value)
                    .map_err(|e| EngineError::storage(format!("corrupt campaign index: {}", e)))?,
            );
            schedules.push(self.get(id)?);
        }
        schedules.sort_by_key(|s| s.round_number);
        Ok(schedules)
    }

    /// Serialized read-modify-write of a single schedule.
    ///
    /// The mutation runs under the per-schedule lock; the stored row is
    /// re-read inside the lock so concurrent updates never lose writes.
    pub fn update<F>(&self, id: ScheduleId, mutate: F) -> EngineResult<CampaignSchedule>
    where
        F: FnOnce(&mut CampaignSchedule) -> EngineResult<()>,
    {
        let lock = self.rmw_lock(id);
        let _guard = lock.lock();

        let mut schedule = self.get(id)?;
        mutate(&mut schedule)?;
        validate_schedule(&schedule)?;
        self.db
            .insert(schedule_key(id).as_bytes(), ser(&schedule)?)
            .map_err(EngineError::storage)?;
        Ok(schedule)
    }

    /// Transition a round's status, enforcing the transition DAG
    pub fn update_status(
        &self,
        id: ScheduleId,
        to: RoundStatus,
        now: chrono::DateTime<chrono::Utc>,
    ) -> EngineResult<CampaignSchedule> {
        self.update(id, |schedule| {
            machine::check_transition(schedule.status, to)?;
            schedule.status = to;
            if to == RoundStatus::Scheduled {
                // Reverting to SCHEDULED (failed launch, unblock) clears the
                // platform campaign id.
                schedule.external_campaign_id = None;
            }
            schedule.updated_at = now;
            Ok(())
        })
    }

    /// Append an immutable metrics row
    pub fn append_metrics(&self, metrics: &CampaignMetrics) -> EngineResult<()> {
        let key = metrics_key(metrics.schedule_id, metrics.collected_at.timestamp_millis());
        self.db
            .insert(key.as_bytes(), ser(metrics)?)
            .map_err(EngineError::storage)?;
        Ok(())
    }

    /// Most recent metrics row for a schedule
    pub fn latest_metrics_for(&self, id: ScheduleId) -> EngineResult<Option<CampaignMetrics>> {
        let prefix = format!("metrics:{}:", id);
        let mut latest: Option<CampaignMetrics> = None;
        for entry in self.db.scan_prefix(prefix.as_bytes()) {
            let (_, value) = entry.map_err(EngineError::storage)?;
            latest = Some(de(&value)?);
        }
        Ok(latest)
    }

    /// Append a notification-log row.
    ///
    /// (schedule, stage, attempt) uniqueness is enforced at write time.
    pub fn append_log(&self, log: &NotificationLog) -> EngineResult<()> {
        let key = log_key(log.schedule_id, log.stage, log.attempt);
        let previous = self
            .db
            .compare_and_swap(
                key.as_bytes(),
                None as Option<&[u8]>,
                Some(ser(log)?),
            )
            .map_err(EngineError::storage)?;
        if previous.is_err() {
            return Err(EngineError::Internal {
                message: format!(
                    "Duplicate notification log for ({}, {}, attempt {})",
                    log.schedule_id, log.stage, log.attempt
                ),
            });
        }
        Ok(())
    }

    /// Next attempt number for a (schedule, stage)
    pub fn next_attempt(&self, id: ScheduleId, stage: Stage) -> EngineResult<u32> {
        let prefix = format!("log:{}:{}:", id, stage);
        let mut count = 0u32;
        for entry in self.db.scan_prefix(prefix.as_bytes()) {
            entry.map_err(EngineError::storage)?;
            count += 1;
        }
        Ok(count + 1)
    }

    /// All log rows for a schedule, in (stage, attempt) key order
    pub fn logs_for(&self, id: ScheduleId) -> EngineResult<Vec<NotificationLog>> {
        let prefix = format!("log:{}:", id);
        let mut logs = Vec::new();
        for entry in self.db.scan_prefix(prefix.as_bytes()) {
            let (_, value) = entry.map_err(EngineError::storage)?;
            logs.push(de(&value)?);
        }
        Ok(logs)
    }

    /// Log rows whose stage never succeeded: the highest attempt per
    /// (schedule, stage) that is still FAILURE or RETRYING.
    pub fn failed_logs_needing_retry(&self) -> EngineResult<Vec<NotificationLog>> {
        let mut latest: std::collections::HashMap<(ScheduleId, Stage), NotificationLog> =
            std::collections::HashMap::new();
        for entry in self.db.scan_prefix(b"log:") {
            let (_, value) = entry.map_err(EngineError::storage)?;
            let log: NotificationLog = de(&value)?;
            let slot = latest.entry((log.schedule_id, log.stage));
            match slot {
                std::collections::hash_map::Entry::Occupied(mut existing) => {
                    if log.attempt > existing.get().attempt {
                        existing.insert(log);
                    }
                }
                std::collections::hash_map::Entry::Vacant(vacant) => {
                    vacant.insert(log);
                }
            }
        }
        let mut failed: Vec<NotificationLog> = latest
            .into_values()
            .filter(|log| matches!(log.status, LogStatus::Failure | LogStatus::Retrying))
            .collect();
        failed.sort_by_key(|log| log.sent_at);
        Ok(failed)
    }

    /// Flush dirty pages to disk
    pub fn flush(&self) -> EngineResult<()> {
        self.db.flush().map_err(EngineError::storage)?;
        Ok(())
    }
}

fn validate_schedule(schedule: &CampaignSchedule) -> EngineResult<()> {
    if !(1..=3).contains(&schedule.round_number) {
        return Err(EngineError::Internal {
            message: format!("round number {} out of range", schedule.round_number),
        });
    }
    let expect_campaign_id = !matches!(
        schedule.status,
        RoundStatus::Scheduled | RoundStatus::Ready | RoundStatus::Blocked
    );
    if expect_campaign_id != schedule.external_campaign_id.is_some() {
        return Err(EngineError::Internal {
            message: format!(
                "schedule {} status {} inconsistent with external campaign id {:?}",
                schedule.id, schedule.status, schedule.external_campaign_id
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::NotificationStatus;
    use chrono::{TimeZone, Utc};

    fn store() -> CampaignStore {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .expect("temporary sled db");
        CampaignStore::new(db)
    }

    fn round(name: &str, number: u8) -> CampaignSchedule {
        let now = Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap();
        CampaignSchedule {
            id: ScheduleId::new(),
            campaign_name: name.into(),
            round_number: number,
            scheduled_date: Utc.with_ymd_and_hms(2025, 10, 2, 9, 15, 0).unwrap()
                + chrono::Duration::days(number as i64 * 5),
            scheduled_time: "09:15".into(),
            list_name: format!("{}-round-{}", name, number),
            external_list_id: number as u64,
            recipient_count: 100,
            recipient_range: "1-100".into(),
            subject: "s".into(),
            sender_name: "n".into(),
            sender_email: "e@example.com".into(),
            external_draft_id: Some(9),
            external_campaign_id: None,
            notification_status: NotificationStatus::default(),
            status: RoundStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn campaign_creation_is_unique() {
        let store = store();
        let rounds = vec![round("Q4", 1), round("Q4", 2), round("Q4", 3)];
        store.create_campaign(&rounds).unwrap();

        let fetched = store.fetch_campaign("Q4").unwrap();
        assert_eq!(fetched.len(), 3);
        assert_eq!(
            fetched.iter().map(|s| s.round_number).collect::<Vec<u8>>(),
            vec![1, 2, 3]
        );

        let err = store.create_campaign(&[round("Q4", 1)]).unwrap_err();
        assert!(matches!(err, EngineError::CampaignExists { .. }));
    }

    #[test]
    fn status_updates_follow_the_dag() {
        let store = store();
        let rounds = vec![round("Q1", 1), round("Q1", 2), round("Q1", 3)];
        store.create_campaign(&rounds).unwrap();
        let id = rounds[0].id;
        let now = Utc.with_ymd_and_hms(2025, 10, 2, 6, 0, 0).unwrap();

        store.update_status(id, RoundStatus::Ready, now).unwrap();
        let err = store
            .update_status(id, RoundStatus::Completed, now)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        assert_eq!(store.get(id).unwrap().status, RoundStatus::Ready);
    }

    #[test]
    fn launch_revert_clears_campaign_id() {
        let store = store();
        let rounds = vec![round("Q2", 1), round("Q2", 2), round("Q2", 3)];
        store.create_campaign(&rounds).unwrap();
        let id = rounds[0].id;
        let now = Utc.with_ymd_and_hms(2025, 10, 2, 9, 15, 0).unwrap();

        store.update_status(id, RoundStatus::Ready, now).unwrap();
        store
            .update(id, |s| {
                machine::check_transition(s.status, RoundStatus::Launching)?;
                s.status = RoundStatus::Launching;
                s.external_campaign_id = Some(77);
                Ok(())
            })
            .unwrap();

        let reverted = store
            .update_status(id, RoundStatus::Scheduled, now)
            .unwrap();
        assert_eq!(reverted.external_campaign_id, None);
    }

    #[test]
    fn log_rows_are_unique_per_attempt() {
        let store = store();
        let rounds = vec![round("Q3", 1), round("Q3", 2), round("Q3", 3)];
        store.create_campaign(&rounds).unwrap();
        let id = rounds[0].id;
        let sent_at = Utc.with_ymd_and_hms(2025, 10, 2, 9, 15, 0).unwrap();

        let log = NotificationLog {
            id: Uuid::new_v4(),
            schedule_id: id,
            stage: Stage::Preflight,
            attempt: 1,
            status: LogStatus::Retrying,
            external_message_id: None,
            error_message: Some("chat: 500".into()),
            sent_at,
        };
        store.append_log(&log).unwrap();
        assert!(store.append_log(&log).is_err());
        assert_eq!(store.next_attempt(id, Stage::Preflight).unwrap(), 2);

        let needing_retry = store.failed_logs_needing_retry().unwrap();
        assert_eq!(needing_retry.len(), 1);

        let success = NotificationLog {
            id: Uuid::new_v4(),
            attempt: 2,
            status: LogStatus::Success,
            external_message_id: Some("msg-2".into()),
            error_message: None,
            ..log
        };
        store.append_log(&success).unwrap();
        assert!(store.failed_logs_needing_retry().unwrap().is_empty());
    }

    #[test]
    fn latest_metrics_wins_by_collection_time() {
        let store = store();
        let rounds = vec![round("Q5", 1), round("Q5", 2), round("Q5", 3)];
        store.create_campaign(&rounds).unwrap();
        let id = rounds[0].id;

        let counters = crate::connectors::DeliveryCounters {
            processed: 10,
            delivered: 10,
            ..Default::default()
        };
        let early = CampaignMetrics::derive(
            id,
            7,
            counters,
            Utc.with_ymd_and_hms(2025, 10, 2, 9, 45, 0).unwrap(),
        )
        .unwrap();
        let late = CampaignMetrics::derive(
            id,
            7,
            counters,
            Utc.with_ymd_and_hms(2025, 10, 2, 10, 45, 0).unwrap(),
        )
        .unwrap();
        store.append_metrics(&early).unwrap();
        store.append_metrics(&late).unwrap();

        let latest = store.latest_metrics_for(id).unwrap().unwrap();
        assert_eq!(latest.collected_at, late.collected_at);
    }
}
