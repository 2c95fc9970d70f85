//! Session event tracking
//!
//! Records session starts and ends per user and rebuilds the usage metrics
//! the dependency classifier scores. Metrics are recomputed from session
//! records on demand rather than incrementally maintained, so a restarted
//! process reaches the same numbers as a long-running one.

use chrono::{Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::persistence::StorageBackend;

/// How far back session history is considered for metrics
const METRICS_WINDOW_DAYS: i64 = 30;

/// One session, completed or in progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: String,
    /// Unix milliseconds
    pub started_at: i64,
    /// Unix milliseconds; None while the session is active
    pub ended_at: Option<i64>,
}

impl SessionRecord {
    /// Duration so far, in seconds
    pub fn duration_secs(&self, now: i64) -> u64 {
        let end = self.ended_at.unwrap_or(now);
        ((end - self.started_at).max(0) / 1000) as u64
    }
}

/// Usage metrics the dependency classifier scores
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyMetrics {
    /// Sessions started in the last 24 hours
    pub daily_sessions: u32,
    /// Sessions started in the last 7 days
    pub weekly_sessions: u32,
    /// Mean session length over the metrics window, in seconds
    pub avg_session_secs: u64,
    /// Consecutive calendar days (UTC) ending today with at least one session
    pub consecutive_days: u32,
    /// Total session time in the last 24 hours, in seconds
    pub daily_time_secs: u64,
    /// Sessions in the metrics window, for step-back cadence
    pub total_sessions: u64,
}

/// Compute metrics from a slice of session records. Pure; `now` is Unix ms.
pub fn compute_metrics(records: &[SessionRecord], now: i64) -> DependencyMetrics {
    let day_ago = now - Duration::days(1).num_milliseconds();
    let week_ago = now - Duration::days(7).num_milliseconds();

    let mut metrics = DependencyMetrics::default();
    let mut total_secs: u64 = 0;
    let mut active_days: HashSet<i32> = HashSet::new();

    for record in records {
        let duration = record.duration_secs(now);
        total_secs += duration;
        metrics.total_sessions += 1;

        if record.started_at >= day_ago {
            metrics.daily_sessions += 1;
            metrics.daily_time_secs += duration;
        }
        if record.started_at >= week_ago {
            metrics.weekly_sessions += 1;
        }
        if let Some(dt) = Utc.timestamp_millis_opt(record.started_at).single() {
            active_days.insert(dt.num_days_from_ce());
        }
    }

    if metrics.total_sessions > 0 {
        metrics.avg_session_secs = total_secs / metrics.total_sessions;
    }

    // Walk back day by day from today while each day saw a session
    if let Some(today) = Utc.timestamp_millis_opt(now).single() {
        let today = today.num_days_from_ce();
        let mut day = today;
        while active_days.contains(&day) && (today - day) < METRICS_WINDOW_DAYS as i32 {
            metrics.consecutive_days += 1;
            day -= 1;
        }
    }

    metrics
}

/// Tracks active sessions and serves usage metrics
pub struct SessionTracker {
    backend: Arc<dyn StorageBackend>,
    active: RwLock<HashMap<String, SessionRecord>>,
}

impl SessionTracker {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            active: RwLock::new(HashMap::new()),
        }
    }

    /// Begin a session. An already-active session for the user is closed
    /// first; abandoned sessions must not leak into the next one's duration.
    pub async fn start_session(&self, user_id: &str) -> Result<Uuid> {
        if self.active.read().await.contains_key(user_id) {
            self.end_session(user_id).await?;
        }

        let record = SessionRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            started_at: Utc::now().timestamp_millis(),
            ended_at: None,
        };

        if let Err(e) = self.backend.put_session(&record).await {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to persist session start");
        }

        let id = record.id;
        self.active.write().await.insert(user_id.to_string(), record);
        Ok(id)
    }

    /// Close the user's active session, if any
    pub async fn end_session(&self, user_id: &str) -> Result<Option<SessionRecord>> {
        let record = self.active.write().await.remove(user_id);
        let Some(mut record) = record else {
            return Ok(None);
        };

        record.ended_at = Some(Utc::now().timestamp_millis());
        self.backend
            .put_session(&record)
            .await
            .map_err(|e| Error::Session(format!("Failed to persist session end: {}", e)))?;
        Ok(Some(record))
    }

    /// Duration of the user's active session so far, in seconds
    pub async fn active_session_secs(&self, user_id: &str) -> Option<u64> {
        let active = self.active.read().await;
        active
            .get(user_id)
            .map(|r| r.duration_secs(Utc::now().timestamp_millis()))
    }

    /// Rebuild the user's usage metrics from persisted history plus any
    /// active session.
    pub async fn metrics(&self, user_id: &str) -> Result<DependencyMetrics> {
        let now = Utc::now().timestamp_millis();
        let since = now - Duration::days(METRICS_WINDOW_DAYS).num_milliseconds();

        let mut records = self
            .backend
            .list_sessions(user_id, since)
            .await
            .map_err(|e| Error::Session(format!("Failed to load session history: {}", e)))?;

        // The active session is already persisted by start_session, but the
        // backend may be behind; dedup by id.
        if let Some(active) = self.active.read().await.get(user_id) {
            if !records.iter().any(|r| r.id == active.id) {
                records.push(active.clone());
            }
        }

        Ok(compute_metrics(&records, now))
    }
}
