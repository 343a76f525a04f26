//! Event ingestion and query surface.

use roost_core::db::unix_timestamp;
use serde_json::Value;
use tracing::warn;

use crate::storage::{Database, DatabaseError, SystemEvent};

use super::types::{Category, Severity};

/// Default and maximum LIMIT for event queries.
const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

/// A not-yet-inserted event.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub category: Category,
    pub severity: Severity,
    pub event_type: &'static str,
    pub message: String,
    pub device_id: Option<String>,
    pub account_id: Option<String>,
    pub context: Value,
}

impl NewEvent {
    pub fn new(
        category: Category,
        severity: Severity,
        event_type: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            severity,
            event_type,
            message: message.into(),
            device_id: None,
            account_id: None,
            context: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

/// Filters for the event query surface.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub severity: Option<String>,
    pub category: Option<String>,
    pub event_type: Option<String>,
    pub device_id: Option<String>,
    pub account_id: Option<String>,
    pub resolved: Option<bool>,
    pub after_id: Option<i64>,
    pub limit: Option<i64>,
}

/// Shared handle for emitting and querying events.
#[derive(Clone)]
pub struct EventSink {
    db: Database,
}

impl EventSink {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert one event row. Returns the event id, or None when the write
    /// failed (the failure goes to the tracing sink, never to the caller).
    pub async fn emit(&self, event: NewEvent) -> Option<i64> {
        let context = event.context.to_string();
        let result: Result<(i64,), sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO system_events
                (timestamp, category, severity, event_type, device_id, account_id,
                 message, context)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(unix_timestamp())
        .bind(event.category.as_str())
        .bind(event.severity.as_str())
        .bind(event.event_type)
        .bind(&event.device_id)
        .bind(&event.account_id)
        .bind(&event.message)
        .bind(&context)
        .fetch_one(self.db.pool())
        .await;

        match result {
            Ok((id,)) => {
                tracing::info!(
                    category = event.category.as_str(),
                    event_type = event.event_type,
                    severity = event.severity.as_str(),
                    "{}",
                    event.message
                );
                Some(id)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    category = event.category.as_str(),
                    event_type = event.event_type,
                    "Failed to emit event"
                );
                None
            }
        }
    }

    /// Flexible event query, newest first.
    pub async fn query(&self, filter: &EventFilter) -> Result<Vec<SystemEvent>, DatabaseError> {
        let limit = filter.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        let mut qb =
            sqlx::QueryBuilder::<sqlx::Sqlite>::new("SELECT * FROM system_events WHERE 1 = 1");
        if let Some(severity) = &filter.severity {
            qb.push(" AND severity = ").push_bind(severity);
        }
        if let Some(category) = &filter.category {
            qb.push(" AND category = ").push_bind(category);
        }
        if let Some(event_type) = &filter.event_type {
            qb.push(" AND event_type = ").push_bind(event_type);
        }
        if let Some(device_id) = &filter.device_id {
            qb.push(" AND device_id = ").push_bind(device_id);
        }
        if let Some(account_id) = &filter.account_id {
            qb.push(" AND account_id = ").push_bind(account_id);
        }
        if let Some(resolved) = filter.resolved {
            qb.push(" AND resolved = ").push_bind(resolved);
        }
        if let Some(after_id) = filter.after_id {
            qb.push(" AND id > ").push_bind(after_id);
        }
        qb.push(" ORDER BY id DESC LIMIT ").push_bind(limit);

        let events = qb
            .build_query_as::<SystemEvent>()
            .fetch_all(self.db.pool())
            .await?;
        Ok(events)
    }

    /// Unresolved events, newest first.
    pub async fn unresolved(
        &self,
        severity: Option<String>,
        category: Option<String>,
        limit: Option<i64>,
    ) -> Result<Vec<SystemEvent>, DatabaseError> {
        self.query(&EventFilter {
            severity,
            category,
            resolved: Some(false),
            limit: Some(limit.unwrap_or(50)),
            ..EventFilter::default()
        })
        .await
    }

    /// Events strictly after an id, oldest first (SSE tailing).
    pub async fn events_after(
        &self,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<SystemEvent>, DatabaseError> {
        let events = sqlx::query_as::<_, SystemEvent>(
            "SELECT * FROM system_events WHERE id > ? ORDER BY id ASC LIMIT ?",
        )
        .bind(after_id)
        .bind(limit.clamp(1, MAX_LIMIT))
        .fetch_all(self.db.pool())
        .await?;
        Ok(events)
    }

    /// Mark an event as resolved. Returns false when the id does not exist.
    pub async fn resolve(&self, event_id: i64, resolved_by: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE system_events SET resolved = 1, resolved_by = ?, resolved_at = ? WHERE id = ?",
        )
        .bind(resolved_by)
        .bind(unix_timestamp())
        .bind(event_id)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count of unresolved error/critical events, for the overview.
    pub async fn unresolved_error_count(&self) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM system_events \
             WHERE resolved = 0 AND severity IN ('error', 'critical')",
        )
        .fetch_one(self.db.pool())
        .await?;
        Ok(row.0)
    }

    /// Completed warming sessions since a timestamp (overview metric).
    pub async fn sessions_since(&self, since: i64) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM system_events \
             WHERE event_type = 'warming_complete' AND timestamp >= ?",
        )
        .bind(since)
        .fetch_one(self.db.pool())
        .await?;
        Ok(row.0)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::events::event_type;

    async fn sink() -> EventSink {
        EventSink::new(Database::open_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn emit_returns_monotonic_ids() {
        let sink = sink().await;
        let mut last = 0;
        for i in 0..10 {
            let id = sink
                .emit(NewEvent::new(
                    Category::Scheduler,
                    Severity::Info,
                    event_type::WARMING_STARTED,
                    format!("event {i}"),
                ))
                .await
                .unwrap();
            assert!(id > last, "ids must be strictly increasing");
            last = id;
        }
    }

    #[tokio::test]
    async fn query_filters_by_severity_and_category() {
        let sink = sink().await;
        sink.emit(NewEvent::new(
            Category::Scheduler,
            Severity::Info,
            event_type::WARMING_COMPLETE,
            "ok",
        ))
        .await;
        sink.emit(NewEvent::new(
            Category::Device,
            Severity::Critical,
            event_type::DEVICE_DISCONNECTED,
            "gone",
        ))
        .await;

        let critical = sink
            .query(&EventFilter {
                severity: Some("critical".into()),
                ..EventFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].event_type, "device_disconnected");

        let scheduler = sink
            .query(&EventFilter {
                category: Some("scheduler".into()),
                ..EventFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(scheduler.len(), 1);
    }

    #[tokio::test]
    async fn query_cursor_and_limit() {
        let sink = sink().await;
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(
                sink.emit(NewEvent::new(
                    Category::Scheduler,
                    Severity::Info,
                    event_type::WARMING_STARTED,
                    "e",
                ))
                .await
                .unwrap(),
            );
        }

        let after = sink
            .query(&EventFilter {
                after_id: Some(ids[2]),
                ..EventFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(after.len(), 2);

        let limited = sink
            .query(&EventFilter {
                limit: Some(2),
                ..EventFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);

        // Limit clamps to the 1000 cap rather than erroring
        let clamped = sink
            .query(&EventFilter {
                limit: Some(10_000),
                ..EventFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(clamped.len(), 5);
    }

    #[tokio::test]
    async fn events_after_is_oldest_first() {
        let sink = sink().await;
        for i in 0..3 {
            sink.emit(NewEvent::new(
                Category::Scheduler,
                Severity::Info,
                event_type::WARMING_STARTED,
                format!("e{i}"),
            ))
            .await;
        }
        let tail = sink.events_after(0, 20).await.unwrap();
        assert_eq!(tail.len(), 3);
        assert!(tail.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn resolve_sets_fields_once() {
        let sink = sink().await;
        let id = sink
            .emit(
                NewEvent::new(
                    Category::Device,
                    Severity::Error,
                    event_type::INSTALL_FAILED,
                    "boom",
                )
                .context(json!({"platform": "tiktok"})),
            )
            .await
            .unwrap();

        assert!(sink.resolve(id, "operator").await.unwrap());
        assert!(!sink.resolve(9_999, "operator").await.unwrap());

        let events = sink
            .query(&EventFilter {
                resolved: Some(true),
                ..EventFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert!(e.resolved);
        assert_eq!(e.resolved_by.as_deref(), Some("operator"));
        assert!(e.resolved_at.is_some(), "resolved_at set iff resolved");

        let unresolved = sink.unresolved(None, None, None).await.unwrap();
        assert!(unresolved.is_empty());
    }

    #[tokio::test]
    async fn context_payload_roundtrips_as_json() {
        let sink = sink().await;
        sink.emit(
            NewEvent::new(
                Category::Scheduler,
                Severity::Info,
                event_type::WARMING_COMPLETE,
                "done",
            )
            .context(json!({"phase": "PASSIVE", "warming_day": 1})),
        )
        .await
        .unwrap();

        let events = sink.query(&EventFilter::default()).await.unwrap();
        let ctx: serde_json::Value = serde_json::from_str(&events[0].context).unwrap();
        assert_eq!(ctx["phase"], "PASSIVE");
        assert_eq!(ctx["warming_day"], 1);
    }

    #[tokio::test]
    async fn unresolved_error_count_ignores_info() {
        let sink = sink().await;
        sink.emit(NewEvent::new(
            Category::Scheduler,
            Severity::Info,
            event_type::WARMING_COMPLETE,
            "fine",
        ))
        .await;
        sink.emit(NewEvent::new(
            Category::Account,
            Severity::Error,
            event_type::LOGIN_FAILED,
            "bad",
        ))
        .await;
        assert_eq!(sink.unresolved_error_count().await.unwrap(), 1);
    }
}
