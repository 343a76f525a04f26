//! Continuous device scheduler.
//!
//! One independent worker task per active device, all sharing nothing but
//! the store and a watch-channel stop signal. Task claims serialize through
//! the store, so workers never race each other onto the same account. The
//! scheduler itself is a per-process singleton with `start`/`stop`/`status`,
//! driven by the process entry point and the dashboard API.

mod worker;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use roost_core::config::Config;
use roost_crypto::CredentialCodec;
use serde_json::json;

use crate::creation::CreationRunner;
use crate::events::{event_type, Category, EventSink, NewEvent, Severity};
use crate::session::SessionRunner;
use crate::storage::{with_retries, Database, DatabaseError};

use worker::Worker;

/// Sessions one device can fit in a day at the 45-minute cadence.
pub const SESSIONS_PER_DAY_TARGET: u64 = 24 * 60 / 45;

/// Grace period for workers to finish after the stop signal.
const STOP_GRACE: std::time::Duration = std::time::Duration::from_secs(30);

/// Live state of one device worker, for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub device_name: String,
    pub current_task: String,
    pub current_account: Option<String>,
    pub sessions_today: u64,
    pub last_session_at: Option<i64>,
    pub running: bool,
    pub error: Option<String>,
}

/// Scheduler status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub device_count: usize,
    pub workers: HashMap<String, WorkerStatus>,
    pub sessions_per_day_target: u64,
}

/// Outcome of a start/stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    /// Started with this many device workers.
    Started(usize),
    AlreadyRunning,
    Stopped,
    NotRunning,
}

struct SchedulerInner {
    shutdown_tx: Option<watch::Sender<bool>>,
    handles: Vec<JoinHandle<()>>,
}

/// The per-process scheduler singleton.
pub struct Scheduler {
    db: Database,
    events: EventSink,
    session_runner: Arc<SessionRunner>,
    creation_runner: Arc<CreationRunner>,
    config: Config,
    statuses: Arc<RwLock<HashMap<String, WorkerStatus>>>,
    inner: Mutex<SchedulerInner>,
}

impl Scheduler {
    pub fn new(
        db: Database,
        events: EventSink,
        codec: Arc<CredentialCodec>,
        config: Config,
    ) -> Self {
        let session_runner = Arc::new(SessionRunner::new(
            db.clone(),
            events.clone(),
            Arc::clone(&codec),
            config.budgets,
        ));
        let creation_runner = Arc::new(CreationRunner::new(
            db.clone(),
            events.clone(),
            codec,
            config.providers.clone(),
            config.budgets,
        ));
        Self {
            db,
            events,
            session_runner,
            creation_runner,
            config,
            statuses: Arc::new(RwLock::new(HashMap::new())),
            inner: Mutex::new(SchedulerInner {
                shutdown_tx: None,
                handles: Vec::new(),
            }),
        }
    }

    /// Spawn one worker per active device.
    pub async fn start(&self) -> Result<ControlOutcome, DatabaseError> {
        let mut inner = self.inner.lock().await;
        if inner.shutdown_tx.is_some() {
            return Ok(ControlOutcome::AlreadyRunning);
        }

        let devices = with_retries(|| self.db.active_devices()).await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        if devices.is_empty() {
            warn!("No active devices found");
            self.events
                .emit(NewEvent::new(
                    Category::Scheduler,
                    Severity::Warning,
                    event_type::NO_DEVICES,
                    "Scheduler started but no active devices found",
                ))
                .await;
        } else {
            self.events
                .emit(
                    NewEvent::new(
                        Category::Scheduler,
                        Severity::Info,
                        event_type::SCHEDULER_STARTED,
                        format!("Starting scheduler with {} devices", devices.len()),
                    )
                    .context(json!({"device_count": devices.len()})),
                )
                .await;
        }

        let started = devices.len();
        self.statuses.write().await.clear();

        for device in devices {
            let status = WorkerStatus {
                device_name: device.name.clone(),
                current_task: "starting".to_string(),
                current_account: None,
                sessions_today: 0,
                last_session_at: None,
                running: true,
                error: None,
            };
            self.statuses
                .write()
                .await
                .insert(device.id.clone(), status);

            let worker = Worker::new(
                device,
                self.db.clone(),
                self.events.clone(),
                Arc::clone(&self.session_runner),
                Arc::clone(&self.creation_runner),
                self.config.budgets,
                Arc::clone(&self.statuses),
                shutdown_rx.clone(),
            );
            inner.handles.push(tokio::spawn(worker.run()));
        }

        inner.shutdown_tx = Some(shutdown_tx);
        info!(workers = started, "Scheduler started");
        Ok(ControlOutcome::Started(started))
    }

    /// Signal all workers to stop and wait out the grace period.
    pub async fn stop(&self) -> ControlOutcome {
        let mut inner = self.inner.lock().await;
        let Some(shutdown_tx) = inner.shutdown_tx.take() else {
            return ControlOutcome::NotRunning;
        };

        info!("Stopping scheduler");
        self.events
            .emit(NewEvent::new(
                Category::Scheduler,
                Severity::Info,
                event_type::SCHEDULER_STOPPING,
                "Scheduler stop requested",
            ))
            .await;

        let _ = shutdown_tx.send(true);

        for handle in inner.handles.drain(..) {
            if tokio::time::timeout(STOP_GRACE, handle).await.is_err() {
                warn!("Worker did not stop within the grace period");
                self.events
                    .emit(NewEvent::new(
                        Category::Scheduler,
                        Severity::Error,
                        event_type::DEVICE_LOOP_ERROR,
                        "Worker hung during shutdown; abandoning task",
                    ))
                    .await;
            }
        }

        self.statuses.write().await.clear();
        self.events
            .emit(NewEvent::new(
                Category::Scheduler,
                Severity::Info,
                event_type::SCHEDULER_STOPPED,
                "Scheduler stopped",
            ))
            .await;
        info!("Scheduler stopped");
        ControlOutcome::Stopped
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.shutdown_tx.is_some()
    }

    /// Status snapshot for the dashboard.
    pub async fn status(&self) -> SchedulerStatus {
        let workers = self.statuses.read().await.clone();
        SchedulerStatus {
            running: self.is_running().await,
            device_count: workers.len(),
            workers,
            sessions_per_day_target: SESSIONS_PER_DAY_TARGET,
        }
    }
}
