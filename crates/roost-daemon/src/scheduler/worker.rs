//! Per-device worker loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use roost_core::config::SessionBudgets;
use roost_core::db::unix_timestamp;
use serde_json::json;
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};

use crate::agent::AgentClient;
use crate::creation::CreationRunner;
use crate::events::{event_type, Category, EventSink, NewEvent, Severity};
use crate::session::{SessionOutcome, SessionRunner};
use crate::storage::{with_retries, Account, Database, Device, DeviceStatus};

use super::WorkerStatus;

/// Health-probe failures before a disconnect escalates to critical.
const DISCONNECT_CRITICAL_AFTER: u32 = 3;

/// One device's scheduler loop. Owns nothing shared except the store handle,
/// the status map entry, and the stop signal.
pub(crate) struct Worker {
    device: Device,
    db: Database,
    events: EventSink,
    session_runner: Arc<SessionRunner>,
    creation_runner: Arc<CreationRunner>,
    budgets: SessionBudgets,
    statuses: Arc<RwLock<HashMap<String, WorkerStatus>>>,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: Device,
        db: Database,
        events: EventSink,
        session_runner: Arc<SessionRunner>,
        creation_runner: Arc<CreationRunner>,
        budgets: SessionBudgets,
        statuses: Arc<RwLock<HashMap<String, WorkerStatus>>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            device,
            db,
            events,
            session_runner,
            creation_runner,
            budgets,
            statuses,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        info!(
            device = %self.device.name,
            agent = %self.device.agent_url(),
            "Device loop started"
        );

        let agent = match AgentClient::new(self.device.agent_url()) {
            Ok(agent) => agent,
            Err(e) => {
                error!(device = %self.device.name, error = %e, "Could not build agent client");
                self.set_task("failed", Some(e.to_string())).await;
                return;
            }
        };

        let mut backoff = Duration::from_secs(self.budgets.agent_backoff_secs);
        let backoff_cap = Duration::from_secs(self.budgets.agent_backoff_max_secs);
        let mut probe_failures: u32 = 0;

        while !self.stopped() {
            if let Err(e) = self.iteration(&agent, &mut backoff, backoff_cap, &mut probe_failures).await {
                // One bad iteration never kills the worker
                error!(device = %self.device.name, error = %e, "Error in device loop");
                self.set_task("error", Some(e)).await;
                self.events
                    .emit(
                        NewEvent::new(
                            Category::Scheduler,
                            Severity::Error,
                            event_type::DEVICE_LOOP_ERROR,
                            format!("Unhandled error in {} loop", self.device.name),
                        )
                        .device(&self.device.id)
                        .context(json!({"device_name": self.device.name})),
                    )
                    .await;
                self.sleep(Duration::from_secs(60)).await;
            }
        }

        self.set_task("stopped", None).await;
        self.mark_stopped().await;
        info!(device = %self.device.name, "Device loop ended");
    }

    /// One pass of the loop: heartbeat, probe, claim, execute, cool down.
    /// String errors feed the failure-isolation path in `run`.
    async fn iteration(
        &mut self,
        agent: &AgentClient,
        backoff: &mut Duration,
        backoff_cap: Duration,
        probe_failures: &mut u32,
    ) -> Result<(), String> {
        if let Err(e) = self.db.touch_heartbeat(&self.device.id).await {
            return Err(format!("heartbeat failed: {e}"));
        }
        self.clear_error().await;

        // Agent must answer the health probe before any work
        self.set_task("waiting_for_agent", None).await;
        if !self.wait_for_agent(agent).await {
            *probe_failures += 1;
            let severity = if *probe_failures >= DISCONNECT_CRITICAL_AFTER {
                Severity::Critical
            } else {
                Severity::Warning
            };
            self.set_task("agent_unreachable", Some("agent not responding".into()))
                .await;
            self.events
                .emit(
                    NewEvent::new(
                        Category::Device,
                        severity,
                        event_type::DEVICE_DISCONNECTED,
                        format!("Automation agent not responding on {}", self.device.name),
                    )
                    .device(&self.device.id)
                    .context(json!({
                        "device_name": self.device.name,
                        "automation_port": self.device.automation_port,
                        "consecutive_failures": *probe_failures,
                    })),
                )
                .await;
            if let Err(e) = self
                .db
                .set_device_status(&self.device.id, DeviceStatus::Disconnected)
                .await
            {
                warn!(error = %e, "Could not mark device disconnected");
            }
            self.sleep(*backoff).await;
            *backoff = (*backoff * 2).min(backoff_cap);
            return Ok(());
        }
        *probe_failures = 0;
        *backoff = Duration::from_secs(self.budgets.agent_backoff_secs);

        // Claim the next task; store trouble retries then surfaces critical
        self.set_task("selecting_task", None).await;
        let now = unix_timestamp();
        let claimed =
            match with_retries(|| self.db.claim_warming_task(&self.device.id, now)).await {
                Ok(claimed) => claimed,
                Err(e) => {
                    self.events
                        .emit(
                            NewEvent::new(
                                Category::Scheduler,
                                Severity::Critical,
                                event_type::DEVICE_LOOP_ERROR,
                                format!("Task claim failed on {}: {e}", self.device.name),
                            )
                            .device(&self.device.id),
                        )
                        .await;
                    self.sleep(Duration::from_secs(60)).await;
                    return Ok(());
                }
            };

        match claimed {
            Some(account) => self.execute_warming(agent, account).await?,
            None => self.execute_creation(agent).await?,
        }

        self.bump_sessions().await;
        self.set_task("cooldown", None).await;
        self.sleep(self.budgets.cooldown()).await;
        Ok(())
    }

    async fn execute_warming(
        &mut self,
        agent: &AgentClient,
        account: Account,
    ) -> Result<(), String> {
        let label = format!("warming:{}/{}", account.platform, account.username);
        self.set_task(&label, None).await;
        self.set_account(Some(account.username.clone())).await;

        let driver = agent
            .create_session()
            .await
            .map_err(|e| format!("agent session failed: {e}"))?;

        let result = tokio::time::timeout(
            self.budgets.session_total(),
            self.session_runner
                .run(&driver, &self.device, &account, self.shutdown.clone()),
        )
        .await;

        match result {
            Ok(Ok(SessionOutcome::Completed {
                new_state,
                new_day_count,
                ..
            })) => {
                info!(
                    device = %self.device.name,
                    account = %account.username,
                    state = %new_state,
                    day = new_day_count,
                    "Warming session complete"
                );
            }
            Ok(Ok(SessionOutcome::Aborted(reason))) => {
                info!(
                    device = %self.device.name,
                    account = %account.username,
                    ?reason,
                    "Warming session aborted"
                );
            }
            Ok(Err(e)) => {
                warn!(
                    device = %self.device.name,
                    account = %account.username,
                    error = %e,
                    "Warming session errored"
                );
            }
            Err(_) => {
                // Hard deadline: the session never came back
                warn!(
                    device = %self.device.name,
                    account = %account.username,
                    "Session exceeded its hard deadline"
                );
                self.events
                    .emit(
                        NewEvent::new(
                            Category::Scheduler,
                            Severity::Error,
                            event_type::WARMING_FAILED,
                            format!(
                                "Session for {} exceeded the {}-minute deadline",
                                account.username,
                                self.budgets.session_total_secs / 60
                            ),
                        )
                        .device(&self.device.id)
                        .account(&account.id)
                        .context(json!({"reason": "session_deadline"})),
                    )
                    .await;
            }
        }

        driver.close().await;
        self.set_account(None).await;
        Ok(())
    }

    async fn execute_creation(&mut self, agent: &AgentClient) -> Result<(), String> {
        self.set_task("creating", None).await;

        let driver = agent
            .create_session()
            .await
            .map_err(|e| format!("agent session failed: {e}"))?;

        let result = tokio::time::timeout(
            self.budgets.session_total(),
            self.creation_runner
                .run(&driver, &self.device, self.shutdown.clone()),
        )
        .await;

        match result {
            Ok(Ok(Some(account))) => {
                info!(device = %self.device.name, username = %account.username, "Created account");
            }
            Ok(Ok(None)) => {
                // Skipped or failed; events already emitted. Idle a while so
                // an unconfigured fleet is not spinning on skip events.
                driver.close().await;
                self.set_task("idle", None).await;
                self.sleep(self.budgets.idle()).await;
                return Ok(());
            }
            Ok(Err(e)) => {
                warn!(device = %self.device.name, error = %e, "Creation run errored");
            }
            Err(_) => {
                warn!(device = %self.device.name, "Creation exceeded the session deadline");
            }
        }

        driver.close().await;
        Ok(())
    }

    async fn wait_for_agent(&mut self, agent: &AgentClient) -> bool {
        // A couple of quick probes; the backoff loop handles longer outages
        for _ in 0..3 {
            if agent.is_ready().await {
                return true;
            }
            if !self.sleep(Duration::from_secs(2)).await {
                return false;
            }
        }
        false
    }

    fn stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep that the stop signal can interrupt. Returns false when stopped.
    async fn sleep(&mut self, duration: Duration) -> bool {
        if self.stopped() {
            return false;
        }
        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return true,
                changed = self.shutdown.changed() => {
                    match changed {
                        Ok(()) => {
                            if *self.shutdown.borrow() {
                                return false;
                            }
                        }
                        Err(_) => {
                            sleep.as_mut().await;
                            return true;
                        }
                    }
                }
            }
        }
    }

    async fn set_task(&self, task: &str, error: Option<String>) {
        let mut statuses = self.statuses.write().await;
        if let Some(status) = statuses.get_mut(&self.device.id) {
            status.current_task = task.to_string();
            status.error = error;
        }
    }

    async fn clear_error(&self) {
        let mut statuses = self.statuses.write().await;
        if let Some(status) = statuses.get_mut(&self.device.id) {
            status.error = None;
        }
    }

    async fn set_account(&self, account: Option<String>) {
        let mut statuses = self.statuses.write().await;
        if let Some(status) = statuses.get_mut(&self.device.id) {
            status.current_account = account;
        }
    }

    async fn bump_sessions(&self) {
        let mut statuses = self.statuses.write().await;
        if let Some(status) = statuses.get_mut(&self.device.id) {
            status.sessions_today += 1;
            status.last_session_at = Some(unix_timestamp());
        }
    }

    async fn mark_stopped(&self) {
        let mut statuses = self.statuses.write().await;
        if let Some(status) = statuses.get_mut(&self.device.id) {
            status.running = false;
        }
    }
}
