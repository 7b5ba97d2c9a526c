//! PR-status manager.
//!
//! Owns the set of monitored tasks (task id -> pull request URL) and keeps
//! each task's PR status fresh. Refreshes happen on a periodic cadence while
//! running, on explicit `refresh_task` calls, and when the UI reports activity
//! on a task. Results leave the manager only as backend events:
//! `manager-started`, `manager-stopped`, `manager-error`, `pr-status-update`.
//!
//! Refreshes for different tasks run independently. For one task at most one
//! fetch is in flight; a refresh requested meanwhile is coalesced into a single
//! follow-up fetch, and the last applied status wins.

mod github;
pub mod registry;
mod status;

pub use github::{GitHubPrFetcher, GitHubPull, PrRef, parse_pr_url};
pub use status::{AddOutcome, MonitoredTask, PrStatus, PrStatusFetcher, RefreshOutcome};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::errors::ManagerError;
use crate::ipc::{BackendEvent, EventSink};

struct TaskEntry {
    pr_url: String,
    pr: PrRef,
    status: Option<PrStatus>,
    last_refreshed: Option<DateTime<Utc>>,
    /// Changes whenever the entry is (re)created; stale fetches compare against it.
    generation: u64,
    in_flight: bool,
    dirty: bool,
}

struct Inner {
    fetcher: Arc<dyn PrStatusFetcher>,
    poll_interval: Duration,
    sink: EventSink,
    tasks: Mutex<HashMap<String, TaskEntry>>,
    next_generation: AtomicU64,
    /// `Some` while the poll loop runs.
    poll_token: Mutex<Option<CancellationToken>>,
}

/// Handle to the PR-status manager. Clones share the same task set.
#[derive(Clone)]
pub struct PrManager {
    inner: Arc<Inner>,
}

impl PrManager {
    pub fn new(fetcher: Arc<dyn PrStatusFetcher>, poll_interval: Duration, sink: EventSink) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                poll_interval,
                sink,
                tasks: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                poll_token: Mutex::new(None),
            }),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, TaskEntry>> {
        self.inner.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn poll_token(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.inner.poll_token.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Begin periodic refreshing. Idempotent; returns whether the manager is running.
    ///
    /// Fails (returning `false` and emitting `manager-error`) only when called
    /// outside a tokio runtime.
    pub fn start(&self) -> bool {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                let error = ManagerError::NoRuntime.to_string();
                tracing::error!(%error, "Manager failed to start");
                self.inner.sink.emit(BackendEvent::ManagerError {
                    error,
                    task_id: None,
                });
                return false;
            }
        };

        let mut slot = self.poll_token();
        if slot.is_some() {
            return true;
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        drop(slot);

        handle.spawn(self.clone().poll_loop(token));
        tracing::info!(
            interval_secs = self.inner.poll_interval.as_secs(),
            "PR manager started"
        );
        self.inner.sink.emit(BackendEvent::ManagerStarted);
        true
    }

    /// Halt periodic refreshing. Idempotent. Fetches already in flight still complete.
    pub fn stop(&self) {
        let token = self.poll_token().take();
        if let Some(token) = token {
            token.cancel();
            tracing::info!("PR manager stopped");
            self.inner.sink.emit(BackendEvent::ManagerStopped);
        }
    }

    pub fn is_running(&self) -> bool {
        self.poll_token().is_some()
    }

    /// Monitor `task_id`'s pull request.
    ///
    /// Re-adding the same URL changes nothing. A different URL replaces the
    /// entry: its status is cleared and any fetch still running for the old URL
    /// is discarded when it lands.
    pub fn add_task(&self, task_id: &str, pr_url: &str) -> Result<AddOutcome, ManagerError> {
        if task_id.trim().is_empty() {
            return Err(ManagerError::EmptyTaskId);
        }
        let pr = parse_pr_url(pr_url).ok_or_else(|| ManagerError::InvalidPrUrl(pr_url.to_string()))?;

        let outcome = {
            let mut tasks = self.tasks();
            let outcome = match tasks.get(task_id) {
                Some(existing) if existing.pr_url == pr_url => return Ok(AddOutcome::Unchanged),
                Some(_) => AddOutcome::Replaced,
                None => AddOutcome::Added,
            };
            tasks.insert(
                task_id.to_string(),
                TaskEntry {
                    pr_url: pr_url.to_string(),
                    pr,
                    status: None,
                    last_refreshed: None,
                    generation: self.inner.next_generation.fetch_add(1, Ordering::Relaxed),
                    in_flight: false,
                    dirty: false,
                },
            );
            outcome
        };

        tracing::info!(task_id, pr_url, outcome = ?outcome, "Monitoring task");
        if self.is_running() {
            self.spawn_refresh(task_id);
        }
        Ok(outcome)
    }

    /// Stop monitoring `task_id`. Returns whether it was monitored.
    pub fn remove_task(&self, task_id: &str) -> bool {
        let removed = self.tasks().remove(task_id).is_some();
        if removed {
            tracing::info!(task_id, "Stopped monitoring task");
        }
        removed
    }

    /// Fetch `task_id`'s status now and emit it.
    ///
    /// If a fetch is already running for the task, the request is folded into
    /// one follow-up fetch performed by that worker, and this call returns
    /// [`RefreshOutcome::Coalesced`] immediately.
    pub async fn refresh_task(&self, task_id: &str) -> Result<RefreshOutcome, ManagerError> {
        let (generation, pr) = {
            let mut tasks = self.tasks();
            let entry = tasks
                .get_mut(task_id)
                .ok_or_else(|| ManagerError::TaskNotMonitored(task_id.to_string()))?;
            if entry.in_flight {
                entry.dirty = true;
                tracing::debug!(task_id, "Refresh coalesced into in-flight fetch");
                return Ok(RefreshOutcome::Coalesced);
            }
            entry.in_flight = true;
            entry.dirty = false;
            (entry.generation, entry.pr.clone())
        };

        let mut guard = InFlightGuard {
            manager: self,
            task_id,
            generation,
            armed: true,
        };

        loop {
            let fetched = self.inner.fetcher.fetch(&pr).await;

            let mut tasks = self.tasks();
            let entry = match tasks.get_mut(task_id) {
                Some(entry) if entry.generation == generation => entry,
                _ => {
                    guard.armed = false;
                    tracing::debug!(task_id, pr = %pr, "Discarding status for removed or replaced task");
                    return Ok(RefreshOutcome::Discarded);
                }
            };

            let again = entry.dirty;
            entry.dirty = false;
            if !again {
                entry.in_flight = false;
                guard.armed = false;
            }

            // Emitted under the lock so events for one task keep their order.
            let result = match fetched {
                Ok(status) => {
                    entry.status = Some(status.clone());
                    entry.last_refreshed = Some(Utc::now());
                    tracing::debug!(task_id, pr = %pr, "PR status refreshed");
                    self.inner.sink.emit(BackendEvent::PrStatusUpdate {
                        task_id: task_id.to_string(),
                        pr_status: status,
                    });
                    Ok(RefreshOutcome::Refreshed)
                }
                Err(e) => {
                    let err = ManagerError::Fetch {
                        task_id: task_id.to_string(),
                        message: format!("{:#}", e),
                    };
                    tracing::warn!(task_id, pr = %pr, error = %err, "PR status fetch failed");
                    self.inner.sink.emit(BackendEvent::ManagerError {
                        error: err.to_string(),
                        task_id: Some(task_id.to_string()),
                    });
                    Err(err)
                }
            };

            if !again {
                return result;
            }
        }
    }

    /// The UI saw activity on `task_id`; refresh it in the background.
    /// Unmonitored ids are ignored.
    pub fn notify_activity(&self, task_id: &str) {
        if !self.tasks().contains_key(task_id) {
            tracing::debug!(task_id, "Activity on unmonitored task ignored");
            return;
        }
        self.spawn_refresh(task_id);
    }

    /// Snapshot of the monitored set, ordered by task id.
    pub fn list_tasks(&self) -> Vec<MonitoredTask> {
        let tasks = self.tasks();
        let mut list: Vec<MonitoredTask> = tasks
            .iter()
            .map(|(id, entry)| MonitoredTask {
                task_id: id.clone(),
                pr_url: entry.pr_url.clone(),
                pr_status: entry.status.clone(),
                last_refreshed: entry.last_refreshed,
            })
            .collect();
        list.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        list
    }

    pub fn task(&self, task_id: &str) -> Option<MonitoredTask> {
        self.tasks().get(task_id).map(|entry| MonitoredTask {
            task_id: task_id.to_string(),
            pr_url: entry.pr_url.clone(),
            pr_status: entry.status.clone(),
            last_refreshed: entry.last_refreshed,
        })
    }

    fn spawn_refresh(&self, task_id: &str) {
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!(task_id, "No runtime available for background refresh");
            return;
        };
        let manager = self.clone();
        let task_id = task_id.to_string();
        handle.spawn(async move {
            // Failures were already reported as events.
            let _ = manager.refresh_task(&task_id).await;
        });
    }

    fn refresh_all(&self) {
        let ids: Vec<String> = self.tasks().keys().cloned().collect();
        tracing::debug!(count = ids.len(), "Periodic PR refresh");
        for id in ids {
            self.spawn_refresh(&id);
        }
    }

    async fn poll_loop(self, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.inner.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => self.refresh_all(),
            }
        }
    }
}

/// Clears `in_flight` if a refresh is dropped before it finishes.
struct InFlightGuard<'a> {
    manager: &'a PrManager,
    task_id: &'a str,
    generation: u64,
    armed: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(entry) = self.manager.tasks().get_mut(self.task_id) {
            if entry.generation == self.generation {
                entry.in_flight = false;
                entry.dirty = false;
            }
        }
    }
}
