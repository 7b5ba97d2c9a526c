use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::github::PrRef;

/// Last known status of a pull request.
///
/// The shape belongs to the PR host; the manager only stores and forwards it.
pub type PrStatus = serde_json::Value;

/// Fetches the current status of one pull request.
///
/// Real implementation: [`GitHubPrFetcher`](super::GitHubPrFetcher). Tests
/// substitute canned or gated fetchers.
#[async_trait]
pub trait PrStatusFetcher: Send + Sync {
    async fn fetch(&self, pr: &PrRef) -> anyhow::Result<PrStatus>;
}

/// A task whose pull request is being monitored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredTask {
    pub task_id: String,
    pub pr_url: String,
    #[serde(default)]
    pub pr_status: Option<PrStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refreshed: Option<DateTime<Utc>>,
}

/// What `add_task` did with an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOutcome {
    Added,
    /// Already monitored with the same URL.
    Unchanged,
    /// Already monitored with a different URL; the old entry and its status are gone.
    Replaced,
}

/// What `refresh_task` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// A fresh status was applied and emitted.
    Refreshed,
    /// A refresh was already running; it will fetch once more before finishing.
    Coalesced,
    /// The task was removed or replaced while fetching; the result was dropped.
    Discarded,
}
