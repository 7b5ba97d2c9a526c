use std::fmt;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::status::{PrStatus, PrStatusFetcher};
use crate::config::DEFAULT_API_BASE;

const GITHUB_HOST: &str = "github.com";
const USER_AGENT: &str = "taskdeck";

/// A pull request reference parsed from its web URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrRef {
    pub host: String,
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl fmt::Display for PrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// Parse `https://<host>/<owner>/<repo>/pull/<number>`.
///
/// Trailing segments (`/files`, `/commits`), a query string, and a fragment
/// are ignored. `http://` is accepted for local mirrors.
pub fn parse_pr_url(url: &str) -> Option<PrRef> {
    let rest = url
        .trim()
        .strip_prefix("https://")
        .or_else(|| url.trim().strip_prefix("http://"))?;
    let rest = rest.split(['?', '#']).next()?;

    let mut parts = rest.split('/');
    let host = parts.next().filter(|h| !h.is_empty())?;
    let owner = parts.next().filter(|s| !s.is_empty())?;
    let repo = parts.next().filter(|s| !s.is_empty())?;
    if parts.next()? != "pull" {
        return None;
    }
    let number: u64 = parts.next()?.parse().ok()?;
    if number == 0 {
        return None;
    }

    Some(PrRef {
        host: host.to_string(),
        owner: owner.to_string(),
        repo: repo.to_string(),
        number,
    })
}

/// A GitHub pull request (subset of fields).
#[derive(Debug, Deserialize)]
pub struct GitHubPull {
    pub number: u64,
    pub state: String,
    pub title: String,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub draft: bool,
    pub mergeable_state: Option<String>,
    pub html_url: Option<String>,
    pub updated_at: Option<String>,
    pub head: GitHubHead,
}

#[derive(Debug, Deserialize)]
pub struct GitHubHead {
    pub sha: String,
}

impl GitHubPull {
    /// Snapshot forwarded to the UI.
    pub fn snapshot(&self) -> PrStatus {
        let status = if self.merged {
            "merged"
        } else if self.state == "open" && self.draft {
            "draft"
        } else {
            self.state.as_str()
        };
        serde_json::json!({
            "number": self.number,
            "status": status,
            "state": self.state,
            "merged": self.merged,
            "draft": self.draft,
            "mergeable_state": self.mergeable_state,
            "title": self.title,
            "head_sha": self.head.sha,
            "url": self.html_url,
            "updated_at": self.updated_at,
        })
    }
}

/// Fetches PR status from the GitHub REST API.
#[derive(Clone)]
pub struct GitHubPrFetcher {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GitHubPrFetcher {
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }

    /// API endpoint for `pr`. Hosts other than github.com are treated as
    /// GitHub Enterprise (`https://<host>/api/v3`) unless a custom base is set.
    pub fn pull_url(&self, pr: &PrRef) -> String {
        let base = if pr.host == GITHUB_HOST || self.api_base != DEFAULT_API_BASE {
            self.api_base.clone()
        } else {
            format!("https://{}/api/v3", pr.host)
        };
        format!("{}/repos/{}/{}/pulls/{}", base, pr.owner, pr.repo, pr.number)
    }
}

#[async_trait]
impl PrStatusFetcher for GitHubPrFetcher {
    async fn fetch(&self, pr: &PrRef) -> anyhow::Result<PrStatus> {
        let mut request = self
            .client
            .get(self.pull_url(pr))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let pull = request
            .send()
            .await
            .with_context(|| format!("Failed to send PR request for {}", pr))?
            .error_for_status()
            .with_context(|| format!("GitHub returned error status for {}", pr))?
            .json::<GitHubPull>()
            .await
            .with_context(|| format!("Failed to parse PR response for {}", pr))?;
        Ok(pull.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_pr_url() {
        let pr = parse_pr_url("https://github.com/owner/repo/pull/42").unwrap();
        assert_eq!(
            pr,
            PrRef {
                host: "github.com".into(),
                owner: "owner".into(),
                repo: "repo".into(),
                number: 42,
            }
        );
        assert_eq!(pr.to_string(), "owner/repo#42");
    }

    #[test]
    fn test_parse_pr_url_any_host() {
        let pr = parse_pr_url("https://host/owner/repo/pull/42").unwrap();
        assert_eq!(pr.host, "host");
        assert_eq!(pr.number, 42);
    }

    #[test]
    fn test_parse_pr_url_with_trailing_segments() {
        let pr = parse_pr_url("https://github.com/o/r/pull/7/files?diff=split#top").unwrap();
        assert_eq!(pr.number, 7);
        assert_eq!(pr.repo, "r");
    }

    #[test]
    fn test_parse_rejects_non_pr_urls() {
        assert!(parse_pr_url("").is_none());
        assert!(parse_pr_url("https://github.com/o/r").is_none());
        assert!(parse_pr_url("https://github.com/o/r/issues/3").is_none());
        assert!(parse_pr_url("https://github.com/o/r/pull/abc").is_none());
        assert!(parse_pr_url("https://github.com/o/r/pull/0").is_none());
        assert!(parse_pr_url("git@github.com:o/r.git").is_none());
        assert!(parse_pr_url("https:///o/r/pull/1").is_none());
    }

    #[test]
    fn test_pull_url_for_github_and_enterprise() {
        let fetcher = GitHubPrFetcher::new(DEFAULT_API_BASE, None);
        let pr = parse_pr_url("https://github.com/o/r/pull/5").unwrap();
        assert_eq!(fetcher.pull_url(&pr), "https://api.github.com/repos/o/r/pulls/5");

        let pr = parse_pr_url("https://git.corp.example/o/r/pull/5").unwrap();
        assert_eq!(
            fetcher.pull_url(&pr),
            "https://git.corp.example/api/v3/repos/o/r/pulls/5"
        );

        let custom = GitHubPrFetcher::new("http://127.0.0.1:9000/", None);
        assert_eq!(custom.pull_url(&pr), "http://127.0.0.1:9000/repos/o/r/pulls/5");
    }

    #[test]
    fn test_blank_token_is_dropped() {
        let fetcher = GitHubPrFetcher::new(DEFAULT_API_BASE, Some("  ".into()));
        assert!(fetcher.token.is_none());
    }

    #[test]
    fn test_pull_snapshot() {
        let json = r#"{
            "number": 42,
            "state": "open",
            "title": "Add relay",
            "merged": false,
            "draft": true,
            "mergeable_state": "clean",
            "html_url": "https://github.com/o/r/pull/42",
            "updated_at": "2026-01-02T03:04:05Z",
            "head": {"sha": "abc123", "ref": "feature"}
        }"#;
        let pull: GitHubPull = serde_json::from_str(json).unwrap();
        let snapshot = pull.snapshot();
        assert_eq!(snapshot["status"], "draft");
        assert_eq!(snapshot["head_sha"], "abc123");
        assert_eq!(snapshot["mergeable_state"], "clean");
    }

    #[test]
    fn test_merged_pull_snapshot() {
        let json = r#"{
            "number": 1, "state": "closed", "title": "t", "merged": true,
            "mergeable_state": null, "head": {"sha": "s"}
        }"#;
        let pull: GitHubPull = serde_json::from_str(json).unwrap();
        assert_eq!(pull.snapshot()["status"], "merged");
        assert!(pull.snapshot()["updated_at"].is_null());
    }
}
