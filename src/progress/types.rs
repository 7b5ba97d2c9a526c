//! Progress event types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marker that introduces a progress payload on a runner stdout line.
pub const PROGRESS_PREFIX: &str = "CLAUDE_MD_PROGRESS:";

/// A structured status update emitted mid-invocation by a runner.
///
/// Constructed per parsed output line, forwarded once, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Short identifier of the pipeline stage (e.g. `"analyzing"`).
    pub phase: String,
    /// Human-readable description of what the runner is doing.
    pub message: String,
    /// Progress in the range 0-100.
    pub percent: u8,
}

impl ProgressEvent {
    pub fn new(phase: impl Into<String>, message: impl Into<String>, percent: u8) -> Self {
        Self {
            phase: phase.into(),
            message: message.into(),
            percent: percent.min(100),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.percent >= 100
    }
}

/// Why a marker line could not be turned into a [`ProgressEvent`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProgressDecodeError {
    #[error("progress payload is empty")]
    Empty,

    #[error("progress payload is not valid JSON: {0}")]
    Json(String),

    #[error("progress payload has an empty phase")]
    MissingPhase,

    #[error("progress percent {0} is not a finite number")]
    InvalidPercent(f64),
}

/// Wire shape of the payload. Runners are loose about numeric types, so percent
/// is read as a float and normalised afterwards.
#[derive(Debug, Deserialize)]
pub(crate) struct RawProgress {
    pub phase: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub percent: f64,
}

impl TryFrom<RawProgress> for ProgressEvent {
    type Error = ProgressDecodeError;

    fn try_from(raw: RawProgress) -> Result<Self, Self::Error> {
        let phase = raw.phase.trim();
        if phase.is_empty() {
            return Err(ProgressDecodeError::MissingPhase);
        }
        if !raw.percent.is_finite() {
            return Err(ProgressDecodeError::InvalidPercent(raw.percent));
        }
        let percent = raw.percent.round().clamp(0.0, 100.0) as u8;
        Ok(ProgressEvent {
            phase: phase.to_string(),
            message: raw.message,
            percent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps_percent() {
        let event = ProgressEvent::new("done", "All finished", 150);
        assert_eq!(event.percent, 100);
        assert!(event.is_complete());
    }

    #[test]
    fn test_raw_progress_rounds_fractional_percent() {
        let raw = RawProgress {
            phase: "writing".into(),
            message: "Writing CLAUDE.md".into(),
            percent: 66.6,
        };
        let event = ProgressEvent::try_from(raw).unwrap();
        assert_eq!(event.percent, 67);
    }

    #[test]
    fn test_raw_progress_clamps_negative_percent() {
        let raw = RawProgress {
            phase: "start".into(),
            message: String::new(),
            percent: -5.0,
        };
        assert_eq!(ProgressEvent::try_from(raw).unwrap().percent, 0);
    }

    #[test]
    fn test_raw_progress_rejects_blank_phase() {
        let raw = RawProgress {
            phase: "   ".into(),
            message: "x".into(),
            percent: 10.0,
        };
        assert_eq!(
            ProgressEvent::try_from(raw),
            Err(ProgressDecodeError::MissingPhase)
        );
    }

    #[test]
    fn test_progress_event_serializes_flat() {
        let json = serde_json::to_string(&ProgressEvent::new("analyzing", "Scanning", 40)).unwrap();
        assert_eq!(
            json,
            r#"{"phase":"analyzing","message":"Scanning","percent":40}"#
        );
    }
}
