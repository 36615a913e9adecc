use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{DomainError, ErrorClass};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub class: ErrorClass,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSnapshot {
    pub counts: BTreeMap<ErrorClass, u64>,
    pub last_error: Option<ErrorRecord>,
}

impl ErrorSnapshot {
    pub fn count(&self, class: ErrorClass) -> u64 {
        self.counts.get(&class).copied().unwrap_or(0)
    }
}

/// Per-class error counters shared by every component and read by the health surface
#[derive(Debug, Default)]
pub struct ErrorTracker {
    inner: Mutex<ErrorSnapshot>,
}

impl ErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, class: ErrorClass, message: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *inner.counts.entry(class).or_insert(0) += 1;
        inner.last_error = Some(ErrorRecord {
            class,
            message: message.into(),
            at: Utc::now(),
        });
    }

    pub fn record_error(&self, error: &DomainError) {
        self.record(error.class(), error.to_string());
    }

    pub fn snapshot(&self) -> ErrorSnapshot {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkWriteError;

    #[test]
    fn test_counts_per_class_and_last_error() {
        let tracker = ErrorTracker::new();
        tracker.record_error(&DomainError::Transport("redis down".into()));
        tracker.record_error(&DomainError::Transport("redis still down".into()));
        tracker.record_error(&SinkWriteError::Permanent("400".into()).into());

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.count(ErrorClass::Transport), 2);
        assert_eq!(snapshot.count(ErrorClass::SinkPermanent), 1);
        assert_eq!(snapshot.count(ErrorClass::Validation), 0);
        let last = snapshot.last_error.unwrap();
        assert_eq!(last.class, ErrorClass::SinkPermanent);
        assert!(last.message.contains("400"));
    }

    #[test]
    fn test_snapshot_serializes_class_keys() {
        let tracker = ErrorTracker::new();
        tracker.record(ErrorClass::Configuration, "bad document");
        let json = serde_json::to_value(tracker.snapshot()).unwrap();
        assert_eq!(json["counts"]["configuration"], 1);
        assert_eq!(json["lastError"]["class"], "configuration");
    }
}
