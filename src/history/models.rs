//! History data types persisted in the log store.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::status::Health;

/// One status sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// RFC 3339 timestamp.
    pub time: String,
    pub status: Health,
    /// Only present on endpoint-level entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

impl HistoryEntry {
    pub fn new(time: DateTime<Utc>, status: Health) -> Self {
        Self {
            time: time.to_rfc3339(),
            status,
            response_time_ms: None,
        }
    }

    pub fn with_response_time(mut self, ms: u64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }

    pub fn parsed_time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.time)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Chronological sequence of samples for a service or endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistorySeries(Vec<HistoryEntry>);

impl HistorySeries {
    /// Append at the tail. Entries from a run are never older than stored ones.
    pub fn add_entry(&mut self, entry: HistoryEntry) {
        self.0.push(entry);
    }

    /// Drop entries older than `max_days` before `now`.
    ///
    /// Entries whose time cannot be parsed are dropped as well. A negative
    /// `max_days` counts as zero; a window reaching past the earliest
    /// representable time keeps every parseable entry.
    pub fn prune_older_than(&mut self, max_days: i64, now: DateTime<Utc>) {
        let cutoff = ChronoDuration::try_days(max_days.max(0))
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.0.retain(|entry| match entry.parsed_time() {
            Some(time) => time >= cutoff,
            None => {
                tracing::warn!("Dropping history entry with bad time {:?}", entry.time);
                false
            }
        });
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.0
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// History for one service and each of its endpoint URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLog {
    #[serde(default)]
    pub service_history: HistorySeries,
    #[serde(default)]
    pub ports_data: BTreeMap<String, HistorySeries>,
}

impl ServiceLog {
    /// Series for `url`, created empty on first use.
    pub fn port_mut(&mut self, url: &str) -> &mut HistorySeries {
        self.ports_data.entry(url.to_string()).or_default()
    }
}
