//! Folding pass results into the log store and expiring old history.

use crate::history::{HistoryEntry, LogStore, StoreError};
use crate::status::Health;

use super::ServiceResult;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;

/// Per-URL fold of one service's endpoint results.
struct UrlOutcome<'a> {
    url: &'a str,
    statuses: Vec<Health>,
    time: DateTime<Utc>,
    response_time: Duration,
}

/// Group endpoint results by URL in first-seen order.
fn group_by_url(svc: &ServiceResult) -> Vec<UrlOutcome<'_>> {
    let mut outcomes: Vec<UrlOutcome<'_>> = Vec::new();

    for ep in &svc.endpoints {
        match outcomes.iter_mut().find(|o| o.url == ep.url) {
            Some(outcome) => {
                outcome.statuses.push(ep.status);
                outcome.response_time = outcome.response_time.max(ep.response_time);
            }
            None => outcomes.push(UrlOutcome {
                url: &ep.url,
                statuses: vec![ep.status],
                time: ep.start_time,
                response_time: ep.response_time,
            }),
        }
    }

    outcomes
}

/// Append this run's results to `store` and prune entries older than
/// `max_log_days`.
///
/// Services and URLs absent from `results` are left untouched.
pub fn record_results(
    store: &mut LogStore,
    results: &[ServiceResult],
    max_log_days: i64,
    now: DateTime<Utc>,
) {
    for svc in results {
        let log = store.service_mut(&svc.name);

        log.service_history
            .add_entry(HistoryEntry::new(svc.start_time, svc.status));
        log.service_history.prune_older_than(max_log_days, now);

        for outcome in group_by_url(svc) {
            let entry = HistoryEntry::new(outcome.time, Health::merge(outcome.statuses))
                .with_response_time(outcome.response_time.as_millis() as u64);

            let series = log.port_mut(outcome.url);
            series.add_entry(entry);
            series.prune_older_than(max_log_days, now);
        }
    }
}

/// Load the store at `path`, record `results`, and save it back.
pub fn update_log<P: AsRef<Path>>(
    path: P,
    results: &[ServiceResult],
    max_log_days: i64,
) -> Result<LogStore, StoreError> {
    let path = path.as_ref();
    let mut store = LogStore::load(path).map_err(|e| {
        tracing::error!("Failed to load log store from {}: {}", path.display(), e);
        e
    })?;
    if store.is_empty() {
        tracing::info!("Starting a new log store at {}", path.display());
    }

    record_results(&mut store, results, max_log_days, Utc::now());

    store.save(path).map_err(|e| {
        tracing::error!("Failed to save log store to {}: {}", path.display(), e);
        e
    })?;
    tracing::info!("Saved history for {} services to {}", store.len(), path.display());

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeTarget;
    use crate::probe::EndpointResult;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn endpoint(url: &str, status: Health, ms: u64, start: DateTime<Utc>) -> EndpointResult {
        let mut ep = EndpointResult::aborted(&ProbeTarget::get(url), String::new());
        ep.status = status;
        ep.response_time = Duration::from_millis(ms);
        ep.start_time = start;
        ep.end_time = start;
        ep
    }

    fn service(name: &str, start: DateTime<Utc>, endpoints: Vec<EndpointResult>) -> ServiceResult {
        ServiceResult::from_endpoints(name.to_string(), start, endpoints)
    }

    #[test]
    fn test_duplicate_urls_fold_into_one_entry() {
        let now = Utc::now();
        let first = now - ChronoDuration::seconds(2);
        let svc = service(
            "api",
            now,
            vec![
                endpoint("http://api/health", Health::Up, 30, first),
                endpoint("http://api/ready", Health::Up, 5, now),
                endpoint("http://api/health", Health::Down, 80, now),
            ],
        );

        let mut store = LogStore::default();
        record_results(&mut store, &[svc], 3, now);

        let log = store.service("api").unwrap();
        assert_eq!(log.service_history.entries()[0].status, Health::Partial);
        assert_eq!(log.service_history.entries()[0].response_time_ms, None);

        let health = log.ports_data["http://api/health"].entries();
        assert_eq!(health.len(), 1);
        assert_eq!(health[0].status, Health::Partial);
        assert_eq!(health[0].response_time_ms, Some(80));
        assert_eq!(health[0].time, first.to_rfc3339());

        let ready = log.ports_data["http://api/ready"].entries();
        assert_eq!(ready[0].status, Health::Up);
        assert_eq!(ready[0].response_time_ms, Some(5));
    }

    #[test]
    fn test_entries_are_never_deduplicated() {
        let now = Utc::now();
        let results = vec![service(
            "web",
            now,
            vec![endpoint("http://web", Health::Up, 10, now)],
        )];

        let mut store = LogStore::default();
        record_results(&mut store, &results, 365, now);
        record_results(&mut store, &results, 365, now);

        let log = store.service("web").unwrap();
        assert_eq!(log.service_history.len(), 2);
        assert_eq!(log.ports_data["http://web"].len(), 2);
    }

    #[test]
    fn test_absent_services_untouched() {
        let now = Utc::now();
        let old = now - ChronoDuration::days(30);
        let mut store = LogStore::default();
        store
            .service_mut("retired")
            .service_history
            .add_entry(HistoryEntry::new(old, Health::Up));
        store
            .service_mut("web")
            .port_mut("http://web/removed")
            .add_entry(HistoryEntry::new(old, Health::Up).with_response_time(1));

        let results = vec![service(
            "web",
            now,
            vec![endpoint("http://web", Health::Down, 0, now)],
        )];
        record_results(&mut store, &results, 3, now);

        assert_eq!(store.service("retired").unwrap().service_history.len(), 1);
        let web = store.service("web").unwrap();
        assert_eq!(web.ports_data["http://web/removed"].len(), 1);
        assert_eq!(web.ports_data["http://web"].entries()[0].status, Health::Down);
    }

    #[test]
    fn test_prunes_existing_series() {
        let now = Utc::now();
        let mut store = LogStore::default();
        let log = store.service_mut("web");
        for days in [5, 1] {
            let time = now - ChronoDuration::days(days);
            log.service_history.add_entry(HistoryEntry::new(time, Health::Up));
            log.port_mut("http://web")
                .add_entry(HistoryEntry::new(time, Health::Up).with_response_time(3));
        }

        let results = vec![service(
            "web",
            now,
            vec![endpoint("http://web", Health::Up, 4, now)],
        )];
        record_results(&mut store, &results, 3, now);

        let log = store.service("web").unwrap();
        assert_eq!(log.service_history.len(), 2);
        let port = log.ports_data["http://web"].entries();
        assert_eq!(port.len(), 2);
        assert_eq!(port[1].response_time_ms, Some(4));
    }

    #[test]
    fn test_update_log_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.json");
        let now = Utc::now();
        let results = vec![service(
            "web",
            now,
            vec![endpoint("http://web", Health::Up, 12, now)],
        )];

        update_log(&path, &results, 3).unwrap();
        let store = update_log(&path, &results, 3).unwrap();

        assert_eq!(store, LogStore::load(&path).unwrap());
        assert_eq!(store.service("web").unwrap().service_history.len(), 2);
    }

    #[test]
    fn test_update_log_refuses_corrupt_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(&path, "[1, 2").unwrap();

        assert!(update_log(&path, &[], 3).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[1, 2");
    }
}
