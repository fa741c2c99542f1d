use crate::anomaly;
use crate::cache::Cache;
use crate::csv;
use crate::errors::Result;
use crate::influx::{self, QueryExecutor};
use crate::metrics::{
    CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL, FETCH_LATENCY_SECONDS, STALE_SERVES_TOTAL,
    UPSTREAM_FAILURES_TOTAL,
};
use crate::model::{Reading, CHANNELS};
use chrono::Local;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, warn};

const LATEST_KEY: &str = "latest_data";
const SNAPSHOT_KEY: &str = "previous_latest_data";

const LATEST_TTL: Duration = Duration::from_secs(60);
const HISTORICAL_TTL: Duration = Duration::from_secs(300);
const SNAPSHOT_TTL: Duration = Duration::from_secs(3600);

/// Serves sensor readings with short-lived caching and degrade-to-stale
/// behavior.
///
/// Retrieval never fails from the caller's point of view: when the live
/// fetch goes wrong the service answers with the last-known-good snapshot,
/// or an empty batch if none was ever recorded. The dashboard keeps
/// rendering either way.
pub struct SensorService<E> {
    executor: E,
    cache: Cache,
    bucket: String,
}

impl<E: QueryExecutor> SensorService<E> {
    pub fn new(executor: E, cache: Cache, bucket: String) -> Self {
        Self {
            executor,
            cache,
            bucket,
        }
    }

    /// Most recent reading per channel, reconciled against the last-known-good
    /// snapshot.
    pub async fn latest(&self) -> Vec<Reading> {
        if let Some(hit) = self.cache.get_fresh(LATEST_KEY) {
            CACHE_HITS_TOTAL.inc();
            return hit;
        }
        CACHE_MISSES_TOTAL.inc();

        match self.fetch_latest().await {
            Ok(batch) => batch,
            Err(e) => {
                UPSTREAM_FAILURES_TOTAL.inc();
                warn!("Latest-data fetch failed: {}", e);
                match self.cache.get_any(SNAPSHOT_KEY) {
                    Some(previous) => {
                        STALE_SERVES_TOTAL.inc();
                        info!("Serving last-known-good snapshot instead");
                        previous
                    }
                    None => Vec::new(),
                }
            }
        }
    }

    async fn fetch_latest(&self) -> Result<Vec<Reading>> {
        let timer = FETCH_LATENCY_SECONDS.start_timer();
        let raw = self
            .executor
            .execute(&influx::latest_query(&self.bucket))
            .await?;
        let batch = csv::parse(&raw)?;
        timer.observe_duration();

        let (mut batch, flagged) = anomaly::reconcile(batch, Local::now());

        if let Some(previous) = self.cache.get_any(SNAPSHOT_KEY) {
            backfill_missing(&mut batch, &flagged, &previous);
        }

        self.cache.put(LATEST_KEY, batch.clone(), LATEST_TTL);
        self.cache.put(SNAPSHOT_KEY, batch.clone(), SNAPSHOT_TTL);

        Ok(batch)
    }

    /// Daily mean aggregates over the last `days` days. Historical data feeds
    /// charts, not the live dashboard, so a failed fetch degrades to an empty
    /// batch without a staleness fallback.
    pub async fn historical(&self, days: u32) -> Vec<Reading> {
        let key = format!("historical_data_{}", days);
        if let Some(hit) = self.cache.get_fresh(&key) {
            CACHE_HITS_TOTAL.inc();
            return hit;
        }
        CACHE_MISSES_TOTAL.inc();

        match self.fetch_historical(&key, days).await {
            Ok(batch) => batch,
            Err(e) => {
                UPSTREAM_FAILURES_TOTAL.inc();
                warn!("Historical fetch for {}d window failed: {}", days, e);
                Vec::new()
            }
        }
    }

    async fn fetch_historical(&self, key: &str, days: u32) -> Result<Vec<Reading>> {
        let timer = FETCH_LATENCY_SECONDS.start_timer();
        let raw = self
            .executor
            .execute(&influx::historical_query(&self.bucket, days))
            .await?;
        let batch = csv::parse(&raw)?;
        timer.observe_duration();

        self.cache.put(key, batch.clone(), HISTORICAL_TTL);
        Ok(batch)
    }
}

/// Copies readings for channels absent from the fresh batch out of the
/// previous snapshot, original timestamps intact. Better a stale point than
/// a hole in the dashboard. Channels the anomaly filter flagged this round
/// stay out, so a faulted sensor does not keep resurfacing an old value.
fn backfill_missing(batch: &mut Vec<Reading>, flagged: &HashSet<String>, previous: &[Reading]) {
    let present: HashSet<String> = batch.iter().map(|r| r.measurement.clone()).collect();

    for channel in CHANNELS {
        if present.contains(channel) || flagged.contains(channel) {
            continue;
        }
        if let Some(prior) = previous.iter().find(|r| r.measurement == channel) {
            info!("Backfilling {} from last-known-good snapshot", channel);
            batch.push(prior.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubExecutor {
        responses: Mutex<VecDeque<Result<String>>>,
        calls: AtomicUsize,
    }

    impl StubExecutor {
        fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QueryExecutor for &StubExecutor {
        async fn execute(&self, _query: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .pop_front()
                .unwrap_or(Err(Error::EmptyResponse))
        }
    }

    fn csv_payload(rows: &[(&str, f64)]) -> String {
        let mut out = String::from(
            "#datatype,string,dateTime:RFC3339,double,string,string\n,_time,_value,_measurement,device\n",
        );
        for (measurement, value) in rows {
            out.push_str(&format!(
                ",2024-05-01T12:00:00Z,{},{},esp32-garden\n",
                value, measurement
            ));
        }
        out
    }

    fn reading(measurement: &str, value: f64, time: &str) -> Reading {
        Reading {
            time: time.parse().unwrap(),
            measurement: measurement.to_string(),
            value,
            device: "esp32-garden".to_string(),
        }
    }

    fn service(stub: &StubExecutor) -> SensorService<&StubExecutor> {
        SensorService::new(stub, Cache::new(), "garden".to_string())
    }

    #[tokio::test]
    async fn test_second_latest_call_within_ttl_is_a_cache_hit() {
        let stub = StubExecutor::new(vec![Ok(csv_payload(&[
            ("temperature", 21.5),
            ("humidity", 48.2),
        ]))]);
        let service = service(&stub);

        let first = service.latest().await;
        let second = service.latest().await;

        assert_eq!(stub.calls(), 1);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_serves_last_known_good() {
        let stub = StubExecutor::new(vec![Err(Error::EmptyResponse)]);
        let cache = Cache::new();
        let previous = vec![reading("temperature", 20.0, "2024-05-01T11:00:00Z")];
        cache.put(SNAPSHOT_KEY, previous.clone(), SNAPSHOT_TTL);
        let service = SensorService::new(&stub, cache, "garden".to_string());

        let batch = service.latest().await;

        assert_eq!(batch, previous);
    }

    #[tokio::test]
    async fn test_expired_snapshot_still_serves_as_fallback() {
        let stub = StubExecutor::new(vec![Err(Error::EmptyResponse)]);
        let cache = Cache::new();
        let previous = vec![reading("pressure", 1013.2, "2024-05-01T09:00:00Z")];
        cache.put(SNAPSHOT_KEY, previous.clone(), Duration::ZERO);
        let service = SensorService::new(&stub, cache, "garden".to_string());

        let batch = service.latest().await;

        assert_eq!(batch, previous);
    }

    #[tokio::test]
    async fn test_failed_fetch_without_snapshot_returns_empty() {
        let stub = StubExecutor::new(vec![Err(Error::EmptyResponse)]);
        let service = service(&stub);

        assert!(service.latest().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_response_degrades_like_transport_failure() {
        let stub = StubExecutor::new(vec![Ok("too short".to_string())]);
        let cache = Cache::new();
        let previous = vec![reading("humidity", 50.0, "2024-05-01T11:30:00Z")];
        cache.put(SNAPSHOT_KEY, previous.clone(), SNAPSHOT_TTL);
        let service = SensorService::new(&stub, cache, "garden".to_string());

        let batch = service.latest().await;

        assert_eq!(batch, previous);
    }

    #[tokio::test]
    async fn test_missing_channel_backfilled_from_snapshot_unchanged() {
        let stub = StubExecutor::new(vec![Ok(csv_payload(&[("temperature", 21.5)]))]);
        let cache = Cache::new();
        let prior_moisture = reading("moisture_b", 0.42, "2024-05-01T10:00:00Z");
        cache.put(SNAPSHOT_KEY, vec![prior_moisture.clone()], SNAPSHOT_TTL);
        let service = SensorService::new(&stub, cache, "garden".to_string());

        let batch = service.latest().await;

        assert_eq!(batch.len(), 2);
        let backfilled = batch
            .iter()
            .find(|r| r.measurement == "moisture_b")
            .unwrap();
        assert_eq!(*backfilled, prior_moisture);
    }

    #[tokio::test]
    async fn test_successful_fetch_records_snapshot() {
        let stub = StubExecutor::new(vec![Ok(csv_payload(&[("temperature", 21.5)]))]);
        let service = service(&stub);

        let batch = service.latest().await;

        assert_eq!(service.cache.get_any(SNAPSHOT_KEY), Some(batch));
    }

    #[tokio::test]
    async fn test_historical_is_cached_per_window() {
        let payload = csv_payload(&[("temperature", 19.0), ("temperature", 22.0)]);
        let stub = StubExecutor::new(vec![Ok(payload.clone()), Ok(payload)]);
        let service = service(&stub);

        let first = service.historical(30).await;
        let second = service.historical(30).await;
        assert_eq!(stub.calls(), 1);
        assert_eq!(first, second);

        // A different window is its own dataset.
        service.historical(7).await;
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_historical_fetch_returns_empty_without_fallback() {
        let stub = StubExecutor::new(vec![Err(Error::EmptyResponse)]);
        let cache = Cache::new();
        cache.put(
            SNAPSHOT_KEY,
            vec![reading("temperature", 20.0, "2024-05-01T11:00:00Z")],
            SNAPSHOT_TTL,
        );
        let service = SensorService::new(&stub, cache, "garden".to_string());

        assert!(service.historical(30).await.is_empty());
    }

    #[test]
    fn test_backfill_skips_present_and_flagged_channels() {
        let mut batch = vec![reading("temperature", 21.5, "2024-05-01T12:00:00Z")];
        let flagged: HashSet<String> = ["luminance".to_string()].into();
        let previous = vec![
            reading("temperature", 20.0, "2024-05-01T11:00:00Z"),
            reading("luminance", 640.0, "2024-05-01T11:00:00Z"),
            reading("moisture_a", 0.61, "2024-05-01T11:00:00Z"),
        ];

        backfill_missing(&mut batch, &flagged, &previous);

        // temperature kept fresh, luminance stays out, moisture_a copied over.
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].value, 21.5);
        assert_eq!(batch[1].measurement, "moisture_a");
    }
}
