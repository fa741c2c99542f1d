use crate::errors::{Error, Result};
use crate::model::CHANNELS;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// InfluxDB connection parameters, loaded from the environment at startup.
#[derive(Debug, Clone)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
}

/// Sends a Flux query and returns the raw response text.
///
/// The trait exists so the sensor service can be exercised against a stub
/// backend in tests. No retries happen at this layer; a failed fetch is
/// terminal for that attempt and the caller decides how to degrade.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &str) -> Result<String>;
}

pub struct InfluxClient {
    http: reqwest::Client,
    config: InfluxConfig,
}

impl InfluxClient {
    pub fn new(config: InfluxConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { http, config })
    }
}

#[async_trait]
impl QueryExecutor for InfluxClient {
    async fn execute(&self, query: &str) -> Result<String> {
        let url = format!("{}/api/v2/query", self.config.url);
        debug!("Querying InfluxDB at {}", url);

        let response = self
            .http
            .post(&url)
            .query(&[("org", self.config.org.as_str())])
            .header("Authorization", format!("Token {}", self.config.token))
            .header("Accept", "application/csv")
            .json(&json!({
                "query": query,
                "dialect": {
                    "header": true,
                    "delimiter": ",",
                    "annotations": ["datatype"],
                },
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamStatus(status));
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(Error::EmptyResponse);
        }

        Ok(body)
    }
}

fn channel_filter() -> String {
    CHANNELS
        .iter()
        .map(|c| format!("r[\"_measurement\"] == \"{}\"", c))
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Flux query for the most recent reading per channel, over a rolling
/// one-hour window.
pub fn latest_query(bucket: &str) -> String {
    format!(
        r#"from(bucket: "{bucket}")
    |> range(start: -1h)
    |> filter(fn: (r) => {filter})
    |> group(columns: ["_measurement"])
    |> sort(columns: ["_time"], desc: true)
    |> limit(n: 1)"#,
        bucket = bucket,
        filter = channel_filter(),
    )
}

/// Flux query for daily mean aggregates over the last `days` days.
pub fn historical_query(bucket: &str, days: u32) -> String {
    format!(
        r#"from(bucket: "{bucket}")
    |> range(start: -{days}d)
    |> filter(fn: (r) => {filter})
    |> aggregateWindow(every: 1d, fn: mean, createEmpty: false)
    |> sort(columns: ["_time"], desc: false)"#,
        bucket = bucket,
        days = days,
        filter = channel_filter(),
    )
}
