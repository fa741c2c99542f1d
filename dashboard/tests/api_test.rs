use serde_json::Value;

// End-to-end smoke test against a running dashboard instance.
// Requires the service on localhost:8080 with a reachable InfluxDB behind it:
//
//   cargo run -p dashboard &
//   cargo test -p dashboard -- --ignored

const BASE_URL: &str = "http://localhost:8080";

#[tokio::test]
#[ignore]
async fn test_latest_endpoint_always_answers() {
    let body: Value = reqwest::get(format!("{}/api/v1/readings/latest", BASE_URL))
        .await
        .expect("dashboard not reachable")
        .error_for_status()
        .expect("latest endpoint returned an error status")
        .json()
        .await
        .expect("latest endpoint returned invalid JSON");

    let data = body["data"].as_array().expect("missing data array");
    assert_eq!(body["total"].as_u64().unwrap() as usize, data.len());

    for reading in data {
        assert!(reading["time"].is_string());
        assert!(reading["measurement"].is_string());
        assert!(reading["value"].is_number());
        assert!(reading["device"].is_string());
    }
}

#[tokio::test]
#[ignore]
async fn test_history_endpoint_accepts_window_parameter() {
    let body: Value = reqwest::get(format!("{}/api/v1/readings/history?days=7", BASE_URL))
        .await
        .expect("dashboard not reachable")
        .error_for_status()
        .expect("history endpoint returned an error status")
        .json()
        .await
        .expect("history endpoint returned invalid JSON");

    assert!(body["data"].is_array());
}

#[tokio::test]
#[ignore]
async fn test_metrics_endpoint_exposes_cache_counters() {
    let body = reqwest::get(format!("{}/metrics", BASE_URL))
        .await
        .expect("dashboard not reachable")
        .text()
        .await
        .unwrap();

    assert!(body.contains("dashboard_cache_hits_total"));
    assert!(body.contains("dashboard_upstream_failures_total"));
}
