mod anomaly;
mod cache;
mod csv;
mod errors;
mod influx;
mod metrics;
mod model;
mod rest;
mod service;

use anyhow::Context;
use axum::{routing::get, Router};
use std::env;
use std::sync::Arc;
use tracing::{error, info};

use crate::cache::Cache;
use crate::influx::{InfluxClient, InfluxConfig};
use crate::service::SensorService;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = match config_from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };
    let http_addr = env::var("HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    info!("Starting garden sensor dashboard");
    info!("InfluxDB endpoint: {}", config.url);
    info!("InfluxDB bucket: {}", config.bucket);
    info!("HTTP server: {}", http_addr);

    // Initialize metrics
    metrics::init_metrics();

    let client = match InfluxClient::new(config.clone()) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build InfluxDB client: {}", e);
            std::process::exit(1);
        }
    };

    let service = Arc::new(SensorService::new(
        client,
        Cache::new(),
        config.bucket.clone(),
    ));

    // Build HTTP app with REST API and metrics endpoint
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(service));

    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .unwrap_or_else(|e| {
            error!("Failed to bind to {}: {}", http_addr, e);
            std::process::exit(1);
        });

    info!("HTTP server listening on {}", http_addr);

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap_or_else(|e| {
            error!("HTTP server error: {}", e);
        });
    });

    tokio::select! {
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
}

fn config_from_env() -> anyhow::Result<InfluxConfig> {
    Ok(InfluxConfig {
        url: env::var("INFLUXDB_URL").context("INFLUXDB_URL is not set")?,
        token: env::var("INFLUXDB_TOKEN").context("INFLUXDB_TOKEN is not set")?,
        org: env::var("INFLUXDB_ORG").context("INFLUXDB_ORG is not set")?,
        bucket: env::var("INFLUXDB_BUCKET").context("INFLUXDB_BUCKET is not set")?,
    })
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
