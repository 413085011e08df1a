// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Invoice indexer monitor
//!
//! Watches the indexer of every configured chain, logs health transitions and
//! exposes Prometheus metrics until Ctrl-C.

use anyhow::Context;
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use invoice_sync::chain::EthChainReader;
use invoice_sync::config::SyncConfig;
use invoice_sync::failover::FailoverConfig;
use invoice_sync::health::HealthMonitor;
use invoice_sync::indexer::GraphQlIndexerClient;
use invoice_sync::metrics::SyncMetrics;
use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(rename_all = "kebab-case", author, version)]
struct Args {
    /// YAML sync configuration
    #[clap(env = "INVOICE_SYNC_CONFIG", long)]
    config: PathBuf,
    #[clap(env, long, default_value = "0.0.0.0:9184")]
    metrics_address: SocketAddr,
}

async fn metrics_handler(State(registry): State<Registry>) -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&registry.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {:?}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

async fn start_metrics_server(
    address: SocketAddr,
    registry: Registry,
    cancel: CancellationToken,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry);
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .context(format!("Failed to bind metrics address {}", address))?;
    tracing::info!("Metrics server listening on {}", address);

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
        {
            tracing::error!("Metrics server error: {:?}", e);
        }
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = SyncConfig::from_file(&args.config)?;
    for chain in &config.chains {
        tracing::info!(
            "Monitoring chain {} ({}) via {} indexer endpoint(s)",
            chain.chain_id,
            chain.name(),
            chain.indexer_urls.len()
        );
    }

    let registry = Registry::new();
    let metrics = Arc::new(SyncMetrics::new(&registry));
    let indexer = GraphQlIndexerClient::new(
        &config.chains,
        FailoverConfig::from(&config.failover),
        metrics.clone(),
    )
    .context("Failed to create indexer client")?;
    let chain_reader = EthChainReader::new(&config.chains, metrics.clone())
        .context("Failed to create chain reader")?;

    let monitor = Arc::new(HealthMonitor::new(
        Arc::new(indexer),
        Arc::new(chain_reader),
        config.chain_ids(),
        config.health.max_lag,
        config.health.check_interval(),
        metrics,
    ));

    let cancel = CancellationToken::new();
    let metrics_handle =
        start_metrics_server(args.metrics_address, registry, cancel.clone()).await?;
    let monitor_handle = tokio::spawn(monitor.clone().run(cancel.clone()));

    let mut reports = monitor.subscribe();
    let watch_cancel = cancel.clone();
    let report_handle = tokio::spawn(async move {
        let mut was_degraded = false;
        loop {
            tokio::select! {
                _ = watch_cancel.cancelled() => break,
                changed = reports.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let degraded = reports.borrow_and_update().is_degraded();
                    if degraded != was_degraded {
                        if degraded {
                            tracing::warn!("Indexer degraded: reads may be stale");
                        } else {
                            tracing::info!("All indexers healthy");
                        }
                        was_degraded = degraded;
                    }
                }
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");
    cancel.cancel();

    let _ = tokio::join!(monitor_handle, metrics_handle, report_handle);
    Ok(())
}
