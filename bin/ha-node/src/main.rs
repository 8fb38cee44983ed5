//! ha-node
//!
//! Runs one instance of an active/standby pair (or group). Every instance
//! polls a shared Redis heartbeat, the one holding the leader lock owns the
//! AMQP broker connection, and a standby takes over once the active
//! instance stops heartbeating.
//!
//! Configuration comes from an optional `ha.toml` plus `HA_*` environment
//! variables; see `ha_config::AppConfig::example_toml()`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ha_config::AppConfig;
use ha_failover::{
    api::create_router, AmqpConfig, AmqpResource, ElectionConfig, FailoverNode,
    InstanceIdentity, RedisLockStore,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for local development)
    let _ = dotenvy::dotenv();

    ha_common::logging::init_logging("ha-node");

    if std::env::args().any(|arg| arg == "--example-config") {
        print!("{}", AppConfig::example_toml());
        return Ok(());
    }

    let config = AppConfig::load().context("Failed to load configuration")?;
    let identity = InstanceIdentity::from_configured(&config.election.instance_id);

    info!(
        instance_id = %identity,
        store = %format!("{}:{}", config.store.host, config.store.port),
        broker = %format!("{}:{}", config.broker.host, config.broker.port),
        "Starting ha-node"
    );

    let store = Arc::new(
        RedisLockStore::connect(&config.store.url())
            .await
            .context("Failed to connect to Redis")?,
    );
    let resource = Arc::new(AmqpResource::new(amqp_config(&config)));

    let node = Arc::new(FailoverNode::new(
        identity,
        election_config(&config),
        store,
        resource,
    ));
    node.start()?;

    let (http_stop_tx, http_stop_rx) = oneshot::channel::<()>();
    let http_task = if config.http.enabled {
        let addr = format!("{}:{}", config.http.host, config.http.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind HTTP listener on {addr}"))?;
        info!(addr = %addr, "HTTP server listening");

        let app = create_router(node.clone());
        Some(tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = http_stop_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }))
    } else {
        None
    };

    ha_common::shutdown_signal().await;
    info!("Shutdown signal received, stepping down");

    // Releases lock and heartbeat if active so a standby takes over immediately.
    node.shutdown().await;

    let _ = http_stop_tx.send(());
    if let Some(task) = http_task {
        join_http_task(task).await;
    }

    info!("ha-node stopped");
    Ok(())
}

/// Wait for the HTTP server task; a panic or cancellation is logged.
async fn join_http_task(task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, "HTTP server task ended abnormally");
            false
        }
    }
}

fn election_config(config: &AppConfig) -> ElectionConfig {
    let settings = &config.election;
    ElectionConfig::default()
        .with_keys(
            config.store.heartbeat_key.clone(),
            config.store.lock_key.clone(),
        )
        .with_timing(
            Duration::from_secs(settings.lock_ttl_seconds),
            Duration::from_secs(settings.heartbeat_interval_seconds),
        )
        .with_timeouts(
            Duration::from_millis(settings.store_timeout_ms),
            Duration::from_millis(config.broker.timeout_ms),
        )
        .with_retract_on_connect_failure(settings.retract_lock_on_connect_failure)
}

fn amqp_config(config: &AppConfig) -> AmqpConfig {
    let broker = &config.broker;
    AmqpConfig {
        host: broker.host.clone(),
        port: broker.port,
        username: broker.username.clone(),
        password: broker.password.clone(),
        vhost: broker.vhost.clone(),
        connection_name: broker.connection_name.clone(),
        timeout: Duration::from_millis(broker.timeout_ms),
    }
}
