// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use telemetry_intake::{
    config::Config, ingestion_service::IngestionService, intake_server::IntakeServer,
    publisher::Publisher, recent_buffer::RecentEventBuffer, recent_consumer::RecentEventConsumer,
};

#[tokio::main]
pub async fn main() {
    let config = Config::new();

    let log_level = config
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    let env_filter = format!("h2=off,hyper=off,rdkafka=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match config {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Error creating config on telemetry intake startup: {e}");
            return;
        }
    };

    let shutdown = CancellationToken::new();

    let publisher = match Publisher::from_config(&config, shutdown.clone()) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            error!("Error connecting to log broker at {}: {e}", config.broker_url);
            return;
        }
    };

    let recent = Arc::new(RecentEventBuffer::new(config.recent_capacity));
    let mut consumer = match publisher.broker() {
        Some(broker) => match broker.subscribe(&config.topic, &config.consumer_group) {
            Ok(subscription) => Some(RecentEventConsumer::start(subscription, recent.clone())),
            Err(e) => {
                error!("Error starting recent event consumer: {e}");
                return;
            }
        },
        None => {
            info!("Log broker disabled, recent events will stay empty");
            None
        }
    };

    let intake_server = IntakeServer {
        config: Arc::clone(&config),
        ingestion_service: Arc::new(IngestionService::new(publisher, recent)),
    };

    info!(
        "Starting telemetry intake on port {} (topic: {})",
        config.port, config.topic
    );

    let consumer_finished = async {
        match consumer.as_mut() {
            Some(c) => c.finished().await,
            None => std::future::pending().await,
        }
    };

    let server = intake_server.start_intake_server(shutdown.clone());
    tokio::pin!(server);

    let server_result = tokio::select! {
        res = &mut server => Some(res),
        _ = consumer_finished => {
            error!("Recent event consumer stopped unexpectedly, shutting down telemetry intake");
            None
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, stopping telemetry intake");
            None
        }
    };

    // interrupts publishes still waiting on the broker, then lets the server drain
    shutdown.cancel();
    let server_result = match server_result {
        Some(res) => res,
        None => server.await,
    };
    if let Err(e) = server_result {
        error!("Error when running telemetry intake: {e}");
    }

    if let Some(consumer) = consumer {
        consumer.stop().await;
    }
}
