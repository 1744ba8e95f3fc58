// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::envelope::EventEnvelope;
use crate::errors::{BrokerError, PublishError};
use crate::log_broker::{self, DeliveryReceipt, LogBroker};

const BROKER_CLIENT_ID: &str = "telemetry-intake";

/// The publish backend, resolved once at startup from [`Config::broker_enabled`].
pub enum Publisher {
    Discard(DiscardPublisher),
    LogBroker(LogBrokerPublisher),
}

impl Publisher {
    /// `shutdown` interrupts publishes that are still waiting for an acknowledgment.
    pub fn from_config(config: &Config, shutdown: CancellationToken) -> Result<Self, BrokerError> {
        if !config.broker_enabled {
            return Ok(Publisher::Discard(DiscardPublisher));
        }
        let broker = log_broker::connect(&config.broker_url, BROKER_CLIENT_ID)?;
        Ok(Publisher::LogBroker(
            LogBrokerPublisher::new(broker, config.topic.clone(), config.publish_timeout)
                .with_cancellation(shutdown),
        ))
    }

    pub async fn publish(&self, event: EventEnvelope) -> Result<(), PublishError> {
        match self {
            Publisher::Discard(publisher) => publisher.publish(event),
            Publisher::LogBroker(publisher) => publisher.publish(event).await.map(|_| ()),
        }
    }

    /// The broker connection backing this publisher, if any.
    pub fn broker(&self) -> Option<Arc<dyn LogBroker>> {
        match self {
            Publisher::Discard(_) => None,
            Publisher::LogBroker(publisher) => Some(Arc::clone(&publisher.broker)),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Publisher::Discard(_) => "discard",
            Publisher::LogBroker(_) => "log-broker",
        }
    }
}

/// Accepts every event and drops it. Used when no broker is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardPublisher;

impl DiscardPublisher {
    pub fn publish(&self, event: EventEnvelope) -> Result<(), PublishError> {
        debug!(
            "Discarding telemetry event (no broker configured): vehicleId={}, speedKph={}",
            event.subject_id(),
            event.metric_value()
        );
        Ok(())
    }
}

/// Sends serialized envelopes to a topic keyed by subject id, waiting a bounded time for the
/// broker to acknowledge each one.
pub struct LogBrokerPublisher {
    broker: Arc<dyn LogBroker>,
    topic: String,
    timeout: Duration,
    cancel_token: CancellationToken,
}

impl LogBrokerPublisher {
    pub fn new(broker: Arc<dyn LogBroker>, topic: String, timeout: Duration) -> Self {
        LogBrokerPublisher {
            broker,
            topic,
            timeout,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    /// A cancelled token fails the publish with [`PublishError::Interrupted`] and stays
    /// cancelled for its other holders.
    pub async fn publish(&self, event: EventEnvelope) -> Result<DeliveryReceipt, PublishError> {
        let payload = event.to_json()?;
        let key = event.subject_id();

        let acknowledged = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => return Err(PublishError::Interrupted),
            result = tokio::time::timeout(self.timeout, self.broker.send(&self.topic, key, payload)) => result,
        };

        match acknowledged {
            Ok(Ok(receipt)) => {
                debug!(
                    "Published to topic={} partition={} offset={}, key={key}",
                    receipt.topic, receipt.partition, receipt.offset
                );
                Ok(receipt)
            }
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(PublishError::Timeout(self.timeout)),
        }
    }
}
