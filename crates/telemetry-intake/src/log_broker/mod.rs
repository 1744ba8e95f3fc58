// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The narrow contract the intake needs from an event-log broker: keyed sends that resolve once
//! the broker acknowledges delivery, and a subscription yielding delivered payloads.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::BrokerError;

#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;

pub use memory::InMemoryLogBroker;

pub const MEMORY_BROKER_URL: &str = "memory://";

/// Where an acknowledged record landed. Only used for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

#[async_trait]
pub trait LogBroker: Send + Sync {
    /// Sends `payload` keyed by `key` to `topic`. Resolves when the broker acknowledges delivery
    /// or reports failure; callers bound the wait.
    async fn send(&self, topic: &str, key: &str, payload: String)
        -> Result<DeliveryReceipt, BrokerError>;

    /// Opens a subscription to the records delivered on `topic`.
    fn subscribe(&self, topic: &str, group: &str) -> Result<BrokerSubscription, BrokerError>;
}

/// Stream of payloads delivered on a topic. Ends when the broker side closes.
#[derive(Debug)]
pub struct BrokerSubscription {
    topic: String,
    rx: mpsc::Receiver<String>,
}

impl BrokerSubscription {
    pub fn new(topic: impl Into<String>, rx: mpsc::Receiver<String>) -> Self {
        BrokerSubscription {
            topic: topic.into(),
            rx,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

/// Builds the broker client for `url`: [`MEMORY_BROKER_URL`] selects the in-process broker,
/// anything else is treated as a Kafka bootstrap server list.
pub fn connect(url: &str, client_id: &str) -> Result<Arc<dyn LogBroker>, BrokerError> {
    if url == MEMORY_BROKER_URL {
        return Ok(Arc::new(InMemoryLogBroker::default()));
    }
    connect_kafka(url, client_id)
}

#[cfg(feature = "kafka")]
fn connect_kafka(url: &str, client_id: &str) -> Result<Arc<dyn LogBroker>, BrokerError> {
    Ok(Arc::new(kafka::KafkaLogBroker::new(url, client_id)?))
}

#[cfg(not(feature = "kafka"))]
fn connect_kafka(url: &str, _client_id: &str) -> Result<Arc<dyn LogBroker>, BrokerError> {
    Err(BrokerError::Unavailable(format!(
        "cannot connect to {url}: Kafka support not enabled, rebuild with the 'kafka' feature"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_memory_broker() {
        let broker = connect(MEMORY_BROKER_URL, "test-client").unwrap();
        let receipt = broker.send("t", "k", "p".to_string()).await.unwrap();
        assert_eq!(receipt.topic, "t");
    }

    #[cfg(not(feature = "kafka"))]
    #[test]
    fn test_connect_kafka_without_feature() {
        let err = connect("localhost:9092", "test-client").err().unwrap();
        assert!(matches!(err, BrokerError::Unavailable(_)));
        assert!(err.to_string().contains("localhost:9092"));
    }
}
