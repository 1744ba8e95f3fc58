// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Kafka adapter. Requires the native `librdkafka` library, so it is only built with the
//! `kafka` feature.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    consumer::{Consumer, StreamConsumer},
    error::KafkaError,
    producer::{FutureProducer, FutureRecord},
    util::Timeout,
    Message,
};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::{BrokerSubscription, DeliveryReceipt, LogBroker};
use crate::errors::BrokerError;

const SUBSCRIPTION_CHANNEL_CAPACITY: usize = 256;
const MESSAGE_TIMEOUT: Duration = Duration::from_secs(30);
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(100);

pub struct KafkaLogBroker {
    bootstrap_servers: String,
    producer: FutureProducer,
}

impl KafkaLogBroker {
    pub fn new(bootstrap_servers: &str, client_id: &str) -> Result<Self, BrokerError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("client.id", client_id)
            .set("acks", "all")
            .set(
                "message.timeout.ms",
                MESSAGE_TIMEOUT.as_millis().to_string(),
            )
            .create()
            .map_err(|e| {
                BrokerError::Unavailable(format!("Failed to create Kafka producer: {e}"))
            })?;

        Ok(KafkaLogBroker {
            bootstrap_servers: bootstrap_servers.to_string(),
            producer,
        })
    }
}

fn delivery_error(err: KafkaError) -> BrokerError {
    match err {
        KafkaError::Canceled => BrokerError::Cancelled,
        other => BrokerError::Delivery(other.to_string()),
    }
}

#[async_trait]
impl LogBroker for KafkaLogBroker {
    async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: String,
    ) -> Result<DeliveryReceipt, BrokerError> {
        let record = FutureRecord::to(topic).key(key).payload(payload.as_str());
        match self.producer.send(record, Timeout::Never).await {
            Ok(delivery) => Ok(DeliveryReceipt {
                topic: topic.to_string(),
                partition: delivery.partition,
                offset: delivery.offset,
            }),
            Err((e, _)) => Err(delivery_error(e)),
        }
    }

    fn subscribe(&self, topic: &str, group: &str) -> Result<BrokerSubscription, BrokerError> {
        let subscribe_error = |reason: String| BrokerError::Subscribe {
            topic: topic.to_string(),
            reason,
        };

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("group.id", group)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "latest")
            .create()
            .map_err(|e| subscribe_error(format!("Failed to create Kafka consumer: {e}")))?;
        consumer
            .subscribe(&[topic])
            .map_err(|e| subscribe_error(e.to_string()))?;
        debug!("Kafka consumer group {group} subscribed to {topic}");

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CHANNEL_CAPACITY);
        let topic_name = topic.to_string();
        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = tx.closed() => break,
                    received = consumer.recv() => received,
                };
                let payload = match received {
                    Ok(message) => match message.payload_view::<str>() {
                        Some(Ok(payload)) => Ok(payload.to_string()),
                        Some(Err(e)) => {
                            warn!("Dropping non UTF-8 record from {topic_name}: {e}");
                            continue;
                        }
                        None => continue,
                    },
                    Err(e) => Err(e.to_string()),
                };
                match payload {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error receiving from {topic_name}: {e}");
                        tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                    }
                }
            }
            debug!("Kafka consumer for {topic_name} stopped");
        });

        Ok(BrokerSubscription::new(topic, rx))
    }
}

#[cfg(test)]
mod tests {
    use rdkafka::types::RDKafkaErrorCode;

    use super::*;

    #[test]
    fn test_canceled_delivery_is_cancelled() {
        assert!(matches!(
            delivery_error(KafkaError::Canceled),
            BrokerError::Cancelled
        ));
    }

    #[test]
    fn test_failed_delivery_keeps_the_broker_reason() {
        let err = delivery_error(KafkaError::MessageProduction(
            RDKafkaErrorCode::MessageTimedOut,
        ));
        assert!(matches!(err, BrokerError::Delivery(ref reason) if reason.contains("timed out")));
    }

    #[test]
    fn test_producer_is_created_without_a_reachable_broker() {
        let broker = KafkaLogBroker::new("127.0.0.1:1", "test-client").unwrap();
        assert_eq!(broker.bootstrap_servers, "127.0.0.1:1");
    }
}
