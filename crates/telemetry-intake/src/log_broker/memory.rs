// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use super::{BrokerSubscription, DeliveryReceipt, LogBroker};
use crate::errors::BrokerError;

const TOPIC_CHANNEL_CAPACITY: usize = 1024;
const SUBSCRIPTION_CHANNEL_CAPACITY: usize = 256;

struct Topic {
    next_offset: i64,
    tx: broadcast::Sender<String>,
}

/// Single-partition, in-process broker. Every subscription sees every record sent after it
/// subscribed, regardless of group.
pub struct InMemoryLogBroker {
    topics: Mutex<HashMap<String, Topic>>,
}

impl Default for InMemoryLogBroker {
    fn default() -> Self {
        InMemoryLogBroker {
            topics: Mutex::new(HashMap::new()),
        }
    }
}

impl InMemoryLogBroker {
    fn with_topic<R>(&self, topic: &str, f: impl FnOnce(&mut Topic) -> R) -> R {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = topics.entry(topic.to_string()).or_insert_with(|| Topic {
            next_offset: 0,
            tx: broadcast::channel(TOPIC_CHANNEL_CAPACITY).0,
        });
        f(entry)
    }
}

#[async_trait]
impl LogBroker for InMemoryLogBroker {
    async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: String,
    ) -> Result<DeliveryReceipt, BrokerError> {
        let offset = self.with_topic(topic, |t| {
            let offset = t.next_offset;
            t.next_offset += 1;
            // no subscribers is not a delivery failure: the record is still appended
            let _ = t.tx.send(payload);
            offset
        });
        debug!("In-memory broker appended key={key} to {topic}@{offset}");
        Ok(DeliveryReceipt {
            topic: topic.to_string(),
            partition: 0,
            offset,
        })
    }

    fn subscribe(&self, topic: &str, group: &str) -> Result<BrokerSubscription, BrokerError> {
        let mut broadcast_rx = self.with_topic(topic, |t| t.tx.subscribe());
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CHANNEL_CAPACITY);
        let topic_name = topic.to_string();
        debug!("In-memory broker: group {group} subscribed to {topic}");

        tokio::spawn(async move {
            loop {
                match broadcast_rx.recv().await {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Subscription to {topic_name} lagged, skipped {skipped} records");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(BrokerSubscription::new(topic, rx))
    }
}
