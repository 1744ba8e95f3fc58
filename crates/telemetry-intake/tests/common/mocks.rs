// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock log brokers for testing

use std::sync::Mutex;

use async_trait::async_trait;
use telemetry_intake::errors::BrokerError;
use telemetry_intake::log_broker::{BrokerSubscription, DeliveryReceipt, LogBroker};

/// Broker that never acknowledges a send
pub struct StalledBroker;

#[async_trait]
impl LogBroker for StalledBroker {
    async fn send(
        &self,
        _topic: &str,
        _key: &str,
        _payload: String,
    ) -> Result<DeliveryReceipt, BrokerError> {
        std::future::pending().await
    }

    fn subscribe(&self, topic: &str, _group: &str) -> Result<BrokerSubscription, BrokerError> {
        Err(BrokerError::Subscribe {
            topic: topic.to_string(),
            reason: "stalled broker has no subscriptions".to_string(),
        })
    }
}

/// Broker that rejects every send and remembers the keys it was given
#[derive(Default)]
pub struct RejectingBroker {
    pub keys: Mutex<Vec<String>>,
}

#[async_trait]
impl LogBroker for RejectingBroker {
    async fn send(
        &self,
        _topic: &str,
        key: &str,
        _payload: String,
    ) -> Result<DeliveryReceipt, BrokerError> {
        self.keys.lock().unwrap().push(key.to_string());
        Err(BrokerError::Delivery("Broker: Leader not available".to_string()))
    }

    fn subscribe(&self, topic: &str, _group: &str) -> Result<BrokerSubscription, BrokerError> {
        Err(BrokerError::Subscribe {
            topic: topic.to_string(),
            reason: "rejecting broker has no subscriptions".to_string(),
        })
    }
}
