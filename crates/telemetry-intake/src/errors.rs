// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Failures reported by a [`crate::log_broker::LogBroker`] adapter.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker reported delivery failure: {0}")]
    Delivery(String),

    #[error("Delivery was cancelled by the broker client")]
    Cancelled,

    #[error("Failed to subscribe to topic {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

/// Coarse classification of a [`PublishError`], used at the HTTP boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishErrorKind {
    Serialization,
    Timeout,
    Publish,
}

/// Errors surfaced by a publish attempt. None of them are retried by the publisher.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to serialize telemetry event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Broker did not acknowledge delivery within {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Failed to publish telemetry event: {0}")]
    Rejected(String),

    #[error("Publish was cancelled before the broker acknowledged delivery")]
    Cancelled,

    #[error("Interrupted while waiting for broker acknowledgment")]
    Interrupted,
}

impl PublishError {
    pub fn kind(&self) -> PublishErrorKind {
        match self {
            PublishError::Serialization(_) => PublishErrorKind::Serialization,
            PublishError::Timeout(_) => PublishErrorKind::Timeout,
            PublishError::Rejected(_) | PublishError::Cancelled | PublishError::Interrupted => {
                PublishErrorKind::Publish
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == PublishErrorKind::Timeout
    }
}

impl From<BrokerError> for PublishError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Cancelled => PublishError::Cancelled,
            other => PublishError::Rejected(other.to_string()),
        }
    }
}
