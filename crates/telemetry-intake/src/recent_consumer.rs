// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::log_broker::BrokerSubscription;
use crate::recent_buffer::RecentEventBuffer;

/// Background task feeding the records delivered on a broker subscription into a
/// [`RecentEventBuffer`].
pub struct RecentEventConsumer {
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RecentEventConsumer {
    /// Spawns the consumer task on the current Tokio runtime.
    pub fn start(subscription: BrokerSubscription, buffer: Arc<RecentEventBuffer>) -> Self {
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(Self::consume(subscription, buffer, cancel_token.clone()));
        RecentEventConsumer {
            cancel_token,
            handle: Some(handle),
        }
    }

    async fn consume(
        mut subscription: BrokerSubscription,
        buffer: Arc<RecentEventBuffer>,
        cancel_token: CancellationToken,
    ) {
        debug!("Recent event consumer started on {}", subscription.topic());
        loop {
            let payload = tokio::select! {
                _ = cancel_token.cancelled() => break,
                payload = subscription.recv() => payload,
            };
            match payload {
                Some(payload) => buffer.record(payload),
                None => {
                    error!(
                        "Subscription to {} closed by the broker",
                        subscription.topic()
                    );
                    break;
                }
            }
        }
        debug!("Recent event consumer stopped");
    }

    /// Resolves when the task exits on its own, which only happens when the subscription closes.
    pub async fn finished(&mut self) {
        match self.handle.as_mut() {
            Some(handle) => {
                Self::log_exit(handle.await);
                self.handle = None;
            }
            None => std::future::pending().await,
        }
    }

    /// Cancels the task and waits for it to exit.
    pub async fn stop(mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.take() {
            Self::log_exit(handle.await);
        }
    }

    fn log_exit(result: Result<(), tokio::task::JoinError>) {
        if let Err(e) = result {
            error!("Recent event consumer task failed: {e:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn test_records_delivered_payloads_in_order() {
        let (tx, rx) = mpsc::channel(8);
        let buffer = Arc::new(RecentEventBuffer::new(2));
        let consumer = RecentEventConsumer::start(BrokerSubscription::new("t", rx), buffer.clone());

        for payload in ["a", "b", "c"] {
            tx.send(payload.to_string()).await.unwrap();
        }
        tokio::time::timeout(Duration::from_secs(2), async {
            while buffer.snapshot() != vec!["b", "c"] {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert!(!consumer.handle.as_ref().unwrap().is_finished());
        consumer.stop().await;
    }

    #[tokio::test]
    async fn test_stop_ends_the_task() {
        let (_tx, rx) = mpsc::channel::<String>(1);
        let buffer = Arc::new(RecentEventBuffer::default());
        let consumer = RecentEventConsumer::start(BrokerSubscription::new("t", rx), buffer);
        consumer.stop().await;
    }

    #[tokio::test]
    async fn test_task_ends_when_subscription_closes() {
        let (tx, rx) = mpsc::channel(1);
        let buffer = Arc::new(RecentEventBuffer::default());
        let mut consumer =
            RecentEventConsumer::start(BrokerSubscription::new("t", rx), buffer.clone());

        tx.send("last".to_string()).await.unwrap();
        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), consumer.finished())
            .await
            .unwrap();

        assert!(consumer.handle.is_none());
        assert_eq!(buffer.snapshot(), vec!["last"]);
    }
}
