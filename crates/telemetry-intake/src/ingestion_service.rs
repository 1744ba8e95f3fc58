// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tracing::debug;

use crate::envelope::EventEnvelope;
use crate::errors::PublishError;
use crate::payload_parser;
use crate::publisher::Publisher;
use crate::recent_buffer::RecentEventBuffer;

/// Turns raw request bodies into envelopes and hands them to the active publisher. Each call is
/// exactly one publish attempt.
pub struct IngestionService {
    publisher: Arc<Publisher>,
    recent: Arc<RecentEventBuffer>,
}

impl IngestionService {
    pub fn new(publisher: Arc<Publisher>, recent: Arc<RecentEventBuffer>) -> Self {
        IngestionService { publisher, recent }
    }

    pub async fn ingest(&self, raw_body: Option<&str>) -> Result<(), PublishError> {
        let attributes = payload_parser::parse(raw_body);
        let envelope = EventEnvelope::from_attributes(attributes);
        debug!(
            "Publishing telemetry event for {} via {} backend",
            envelope.subject_id(),
            self.publisher.backend_name()
        );
        self.publisher.publish(envelope).await
    }

    /// Serialized events most recently delivered by the broker, oldest first.
    pub fn recent(&self) -> Vec<String> {
        self.recent.snapshot()
    }
}
