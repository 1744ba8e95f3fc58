// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::payload_parser::{metric_value, subject_id};

/// One ingested telemetry event.
///
/// `subject_id` and `metric_value` are a typed view over `attributes`, which always holds the
/// complete payload the event was built from. The serialized field names are the ones consumers
/// of the topic read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "vehicleId")]
    subject_id: String,
    #[serde(rename = "speedKph")]
    metric_value: f64,
    #[serde(rename = "ts")]
    observed_at: DateTime<Utc>,
    #[serde(rename = "extra")]
    attributes: Map<String, Value>,
}

impl EventEnvelope {
    /// Builds an envelope from a parsed payload, stamped with the current wall clock.
    pub fn from_attributes(attributes: Map<String, Value>) -> Self {
        Self::new(attributes, Utc::now())
    }

    pub fn new(attributes: Map<String, Value>, observed_at: DateTime<Utc>) -> Self {
        EventEnvelope {
            subject_id: subject_id(&attributes),
            metric_value: metric_value(&attributes),
            observed_at,
            attributes,
        }
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn metric_value(&self) -> f64 {
        self.metric_value
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
