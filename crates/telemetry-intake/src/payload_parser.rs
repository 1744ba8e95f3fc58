// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Lenient decoding of telemetry request bodies.
//!
//! A body is first decoded as a JSON object. When that fails it is read as
//! `application/x-www-form-urlencoded` pairs (`vehicleId=WDB&speedKph=80.5`). Anything that is
//! neither decodes to an empty map: parsing never fails.

use serde_json::{Map, Value};
use tracing::debug;

pub const SUBJECT_ID_KEY: &str = "vehicleId";
pub const METRIC_VALUE_KEY: &str = "speedKph";
pub const UNKNOWN_SUBJECT_ID: &str = "unknown";

/// Decodes a raw request body into an attribute map.
pub fn parse(raw_body: Option<&str>) -> Map<String, Value> {
    let body = match raw_body {
        Some(body) if !body.trim().is_empty() => body,
        _ => return Map::new(),
    };

    match serde_json::from_str::<Map<String, Value>>(body) {
        Ok(attributes) => attributes,
        Err(err) => {
            debug!("Body is not a JSON object ({err}), falling back to form decoding");
            parse_form(body)
        }
    }
}

/// Splits `body` on `&`, then each pair on its first `=`. Pairs without `=` are dropped and a
/// repeated key keeps its last value.
fn parse_form(body: &str) -> Map<String, Value> {
    let mut attributes = Map::new();
    for pair in body.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            attributes.insert(form_decode(key), Value::String(form_decode(value)));
        }
    }
    attributes
}

/// Percent-decodes a form component. `+` is a space; undecodable input is kept as-is.
fn form_decode(component: &str) -> String {
    let component = component.replace('+', " ");
    match urlencoding::decode(&component) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => component,
    }
}

/// String form of the `vehicleId` attribute, or [`UNKNOWN_SUBJECT_ID`] when it is missing.
pub fn subject_id(attributes: &Map<String, Value>) -> String {
    match attributes.get(SUBJECT_ID_KEY) {
        None => UNKNOWN_SUBJECT_ID.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Numeric coercion of the `speedKph` attribute. Numbers pass through, numeric strings are
/// parsed, everything else is `0.0`. The result is always finite, since JSON cannot carry
/// `NaN` or infinities.
pub fn metric_value(attributes: &Map<String, Value>) -> f64 {
    let value = match attributes.get(METRIC_VALUE_KEY) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}
