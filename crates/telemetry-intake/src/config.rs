// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::recent_buffer::DEFAULT_RECENT_CAPACITY;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_BROKER_URL: &str = "localhost:9092";
const DEFAULT_TOPIC: &str = "telemetry-events";
const DEFAULT_CONSUMER_GROUP: &str = "telemetry-consumer";
const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 5000;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone)]
pub struct Config {
    /// Selects the log broker publisher; otherwise events are discarded after parsing.
    pub broker_enabled: bool,
    /// `memory://` or a Kafka bootstrap server list
    pub broker_url: String,
    pub topic: String,
    pub consumer_group: String,
    pub port: u16,
    /// how long a publish waits for the broker to acknowledge delivery
    pub publish_timeout: Duration,
    pub recent_capacity: usize,
    pub max_request_content_length: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            broker_enabled: false,
            broker_url: DEFAULT_BROKER_URL.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            consumer_group: DEFAULT_CONSUMER_GROUP.to_string(),
            port: DEFAULT_PORT,
            publish_timeout: Duration::from_millis(DEFAULT_PUBLISH_TIMEOUT_MS),
            recent_capacity: DEFAULT_RECENT_CAPACITY,
            max_request_content_length: 10 * 1024 * 1024, // 10MB in Bytes
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    pub fn new() -> Result<Config, Box<dyn std::error::Error>> {
        let defaults = Config::default();

        let broker_enabled = env::var("TELEMETRY_BROKER_ENABLED")
            .map(|val| matches!(val.trim().to_lowercase().as_str(), "true" | "1"))
            .unwrap_or(defaults.broker_enabled);

        let topic = env::var("TELEMETRY_TOPIC").unwrap_or(defaults.topic);
        if topic.trim().is_empty() {
            return Err(anyhow::anyhow!("TELEMETRY_TOPIC must not be empty").into());
        }

        let recent_capacity =
            parse_env_var("TELEMETRY_RECENT_CAPACITY")?.unwrap_or(defaults.recent_capacity);
        if recent_capacity == 0 {
            return Err(anyhow::anyhow!("TELEMETRY_RECENT_CAPACITY must be greater than 0").into());
        }

        let publish_timeout = parse_env_var::<u64>("TELEMETRY_PUBLISH_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.publish_timeout);

        Ok(Config {
            broker_enabled,
            broker_url: env::var("TELEMETRY_BROKER_URL").unwrap_or(defaults.broker_url),
            topic,
            consumer_group: env::var("TELEMETRY_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            port: parse_env_var("TELEMETRY_PORT")?.unwrap_or(defaults.port),
            publish_timeout,
            recent_capacity,
            max_request_content_length: defaults.max_request_content_length,
            log_level: env::var("TELEMETRY_LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or(defaults.log_level),
        })
    }
}

fn parse_env_var<T: FromStr>(name: &str) -> anyhow::Result<Option<T>> {
    match env::var(name) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("Invalid value for {name}: {val}")),
        Err(_) => Ok(None),
    }
}
