// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod envelope;
pub mod errors;
pub mod http_utils;
pub mod ingestion_service;
pub mod intake_server;
pub mod log_broker;
pub mod payload_parser;
pub mod publisher;
pub mod recent_buffer;
pub mod recent_consumer;
