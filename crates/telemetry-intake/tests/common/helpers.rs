// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use telemetry_intake::{
    config::Config, ingestion_service::IngestionService, intake_server::IntakeServer,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// A running intake bound to an ephemeral local port.
pub struct RunningIntake {
    pub addr: SocketAddr,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<()>,
}

impl RunningIntake {
    pub async fn stop(self) {
        self.shutdown.cancel();
        let _ = timeout(Duration::from_secs(2), self.handle).await;
    }
}

pub async fn start_intake(
    config: Config,
    ingestion_service: Arc<IngestionService>,
) -> RunningIntake {
    start_intake_with_shutdown(config, ingestion_service, CancellationToken::new()).await
}

/// Like [`start_intake`], stopping when `shutdown` is cancelled.
pub async fn start_intake_with_shutdown(
    config: Config,
    ingestion_service: Arc<IngestionService>,
    shutdown: CancellationToken,
) -> RunningIntake {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind intake listener");
    let addr = listener.local_addr().expect("Failed to get local addr");

    let server = IntakeServer {
        config: Arc::new(config),
        ingestion_service,
    };
    let server_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move {
        if let Err(e) = server.serve(listener, server_shutdown).await {
            panic!("Intake server failed: {e}");
        }
    });

    RunningIntake {
        addr,
        shutdown,
        handle,
    }
}

/// Send an HTTP request over TCP and return the response
pub async fn send_tcp_request(
    addr: SocketAddr,
    uri: &str,
    method: &str,
    content_type: &str,
    body: Option<Vec<u8>>,
) -> Result<Response<hyper::body::Incoming>, Box<dyn std::error::Error>> {
    let stream = timeout(Duration::from_secs(2), tokio::net::TcpStream::connect(addr)).await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let mut request_builder = Request::builder()
        .uri(uri)
        .method(method)
        .header("Host", addr.to_string())
        .header("Content-Type", content_type);

    let response = if let Some(body_data) = body {
        let body_len = body_data.len();
        request_builder = request_builder.header("Content-Length", body_len.to_string());
        let request = request_builder.body(Full::new(Bytes::from(body_data)))?;
        timeout(Duration::from_secs(2), sender.send_request(request)).await??
    } else {
        let request = request_builder.body(Full::new(Bytes::new()))?;
        timeout(Duration::from_secs(2), sender.send_request(request)).await??
    };

    Ok(response)
}

pub async fn read_body(response: Response<hyper::body::Incoming>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("Response body is not UTF-8")
}
