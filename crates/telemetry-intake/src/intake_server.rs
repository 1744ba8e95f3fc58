// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::service::service_fn;
use hyper::{http, Method, Request, StatusCode};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::http_utils::{
    create_empty_http_response, create_json_http_response, log_and_create_http_response,
    verify_request_content_length, HttpResponse,
};
use crate::ingestion_service::IngestionService;

pub const PUBLISH_ENDPOINT_PATH: &str = "/api/telemetry/publish";
pub const RECENT_ENDPOINT_PATH: &str = "/api/telemetry/recent";
pub const HEALTH_ENDPOINT_PATH: &str = "/actuator/health";

const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct IntakeServer {
    pub config: Arc<Config>,
    pub ingestion_service: Arc<IngestionService>,
}

impl IntakeServer {
    /// Binds the configured port on all interfaces and serves until `shutdown` is cancelled. Open
    /// connections then get to finish their current request before this returns.
    pub async fn start_intake_server(
        &self,
        shutdown: CancellationToken,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = TcpListener::bind(&addr).await?;
        info!("Telemetry intake listening on port {}", self.config.port);
        self.serve(listener, shutdown).await
    }

    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let config = self.config.clone();
        let ingestion_service = self.ingestion_service.clone();

        let service = service_fn(move |req: Request<hyper::body::Incoming>| {
            // called for each http request
            let config = config.clone();
            let ingestion_service = ingestion_service.clone();
            Self::endpoint_handler(config, ingestion_service, req)
        });

        Self::serve_tcp(listener, service, shutdown).await
    }

    async fn serve_tcp<S>(
        listener: TcpListener,
        service: S,
        shutdown: CancellationToken,
    ) -> Result<(), Box<dyn Error + Send + Sync>>
    where
        S: hyper::service::Service<Request<hyper::body::Incoming>, Response = HttpResponse>
            + Clone
            + Send
            + 'static,
        S::Future: Send,
        S::Error: Error + Send + Sync + 'static,
    {
        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        loop {
            let conn = tokio::select! {
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(e.into());
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        // Don't kill server on panic - log and continue
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
                _ = shutdown.cancelled() => break,
            };
            let conn = hyper_util::rt::TokioIo::new(conn);
            let server = server.clone();
            let service = service.clone();
            let shutdown = shutdown.clone();
            joinset.spawn(async move {
                let conn = server.serve_connection(conn, service);
                tokio::pin!(conn);
                let res = tokio::select! {
                    res = conn.as_mut() => res,
                    _ = shutdown.cancelled() => {
                        // answers the request in flight, then closes
                        conn.as_mut().graceful_shutdown();
                        conn.await
                    }
                };
                if let Err(e) = res {
                    error!("Connection error: {e}");
                }
            });
        }

        drop(listener);
        debug!(
            "Telemetry intake shutting down, draining {} open connections",
            joinset.len()
        );
        let drained = tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, async {
            while let Some(finished) = joinset.join_next().await {
                if let Err(e) = finished {
                    if e.is_panic() {
                        error!("Connection handler panicked: {:?}", e);
                    }
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                "Telemetry intake did not drain within {} ms, aborting {} connections",
                SHUTDOWN_DRAIN_TIMEOUT.as_millis(),
                joinset.len()
            );
        }
        Ok(())
    }

    pub(crate) async fn endpoint_handler<B>(
        config: Arc<Config>,
        ingestion_service: Arc<IngestionService>,
        req: Request<B>,
    ) -> http::Result<HttpResponse>
    where
        B: Body,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        match (req.method(), req.uri().path()) {
            (&Method::POST, PUBLISH_ENDPOINT_PATH) => {
                Self::publish_handler(config, ingestion_service, req).await
            }
            (&Method::GET, RECENT_ENDPOINT_PATH) => {
                create_json_http_response(&json!(ingestion_service.recent()), StatusCode::OK)
            }
            (&Method::GET, HEALTH_ENDPOINT_PATH) => {
                create_json_http_response(&json!({ "status": "UP" }), StatusCode::OK)
            }
            _ => create_empty_http_response(StatusCode::NOT_FOUND),
        }
    }

    async fn publish_handler<B>(
        config: Arc<Config>,
        ingestion_service: Arc<IngestionService>,
        req: Request<B>,
    ) -> http::Result<HttpResponse>
    where
        B: Body,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        debug!("Received telemetry to publish");
        let (parts, body) = req.into_parts();
        if let Some(response) = verify_request_content_length(
            &parts.headers,
            config.max_request_content_length,
            "Error publishing telemetry",
        ) {
            return response;
        }

        // the header check above does not cover chunked bodies
        let body_bytes = match Limited::new(body, config.max_request_content_length)
            .collect()
            .await
        {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                return log_and_create_http_response(
                    "Error publishing telemetry: Payload too large",
                    StatusCode::PAYLOAD_TOO_LARGE,
                );
            }
            Err(e) => {
                return log_and_create_http_response(
                    &format!("Error reading telemetry request body: {e}"),
                    StatusCode::BAD_REQUEST,
                );
            }
        };

        let raw_body = String::from_utf8_lossy(&body_bytes);
        let raw_body = (!body_bytes.is_empty()).then_some(raw_body.as_ref());

        match ingestion_service.ingest(raw_body).await {
            Ok(()) => create_empty_http_response(StatusCode::ACCEPTED),
            Err(err) => {
                let status = if err.is_timeout() {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                log_and_create_http_response(&format!("Error publishing telemetry: {err}"), status)
            }
        }
    }
}
