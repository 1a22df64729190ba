//! HTTP exposition server
//!
//! Serves the metric snapshot, liveness, and readiness. Read-only: it
//! never mutates collector state, so it can answer at any time, including
//! mid-sweep.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::HeaderValue;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use kilowatch_core::{Error, Result};
use kilowatch_metrics::ExporterMetrics;
use tokio::net::TcpListener;

use crate::shutdown::ShutdownSignal;

/// Prometheus text exposition format, version 0.0.4
const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Exposition HTTP server
#[derive(Debug)]
pub struct ExpositionServer {
    listener: TcpListener,
    metrics: Arc<ExporterMetrics>,
    shutdown: ShutdownSignal,
}

impl ExpositionServer {
    /// Bind the listening socket.
    ///
    /// Binding happens here rather than in [`run`](Self::run) so an occupied
    /// port fails startup instead of a background task.
    pub async fn bind(
        listen: SocketAddr,
        metrics: Arc<ExporterMetrics>,
        shutdown: ShutdownSignal,
    ) -> Result<Self> {
        let listener = TcpListener::bind(listen)
            .await
            .map_err(|e| Error::Runtime(format!("failed to bind {listen}: {e}")))?;

        Ok(Self {
            listener,
            metrics,
            shutdown,
        })
    }

    /// The bound address, useful when binding port 0
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Error::from)
    }

    /// Accept connections until shutdown
    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(listen = %addr, "exposition server listening");
        }

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            tracing::trace!(peer = %addr, "accepted connection");
                            let metrics = Arc::clone(&self.metrics);

                            tokio::spawn(async move {
                                let service = service_fn(move |req| {
                                    let metrics = Arc::clone(&metrics);
                                    async move { respond(req, metrics) }
                                });

                                let io = TokioIo::new(stream);
                                if let Err(e) = hyper::server::conn::http1::Builder::new()
                                    .serve_connection(io, service)
                                    .await
                                {
                                    tracing::debug!(peer = %addr, error = %e, "connection error");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "failed to accept connection");
                        }
                    }
                }

                _ = shutdown_rx.recv() => {
                    tracing::info!("exposition server stopping");
                    break;
                }
            }
        }
    }
}

fn respond(
    req: Request<Incoming>,
    metrics: Arc<ExporterMetrics>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => match metrics.render() {
            Ok(body) => {
                let mut response = Response::new(Full::new(Bytes::from(body)));
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static(EXPOSITION_CONTENT_TYPE),
                );
                response
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to render metrics");
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "encoding error\n")
            }
        },
        (&Method::GET, "/-/healthz") => text_response(StatusCode::OK, "ok\n"),
        (&Method::GET, "/-/ready") => {
            if metrics.is_ready() {
                text_response(StatusCode::OK, "ready\n")
            } else {
                text_response(StatusCode::SERVICE_UNAVAILABLE, "not ready\n")
            }
        }
        (_, "/metrics" | "/-/healthz" | "/-/ready") => {
            text_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n")
        }
        _ => text_response(StatusCode::NOT_FOUND, "not found\n"),
    };

    Ok(response)
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}
