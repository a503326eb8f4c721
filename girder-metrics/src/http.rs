//! HTTP exposition endpoint.
//!
//! Serves a registry's rendered metrics at `/metrics`; every other path is
//! a 404.

use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use crate::error::{MetricsError, Result};
use crate::registry::Registry;

/// Content type of the Prometheus text exposition format.
const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

/// A bound but not yet serving metrics endpoint.
///
/// Binding separately from serving lets callers bind port 0 and read the
/// assigned address before the accept loop starts.
pub struct MetricsServer {
    listener: TcpListener,
    registry: Registry,
}

impl MetricsServer {
    /// Bind the endpoint without serving yet.
    pub async fn bind(registry: Registry, addr: SocketAddr) -> Result<MetricsServer> {
        let listener = TcpListener::bind(addr).await.map_err(MetricsError::Bind)?;
        Ok(MetricsServer { listener, registry })
    }

    /// The address the endpoint is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(MetricsError::Bind)
    }

    /// Accept and serve connections until the task is dropped.
    pub async fn serve(self) -> Result<()> {
        loop {
            let (stream, _) = self
                .listener
                .accept()
                .await
                .map_err(MetricsError::Accept)?;
            let io = TokioIo::new(stream);
            let registry = self.registry.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let registry = registry.clone();
                    async move { Ok::<_, std::convert::Infallible>(handle(&req, &registry)) }
                });
                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::debug!("metrics connection error: {err}");
                }
            });
        }
    }
}

/// Bind and serve in one call.
pub async fn run_metrics_server(registry: Registry, addr: SocketAddr) -> Result<()> {
    MetricsServer::bind(registry, addr).await?.serve().await
}

fn handle(req: &Request<Incoming>, registry: &Registry) -> Response<Full<Bytes>> {
    if req.method() == Method::GET && req.uri().path() == "/metrics" {
        let mut response = Response::new(Full::new(Bytes::from(registry.render())));
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_FORMAT));
        response
    } else {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::NOT_FOUND;
        response
    }
}
