//! The mock server and its canned-response map.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use dashmap::DashMap;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{MockServerError, Result};

/// One canned response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: Bytes,
}

/// An HTTP server answering from a map of canned responses.
///
/// The map is shared with the serving task, so responses added or removed
/// after startup take effect immediately.
pub struct MockServer {
    addr: SocketAddr,
    responses: Arc<DashMap<String, MockResponse>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl MockServer {
    /// Bind `127.0.0.1` on an ephemeral port and start serving.
    pub async fn start() -> Result<MockServer> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(MockServerError::Bind)?;
        let addr = listener.local_addr().map_err(MockServerError::Bind)?;
        let responses: Arc<DashMap<String, MockResponse>> = Arc::new(DashMap::new());

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let serving = Arc::clone(&responses);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { break };
                        let io = TokioIo::new(stream);
                        let responses = Arc::clone(&serving);
                        tokio::spawn(async move {
                            let service = service_fn(move |req: Request<Incoming>| {
                                let responses = Arc::clone(&responses);
                                async move {
                                    Ok::<_, std::convert::Infallible>(respond(&req, &responses))
                                }
                            });
                            if let Err(err) =
                                http1::Builder::new().serve_connection(io, service).await
                            {
                                tracing::debug!("mock connection error: {err}");
                            }
                        });
                    }
                }
            }
        });
        tracing::debug!("mock http server listening on {addr}");

        Ok(MockServer {
            addr,
            responses,
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    /// Base address of the server, e.g. `http://127.0.0.1:PORT`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Map `url` (path plus optional query) to a canned response.
    ///
    /// Adding the same URL again overwrites the earlier entry.
    pub fn add_response(&self, url: &str, status: u16, body: impl Into<Bytes>) {
        self.responses.insert(
            url.to_string(),
            MockResponse {
                status,
                body: body.into(),
            },
        );
    }

    /// Remove a canned response; the URL answers 404 again afterwards.
    pub fn remove_response(&self, url: &str) {
        self.responses.remove(url);
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        // Close the accept loop even when close() was never called
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

fn respond(
    req: &Request<Incoming>,
    responses: &DashMap<String, MockResponse>,
) -> Response<Full<Bytes>> {
    let key = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    match responses.get(&key) {
        Some(canned) => {
            let mut response = Response::new(Full::new(canned.body.clone()));
            *response.status_mut() =
                StatusCode::from_u16(canned.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        None => {
            tracing::debug!("no canned response for {key}");
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::NOT_FOUND;
            response
        }
    }
}
