//! Status HTTP endpoint
//!
//! Answers `GET /` with the program name and version so that supervisors can
//! check the agent is alive. Every other request gets a 404.

use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// HTTP server reporting that the agent is running
pub struct StatusServer {
    listener: TcpListener,
}

impl StatusServer {
    /// Binds the listening socket
    ///
    /// # Arguments
    /// * `endpoint` - Address to bind, e.g. `"127.0.0.1:8080"`
    pub async fn bind(endpoint: &str) -> anyhow::Result<Self> {
        let addr: SocketAddr = endpoint.parse()?;
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves requests until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        info!(addr = ?self.listener.local_addr().ok(), "Status server listening");

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    let (stream, peer) = result?;
                    debug!(%peer, "Status connection");
                    let io = TokioIo::new(stream);

                    tokio::spawn(async move {
                        let service = service_fn(|req| async move { handle_request(req) });
                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            error!(error = %e, "Status HTTP connection error");
                        }
                    });
                }
                _ = shutdown.cancelled() => {
                    info!("Status server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    if req.method() == Method::GET && req.uri().path() == "/" {
        let body = format!("putsync {}", env!("CARGO_PKG_VERSION"));
        return Ok(Response::new(Full::new(Bytes::from(body))));
    }

    let mut response = Response::new(Full::new(Bytes::from_static(b"Not Found")));
    *response.status_mut() = StatusCode::NOT_FOUND;
    Ok(response)
}
