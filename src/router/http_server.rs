use crate::server::{shutdown_signal, ServerShutdownHandle};
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

/// HttpHandler answers every request on one listening endpoint. It never fails; errors are
/// expressed as HTTP statuses.
#[async_trait::async_trait]
pub(crate) trait HttpHandler: Send + Sync + 'static {
    async fn handle(&self, request: Request<Body>, remote_addr: SocketAddr) -> Response<Body>;
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("Failed to bind HTTP endpoint {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: hyper::Error,
    },
}

/// Running HTTP server. Dropping this stops accepting connections and lets in-flight requests
/// finish.
pub(crate) struct HttpServerHandle {
    local_addr: SocketAddr,
    _shutdown: ServerShutdownHandle,
}

impl HttpServerHandle {
    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Binds `addr` now, so the caller learns about an unavailable port, and serves on a background
/// task.
pub(crate) fn serve_http<H>(logger: slog::Logger, addr: SocketAddr, handler: H) -> Result<HttpServerHandle, RouterError>
where
    H: HttpHandler,
{
    let handler = Arc::new(handler);
    let make_service = make_service_fn(move |conn: &AddrStream| {
        let handler = handler.clone();
        let remote_addr = conn.remote_addr();
        async move {
            Ok::<_, Infallible>(service_fn(move |request| {
                let handler = handler.clone();
                async move { Ok::<_, Infallible>(handler.handle(request, remote_addr).await) }
            }))
        }
    });

    let server = Server::try_bind(&addr)
        .map_err(|source| RouterError::Bind { addr, source })?
        .serve(make_service);
    let local_addr = server.local_addr();

    let (shutdown_handle, shutdown_signal) = shutdown_signal();
    let server = server.with_graceful_shutdown(shutdown_signal);
    slog::info!(logger, "HTTP listening on '{:?}'", local_addr);
    tokio::spawn(async move {
        match server.await {
            Ok(()) => slog::info!(logger, "HTTP server on '{:?}' has exited", local_addr),
            Err(e) => slog::error!(logger, "HTTP server on '{:?}' failed: {:?}", local_addr, e),
        }
    });

    Ok(HttpServerHandle {
        local_addr,
        _shutdown: shutdown_handle,
    })
}
