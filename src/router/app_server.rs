use crate::api::{EnqueueEntryError, EnqueueEntryInput, ReplicatedLog};
use crate::replica::StateMachineOutput;
use crate::router::http_server::HttpHandler;
use crate::router::proxy::status_response;
use hyper::header::HeaderValue;
use hyper::{Body, Request, Response, StatusCode};
use std::net::SocketAddr;

const X_RAFT_LEADER: &str = "x-raft-leader";

/// ApplicationServer is the leader-side endpoint the router forwards to. Every request body is
/// committed through the replicated log as one command.
pub(crate) struct ApplicationServer {
    logger: slog::Logger,
    replicated_log: ReplicatedLog,
}

impl ApplicationServer {
    pub(crate) fn new(logger: slog::Logger, replicated_log: ReplicatedLog) -> Self {
        ApplicationServer { logger, replicated_log }
    }

    async fn commit(&self, request: Request<Body>) -> Response<Body> {
        let data = match hyper::body::to_bytes(request.into_body()).await {
            Ok(data) => data,
            Err(e) => {
                slog::info!(self.logger, "Failed to read request body: {:?}", e);
                return status_response(StatusCode::BAD_REQUEST);
            }
        };

        match self.replicated_log.enqueue_entry(EnqueueEntryInput { data }).await {
            Ok(output) => {
                slog::debug!(self.logger, "Committed {:?}", output.entry_id);
                let body = match output.output {
                    StateMachineOutput::Data(data) => Body::from(data),
                    StateMachineOutput::NoData => Body::empty(),
                };
                Response::new(body)
            }
            Err(EnqueueEntryError::LeaderRedirect(leader)) => {
                let mut response = status_response(StatusCode::SERVICE_UNAVAILABLE);
                if let Ok(value) = HeaderValue::from_str(&leader.app_addr.to_string()) {
                    response.headers_mut().insert(X_RAFT_LEADER, value);
                }
                response
            }
            Err(EnqueueEntryError::NoLeader) | Err(EnqueueEntryError::LeadershipLost) => {
                status_response(StatusCode::SERVICE_UNAVAILABLE)
            }
            Err(e @ EnqueueEntryError::LocalIoError(_)) | Err(e @ EnqueueEntryError::ReplicaExited) => {
                slog::error!(self.logger, "Failed to commit request: {:?}", e);
                status_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

#[async_trait::async_trait]
impl HttpHandler for ApplicationServer {
    async fn handle(&self, request: Request<Body>, _remote_addr: SocketAddr) -> Response<Body> {
        self.commit(request).await
    }
}
