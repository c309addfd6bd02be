use crate::actor::WeakActorClient;
use crate::grpc::grpc_raft_server::{GrpcRaft, GrpcRaftServer};
use crate::grpc::{ProtoAppendEntriesReq, ProtoAppendEntriesResult, ProtoRequestVoteReq, ProtoRequestVoteResult};
use crate::replica::AppendEntriesError;
use crate::server::ServerShutdownSignal;
use crate::transport;
use std::net::SocketAddr;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

/// RpcServer is the type that implements the Raft gRPC interface.
pub(crate) struct RpcServer {
    logger: slog::Logger,
    local_replica: WeakActorClient,
}

impl RpcServer {
    pub(crate) fn new(logger: slog::Logger, local_replica: WeakActorClient) -> Self {
        RpcServer { logger, local_replica }
    }

    pub(crate) async fn run(self, socket_addr: SocketAddr, shutdown_signal: ServerShutdownSignal) {
        let logger = self.logger.clone();
        slog::info!(logger, "Listening on '{:?}'", socket_addr);

        let result = Server::builder()
            .add_service(GrpcRaftServer::new(self))
            .serve_with_shutdown(socket_addr, shutdown_signal)
            .await;

        match result {
            Ok(()) => slog::info!(logger, "Server run() has exited"),
            Err(e) => slog::error!(logger, "Server run() has exited with error: {:?}", e),
        }
    }

    async fn handle_request_vote(&self, rpc_request: ProtoRequestVoteReq) -> Result<ProtoRequestVoteResult, Status> {
        let app_input =
            transport::request_vote_from_proto(rpc_request).map_err(|e| Status::invalid_argument(e.0))?;
        let app_output = self
            .local_replica
            .request_vote(app_input)
            .await
            .map_err(|_| Status::unavailable("Replica has exited"))?;
        Ok(transport::request_vote_output_to_proto(app_output))
    }

    async fn handle_append_entries(
        &self,
        rpc_request: ProtoAppendEntriesReq,
    ) -> Result<ProtoAppendEntriesResult, Status> {
        let app_input =
            transport::append_entries_from_proto(rpc_request).map_err(|e| Status::invalid_argument(e.0))?;
        match self.local_replica.append_entries(app_input).await {
            Ok(app_output) => Ok(transport::append_entries_output_to_proto(app_output)),
            Err(AppendEntriesError::ServerIoError(e)) => {
                slog::warn!(self.logger, "Failed to handle AppendEntries: {:?}", e);
                Err(Status::internal(format!("Local IO failure: {}", e)))
            }
            Err(AppendEntriesError::ActorExited) => Err(Status::unavailable("Replica has exited")),
        }
    }
}

#[tonic::async_trait]
impl GrpcRaft for RpcServer {
    async fn request_vote(
        &self,
        request: Request<ProtoRequestVoteReq>,
    ) -> Result<Response<ProtoRequestVoteResult>, Status> {
        let reply = self.handle_request_vote(request.into_inner()).await?;
        Ok(Response::new(reply))
    }

    async fn append_entries(
        &self,
        request: Request<ProtoAppendEntriesReq>,
    ) -> Result<Response<ProtoAppendEntriesResult>, Status> {
        let reply = self.handle_append_entries(request.into_inner()).await?;
        Ok(Response::new(reply))
    }
}
