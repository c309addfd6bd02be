use bytes::Bytes;
use raft_proxy::{
    HttpOptions, RaftMemberInfo, RaftNetwork, RaftNode, RaftNodeConfig, RaftOptions, StateMachine, StateMachineOutput,
};
use slog::Drain;
use std::error::Error;
use std::net::SocketAddr;

const NUM_MEMBERS: u16 = 3;

/// Appends every command to a journal and replies with the command's position in it.
struct Journal {
    entries: Vec<Bytes>,
}

impl StateMachine for Journal {
    fn apply(&mut self, command: Bytes) -> StateMachineOutput {
        self.entries.push(command);
        StateMachineOutput::Data(Bytes::from(format!("{}\n", self.entries.len())))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let root_logger = create_root_logger();
    let members: Vec<RaftMemberInfo> = (0..NUM_MEMBERS).map(member_info).collect();

    let mut nodes: Vec<RaftNode> = Vec::with_capacity(members.len());
    for i in 0..NUM_MEMBERS {
        let mut config = RaftNodeConfig::new(repl_id(i), members.clone(), root_logger.clone());
        config.bootstrap = i == 0;
        config.options = RaftOptions::default();
        config.state_machine = Box::new(Journal { entries: Vec::new() });
        config.network = RaftNetwork::Grpc;
        config.http = Some(HttpOptions {
            router_addr: addr(8080 + i),
        });
        nodes.push(raft_proxy::try_create_raft_node(config).await?);
    }

    slog::info!(
        root_logger,
        "Cluster of {} is up. Send requests to any router, e.g. `curl -d hello http://127.0.0.1:8080/`",
        NUM_MEMBERS
    );
    tokio::signal::ctrl_c().await?;
    slog::info!(root_logger, "Shutting down");
    drop(nodes);

    Ok(())
}

fn repl_id(i: u16) -> String {
    format!("replica-{}", i)
}

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn member_info(i: u16) -> RaftMemberInfo {
    RaftMemberInfo {
        replica_id: repl_id(i),
        raft_addr: addr(7070 + i),
        app_addr: addr(9090 + i),
    }
}

fn create_root_logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!())
}
