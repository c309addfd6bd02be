mod common;

use bytes::Bytes;
use common::RecordingStateMachine;
use hyper::{Body, Client, Method, Request, StatusCode};
use raft_proxy::{HttpOptions, RaftNetwork, RaftNode, RaftNodeConfig};
use std::net::SocketAddr;
use tokio::time::{Duration, Instant};

const RAFT_PORT_BASE: u16 = 17170;
const APP_PORT_BASE: u16 = 17190;
const ROUTER_PORT_BASE: u16 = 17180;
const CONVERGE_TIMEOUT: Duration = Duration::from_secs(15);

async fn post(
    client: &Client<hyper::client::HttpConnector>,
    addr: SocketAddr,
    body: &'static str,
) -> (StatusCode, Bytes) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("http://{}/commands", addr))
        .body(Body::from(body))
        .expect("Valid request");
    match client.request(request).await {
        Ok(response) => {
            let status = response.status();
            let body = hyper::body::to_bytes(response.into_body()).await.unwrap_or_default();
            (status, body)
        }
        Err(_) => (StatusCode::BAD_GATEWAY, Bytes::new()),
    }
}

/// Retries through `router` until the write commits.
async fn post_until_ok(client: &Client<hyper::client::HttpConnector>, router: SocketAddr, body: &'static str) {
    let deadline = Instant::now() + CONVERGE_TIMEOUT;
    loop {
        let (status, response_body) = post(client, router, body).await;
        if status == StatusCode::OK {
            assert_eq!(response_body, Bytes::from(body));
            return;
        }
        assert!(Instant::now() < deadline, "Router {} never committed {:?}, last status {}", router, body, status);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test]
async fn routers_follow_the_leader_across_failover() {
    let logger = common::create_root_logger_for_stdout();
    let members = common::members(3, RAFT_PORT_BASE, APP_PORT_BASE);

    let mut nodes: Vec<Option<RaftNode>> = Vec::new();
    let mut applied = Vec::new();
    for i in 0..3 {
        let (state_machine, applied_log) = RecordingStateMachine::new();
        let mut config = RaftNodeConfig::new(common::repl_id(i), members.clone(), logger.clone());
        config.bootstrap = i == 0;
        config.options = common::fast_options();
        config.state_machine = Box::new(state_machine);
        config.network = RaftNetwork::Grpc;
        config.http = Some(HttpOptions {
            router_addr: common::localhost(ROUTER_PORT_BASE + i as u16),
        });
        let node = raft_proxy::try_create_raft_node(config)
            .await
            .expect("Failed to create raft node");
        nodes.push(Some(node));
        applied.push(applied_log);
    }
    let routers: Vec<SocketAddr> = nodes
        .iter()
        .map(|n| n.as_ref().and_then(|n| n.router_addr()).expect("Router is enabled"))
        .collect();
    let client = Client::new();

    let (leader, _) = common::wait_for_stable_leader(&nodes, &[0, 1, 2], CONVERGE_TIMEOUT).await;
    assert_eq!(leader, 0);

    // Every router, leader's or not, ends up at the leader's app endpoint.
    post_until_ok(&client, routers[0], "through-leader").await;
    post_until_ok(&client, routers[2], "through-follower").await;
    common::eventually("followers track the leader", CONVERGE_TIMEOUT, || {
        let tracked = nodes.iter().flatten().all(|n| n.proxy_target().current() == Some(members[0].app_addr));
        async move { tracked }
    })
    .await;

    // A follower's own app endpoint refuses writes and names the leader.
    let direct = Request::builder()
        .method(Method::POST)
        .uri(format!("http://{}/", members[1].app_addr))
        .body(Body::from("direct"))
        .expect("Valid request");
    let response = client.request(direct).await.expect("App endpoint is up");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        response.headers().get("x-raft-leader").and_then(|v| v.to_str().ok()),
        Some(members[0].app_addr.to_string().as_str())
    );

    nodes[0] = None;

    let (new_leader, _) = common::wait_for_stable_leader(&nodes, &[1, 2], CONVERGE_TIMEOUT).await;
    let follower = if new_leader == 1 { 2 } else { 1 };
    post_until_ok(&client, routers[follower], "after-failover").await;

    let after = Bytes::from("after-failover");
    common::eventually("write applied on survivors", CONVERGE_TIMEOUT, || {
        let done = common::has_applied(&applied[1], &after) && common::has_applied(&applied[2], &after);
        async move { done }
    })
    .await;
    assert_eq!(
        nodes[follower].as_ref().and_then(|n| n.proxy_target().current()),
        Some(members[new_leader].app_addr)
    );
}
