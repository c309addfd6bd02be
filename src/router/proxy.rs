use crate::router::http_server::HttpHandler;
use crate::router::ProxyTarget;
use hyper::client::HttpConnector;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION};
use hyper::{Body, Client, Request, Response, StatusCode, Uri};
use std::net::{IpAddr, SocketAddr};

const X_FORWARDED_FOR: &str = "x-forwarded-for";

// Per connection, never forwarded (RFC 7230 §6.1).
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// RequestRouter forwards every request to the current leader's application endpoint.
pub(crate) struct RequestRouter {
    logger: slog::Logger,
    target: ProxyTarget,
    client: Client<HttpConnector, Body>,
}

impl RequestRouter {
    pub(crate) fn new(logger: slog::Logger, target: ProxyTarget) -> Self {
        RequestRouter {
            logger,
            target,
            client: Client::new(),
        }
    }

    pub(crate) async fn forward(&self, mut request: Request<Body>, remote_addr: SocketAddr) -> Response<Body> {
        // Read once. A leadership change after this point only affects later requests.
        let target = match self.target.current() {
            Some(target) => target,
            None => return status_response(StatusCode::SERVICE_UNAVAILABLE),
        };

        let uri = match upstream_uri(target, request.uri()) {
            Ok(uri) => uri,
            Err(e) => {
                slog::warn!(self.logger, "Can't build upstream URI for {}: {:?}", request.uri(), e);
                return status_response(StatusCode::BAD_REQUEST);
            }
        };
        slog::debug!(self.logger, "{} {} -> {}", request.method(), request.uri(), target);
        *request.uri_mut() = uri;

        let headers = request.headers_mut();
        strip_hop_by_hop_headers(headers);
        append_forwarded_for(headers, remote_addr.ip());

        match self.client.request(request).await {
            Ok(mut response) => {
                strip_hop_by_hop_headers(response.headers_mut());
                response
            }
            Err(e) => {
                slog::warn!(self.logger, "Upstream {} failed: {:?}", target, e);
                status_response(StatusCode::BAD_GATEWAY)
            }
        }
    }
}

#[async_trait::async_trait]
impl HttpHandler for RequestRouter {
    async fn handle(&self, request: Request<Body>, remote_addr: SocketAddr) -> Response<Body> {
        self.forward(request, remote_addr).await
    }
}

pub(crate) fn status_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::from(status.canonical_reason().unwrap_or("")));
    *response.status_mut() = status;
    response
}

fn upstream_uri(target: SocketAddr, original: &Uri) -> Result<Uri, hyper::http::uri::InvalidUri> {
    let path_and_query = original.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("http://{}{}", target, path_and_query).parse()
}

fn strip_hop_by_hop_headers(headers: &mut HeaderMap) {
    // Connection may name more per-connection headers.
    let listed: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    for name in HOP_BY_HOP_HEADERS.iter() {
        headers.remove(*name);
    }
    for name in listed.iter() {
        headers.remove(name.as_str());
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, client_ip: IpAddr) {
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{}, {}", existing, client_ip),
        None => client_ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(HeaderName::from_static(X_FORWARDED_FOR), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::Term;
    use crate::router::http_server::{serve_http, HttpServerHandle};
    use std::sync::Arc;
    use tokio::sync::Notify;

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn client_addr() -> SocketAddr {
        "10.0.0.7:5555".parse().unwrap()
    }

    /// Replies with its own name, and echoes what the router sent it.
    struct Upstream {
        name: &'static str,
        // If set, wait for this before answering.
        hold: Option<Arc<Notify>>,
    }

    #[async_trait::async_trait]
    impl HttpHandler for Upstream {
        async fn handle(&self, request: Request<Body>, _: SocketAddr) -> Response<Body> {
            if let Some(hold) = &self.hold {
                hold.notified().await;
            }
            let forwarded_for = request
                .headers()
                .get(X_FORWARDED_FOR)
                .map(|v| v.to_str().unwrap().to_string())
                .unwrap_or_default();
            let has_hop_header = request.headers().contains_key("proxy-authorization");
            let (parts, body) = request.into_parts();
            let body = hyper::body::to_bytes(body).await.unwrap();

            Response::builder()
                .status(StatusCode::CREATED)
                .header("x-upstream", self.name)
                .header("x-seen-forwarded-for", forwarded_for)
                .header("x-seen-hop-header", has_hop_header.to_string())
                .header("x-seen-uri", parts.uri.to_string())
                .header("x-seen-method", parts.method.as_str())
                .body(Body::from(body))
                .unwrap()
        }
    }

    fn upstream(name: &'static str, hold: Option<Arc<Notify>>) -> HttpServerHandle {
        serve_http(logger(), "127.0.0.1:0".parse().unwrap(), Upstream { name, hold }).unwrap()
    }

    fn header<'a>(response: &'a Response<Body>, name: &str) -> &'a str {
        response.headers().get(name).unwrap().to_str().unwrap()
    }

    #[tokio::test]
    async fn no_target_is_service_unavailable() {
        let router = RequestRouter::new(logger(), ProxyTarget::new());
        let response = router
            .forward(Request::new(Body::from("ignored")), client_addr())
            .await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], b"Service Unavailable");
    }

    #[tokio::test]
    async fn forwards_request_and_streams_response_back() {
        let leader = upstream("leader", None);
        let target = ProxyTarget::new();
        target.update(Term::new(1), Some(leader.local_addr()));
        let router = RequestRouter::new(logger(), target);

        let request = Request::builder()
            .method("PUT")
            .uri("http://router.local/kv/a?consistent=true")
            .header(X_FORWARDED_FOR, "192.168.1.1")
            .header("proxy-authorization", "secret")
            .body(Body::from("value"))
            .unwrap();
        let response = router.forward(request, client_addr()).await;

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(header(&response, "x-upstream"), "leader");
        assert_eq!(header(&response, "x-seen-method"), "PUT");
        assert_eq!(header(&response, "x-seen-uri"), "/kv/a?consistent=true");
        assert_eq!(header(&response, "x-seen-forwarded-for"), "192.168.1.1, 10.0.0.7");
        assert_eq!(header(&response, "x-seen-hop-header"), "false");
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], b"value");
    }

    #[tokio::test]
    async fn unreachable_target_is_bad_gateway() {
        // Bind then drop, so nothing listens there.
        let addr = upstream("gone", None).local_addr();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let target = ProxyTarget::new();
        target.update(Term::new(1), Some(addr));
        let router = RequestRouter::new(logger(), target);

        let response = router.forward(Request::new(Body::empty()), client_addr()).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn in_flight_request_keeps_target_captured_at_dispatch() {
        let hold = Arc::new(Notify::new());
        let old_leader = upstream("old", Some(hold.clone()));
        let new_leader = upstream("new", None);

        let target = ProxyTarget::new();
        target.update(Term::new(1), Some(old_leader.local_addr()));
        let router = Arc::new(RequestRouter::new(logger(), target.clone()));

        let in_flight = {
            let router = router.clone();
            tokio::spawn(async move { router.forward(Request::new(Body::empty()), client_addr()).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        target.update(Term::new(2), Some(new_leader.local_addr()));
        let next = router.forward(Request::new(Body::empty()), client_addr()).await;
        assert_eq!(header(&next, "x-upstream"), "new");

        hold.notify_one();
        let response = in_flight.await.unwrap();
        assert_eq!(header(&response, "x-upstream"), "old");
    }
}
