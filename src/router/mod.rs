mod app_server;
mod http_server;
mod leader_tracker;
mod proxy;

pub(crate) use app_server::ApplicationServer;
pub(crate) use http_server::serve_http;
pub(crate) use http_server::HttpServerHandle;
pub use http_server::RouterError;
pub(crate) use leader_tracker::LeaderTracker;
pub use leader_tracker::ProxyTarget;
pub(crate) use proxy::RequestRouter;
