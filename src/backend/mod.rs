//! 演示后端：在 B 上提供明文与 HTTPS 两个最小 HTTP 服务
//!
//! 与隧道核心相互独立，只用来让整条链路可以端到端跑起来。HTTP 协议由 axum
//! 处理，所有路径都落到同一个兜底处理函数，再交给 [`RouteTable`] 分发。

mod hwaddr;
mod router;

pub use hwaddr::hardware_address;
pub use router::{Handler, Request, RouteError, RouteTable, RouteTableBuilder, Scheme};

use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::rustls;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::config::BackendConfig;
use crate::error::{Result, TunnelError};

/// TLS 握手的最长等待时间
const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// accept 出错后的退避时间
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// 构建演示路由表：`/` 返回本机网卡硬件地址
pub fn default_routes(interface: &str) -> std::result::Result<RouteTable, RouteError> {
    let interface = interface.to_string();
    let table = RouteTable::builder()
        .route("/", move |req| {
            let addr = hardware_address(&interface).unwrap_or_else(|e| e.to_string());
            format!("{} B mac address: {}", req.scheme, addr)
        })?
        .build();
    Ok(table)
}

#[derive(Clone)]
struct BackendState {
    routes: RouteTable,
    scheme: Scheme,
}

/// 一个监听器上的 axum 应用，所有请求都经过路由表
pub fn backend_router(routes: RouteTable, scheme: Scheme) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(BackendState { routes, scheme })
}

async fn dispatch(State(state): State<BackendState>, method: Method, uri: Uri) -> Response {
    let req = Request::from_http(&method, &uri, state.scheme);

    let (status, body) = match state.routes.resolve(&req.path) {
        Ok(handler) => (StatusCode::OK, handler(&req)),
        Err(e) => {
            debug!("{} {} request for {} rejected: {}", state.scheme, req.method, req.path, e);
            (StatusCode::NOT_FOUND, e.to_string())
        }
    };

    (
        status,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CONNECTION, "close"),
        ],
        body,
    )
        .into_response()
}

/// 在 accept 时完成 TLS 握手的监听器，握手失败的连接直接丢弃
pub struct TlsListener {
    inner: TcpListener,
    acceptor: TlsAcceptor,
}

impl TlsListener {
    pub fn new(inner: TcpListener, acceptor: TlsAcceptor) -> Self {
        Self { inner, acceptor }
    }
}

impl axum::serve::Listener for TlsListener {
    type Io = TlsStream<TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            let (stream, peer) = match self.inner.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Secure backend accept error: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let handshake = tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, self.acceptor.accept(stream));
            match handshake.await {
                Ok(Ok(tls)) => return (tls, peer),
                Ok(Err(e)) => warn!("TLS handshake with {} failed: {}", peer, e),
                Err(_) => warn!("TLS handshake with {} timed out", peer),
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

/// 明文 HTTP 服务
pub async fn serve_plain(listener: TcpListener, routes: RouteTable) -> Result<()> {
    axum::serve(listener, backend_router(routes, Scheme::Http)).await?;
    Ok(())
}

/// HTTPS 服务
pub async fn serve_secure(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    routes: RouteTable,
) -> Result<()> {
    let listener = TlsListener::new(listener, acceptor);
    axum::serve(listener, backend_router(routes, Scheme::Https)).await?;
    Ok(())
}

/// 运行演示后端
pub async fn run_backend(config: BackendConfig, tls: Arc<rustls::ServerConfig>) -> Result<()> {
    let routes = default_routes(&config.interface)?;

    let plain_addr = format!("{}:{}", config.bind_addr, config.plain_port);
    let secure_addr = format!("{}:{}", config.bind_addr, config.secure_port);

    let plain = TcpListener::bind(&plain_addr)
        .await
        .map_err(|e| TunnelError::bind_failed(&plain_addr, e))?;
    let secure = TcpListener::bind(&secure_addr)
        .await
        .map_err(|e| TunnelError::bind_failed(&secure_addr, e))?;

    info!(
        "Demo backend serving http on {} and https on {} (interface {})",
        plain_addr, secure_addr, config.interface
    );

    let acceptor = TlsAcceptor::from(tls);

    tokio::select! {
        result = serve_plain(plain, routes.clone()) => result,
        result = serve_secure(secure, acceptor, routes) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, stopping backend...");
            Ok(())
        }
    }
}
