//! B 端：接受唯一的链路，按服务类别拨号后端并转发

mod backend;

pub use backend::{relay_binding, BackendDialer, BindingEnd, BindingOptions};

use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::error::{Result, TunnelError};
use crate::io_util::is_transient;
use crate::link::Link;
use crate::protocol::{is_sentinel, ServiceClass, CHUNK_SIZE};
use crate::stats::RelayStats;

/// B 端帧循环的共享参数
pub struct RelayContext {
    pub dialer: BackendDialer,
    pub options: BindingOptions,
    pub stats: RelayStats,
}

impl RelayContext {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            dialer: BackendDialer::from_config(config),
            options: BindingOptions {
                poll_interval: config.poll_interval(),
                idle_policy: config.idle_policy,
            },
            stats: RelayStats::new(),
        }
    }
}

/// 绑定链路监听端口（失败为致命错误）
pub async fn bind_link_listener(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| TunnelError::bind_failed(addr, e))
}

/// 接受链路，每个进程只调用一次
pub async fn accept_link(listener: &TcpListener) -> Result<Link> {
    let addr = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".into());

    let (stream, peer) = listener.accept().await.map_err(|e| {
        error!("Failed to accept link on {}: {}", addr, e);
        TunnelError::link_failed(addr.clone(), e)
    })?;

    info!("Accepted link from {} on {}", peer, addr);
    Link::new(stream).map_err(|e| TunnelError::link_failed(addr, e))
}

/// 运行 B 端
pub async fn run_relay(config: RelayConfig) -> Result<()> {
    config
        .validate()
        .map_err(|e| TunnelError::config_error(format!("{:#}", e)))?;

    let listener = bind_link_listener(&config.link_endpoint()).await?;
    info!(
        "Relay listening for link on {} (idle policy {})",
        config.link_endpoint(),
        config.idle_policy
    );
    run_relay_with_listener(config, listener).await
}

/// 在已绑定的监听器上接受一次链路并驱动帧循环
///
/// 监听器在整个生命周期内保持打开，但不会再接受第二条链路；链路 EOF 后返回。
pub async fn run_relay_with_listener(config: RelayConfig, listener: TcpListener) -> Result<()> {
    let ctx = RelayContext::from_config(&config);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let result = tokio::select! {
        result = accept_and_serve(&listener, &ctx) => result,
        _ = &mut shutdown => {
            info!("Received shutdown signal, stopping relay...");
            Ok(())
        }
    };

    info!("Relay stats: {:?}", ctx.stats.snapshot());
    drop(listener);
    result
}

async fn accept_and_serve(listener: &TcpListener, ctx: &RelayContext) -> Result<()> {
    let link = accept_link(listener).await?;
    serve_link(link, ctx).await
}

/// 帧循环：WAIT_FRAME → CLASSIFY → BACKEND_DIAL → RELAYING
///
/// 链路 EOF 后永久结束，返回 `Ok(())`。
pub async fn serve_link(link: Link, ctx: &RelayContext) -> Result<()> {
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = match link.recv(&mut buf).await {
            Ok(0) => {
                info!("Link closed by agent, no further frames will be relayed");
                return Ok(());
            }
            Ok(n) => n,
            Err(e) if is_transient(&e) => continue,
            Err(e) => {
                error!("Link read error, relaying stopped: {}", e);
                return Err(e.into());
            }
        };
        ctx.stats.add_bytes_from_link(n as u64);

        let chunk = &buf[..n];

        // 还没有后端绑定时收到的哨兵直接丢弃
        if is_sentinel(chunk) {
            ctx.stats.sentinel_received();
            debug!("Discarding sentinel with no backend bound");
            continue;
        }

        let class = ServiceClass::classify(chunk);

        let backend = match ctx.dialer.dial(class).await {
            Ok(stream) => stream,
            Err(e) => {
                ctx.stats.dial_failed();
                warn!(
                    "Failed to dial {} backend {}: {}, dropping {} bytes",
                    class,
                    ctx.dialer.endpoint(class),
                    e,
                    n
                );
                continue;
            }
        };

        let _guard = ctx.stats.session_started();
        info!("Frame bound to {} backend {}", class, ctx.dialer.endpoint(class));

        let end = relay_binding(backend, &link, chunk, &ctx.options, &ctx.stats).await;
        info!("Frame on {} backend ended ({:?})", class, end);
    }
}
