use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::io_util::{is_peer_reset, IdlePolicy, Polled, StopSignal};
use crate::link::Link;
use crate::protocol::{ServiceClass, CHUNK_SIZE};
use crate::stats::RelayStats;

/// 链路上的会话互斥门
///
/// 线协议没有会话标识，A 与 B 之间只靠先后顺序对应；开启后同一时刻只有一个
/// 会话能使用链路，重叠的客户端会排队而不是在链路上交错。
#[derive(Debug, Clone)]
pub struct SessionGate {
    permits: Option<Arc<Semaphore>>,
}

impl SessionGate {
    pub fn new(exclusive: bool) -> Self {
        Self {
            permits: exclusive.then(|| Arc::new(Semaphore::new(1))),
        }
    }

    pub fn is_exclusive(&self) -> bool {
        self.permits.is_some()
    }

    /// 等待轮到当前会话；未开启互斥时立即返回 None
    pub async fn enter(&self) -> Option<OwnedSemaphorePermit> {
        match &self.permits {
            Some(permits) => permits.clone().acquire_owned().await.ok(),
            None => None,
        }
    }
}

/// 所有会话共享的上下文
pub struct SessionContext {
    pub link: Link,
    pub poll_interval: Duration,
    pub idle_policy: IdlePolicy,
    pub gate: SessionGate,
    pub stats: RelayStats,
}

/// 会话结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// 客户端正常关闭
    ClientClosed,
    /// 客户端读写出错（包括重置）
    ClientError,
    /// 轮询截止时间内链路上没有数据
    LinkIdle,
    /// 链路被对端关闭
    LinkClosed,
    /// 链路读写出错
    LinkError,
}

/// 处理一个本地接受的客户端连接
///
/// 两个方向并发拷贝，任一方向结束即结束整个会话并关闭客户端连接。正在写向
/// 链路的数据块总会写完，另一方向只在读取时才响应停止信号。
pub async fn handle_session(
    client: TcpStream,
    peer: SocketAddr,
    class: ServiceClass,
    ctx: Arc<SessionContext>,
) -> SessionEnd {
    let _permit = ctx.gate.enter().await;
    let _guard = ctx.stats.session_started();

    info!("Session started for {} client {}", class, peer);

    // 先让 B 丢弃上一会话可能遗留的后端绑定
    if class.resets_on_accept() {
        if let Err(e) = ctx.link.send_sentinel().await {
            warn!("Failed to send sentinel for {}: {}", peer, e);
            return SessionEnd::LinkError;
        }
        ctx.stats.sentinel_sent();
    }

    let (client_read, client_write) = client.into_split();

    let stop = StopSignal::new();
    let (outbound, inbound) = tokio::join!(
        relay_outbound(client_read, class, &ctx, stop.clone()),
        relay_inbound(client_write, &ctx, stop),
    );
    let end = outbound.or(inbound).unwrap_or(SessionEnd::ClientClosed);

    info!("Session closed for {} client {} ({:?})", class, peer, end);
    end
}

/// 客户端 → 链路，被另一方向停止时返回 None
async fn relay_outbound(
    mut client: OwnedReadHalf,
    class: ServiceClass,
    ctx: &SessionContext,
    mut stop: StopSignal,
) -> Option<SessionEnd> {
    let mut buf = vec![0u8; CHUNK_SIZE];

    let end = loop {
        let read = tokio::select! {
            biased;
            _ = stop.stopped() => return None,
            read = client.read(&mut buf) => read,
        };

        let n = match read {
            Ok(0) => break SessionEnd::ClientClosed,
            Ok(n) => n,
            Err(e) => {
                debug!("Client read error: {}", e);
                if class == ServiceClass::Secure && is_peer_reset(&e) {
                    match ctx.link.send_sentinel().await {
                        Ok(()) => ctx.stats.sentinel_sent(),
                        Err(e) => warn!("Failed to send sentinel after client reset: {}", e),
                    }
                }
                break SessionEnd::ClientError;
            }
        };

        if let Err(e) = ctx.link.send(&buf[..n]).await {
            warn!("Link write error: {}", e);
            break SessionEnd::LinkError;
        }
        ctx.stats.add_bytes_to_link(n as u64);
    };

    stop.stop();
    Some(end)
}

/// 链路 → 客户端，被另一方向停止时返回 None
async fn relay_inbound(
    mut client: OwnedWriteHalf,
    ctx: &SessionContext,
    mut stop: StopSignal,
) -> Option<SessionEnd> {
    let mut buf = vec![0u8; CHUNK_SIZE];

    let end = loop {
        let polled = tokio::select! {
            biased;
            _ = stop.stopped() => return None,
            polled = ctx.link.poll(&mut buf, ctx.poll_interval) => polled,
        };

        let n = match polled {
            Ok(Polled::Data(n)) => n,
            Ok(Polled::Idle) => {
                if ctx.idle_policy.ends_session() {
                    break SessionEnd::LinkIdle;
                }
                continue;
            }
            Ok(Polled::Eof) => break SessionEnd::LinkClosed,
            Err(e) => {
                warn!("Link read error: {}", e);
                break SessionEnd::LinkError;
            }
        };

        ctx.stats.add_bytes_from_link(n as u64);

        // 客户端即将被关闭，写到一半被停止没有影响
        let written = tokio::select! {
            biased;
            _ = stop.stopped() => return None,
            written = client.write_all(&buf[..n]) => written,
        };
        if let Err(e) = written {
            debug!("Client write error: {}", e);
            break SessionEnd::ClientError;
        }
    };

    stop.stop();
    Some(end)
}
