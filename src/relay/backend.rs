use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::RelayConfig;
use crate::io_util::{IdlePolicy, Polled, StopSignal};
use crate::link::Link;
use crate::protocol::{is_sentinel, ServiceClass, CHUNK_SIZE};
use crate::stats::RelayStats;

/// 按服务类别拨号本地后端
#[derive(Debug, Clone)]
pub struct BackendDialer {
    plain: String,
    secure: String,
}

impl BackendDialer {
    pub fn new(plain: impl Into<String>, secure: impl Into<String>) -> Self {
        Self {
            plain: plain.into(),
            secure: secure.into(),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            config.backend_endpoint(ServiceClass::Plain),
            config.backend_endpoint(ServiceClass::Secure),
        )
    }

    /// 服务类别对应的后端端点
    pub fn endpoint(&self, class: ServiceClass) -> &str {
        match class {
            ServiceClass::Plain => &self.plain,
            ServiceClass::Secure => &self.secure,
        }
    }

    pub async fn dial(&self, class: ServiceClass) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(self.endpoint(class)).await?;
        debug!("Dialed {} backend {}", class, self.endpoint(class));
        Ok(stream)
    }
}

/// 后端绑定结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingEnd {
    /// 链路上收到哨兵
    Sentinel,
    /// 轮询截止时间内链路上没有数据
    LinkIdle,
    /// 链路被对端关闭
    LinkClosed,
    /// 链路读写出错
    LinkError,
    /// 后端关闭连接
    BackendClosed,
    /// 后端读写出错
    BackendError,
}

/// 一个后端绑定期间的轮询参数
#[derive(Debug, Clone)]
pub struct BindingOptions {
    pub poll_interval: Duration,
    pub idle_policy: IdlePolicy,
}

/// RELAYING 状态：把已读到的首块写入后端，然后双向转发
///
/// 链路 → 后端与后端 → 链路并发运行，任一方向结束即拆除绑定、关闭后端连接。
/// 正在写向链路的数据块总会写完才拆除。
pub async fn relay_binding(
    mut backend: TcpStream,
    link: &Link,
    first_chunk: &[u8],
    options: &BindingOptions,
    stats: &RelayStats,
) -> BindingEnd {
    if let Err(e) = backend.write_all(first_chunk).await {
        debug!("Backend write error on first chunk: {}", e);
        return BindingEnd::BackendError;
    }

    let (mut backend_read, mut backend_write) = backend.split();

    let stop = StopSignal::new();
    let (inbound, outbound) = tokio::join!(
        link_to_backend(link, &mut backend_write, options, stats, stop.clone()),
        backend_to_link(&mut backend_read, link, stats, stop),
    );
    inbound.or(outbound).unwrap_or(BindingEnd::BackendClosed)
}

async fn link_to_backend<W>(
    link: &Link,
    backend: &mut W,
    options: &BindingOptions,
    stats: &RelayStats,
    mut stop: StopSignal,
) -> Option<BindingEnd>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];

    let end = loop {
        let polled = tokio::select! {
            biased;
            _ = stop.stopped() => return None,
            polled = link.poll(&mut buf, options.poll_interval) => polled,
        };

        let n = match polled {
            Ok(Polled::Data(n)) => n,
            Ok(Polled::Idle) => {
                if options.idle_policy.ends_session() {
                    break BindingEnd::LinkIdle;
                }
                continue;
            }
            Ok(Polled::Eof) => break BindingEnd::LinkClosed,
            Err(e) => {
                debug!("Link read error while relaying: {}", e);
                break BindingEnd::LinkError;
            }
        };

        stats.add_bytes_from_link(n as u64);

        if is_sentinel(&buf[..n]) {
            stats.sentinel_received();
            debug!("Sentinel received, releasing backend");
            break BindingEnd::Sentinel;
        }

        let written = tokio::select! {
            biased;
            _ = stop.stopped() => return None,
            written = backend.write_all(&buf[..n]) => written,
        };
        if let Err(e) = written {
            debug!("Backend write error: {}", e);
            break BindingEnd::BackendError;
        }
    };

    stop.stop();
    Some(end)
}

async fn backend_to_link<R>(
    backend: &mut R,
    link: &Link,
    stats: &RelayStats,
    mut stop: StopSignal,
) -> Option<BindingEnd>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];

    let end = loop {
        let read = tokio::select! {
            biased;
            _ = stop.stopped() => return None,
            read = backend.read(&mut buf) => read,
        };

        let n = match read {
            Ok(0) => break BindingEnd::BackendClosed,
            Ok(n) => n,
            Err(e) => {
                debug!("Backend read error: {}", e);
                break BindingEnd::BackendError;
            }
        };

        if let Err(e) = link.send(&buf[..n]).await {
            debug!("Link write error while relaying: {}", e);
            break BindingEnd::LinkError;
        }
        stats.add_bytes_to_link(n as u64);
    };

    stop.stop();
    Some(end)
}
