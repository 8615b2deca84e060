/// A↔B 之间唯一的长连接
///
/// 链路在 A 启动时建立一次，之后所有逻辑会话都复用这一条连接，断开后不会重连。
/// 读写两半各自由一把异步锁保护，任意多个任务都可以并发读写；除此之外不做任何
/// 协调，会话之间的边界完全依赖哨兵协议。
use socket2::{SockRef, TcpKeepalive};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, TunnelError};
use crate::io_util::{read_with_deadline, Polled};
use crate::protocol::SENTINEL;

/// 链路 keepalive 首次探测时间
const LINK_KEEPALIVE_TIME: Duration = Duration::from_secs(30);
/// 链路 keepalive 探测间隔
const LINK_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// 共享链路句柄，clone 后指向同一条连接
#[derive(Clone)]
pub struct Link {
    reader: Arc<Mutex<OwnedReadHalf>>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    peer_addr: SocketAddr,
}

impl Link {
    /// 包装一条已建立的 TCP 连接
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        let peer_addr = stream.peer_addr()?;
        apply_link_options(&stream);

        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: Arc::new(Mutex::new(reader)),
            writer: Arc::new(Mutex::new(writer)),
            peer_addr,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// 写入一段数据（单次写入在并发写者之间是原子的）
    ///
    /// 不是取消安全的：在写入途中丢弃该 future 会在链路上留下半块数据。
    pub async fn send(&self, data: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(data).await
    }

    /// 写入控制哨兵
    pub async fn send_sentinel(&self) -> io::Result<()> {
        debug!("Sending sentinel to {}", self.peer_addr);
        self.send(SENTINEL).await
    }

    /// 阻塞读取一块数据，返回 0 表示对端关闭
    pub async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut reader = self.reader.lock().await;
        reader.read(buf).await
    }

    /// 在截止时间内读取一块数据
    pub async fn poll(&self, buf: &mut [u8], deadline: Duration) -> io::Result<Polled> {
        let mut reader = self.reader.lock().await;
        read_with_deadline(&mut *reader, buf, deadline).await
    }

    /// 关闭写方向，对端会读到 EOF
    pub async fn shutdown(&self) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}

/// 从固定的本地源端口拨号到 B，建立链路
///
/// `local_port` 为 0 时使用临时端口。失败即返回致命错误，不做重试。
pub async fn establish_link(remote: &str, local_port: u16) -> Result<Link> {
    let remote_addr = lookup_host(remote)
        .await
        .map_err(|e| TunnelError::link_failed(remote, e))?
        .next()
        .ok_or_else(|| {
            TunnelError::link_failed(
                remote,
                io::Error::new(io::ErrorKind::NotFound, "address resolved to nothing"),
            )
        })?;

    let socket = if remote_addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|e| TunnelError::link_failed(remote, e))?;

    if local_port != 0 {
        // 固定源端口，重启后需要能立即复用
        socket
            .set_reuseaddr(true)
            .map_err(|e| TunnelError::link_failed(remote, e))?;
        let local_ip = if remote_addr.is_ipv4() {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        };
        socket
            .bind(SocketAddr::new(local_ip, local_port))
            .map_err(|e| TunnelError::link_failed(remote, e))?;
    }

    let stream = socket
        .connect(remote_addr)
        .await
        .map_err(|e| TunnelError::link_failed(remote, e))?;

    info!(
        "Link established {} -> {}",
        stream
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".into()),
        remote_addr
    );

    Link::new(stream).map_err(|e| TunnelError::link_failed(remote, e))
}

fn apply_link_options(stream: &TcpStream) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY on link: {}", e);
    }

    let keepalive = TcpKeepalive::new()
        .with_time(LINK_KEEPALIVE_TIME)
        .with_interval(LINK_KEEPALIVE_INTERVAL);

    let sock_ref = SockRef::from(stream);
    if let Err(e) = sock_ref.set_tcp_keepalive(&keepalive) {
        warn!("Failed to set TCP keepalive on link: {}", e);
    }
}
