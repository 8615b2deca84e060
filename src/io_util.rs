//! 带截止时间的轮询读取
//!
//! 链路上的读取都通过一个很短的截止时间（默认 100ms）来轮询。截止时间到期
//! 后如何处理由 [`IdlePolicy`] 决定。
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;

/// 默认轮询截止时间（毫秒）
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// 轮询截止时间到期后的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdlePolicy {
    /// 超时与其他 I/O 错误同等对待，直接结束会话
    #[default]
    Terminate,
    /// 重新设置截止时间继续等待，只有真实错误、EOF 或哨兵才结束
    Rearm,
}

impl IdlePolicy {
    /// 一次轮询超时是否应结束当前会话
    pub fn ends_session(self) -> bool {
        matches!(self, IdlePolicy::Terminate)
    }
}

impl std::fmt::Display for IdlePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdlePolicy::Terminate => write!(f, "terminate"),
            IdlePolicy::Rearm => write!(f, "rearm"),
        }
    }
}

/// 单次轮询读取的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polled {
    /// 读到 n 个字节
    Data(usize),
    /// 对端关闭
    Eof,
    /// 截止时间内没有数据
    Idle,
}

/// 在截止时间内读取一次
///
/// `AsyncReadExt::read` 是取消安全的，超时丢弃 future 不会丢失已到达的数据。
pub async fn read_with_deadline<R>(
    reader: &mut R,
    buf: &mut [u8],
    deadline: Duration,
) -> io::Result<Polled>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match tokio::time::timeout(deadline, reader.read(buf)).await {
        Ok(Ok(0)) => Ok(Polled::Eof),
        Ok(Ok(n)) => Ok(Polled::Data(n)),
        Ok(Err(e)) => Err(e),
        Err(_) => Ok(Polled::Idle),
    }
}

/// 双向转发共用的停止信号
///
/// 一个方向结束时调用 [`StopSignal::stop`]，另一个方向只在可以安全取消的等待点
/// （读取、本地写入）上观察该信号。写向链路的数据块不会被中途打断。
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// 等到停止信号被触发（取消安全）
    pub async fn stopped(&mut self) {
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// 对端是否在传输中途重置了连接
pub fn is_peer_reset(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::ConnectionReset
}

/// 不应终止链路读取循环的瞬时错误
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
