//! Common utilities for integration tests
#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use sentinel_tunnel::relay::bind_link_listener;
use sentinel_tunnel::{
    establish_link, run_agent_with_link, run_relay_with_listener, AgentConfig, IdlePolicy,
    RelayConfig,
};

/// Find an available port
pub fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to random port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Create a simple echo server for testing
pub async fn start_echo_server() -> (u16, JoinHandle<()>) {
    let listener = TokioTcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind echo server");
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    (port, handle)
}

/// 记录型后端上发生的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    Accepted(usize),
    Data(usize, Vec<u8>),
    Closed(usize),
}

/// 只收不回的后端，把每个连接上的事件发到通道
pub struct RecordingBackend {
    pub port: u16,
    pub events: mpsc::UnboundedReceiver<BackendEvent>,
    handle: JoinHandle<()>,
}

impl RecordingBackend {
    pub async fn start() -> Self {
        let listener = TokioTcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind recording backend");
        let port = listener.local_addr().unwrap().port();
        let (tx, events) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            let mut next_id = 0usize;
            while let Ok((mut socket, _)) = listener.accept().await {
                let id = next_id;
                next_id += 1;
                let tx = tx.clone();
                let _ = tx.send(BackendEvent::Accepted(id));
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    loop {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                let _ = tx.send(BackendEvent::Data(id, buf[..n].to_vec()));
                            }
                        }
                    }
                    let _ = tx.send(BackendEvent::Closed(id));
                });
            }
        });

        Self {
            port,
            events,
            handle,
        }
    }

    /// 等待下一个事件
    pub async fn next_event(&mut self, max_wait: Duration) -> Option<BackendEvent> {
        timeout(max_wait, self.events.recv()).await.ok().flatten()
    }

    /// 收集数据直到达到预期长度，返回 (连接编号, 数据) 顺序
    pub async fn collect_bytes(
        &mut self,
        expected: usize,
        max_wait: Duration,
    ) -> Vec<(usize, Vec<u8>)> {
        let mut collected = Vec::new();
        let mut total = 0;
        let deadline = tokio::time::Instant::now() + max_wait;

        while total < expected {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match timeout(remaining, self.events.recv()).await {
                Ok(Some(BackendEvent::Data(id, data))) => {
                    total += data.len();
                    collected.push((id, data));
                }
                Ok(Some(_)) => {}
                _ => break,
            }
        }
        collected
    }

    /// 等待指定连接被关闭
    pub async fn wait_closed(&mut self, conn: usize, max_wait: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match timeout(remaining, self.events.recv()).await {
                Ok(Some(BackendEvent::Closed(id))) if id == conn => return true,
                Ok(Some(_)) => {}
                _ => return false,
            }
        }
    }

    /// 在给定时间内没有新的连接被接受
    pub async fn expect_no_accept(&mut self, window: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match timeout(remaining, self.events.recv()).await {
                Ok(Some(BackendEvent::Accepted(_))) => return false,
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => return true,
            }
        }
    }
}

impl Drop for RecordingBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// 测试隧道的参数
#[derive(Debug, Clone)]
pub struct TunnelOptions {
    pub agent_poll_ms: u64,
    pub relay_poll_ms: u64,
    pub agent_policy: IdlePolicy,
    pub relay_policy: IdlePolicy,
    pub exclusive_sessions: bool,
}

impl Default for TunnelOptions {
    fn default() -> Self {
        Self {
            agent_poll_ms: 500,
            relay_poll_ms: 500,
            agent_policy: IdlePolicy::Terminate,
            relay_policy: IdlePolicy::Terminate,
            exclusive_sessions: true,
        }
    }
}

/// 一套运行中的 A + B
pub struct Tunnel {
    pub plain_port: u16,
    pub secure_port: u16,
    pub link_addr: SocketAddr,
    pub relay: JoinHandle<sentinel_tunnel::Result<()>>,
    pub agent: JoinHandle<sentinel_tunnel::Result<()>>,
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        self.agent.abort();
        self.relay.abort();
    }
}

/// 在回环地址上启动 B 和 A，B 指向给定的两个后端端口
pub async fn start_tunnel(
    plain_backend: u16,
    secure_backend: u16,
    options: TunnelOptions,
) -> Tunnel {
    let listener = bind_link_listener("127.0.0.1:0")
        .await
        .expect("Failed to bind link listener");
    let link_addr = listener.local_addr().unwrap();
    let relay_config = RelayConfig::builder()
        .bind_addr("127.0.0.1")
        .bind_port(link_addr.port())
        .backend_addr("127.0.0.1")
        .plain_port(plain_backend)
        .secure_port(secure_backend)
        .poll_interval_ms(options.relay_poll_ms)
        .idle_policy(options.relay_policy)
        .build()
        .expect("invalid relay config");
    let relay = tokio::spawn(run_relay_with_listener(relay_config, listener));

    let link = establish_link(&link_addr.to_string(), 0)
        .await
        .expect("Failed to establish link");

    let plain_port = get_available_port();
    let secure_port = get_available_port();
    let agent_config = AgentConfig::builder()
        .relay_addr("127.0.0.1")
        .relay_port(link_addr.port())
        .local_port(0)
        .bind_addr("127.0.0.1")
        .plain_port(plain_port)
        .secure_port(secure_port)
        .poll_interval_ms(options.agent_poll_ms)
        .idle_policy(options.agent_policy)
        .exclusive_sessions(options.exclusive_sessions)
        .build()
        .expect("invalid agent config");
    let agent = tokio::spawn(run_agent_with_link(agent_config, link));

    assert!(
        wait_for_ingress(plain_port, secure_port).await,
        "Agent ingress listeners did not come up"
    );

    Tunnel {
        plain_port,
        secure_port,
        link_addr,
        relay,
        agent,
    }
}

/// 入口监听器就绪检测：只检查端口是否已被占用，避免产生会话
async fn wait_for_ingress(plain_port: u16, secure_port: u16) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        let plain_bound = TcpListener::bind(("127.0.0.1", plain_port)).is_err();
        let secure_bound = TcpListener::bind(("127.0.0.1", secure_port)).is_err();
        if plain_bound && secure_bound {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// 读取恰好 len 字节
pub async fn read_exact_timeout(
    stream: &mut TcpStream,
    len: usize,
    max_wait: Duration,
) -> Option<Vec<u8>> {
    let mut buf = vec![0u8; len];
    match timeout(max_wait, stream.read_exact(&mut buf)).await {
        Ok(Ok(_)) => Some(buf),
        _ => None,
    }
}

/// 生成以 GET 开头的随机负载
pub fn plain_payload(len: usize) -> Vec<u8> {
    use rand::Rng;

    let mut payload = vec![0u8; len];
    rand::rng().fill(&mut payload[..]);
    let prefix = b"GET /";
    let n = prefix.len().min(len);
    payload[..n].copy_from_slice(&prefix[..n]);
    payload
}

/// 生成不以 GET 开头的随机负载（模拟 TLS 记录）
pub fn secure_payload(len: usize) -> Vec<u8> {
    use rand::Rng;

    let mut payload = vec![0u8; len];
    rand::rng().fill(&mut payload[..]);
    if len > 0 {
        payload[0] = 0x16;
    }
    payload
}
