use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use super::session::{handle_session, SessionContext};
use crate::error::{Result, TunnelError};
use crate::protocol::ServiceClass;

/// 绑定某个服务类别的入口监听器（失败为致命错误）
pub async fn bind_ingress(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| TunnelError::bind_failed(addr, e))
}

/// 入口监听器的接受循环
///
/// 每个接受的客户端都派生一个会话任务。接受出错时只停止本监听器，
/// 另一个服务类别的监听器不受影响。
pub async fn run_ingress_listener(
    listener: TcpListener,
    class: ServiceClass,
    ctx: Arc<SessionContext>,
) -> Result<()> {
    info!(
        "Ingress for {} class listening on {}",
        class,
        listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".into())
    );

    loop {
        match listener.accept().await {
            Ok((client, peer)) => {
                debug!("Accepted {} client {}", class, peer);
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    handle_session(client, peer, class, ctx).await;
                });
            }
            Err(e) => {
                error!("Ingress for {} class accept error: {}", class, e);
                return Err(e.into());
            }
        }
    }
}
