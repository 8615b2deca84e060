//! A 端：建立链路并接收两类客户端流量

mod ingress;
mod session;

pub use ingress::{bind_ingress, run_ingress_listener};
pub use session::{handle_session, SessionContext, SessionEnd, SessionGate};

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::AgentConfig;
use crate::error::{Result, TunnelError};
use crate::link::{establish_link, Link};
use crate::protocol::ServiceClass;
use crate::stats::RelayStats;

/// 运行 A 端
///
/// 启动时拨号一次建立链路，失败即返回（致命，不重试），随后启动两个入口监听器。
pub async fn run_agent(config: AgentConfig) -> Result<()> {
    config
        .validate()
        .map_err(|e| TunnelError::config_error(format!("{:#}", e)))?;

    info!(
        "Starting agent: link {} (local port {}), idle policy {}",
        config.relay_endpoint(),
        config.local_port,
        config.idle_policy
    );

    let link = establish_link(&config.relay_endpoint(), config.local_port).await?;
    run_agent_with_link(config, link).await
}

/// 在已建立的链路上运行两个入口监听器
pub async fn run_agent_with_link(config: AgentConfig, link: Link) -> Result<()> {
    let stats = RelayStats::new();
    let ctx = Arc::new(SessionContext {
        link,
        poll_interval: config.poll_interval(),
        idle_policy: config.idle_policy,
        gate: SessionGate::new(config.exclusive_sessions),
        stats: stats.clone(),
    });

    let plain = bind_ingress(&config.ingress_endpoint(ServiceClass::Plain)).await?;
    let secure = bind_ingress(&config.ingress_endpoint(ServiceClass::Secure)).await?;

    let plain_task = tokio::spawn(run_ingress_listener(
        plain,
        ServiceClass::Plain,
        Arc::clone(&ctx),
    ));
    let secure_task = tokio::spawn(run_ingress_listener(
        secure,
        ServiceClass::Secure,
        Arc::clone(&ctx),
    ));

    let plain_abort = plain_task.abort_handle();
    let secure_abort = secure_task.abort_handle();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tokio::select! {
        (plain_result, secure_result) = async { tokio::join!(plain_task, secure_task) } => {
            let results = [
                (ServiceClass::Plain, plain_result),
                (ServiceClass::Secure, secure_result),
            ];
            for (class, result) in results {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Ingress for {} class stopped: {}", class, e),
                    Err(e) => error!("Ingress task for {} class panicked: {}", class, e),
                }
            }
            info!("All ingress listeners stopped");
        }
        _ = &mut shutdown => {
            info!("Received shutdown signal, stopping agent...");
            plain_abort.abort();
            secure_abort.abort();
        }
    }

    info!("Agent stats: {:?}", stats.snapshot());
    Ok(())
}
