use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};

use crate::config::{AgentConfig, AppConfig, BackendConfig, RelayConfig};
use crate::{agent, backend, relay, tls};

use super::cert;
use super::config::{check_config, expand_path};
use super::template;

/// 执行 CLI 子命令
pub async fn execute_command(cli: &super::Cli) -> Result<()> {
    use super::Commands;

    match &cli.command {
        Commands::Check { config, format } => {
            let config_path = expand_path(config)?;
            check_config(&config_path, format)?;
        }
        Commands::Template {
            template_type,
            output,
        } => {
            template::generate_config_template(template_type, output.as_deref())?;
        }
        Commands::Cert {
            cert_out,
            key_out,
            common_name,
            alt_names,
        } => {
            cert::generate_certificate(cert_out, key_out, common_name, alt_names)?;
        }
        Commands::Agent { config } => {
            run_agent(config).await?;
        }
        Commands::Relay { config } => {
            run_relay(config).await?;
        }
        Commands::Backend { config } => {
            run_backend(config).await?;
        }
    }

    Ok(())
}

/// 配置文件不存在时返回 None，调用方退回内置默认值
fn existing_config(config: &str) -> Result<Option<String>> {
    let config_path = expand_path(config)?;
    if Path::new(&config_path).exists() {
        Ok(Some(config_path))
    } else {
        warn!(
            "Config file {} not found, using built-in defaults",
            config_path
        );
        Ok(None)
    }
}

/// 运行 A 端（发起链路、接收客户端）
async fn run_agent(config: &str) -> Result<()> {
    let agent_config = match existing_config(config)? {
        Some(path) => {
            info!("Loading agent configuration from: {}", path);
            AppConfig::load_agent_config(&path)?
        }
        None => AgentConfig::default(),
    };

    agent::run_agent(agent_config).await?;
    Ok(())
}

/// 运行 B 端（接受链路、转发到后端）
async fn run_relay(config: &str) -> Result<()> {
    let relay_config = match existing_config(config)? {
        Some(path) => {
            info!("Loading relay configuration from: {}", path);
            AppConfig::load_relay_config(&path)?
        }
        None => RelayConfig::default(),
    };

    relay::run_relay(relay_config).await?;
    Ok(())
}

/// 运行演示后端（缺少证书时自动生成）
async fn run_backend(config: &str) -> Result<()> {
    let backend_config = match existing_config(config)? {
        Some(path) => {
            info!("Loading backend configuration from: {}", path);
            AppConfig::load_backend_config(&path)?
        }
        None => BackendConfig::default(),
    };

    let (cert_path, key_path) = cert::ensure_backend_certs(&backend_config)?;
    let tls_config = tls::load_server_config(&cert_path, &key_path)?;

    backend::run_backend(backend_config, tls_config).await?;
    Ok(())
}
