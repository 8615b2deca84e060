use anyhow::{bail, Result};
use tracing::warn;

use super::{AgentConfig, BackendConfig, RelayConfig};

/// 轮询截止时间上限（毫秒）
const MAX_POLL_INTERVAL_MS: u64 = 60_000;

/// 配置验证器 - 负责所有配置验证逻辑
pub struct ConfigValidator;

impl ConfigValidator {
    /// 验证端口号
    pub fn validate_port(port: u16, context: &str) -> Result<()> {
        if port == 0 {
            bail!("{}: port cannot be 0", context);
        }
        Ok(())
    }

    /// 验证地址不为空
    pub fn validate_address(addr: &str, context: &str) -> Result<()> {
        if addr.trim().is_empty() {
            bail!("{}: address cannot be empty", context);
        }
        Ok(())
    }

    /// 验证轮询截止时间
    pub fn validate_poll_interval(ms: u64) -> Result<()> {
        if ms == 0 {
            bail!("poll_interval_ms must be greater than 0");
        }
        if ms > MAX_POLL_INTERVAL_MS {
            bail!(
                "poll_interval_ms ({}) cannot exceed {}",
                ms,
                MAX_POLL_INTERVAL_MS
            );
        }
        Ok(())
    }

    /// 明文类和安全类必须使用不同端口
    pub fn validate_class_ports(plain: u16, secure: u16, context: &str) -> Result<()> {
        Self::validate_port(plain, &format!("{} plain_port", context))?;
        Self::validate_port(secure, &format!("{} secure_port", context))?;
        if plain == secure {
            bail!(
                "{}: plain_port and secure_port must differ (both are {})",
                context,
                plain
            );
        }
        Ok(())
    }

    /// 验证 A 端配置
    pub fn validate_agent_config(config: &AgentConfig) -> Result<()> {
        Self::validate_address(&config.relay_addr, "Agent relay_addr")?;
        Self::validate_port(config.relay_port, "Agent relay_port")?;
        Self::validate_address(&config.bind_addr, "Agent bind_addr")?;
        Self::validate_class_ports(config.plain_port, config.secure_port, "Agent")?;
        Self::validate_poll_interval(config.poll_interval_ms)?;

        if config.local_port != 0
            && (config.local_port == config.plain_port || config.local_port == config.secure_port)
        {
            bail!(
                "Agent local_port {} conflicts with an ingress port",
                config.local_port
            );
        }

        if !config.exclusive_sessions {
            warn!(
                "exclusive_sessions is disabled: overlapping client sessions will interleave on the link"
            );
        }

        Ok(())
    }

    /// 验证 B 端配置
    pub fn validate_relay_config(config: &RelayConfig) -> Result<()> {
        Self::validate_address(&config.bind_addr, "Relay bind_addr")?;
        Self::validate_port(config.bind_port, "Relay bind_port")?;
        Self::validate_address(&config.backend_addr, "Relay backend_addr")?;
        Self::validate_class_ports(config.plain_port, config.secure_port, "Relay")?;
        Self::validate_poll_interval(config.poll_interval_ms)?;
        Ok(())
    }

    /// 验证演示后端配置
    pub fn validate_backend_config(config: &BackendConfig) -> Result<()> {
        Self::validate_address(&config.bind_addr, "Backend bind_addr")?;
        Self::validate_class_ports(config.plain_port, config.secure_port, "Backend")?;

        if config.interface.trim().is_empty() {
            bail!("Backend interface cannot be empty");
        }

        match (&config.cert_path, &config.key_path) {
            (Some(_), Some(_)) | (None, None) => {}
            _ => bail!("cert_path and key_path must both be set, or both omitted to auto-generate"),
        }

        Ok(())
    }
}
