use anyhow::Result;

use crate::io_util::IdlePolicy;

use super::{validator::ConfigValidator, AgentConfig, RelayConfig};

/// AgentConfig Builder
///
/// 未设置的字段保持参考部署的默认值
#[derive(Debug, Default)]
pub struct AgentConfigBuilder {
    relay_addr: Option<String>,
    relay_port: Option<u16>,
    local_port: Option<u16>,
    bind_addr: Option<String>,
    plain_port: Option<u16>,
    secure_port: Option<u16>,
    poll_interval_ms: Option<u64>,
    idle_policy: Option<IdlePolicy>,
    exclusive_sessions: Option<bool>,
}

impl AgentConfigBuilder {
    /// 创建新的 Builder
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置 B 的链路地址
    pub fn relay_addr(mut self, addr: impl Into<String>) -> Self {
        self.relay_addr = Some(addr.into());
        self
    }

    /// 设置 B 的链路端口
    pub fn relay_port(mut self, port: u16) -> Self {
        self.relay_port = Some(port);
        self
    }

    /// 设置固定本地源端口（0 表示临时端口）
    pub fn local_port(mut self, port: u16) -> Self {
        self.local_port = Some(port);
        self
    }

    /// 设置入口监听地址
    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = Some(addr.into());
        self
    }

    /// 设置明文类入口端口
    pub fn plain_port(mut self, port: u16) -> Self {
        self.plain_port = Some(port);
        self
    }

    /// 设置安全类入口端口
    pub fn secure_port(mut self, port: u16) -> Self {
        self.secure_port = Some(port);
        self
    }

    /// 设置轮询截止时间
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = Some(ms);
        self
    }

    /// 设置超时策略
    pub fn idle_policy(mut self, policy: IdlePolicy) -> Self {
        self.idle_policy = Some(policy);
        self
    }

    /// 设置是否串行化会话
    pub fn exclusive_sessions(mut self, exclusive: bool) -> Self {
        self.exclusive_sessions = Some(exclusive);
        self
    }

    /// 构建 AgentConfig 并验证
    pub fn build(self) -> Result<AgentConfig> {
        let defaults = AgentConfig::default();
        let config = AgentConfig {
            relay_addr: self.relay_addr.unwrap_or(defaults.relay_addr),
            relay_port: self.relay_port.unwrap_or(defaults.relay_port),
            local_port: self.local_port.unwrap_or(defaults.local_port),
            bind_addr: self.bind_addr.unwrap_or(defaults.bind_addr),
            plain_port: self.plain_port.unwrap_or(defaults.plain_port),
            secure_port: self.secure_port.unwrap_or(defaults.secure_port),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
            idle_policy: self.idle_policy.unwrap_or(defaults.idle_policy),
            exclusive_sessions: self
                .exclusive_sessions
                .unwrap_or(defaults.exclusive_sessions),
        };

        ConfigValidator::validate_agent_config(&config)?;

        Ok(config)
    }
}

/// RelayConfig Builder
#[derive(Debug, Default)]
pub struct RelayConfigBuilder {
    bind_addr: Option<String>,
    bind_port: Option<u16>,
    backend_addr: Option<String>,
    plain_port: Option<u16>,
    secure_port: Option<u16>,
    poll_interval_ms: Option<u64>,
    idle_policy: Option<IdlePolicy>,
}

impl RelayConfigBuilder {
    /// 创建新的 Builder
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置链路监听地址
    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = Some(addr.into());
        self
    }

    /// 设置链路监听端口
    pub fn bind_port(mut self, port: u16) -> Self {
        self.bind_port = Some(port);
        self
    }

    /// 设置后端地址
    pub fn backend_addr(mut self, addr: impl Into<String>) -> Self {
        self.backend_addr = Some(addr.into());
        self
    }

    /// 设置明文类后端端口
    pub fn plain_port(mut self, port: u16) -> Self {
        self.plain_port = Some(port);
        self
    }

    /// 设置安全类后端端口
    pub fn secure_port(mut self, port: u16) -> Self {
        self.secure_port = Some(port);
        self
    }

    /// 设置轮询截止时间
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = Some(ms);
        self
    }

    /// 设置超时策略
    pub fn idle_policy(mut self, policy: IdlePolicy) -> Self {
        self.idle_policy = Some(policy);
        self
    }

    /// 构建 RelayConfig 并验证
    pub fn build(self) -> Result<RelayConfig> {
        let defaults = RelayConfig::default();
        let config = RelayConfig {
            bind_addr: self.bind_addr.unwrap_or(defaults.bind_addr),
            bind_port: self.bind_port.unwrap_or(defaults.bind_port),
            backend_addr: self.backend_addr.unwrap_or(defaults.backend_addr),
            plain_port: self.plain_port.unwrap_or(defaults.plain_port),
            secure_port: self.secure_port.unwrap_or(defaults.secure_port),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
            idle_policy: self.idle_policy.unwrap_or(defaults.idle_policy),
        };

        ConfigValidator::validate_relay_config(&config)?;

        Ok(config)
    }
}
