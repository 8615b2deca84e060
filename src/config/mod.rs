// 配置管理模块 - 使用模块化设计
//
// 所有字段的默认值就是参考部署中的固定常量，空的配置段即可还原参考部署。

mod builder;
mod validator;

pub use builder::{AgentConfigBuilder, RelayConfigBuilder};
pub use validator::ConfigValidator;

use crate::io_util::{IdlePolicy, DEFAULT_POLL_INTERVAL_MS};
use crate::protocol::ServiceClass;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "SENTINEL_TUNNEL_";

/// 参考部署：B 的链路地址
pub const DEFAULT_RELAY_ADDR: &str = "10.18.13.101";
/// 参考部署：链路端口（A 的固定源端口与 B 的监听端口相同）
pub const DEFAULT_LINK_PORT: u16 = 9222;
/// 参考部署：明文类端口
pub const DEFAULT_PLAIN_PORT: u16 = 8855;
/// 参考部署：安全类端口
pub const DEFAULT_SECURE_PORT: u16 = 8854;

fn default_relay_addr() -> String {
    DEFAULT_RELAY_ADDR.to_string()
}

fn default_link_port() -> u16 {
    DEFAULT_LINK_PORT
}

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_backend_addr() -> String {
    "localhost".to_string()
}

fn default_loopback_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_plain_port() -> u16 {
    DEFAULT_PLAIN_PORT
}

fn default_secure_port() -> u16 {
    DEFAULT_SECURE_PORT
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_interface() -> String {
    "eth0".to_string()
}

fn default_true() -> bool {
    true
}

/// 轮询间隔 - 可通过环境变量 SENTINEL_TUNNEL_POLL_INTERVAL_MS 覆盖
///
/// 覆盖值与配置文件遵守同样的范围校验，非法值会被忽略并记录警告。
pub fn resolve_poll_interval(configured_ms: u64) -> Duration {
    let key = format!("{}POLL_INTERVAL_MS", ENV_PREFIX);
    poll_interval_with_override(configured_ms, std::env::var(&key).ok().as_deref())
}

fn poll_interval_with_override(configured_ms: u64, raw: Option<&str>) -> Duration {
    let Some(raw) = raw else {
        return Duration::from_millis(configured_ms);
    };

    let ms = match raw.trim().parse::<u64>() {
        Ok(ms) => match ConfigValidator::validate_poll_interval(ms) {
            Ok(()) => ms,
            Err(e) => {
                warn!(
                    "Ignoring {}POLL_INTERVAL_MS override: {}, using {} ms",
                    ENV_PREFIX, e, configured_ms
                );
                configured_ms
            }
        },
        Err(e) => {
            warn!(
                "Ignoring {}POLL_INTERVAL_MS override {:?}: {}, using {} ms",
                ENV_PREFIX, raw, e, configured_ms
            );
            configured_ms
        }
    };
    Duration::from_millis(ms)
}

/// A 端（发起链路、接收客户端）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// B 的链路地址
    #[serde(default = "default_relay_addr")]
    pub relay_addr: String,
    /// B 的链路端口
    #[serde(default = "default_link_port")]
    pub relay_port: u16,
    /// 拨号使用的固定本地源端口（0 表示临时端口）
    #[serde(default = "default_link_port")]
    pub local_port: u16,
    /// 两个入口监听器的绑定地址
    #[serde(default = "default_listen_addr")]
    pub bind_addr: String,
    /// 明文类入口端口
    #[serde(default = "default_plain_port")]
    pub plain_port: u16,
    /// 安全类入口端口
    #[serde(default = "default_secure_port")]
    pub secure_port: u16,
    /// 链路轮询截止时间（毫秒）
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// 轮询超时的处理策略
    #[serde(default)]
    pub idle_policy: IdlePolicy,
    /// 同一时刻只允许一个会话占用链路
    #[serde(default = "default_true")]
    pub exclusive_sessions: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            relay_addr: default_relay_addr(),
            relay_port: DEFAULT_LINK_PORT,
            local_port: DEFAULT_LINK_PORT,
            bind_addr: default_listen_addr(),
            plain_port: DEFAULT_PLAIN_PORT,
            secure_port: DEFAULT_SECURE_PORT,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            idle_policy: IdlePolicy::default(),
            exclusive_sessions: true,
        }
    }
}

impl AgentConfig {
    /// 创建 Builder
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::new()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ConfigValidator::validate_agent_config(self)
    }

    /// B 的链路端点
    pub fn relay_endpoint(&self) -> String {
        format!("{}:{}", self.relay_addr, self.relay_port)
    }

    /// 指定服务类别的入口监听地址
    pub fn ingress_endpoint(&self, class: ServiceClass) -> String {
        let port = match class {
            ServiceClass::Plain => self.plain_port,
            ServiceClass::Secure => self.secure_port,
        };
        format!("{}:{}", self.bind_addr, port)
    }

    pub fn poll_interval(&self) -> Duration {
        resolve_poll_interval(self.poll_interval_ms)
    }
}

/// B 端（接受链路、拨号后端）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// 链路监听地址
    #[serde(default = "default_relay_addr")]
    pub bind_addr: String,
    /// 链路监听端口
    #[serde(default = "default_link_port")]
    pub bind_port: u16,
    /// 后端服务所在地址
    #[serde(default = "default_backend_addr")]
    pub backend_addr: String,
    /// 明文类后端端口
    #[serde(default = "default_plain_port")]
    pub plain_port: u16,
    /// 安全类后端端口
    #[serde(default = "default_secure_port")]
    pub secure_port: u16,
    /// 链路轮询截止时间（毫秒）
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// 轮询超时的处理策略
    #[serde(default)]
    pub idle_policy: IdlePolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_relay_addr(),
            bind_port: DEFAULT_LINK_PORT,
            backend_addr: default_backend_addr(),
            plain_port: DEFAULT_PLAIN_PORT,
            secure_port: DEFAULT_SECURE_PORT,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            idle_policy: IdlePolicy::default(),
        }
    }
}

impl RelayConfig {
    /// 创建 Builder
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder::new()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ConfigValidator::validate_relay_config(self)
    }

    /// 链路监听端点
    pub fn link_endpoint(&self) -> String {
        format!("{}:{}", self.bind_addr, self.bind_port)
    }

    /// 指定服务类别的后端端点
    pub fn backend_endpoint(&self, class: ServiceClass) -> String {
        let port = match class {
            ServiceClass::Plain => self.plain_port,
            ServiceClass::Secure => self.secure_port,
        };
        format!("{}:{}", self.backend_addr, port)
    }

    pub fn poll_interval(&self) -> Duration {
        resolve_poll_interval(self.poll_interval_ms)
    }
}

/// 演示后端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// 后端绑定地址
    #[serde(default = "default_loopback_addr")]
    pub bind_addr: String,
    /// 明文 HTTP 端口
    #[serde(default = "default_plain_port")]
    pub plain_port: u16,
    /// HTTPS 端口
    #[serde(default = "default_secure_port")]
    pub secure_port: u16,
    /// 查询硬件地址的网卡名
    #[serde(default = "default_interface")]
    pub interface: String,
    /// TLS 证书路径
    #[serde(default)]
    pub cert_path: Option<PathBuf>,
    /// TLS 私钥路径
    #[serde(default)]
    pub key_path: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_loopback_addr(),
            plain_port: DEFAULT_PLAIN_PORT,
            secure_port: DEFAULT_SECURE_PORT,
            interface: default_interface(),
            cert_path: None,
            key_path: None,
        }
    }
}

impl BackendConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ConfigValidator::validate_backend_config(self)
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AppConfig {
    Agent(AgentConfig),
    Relay(RelayConfig),
    Backend(BackendConfig),
}

impl AppConfig {
    /// 从文件加载 A 端配置
    pub fn load_agent_config(path: &str) -> anyhow::Result<AgentConfig> {
        #[derive(Deserialize)]
        struct AgentConfigWrapper {
            agent: AgentConfig,
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let wrapper: AgentConfigWrapper =
            toml::from_str(&content).context("Failed to parse agent configuration")?;
        wrapper
            .agent
            .validate()
            .context("Agent configuration validation failed")?;
        Ok(wrapper.agent)
    }

    /// 从文件加载 B 端配置
    pub fn load_relay_config(path: &str) -> anyhow::Result<RelayConfig> {
        #[derive(Deserialize)]
        struct RelayConfigWrapper {
            relay: RelayConfig,
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let wrapper: RelayConfigWrapper =
            toml::from_str(&content).context("Failed to parse relay configuration")?;
        wrapper
            .relay
            .validate()
            .context("Relay configuration validation failed")?;
        Ok(wrapper.relay)
    }

    /// 从文件加载演示后端配置
    pub fn load_backend_config(path: &str) -> anyhow::Result<BackendConfig> {
        #[derive(Deserialize)]
        struct BackendConfigWrapper {
            backend: BackendConfig,
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let wrapper: BackendConfigWrapper =
            toml::from_str(&content).context("Failed to parse backend configuration")?;
        wrapper
            .backend
            .validate()
            .context("Backend configuration validation failed")?;
        Ok(wrapper.backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_defaults_match_reference_deployment() {
        let config = AgentConfig::default();
        assert_eq!(config.relay_endpoint(), "10.18.13.101:9222");
        assert_eq!(config.local_port, 9222);
        assert_eq!(
            config.ingress_endpoint(ServiceClass::Plain),
            "0.0.0.0:8855"
        );
        assert_eq!(
            config.ingress_endpoint(ServiceClass::Secure),
            "0.0.0.0:8854"
        );
        assert_eq!(config.poll_interval_ms, 100);
        assert_eq!(config.idle_policy, IdlePolicy::Terminate);
        assert!(config.exclusive_sessions);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_relay_defaults_match_reference_deployment() {
        let config = RelayConfig::default();
        assert_eq!(config.link_endpoint(), "10.18.13.101:9222");
        assert_eq!(
            config.backend_endpoint(ServiceClass::Plain),
            "localhost:8855"
        );
        assert_eq!(
            config.backend_endpoint(ServiceClass::Secure),
            "localhost:8854"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_sections_use_defaults() {
        let agent: AgentConfig = toml::from_str("").unwrap();
        assert_eq!(agent.plain_port, DEFAULT_PLAIN_PORT);
        assert_eq!(agent.secure_port, DEFAULT_SECURE_PORT);

        let relay: RelayConfig = toml::from_str("").unwrap();
        assert_eq!(relay.bind_port, DEFAULT_LINK_PORT);

        let backend: BackendConfig = toml::from_str("").unwrap();
        assert_eq!(backend.interface, "eth0");
        assert!(backend.cert_path.is_none());
    }

    #[test]
    fn test_toml_deserialization_agent() {
        let toml_str = r#"
            relay_addr = "192.168.1.20"
            relay_port = 7000
            local_port = 0
            plain_port = 18855
            secure_port = 18854
            poll_interval_ms = 250
            idle_policy = "rearm"
            exclusive_sessions = false
        "#;

        let config: AgentConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.relay_endpoint(), "192.168.1.20:7000");
        assert_eq!(config.local_port, 0);
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.idle_policy, IdlePolicy::Rearm);
        assert!(!config.exclusive_sessions);
    }

    #[test]
    fn test_load_relay_config_from_file() {
        let path = std::env::temp_dir().join(format!(
            "sentinel-tunnel-relay-{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "[relay]\nbind_addr = \"127.0.0.1\"\nbind_port = 19222\n",
        )
        .unwrap();

        let config = AppConfig::load_relay_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.link_endpoint(), "127.0.0.1:19222");
        assert_eq!(config.plain_port, DEFAULT_PLAIN_PORT);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_load_rejects_invalid_config() {
        let path = std::env::temp_dir().join(format!(
            "sentinel-tunnel-agent-invalid-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[agent]\nplain_port = 8854\nsecure_port = 8854\n").unwrap();

        assert!(AppConfig::load_agent_config(path.to_str().unwrap()).is_err());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_app_config_tagged() {
        let config: AppConfig = toml::from_str("mode = \"relay\"\nbind_port = 9000\n").unwrap();
        match config {
            AppConfig::Relay(relay) => assert_eq!(relay.bind_port, 9000),
            other => panic!("unexpected config: {:?}", other),
        }
    }

    #[test]
    fn test_poll_interval_override_in_range() {
        assert_eq!(
            poll_interval_with_override(100, Some("250")),
            Duration::from_millis(250)
        );
        assert_eq!(
            poll_interval_with_override(100, Some(" 60000 ")),
            Duration::from_millis(60000)
        );
        assert_eq!(poll_interval_with_override(100, None), Duration::from_millis(100));
    }

    #[test]
    fn test_poll_interval_override_out_of_range_falls_back() {
        assert_eq!(
            poll_interval_with_override(100, Some("0")),
            Duration::from_millis(100)
        );
        assert_eq!(
            poll_interval_with_override(100, Some("60001")),
            Duration::from_millis(100)
        );
        assert_eq!(
            poll_interval_with_override(300, Some("fast")),
            Duration::from_millis(300)
        );
    }

    /// 串行化对进程环境变量的修改，并在结束时恢复原值
    struct EnvGuard {
        key: String,
        previous: Option<String>,
        _lock: std::sync::MutexGuard<'static, ()>,
    }

    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
            let previous = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self {
                key: key.to_string(),
                previous,
                _lock: lock,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.previous {
                Some(value) => std::env::set_var(&self.key, value),
                None => std::env::remove_var(&self.key),
            }
        }
    }

    #[test]
    fn test_env_override_applies_to_configs() {
        let key = format!("{}POLL_INTERVAL_MS", ENV_PREFIX);

        {
            let _env = EnvGuard::set(&key, "750");
            assert_eq!(AgentConfig::default().poll_interval(), Duration::from_millis(750));
            assert_eq!(RelayConfig::default().poll_interval(), Duration::from_millis(750));
        }

        {
            let _env = EnvGuard::set(&key, "120000");
            assert_eq!(AgentConfig::default().poll_interval(), Duration::from_millis(100));
            assert_eq!(RelayConfig::default().poll_interval(), Duration::from_millis(100));
        }
    }
}
