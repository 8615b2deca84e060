/// 自定义错误类型
///
/// 使用 thiserror 定义精确的错误类型，调用方可以区分致命错误（链路、监听）
/// 与仅影响单个会话的错误
use std::io;
use thiserror::Error;

use crate::backend::RouteError;

/// Sentinel Tunnel 的主要错误类型
#[derive(Error, Debug)]
pub enum TunnelError {
    /// 建立 A→B 链路失败（致命）
    #[error("Failed to establish link to {addr}: {source}")]
    LinkFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// 绑定监听端口失败（致命）
    #[error("Failed to bind {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 演示后端路由错误
    #[error("Route error: {0}")]
    Route(#[from] RouteError),

    /// I/O 错误
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// 其他错误（保留与 anyhow 的兼容性）
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, TunnelError>;

impl TunnelError {
    /// 创建链路建立失败错误
    pub fn link_failed(addr: impl Into<String>, source: io::Error) -> Self {
        Self::LinkFailed {
            addr: addr.into(),
            source,
        }
    }

    /// 创建绑定失败错误
    pub fn bind_failed(addr: impl Into<String>, source: io::Error) -> Self {
        Self::BindFailed {
            addr: addr.into(),
            source,
        }
    }

    /// 创建配置错误
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// 是否为进程级致命错误
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LinkFailed { .. } | Self::BindFailed { .. })
    }

    /// 检查是否为配置错误
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_failed() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err = TunnelError::link_failed("10.18.13.101:9222", io_err);
        assert!(err.is_fatal());
        assert!(err.to_string().contains("Failed to establish link"));
        assert!(err.to_string().contains("10.18.13.101:9222"));
    }

    #[test]
    fn test_bind_failed_is_fatal() {
        let io_err = io::Error::new(io::ErrorKind::AddrInUse, "in use");
        let err = TunnelError::bind_failed("0.0.0.0:8855", io_err);
        assert!(err.is_fatal());
        assert!(!err.is_config_error());
    }

    #[test]
    fn test_session_errors_are_not_fatal() {
        let err = TunnelError::from(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_route_error_conversion() {
        let err: TunnelError = RouteError::NotFound("/missing".to_string()).into();
        assert_eq!(err.to_string(), "Route error: no route for path '/missing'");
    }

    #[test]
    fn test_config_error() {
        let err = TunnelError::config_error("plain_port cannot be 0");
        assert!(err.is_config_error());
        assert_eq!(
            err.to_string(),
            "Configuration error: plain_port cannot be 0"
        );
    }
}
