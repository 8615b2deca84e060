/// Sentinel Tunnel 库入口
///
/// 将核心模块导出为库，方便测试和复用
pub mod agent;
pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod io_util;
pub mod link;
pub mod protocol;
pub mod relay;
pub mod stats;
pub mod tls;

// 重新导出常用类型
pub use agent::{run_agent, run_agent_with_link, SessionGate};
pub use config::{AgentConfig, AppConfig, BackendConfig, RelayConfig};
pub use error::{Result, TunnelError};
pub use io_util::{IdlePolicy, Polled};
pub use link::{establish_link, Link};
pub use protocol::{ServiceClass, CHUNK_SIZE, SENTINEL};
pub use relay::{run_relay, run_relay_with_listener, serve_link, RelayContext};
pub use stats::{RelayStats, RelayStatsSnapshot};
