use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "sentinel-tunnel")]
#[command(author, version, about = "Single-link TCP relay with in-band sentinel framing", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 日志级别 (trace, debug, info, warn, error)，RUST_LOG 优先
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 运行 A 端：拨号建立链路并接收客户端
    Agent {
        /// 配置文件路径（不存在时使用内置默认值）
        #[arg(short, long, default_value = "agent.toml")]
        config: String,
    },
    /// 运行 B 端：接受链路并转发到本地后端
    Relay {
        /// 配置文件路径（不存在时使用内置默认值）
        #[arg(short, long, default_value = "relay.toml")]
        config: String,
    },
    /// 运行演示后端（HTTP + HTTPS）
    Backend {
        /// 配置文件路径（不存在时使用内置默认值）
        #[arg(short, long, default_value = "backend.toml")]
        config: String,
    },
    /// 检查配置文件格式是否正确
    Check {
        /// 配置文件路径
        #[arg(short, long)]
        config: String,

        /// 输出格式 (text, json)
        #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },
    /// 生成配置模板
    Template {
        /// 模板类型 (agent, relay, backend)
        #[arg(value_parser = ["agent", "relay", "backend"])]
        template_type: String,

        /// 输出文件路径，省略则打印到标准输出
        #[arg(short, long)]
        output: Option<String>,
    },
    /// 生成自签名证书
    Cert {
        /// 证书输出路径
        #[arg(long, default_value = "cert.pem", value_name = "PATH")]
        cert_out: String,

        /// 私钥输出路径
        #[arg(long, default_value = "key.pem", value_name = "PATH")]
        key_out: String,

        /// 证书的 Common Name
        #[arg(long, default_value = "localhost")]
        common_name: String,

        /// 证书的 SubjectAltName（用逗号分隔多个）
        #[arg(long, value_delimiter = ',', value_name = "DNS,...")]
        alt_names: Vec<String>,
    },
}
