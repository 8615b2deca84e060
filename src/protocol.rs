/// A↔B 链路上的线协议
///
/// 链路上传输的是原始字节，不做长度前缀也不做转义；唯一的控制原语是一个保留值
/// `connection-reset`。任一端读到的缓冲区内容与它完全相等时，视为
/// "放弃当前后端绑定，下一段字节开始新的逻辑帧"，而不是载荷。
///
/// 注意：与保留值完全相同的真实载荷无法与控制信号区分，会被当作控制信号处理。
use serde::{Deserialize, Serialize};

/// 控制哨兵（ASCII，整个缓冲区精确匹配）
pub const SENTINEL: &[u8] = b"connection-reset";

/// 链路单次传输块大小
pub const CHUNK_SIZE: usize = 4096;

/// 明文类请求的前缀（大小写敏感）
pub const PLAIN_PREFIX: &[u8] = b"GET";

/// 缓冲区内容是否恰好为控制哨兵
pub fn is_sentinel(buf: &[u8]) -> bool {
    buf == SENTINEL
}

/// 服务类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceClass {
    /// 明文 HTTP
    Plain,
    /// TLS（HTTPS），由后端自行终结
    Secure,
}

impl ServiceClass {
    /// 根据块的前导字节判断服务类别
    ///
    /// 以 `GET` 开头归为 Plain，其余（包括不足 3 字节的块）一律归为 Secure。
    pub fn classify(chunk: &[u8]) -> Self {
        if chunk.starts_with(PLAIN_PREFIX) {
            ServiceClass::Plain
        } else {
            ServiceClass::Secure
        }
    }

    /// 新会话开始前是否需要先发送哨兵
    pub fn resets_on_accept(self) -> bool {
        matches!(self, ServiceClass::Secure)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceClass::Plain => "plain",
            ServiceClass::Secure => "secure",
        }
    }
}

impl std::fmt::Display for ServiceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ServiceClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "plain" | "http" => Ok(Self::Plain),
            "secure" | "https" => Ok(Self::Secure),
            _ => anyhow::bail!("Unknown service class: {}", s),
        }
    }
}
