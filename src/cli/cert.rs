use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

use crate::{config::BackendConfig, tls};

/// 生成自签名证书
pub fn generate_certificate(
    cert_out: &str,
    key_out: &str,
    common_name: &str,
    alt_names: &[String],
) -> Result<()> {
    tls::generate_self_signed_cert(
        common_name,
        alt_names,
        Path::new(cert_out),
        Path::new(key_out),
    )?;

    println!("Generated self-signed certificate: {}", cert_out);
    println!("Generated private key: {}", key_out);

    Ok(())
}

/// 确保演示后端有可用证书；未配置时在临时目录生成自签名证书
pub fn ensure_backend_certs(config: &BackendConfig) -> Result<(PathBuf, PathBuf)> {
    match (&config.cert_path, &config.key_path) {
        (Some(cert), Some(key)) => Ok((cert.clone(), key.clone())),
        (None, None) => {
            let ts = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            let temp_dir = std::env::temp_dir();
            let cert_path = temp_dir.join(format!("sentinel-tunnel-cert-{}.pem", ts));
            let key_path = temp_dir.join(format!("sentinel-tunnel-key-{}.pem", ts));

            // 通配地址不能作为 CN，退回 localhost
            let cn = match config.bind_addr.as_str() {
                "0.0.0.0" | "::" => "localhost",
                addr => addr,
            };

            tls::generate_self_signed_cert(cn, &[cn.to_string()], &cert_path, &key_path)?;

            info!(
                "Generated self-signed backend certificate at {:?} and key at {:?}",
                cert_path, key_path
            );

            Ok((cert_path, key_path))
        }
        _ => anyhow::bail!(
            "Both cert_path and key_path must be set, or leave both empty to auto-generate"
        ),
    }
}
