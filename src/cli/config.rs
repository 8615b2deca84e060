use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;

#[derive(Serialize)]
struct CheckResult {
    valid: bool,
    config_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    details: serde_json::Value,
}

/// Expand path with tilde (~) and make it absolute
pub fn expand_path(path: &str) -> Result<String> {
    let expanded = shellexpand::tilde(path);
    let path_buf = PathBuf::from(expanded.as_ref());

    if path_buf.is_absolute() {
        Ok(expanded.into_owned())
    } else {
        std::env::current_dir()
            .context("Failed to get current directory")?
            .join(&path_buf)
            .to_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid path: {}", path))
    }
}

/// 根据配置段判断配置类型
pub fn detect_config_type(content: &str) -> Result<&'static str> {
    let table: toml::Table = toml::from_str(content).context("Failed to parse TOML")?;
    for section in ["agent", "relay", "backend"] {
        if table.contains_key(section) {
            return Ok(section);
        }
    }
    anyhow::bail!("No [agent], [relay] or [backend] section found")
}

/// 按类型加载并校验配置，返回展示用的细节和警告
fn inspect_config(
    config_type: &str,
    config_path: &str,
) -> Result<(serde_json::Value, Vec<String>)> {
    let mut warnings = Vec::new();

    let details = match config_type {
        "agent" => {
            let config = AppConfig::load_agent_config(config_path)?;
            if !config.exclusive_sessions {
                warnings.push(
                    "exclusive_sessions is disabled, overlapping sessions will interleave on the link"
                        .to_string(),
                );
            }
            serde_json::to_value(&config)?
        }
        "relay" => {
            let config = AppConfig::load_relay_config(config_path)?;
            serde_json::to_value(&config)?
        }
        "backend" => {
            let config = AppConfig::load_backend_config(config_path)?;
            if let (Some(cert), Some(key)) = (&config.cert_path, &config.key_path) {
                if !cert.exists() {
                    warnings.push(format!("Certificate file not found: {:?}", cert));
                }
                if !key.exists() {
                    warnings.push(format!("Key file not found: {:?}", key));
                }
            }
            serde_json::to_value(&config)?
        }
        other => anyhow::bail!("Unknown configuration type: {}", other),
    };

    Ok((details, warnings))
}

/// Check configuration file format
pub fn check_config(config_path: &str, format: &str) -> Result<()> {
    let path = Path::new(config_path);

    let outcome = if path.exists() {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", config_path))
            .and_then(|content| detect_config_type(&content))
            .and_then(|config_type| {
                inspect_config(config_type, config_path).map(|(d, w)| (config_type, d, w))
            })
    } else {
        Err(anyhow::anyhow!("Configuration file not found: {}", config_path))
    };

    match outcome {
        Ok((config_type, details, warnings)) => {
            if format == "json" {
                let result = CheckResult {
                    valid: true,
                    config_type: config_type.to_string(),
                    warnings,
                    error: None,
                    details,
                };
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Checking configuration file: {}\n", config_path);
                println!("✓ Configuration type: {}", config_type);
                if let Some(fields) = details.as_object() {
                    for (key, value) in fields {
                        println!("✓ {}: {}", key, value);
                    }
                }
                for warning in &warnings {
                    println!("⚠ Warning: {}", warning);
                }
                println!("\n✓ Configuration is valid!");
            }
            Ok(())
        }
        Err(e) => {
            if format == "json" {
                let result = CheckResult {
                    valid: false,
                    config_type: "unknown".to_string(),
                    warnings: vec![],
                    error: Some(format!("{:#}", e)),
                    details: serde_json::json!({}),
                };
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("✗ Configuration validation failed!");
                println!("\nError details:");
                println!("{:#}", e);
                println!("\nCommon issues:");
                println!("  1. Check TOML syntax (brackets, quotes, commas)");
                println!("  2. Use exactly one of the [agent], [relay] or [backend] sections");
                println!("  3. Ensure port numbers are valid (1-65535) and the two class ports differ");
                println!("  4. idle_policy must be \"terminate\" or \"rearm\"");
            }
            Err(e)
        }
    }
}
