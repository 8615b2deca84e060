use anyhow::{Context, Result};

/// 返回指定类型的配置模板内容
pub fn template_content(template_type: &str) -> Result<&'static str> {
    match template_type {
        "agent" => Ok(include_str!("../../templates/agent-template.toml")),
        "relay" => Ok(include_str!("../../templates/relay-template.toml")),
        "backend" => Ok(include_str!("../../templates/backend-template.toml")),
        other => anyhow::bail!("Unknown template type: {}", other),
    }
}

/// 生成配置模板
pub fn generate_config_template(template_type: &str, output: Option<&str>) -> Result<()> {
    let content = template_content(template_type)?;

    if let Some(path) = output {
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config template to {}", path))?;
        println!(
            "Generated {} configuration template: {}",
            template_type, path
        );
    } else {
        println!("{}", content);
    }

    Ok(())
}
