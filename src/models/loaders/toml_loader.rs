use crate::config::Config;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// 从 TOML 文件加载配置，环境变量优先级更高
pub async fn load_config(toml_file_path: &Path) -> Result<Config> {
    if !toml_file_path.exists() {
        anyhow::bail!("配置文件不存在: {}", toml_file_path.display());
    }

    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    let config = config.with_env_overrides()?;
    config.validate()?;

    tracing::info!("已加载配置文件: {}", toml_file_path.display());

    Ok(config)
}
