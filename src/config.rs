use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 后端 API 根地址
    pub api_base_url: String,
    /// 访问令牌（Bearer），为空时不发送
    pub api_token: Option<String>,
    /// 单次 HTTP 请求超时（秒）
    pub request_timeout_secs: u64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- 诊断任务轮询 ---
    pub diagnosis_poll_interval_ms: u64,
    pub diagnosis_max_attempts: u32,
    // --- 支付确认轮询 ---
    pub payment_poll_interval_ms: u64,
    pub payment_max_attempts: u32,
    /// 支付确认的展示时限（秒），到期只表示“尚未确认”
    pub payment_display_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api".to_string(),
            api_token: None,
            request_timeout_secs: 15,
            verbose_logging: false,
            diagnosis_poll_interval_ms: 2_000,
            diagnosis_max_attempts: 30,
            payment_poll_interval_ms: 2_000,
            payment_max_attempts: 5,
            payment_display_timeout_secs: 10,
        }
    }
}

impl Config {
    /// 从环境变量加载配置，缺失的项使用默认值
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// 用环境变量覆盖已有配置项
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        Ok(Self {
            api_base_url: std::env::var("AGRI_API_BASE_URL").unwrap_or(self.api_base_url),
            api_token: std::env::var("AGRI_API_TOKEN").ok().or(self.api_token),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", self.request_timeout_secs)?,
            verbose_logging: env_parse("VERBOSE_LOGGING", self.verbose_logging)?,
            diagnosis_poll_interval_ms: env_parse(
                "DIAGNOSIS_POLL_INTERVAL_MS",
                self.diagnosis_poll_interval_ms,
            )?,
            diagnosis_max_attempts: env_parse(
                "DIAGNOSIS_MAX_ATTEMPTS",
                self.diagnosis_max_attempts,
            )?,
            payment_poll_interval_ms: env_parse(
                "PAYMENT_POLL_INTERVAL_MS",
                self.payment_poll_interval_ms,
            )?,
            payment_max_attempts: env_parse("PAYMENT_MAX_ATTEMPTS", self.payment_max_attempts)?,
            payment_display_timeout_secs: env_parse(
                "PAYMENT_DISPLAY_TIMEOUT_SECS",
                self.payment_display_timeout_secs,
            )?,
        })
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&str, bool); 5] = [
            ("diagnosis_max_attempts", self.diagnosis_max_attempts > 0),
            ("diagnosis_poll_interval_ms", self.diagnosis_poll_interval_ms > 0),
            ("payment_max_attempts", self.payment_max_attempts > 0),
            ("payment_poll_interval_ms", self.payment_poll_interval_ms > 0),
            ("payment_display_timeout_secs", self.payment_display_timeout_secs > 0),
        ];
        if let Some((field, _)) = checks.iter().find(|(_, ok)| !ok) {
            return Err(ConfigError::InvalidValue {
                field: field.to_string(),
                reason: "必须大于 0".to_string(),
            });
        }
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url".to_string(),
                reason: "不能为空".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_parse<T: FromStr>(var_name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::EnvVarParseFailed {
            var_name: var_name.to_string(),
            expected_type: std::any::type_name::<T>().to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}
