use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// API 调用错误
    #[error("API错误: {0}")]
    Api(#[from] ApiError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// API 调用错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 网络请求失败（连接、超时等）
    #[error("API请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        timed_out: bool,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// API 返回非 2xx 响应
    #[error("API返回错误响应 ({endpoint}): status={status}, message={message:?}")]
    BadResponse {
        endpoint: String,
        status: u16,
        message: Option<String>,
    },
    /// 响应中缺少必需字段
    #[error("API响应缺少字段 `{field}` ({endpoint})")]
    MissingField { endpoint: String, field: String },
    /// JSON 解析失败
    #[error("JSON解析失败: {source}")]
    JsonParseFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ApiError {
    /// 请求是否因客户端超时而失败
    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::RequestFailed { timed_out: true, .. })
    }

    /// 是否为网络层失败（请求未完成或服务端返回非 2xx）
    ///
    /// 响应体形状问题不属于网络层失败。
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ApiError::RequestFailed { .. } | ApiError::BadResponse { .. }
        )
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置值非法
    #[error("配置项 {field} 非法: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 操作错误种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 创建任务的请求失败
    SubmissionError,
    /// 状态查询在网络层失败
    TransportError,
    /// 服务端明确报告任务失败
    ProcessingFailed,
    /// 服务端返回了未建模的状态值
    UnrecognizedStatus,
    /// 成功响应的载荷未通过必填字段校验
    MalformedResult,
    /// 查询次数或展示时限耗尽时仍在处理中
    Timeout,
    /// 调用方主动取消
    Cancelled,
}

impl ErrorKind {
    /// 是否允许自动重试
    ///
    /// 本层从不自动重试，任何重新提交都由调用方决定。
    pub fn is_auto_retryable(self) -> bool {
        false
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::SubmissionError => "SubmissionError",
            ErrorKind::TransportError => "TransportError",
            ErrorKind::ProcessingFailed => "ProcessingFailed",
            ErrorKind::UnrecognizedStatus => "UnrecognizedStatus",
            ErrorKind::MalformedResult => "MalformedResult",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// 操作终止错误：错误种类 + 可读原因
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{kind}: {message}")]
pub struct OperationError {
    pub kind: ErrorKind,
    pub message: String,
}

impl OperationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn submission(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SubmissionError, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransportError, message)
    }

    pub fn processing_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProcessingFailed, message)
    }

    pub fn unrecognized_status(status: &str) -> Self {
        Self::new(
            ErrorKind::UnrecognizedStatus,
            format!("无法识别的任务状态: '{}'", status),
        )
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedResult, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "操作已被调用方取消")
    }
}

// ========== 从常见错误类型转换 ==========

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::JsonParseFailed {
            source: Box::new(err),
        }
    }
}

// ========== 便捷构造函数 ==========

impl ApiError {
    /// 由 reqwest 错误构造请求失败错误，保留是否超时的信息
    pub fn from_reqwest(endpoint: impl Into<String>, err: reqwest::Error) -> Self {
        ApiError::RequestFailed {
            endpoint: endpoint.into(),
            timed_out: err.is_timeout(),
            source: Box::new(err),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

/// API 调用结果类型
pub type ApiResult<T> = Result<T, ApiError>;
