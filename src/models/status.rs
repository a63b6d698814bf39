//! 状态接口的响应结构
//!
//! 服务端返回的状态字符串在边界处被归类为带标签的 `JobStatus`，
//! 未建模的值（包括缺失或非字符串的 `status`）一律归为 `Unrecognized`，
//! 绝不当作"仍在处理"继续轮询。
//!
//! 响应体按原样保存为 JSON，字段在读取时才按名字查找：
//! 服务端可能同时返回 `error` / `detail` / `result_desc`（有的为 null），
//! 解析阶段不做字段合并，避免合法响应因为重复字段被拒绝。

use serde::Deserialize;
use serde_json::{Map, Value};

/// 成功载荷的字段名（诊断接口为 `diagnosis_result`）
const RESULT_KEYS: [&str; 2] = ["result", "diagnosis_result"];
/// 失败原因的字段名，按优先级排列
const ERROR_KEYS: [&str; 3] = ["error", "detail", "result_desc"];

/// 归类后的任务状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    InProgress,
    Succeeded,
    Failed,
    Unrecognized(String),
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "in_progress" | "pending" | "processing" | "uploaded" | "queued" => {
                JobStatus::InProgress
            }
            "succeeded" | "processed" | "completed" | "success" => JobStatus::Succeeded,
            "failed" | "cancelled_by_user" | "declined" => JobStatus::Failed,
            _ => JobStatus::Unrecognized(raw.to_string()),
        }
    }
}

/// 状态接口的原始响应
///
/// 任何合法 JSON 都能被接收，形状问题交给结果解释器判断。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct StatusResponse {
    body: Value,
}

impl StatusResponse {
    pub fn new(status: impl Into<String>) -> Self {
        let mut body = Map::new();
        body.insert("status".to_string(), Value::String(status.into()));
        Self {
            body: Value::Object(body),
        }
    }

    pub fn with_result(self, result: Value) -> Self {
        self.with_field("result", result)
    }

    pub fn with_error(self, error: impl Into<String>) -> Self {
        self.with_field("error", Value::String(error.into()))
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        if let Value::Object(map) = &mut self.body {
            map.insert(key.into(), value);
        }
        self
    }

    /// 原始响应体
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// 顶层字段，`null` 视为缺失
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.body.get(key).filter(|v| !v.is_null())
    }

    /// `status` 字段的字符串值
    pub fn status_text(&self) -> Option<&str> {
        self.field("status").and_then(Value::as_str)
    }

    /// 成功载荷：`result` 或 `diagnosis_result` 中第一个非 null 的值
    pub fn result(&self) -> Option<&Value> {
        RESULT_KEYS.iter().find_map(|key| self.field(key))
    }

    /// 失败原因：`error` / `detail` / `result_desc` 中第一个非空的值
    ///
    /// 非字符串的值（例如错误对象）按 JSON 文本返回。
    pub fn error_message(&self) -> Option<String> {
        ERROR_KEYS
            .iter()
            .filter_map(|key| self.field(key))
            .map(|v| match v {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .find(|s| !s.is_empty())
    }

    /// 归类任务状态；缺失或非字符串的 `status` 归为 `Unrecognized`
    pub fn job_status(&self) -> JobStatus {
        match self.body.get("status") {
            Some(Value::String(raw)) => JobStatus::parse(raw),
            Some(other) => JobStatus::Unrecognized(other.to_string()),
            None if self.body.is_object() => JobStatus::Unrecognized("<缺少 status>".to_string()),
            None => JobStatus::Unrecognized(self.body.to_string()),
        }
    }
}
