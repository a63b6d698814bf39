use serde::{Deserialize, Serialize};

/// 病害严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// 无病害 / 健康
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// 获取标准名称
    pub fn name(self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// 从服务端字符串解析严重程度（不区分大小写）
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "healthy" => Some(Severity::None),
            "low" | "mild" => Some(Severity::Low),
            "medium" | "moderate" => Some(Severity::Medium),
            "high" | "severe" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Severity::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("未知的严重程度: '{}'", raw)))
    }
}

/// 推荐的市场商品
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedProduct {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// 防治建议
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    /// 问题描述
    pub issue: String,
    pub severity: Severity,
    /// 有序的处理步骤
    pub treatment: Vec<String>,
    #[serde(default)]
    pub recommended_products: Option<Vec<RecommendedProduct>>,
}

/// 作物诊断结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub predicted_label: String,
    /// 置信度，取值 [0, 1]
    pub confidence: f64,
    pub recommendations: Recommendations,
}

impl DiagnosisResult {
    /// 置信度百分比，用于展示
    pub fn confidence_percent(&self) -> String {
        format!("{:.1}%", self.confidence * 100.0)
    }
}

/// 待诊断的图片
///
/// 调用方在提交前已确认是受支持的图片类型。
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
        }
    }
}
