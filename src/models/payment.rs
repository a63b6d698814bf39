use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::OperationError;
use crate::models::operation::{Operation, OperationResult, OperationState};

/// 发起 STK push 的请求
///
/// 手机号不在本地校验，网关的判断为准。
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRequest {
    pub order_id: String,
    pub phone: String,
}

impl PaymentRequest {
    pub fn new(order_id: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            phone: phone.into(),
        }
    }
}

/// 支付回执
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentReceipt {
    /// 网关推送引用
    pub checkout_request_id: String,
    /// 网关回执号
    pub receipt_number: String,
    /// 最终交易金额
    pub amount: f64,
}

/// 后端转发的网关回调确认
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WebhookConfirmation {
    pub checkout_request_id: String,
    /// 0 表示成功，其余为网关错误码
    pub result_code: i64,
    #[serde(default, alias = "mpesa_receipt_number")]
    pub receipt_number: Option<String>,
    #[serde(default, deserialize_with = "de_amount")]
    pub amount: Option<f64>,
    #[serde(default)]
    pub result_desc: Option<String>,
}

/// 支付确认的最终结论（面向界面）
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    /// 后端明确确认支付成功
    Confirmed(PaymentReceipt),
    /// 后端明确确认支付失败，或查询失败
    Declined(OperationError),
    /// 展示时限已到但没有任何确认信号，支付状态未知
    Pending { checkout_request_id: String },
    /// 调用方已取消等待
    Cancelled,
}

impl PaymentOutcome {
    /// 把支付操作的快照映射为界面结论
    ///
    /// 只有 `succeeded` 且带支付回执才会得到 `Confirmed`；时限到期永远是 `Pending`。
    pub fn from_operation(operation: &Operation) -> Self {
        let checkout_request_id = operation
            .id()
            .map(|id| id.as_str().to_string())
            .unwrap_or_default();
        match (operation.state(), operation.result(), operation.error()) {
            (OperationState::Succeeded, Some(OperationResult::Payment(receipt)), _) => {
                PaymentOutcome::Confirmed(receipt.clone())
            }
            (OperationState::Succeeded, _, _) => {
                PaymentOutcome::Declined(OperationError::malformed("成功结果不是支付回执"))
            }
            (OperationState::Failed, _, Some(err)) => PaymentOutcome::Declined(err.clone()),
            (OperationState::Failed, _, None) => {
                PaymentOutcome::Declined(OperationError::processing_failed("支付失败"))
            }
            (OperationState::Cancelled, _, _) => PaymentOutcome::Cancelled,
            (OperationState::TimedOut, _, _)
            | (OperationState::Submitted, _, _)
            | (OperationState::Polling, _, _) => PaymentOutcome::Pending {
                checkout_request_id,
            },
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, PaymentOutcome::Confirmed(_))
    }
}

/// 交易记录
#[derive(Debug, Clone, Deserialize)]
pub struct Transaction {
    pub id: u64,
    #[serde(default)]
    pub checkout_request_id: Option<String>,
    #[serde(default, alias = "receipt_number")]
    pub mpesa_receipt_number: Option<String>,
    #[serde(default, deserialize_with = "de_amount")]
    pub amount: Option<f64>,
    pub status: String,
}

/// 金额既可能是数字，也可能是十进制字符串（如 "1500.00"）
pub(crate) fn parse_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|amount: &f64| amount.is_finite())
}

fn de_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => parse_amount(&v)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("无法解析金额: {}", v))),
    }
}
