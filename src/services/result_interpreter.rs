//! 结果解释 - 业务能力层
//!
//! 只负责把一次状态响应解释为 `PollVerdict`，不关心轮询流程。
//! 成功载荷在这里做必填字段校验，不合法时整体判为 `MalformedResult`，不做部分渲染。

use serde_json::Value;
use tracing::debug;

use crate::error::OperationError;
use crate::models::payment::parse_amount;
use crate::models::{
    DiagnosisResult, JobStatus, OperationId, OperationKind, OperationResult, PaymentReceipt,
    PollVerdict, StatusResponse, WebhookConfirmation,
};

/// 网关成功的结果码
const RESULT_CODE_SUCCESS: i64 = 0;

/// 结果解释器
///
/// 职责：
/// - 把状态字符串映射为 进行中 / 成功 / 失败 / 未知
/// - 校验成功载荷并转换为带类型的结果
/// - 不发请求、不计数、不等待
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultInterpreter;

impl ResultInterpreter {
    pub fn new() -> Self {
        Self
    }

    /// 解释一次状态响应
    ///
    /// # 参数
    /// - `kind`: 操作类型
    /// - `id`: 操作 ID（支付回执需要回填网关引用）
    /// - `response`: 状态接口响应
    pub fn interpret(
        &self,
        kind: OperationKind,
        id: &OperationId,
        response: &StatusResponse,
    ) -> PollVerdict {
        match response.job_status() {
            JobStatus::InProgress => PollVerdict::InProgress,
            JobStatus::Failed => {
                let reason = response
                    .error_message()
                    .unwrap_or_else(|| "服务端处理失败".to_string());
                PollVerdict::Failed(OperationError::processing_failed(reason))
            }
            JobStatus::Unrecognized(raw) => {
                PollVerdict::Failed(OperationError::unrecognized_status(&raw))
            }
            JobStatus::Succeeded => {
                let result = match kind {
                    OperationKind::Diagnosis => {
                        self.diagnosis(response).map(OperationResult::Diagnosis)
                    }
                    OperationKind::Payment => {
                        self.payment(id, response).map(OperationResult::Payment)
                    }
                };
                match result {
                    Ok(result) => PollVerdict::Succeeded(result),
                    Err(err) => PollVerdict::Failed(err),
                }
            }
        }
    }

    /// 解释后端转发的网关回调
    ///
    /// 只有结果码为 0 且带回执号时才算确认成功。
    pub fn interpret_webhook(&self, confirmation: &WebhookConfirmation) -> PollVerdict {
        if confirmation.result_code != RESULT_CODE_SUCCESS {
            let reason = confirmation
                .result_desc
                .clone()
                .unwrap_or_else(|| format!("网关返回结果码 {}", confirmation.result_code));
            return PollVerdict::Failed(OperationError::processing_failed(reason));
        }

        let receipt_number = match confirmation
            .receipt_number
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
        {
            Some(r) => r.to_string(),
            None => return PollVerdict::Failed(OperationError::malformed("支付回调缺少回执号")),
        };
        let amount = match confirmation.amount {
            Some(amount) => amount,
            None => return PollVerdict::Failed(OperationError::malformed("支付回调缺少交易金额")),
        };

        PollVerdict::Succeeded(OperationResult::Payment(PaymentReceipt {
            checkout_request_id: confirmation.checkout_request_id.clone(),
            receipt_number,
            amount,
        }))
    }

    /// 校验诊断载荷
    pub fn diagnosis(&self, response: &StatusResponse) -> Result<DiagnosisResult, OperationError> {
        let payload = response
            .result()
            .ok_or_else(|| OperationError::malformed("诊断结果缺失"))?;

        let result: DiagnosisResult = serde_json::from_value(payload.clone())
            .map_err(|e| OperationError::malformed(format!("诊断结果格式错误: {}", e)))?;

        if result.predicted_label.trim().is_empty() {
            return Err(OperationError::malformed("诊断结果缺少预测标签"));
        }
        if !result.confidence.is_finite() || !(0.0..=1.0).contains(&result.confidence) {
            return Err(OperationError::malformed(format!(
                "置信度 {} 超出 [0, 1]",
                result.confidence
            )));
        }
        if result.recommendations.issue.trim().is_empty() {
            return Err(OperationError::malformed("防治建议缺少问题描述"));
        }

        debug!(
            "诊断结果: {} ({})",
            result.predicted_label,
            result.confidence_percent()
        );
        Ok(result)
    }

    /// 校验支付回执
    ///
    /// 回执字段可能在 `result` 对象里，也可能在响应顶层。
    pub fn payment(
        &self,
        id: &OperationId,
        response: &StatusResponse,
    ) -> Result<PaymentReceipt, OperationError> {
        let receipt_number = receipt_field(response, "mpesa_receipt_number")
            .or_else(|| receipt_field(response, "receipt_number"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| OperationError::malformed("支付结果缺少回执号"))?
            .to_string();

        let amount = receipt_field(response, "amount")
            .and_then(parse_amount)
            .ok_or_else(|| OperationError::malformed("支付结果缺少交易金额"))?;

        Ok(PaymentReceipt {
            checkout_request_id: id.as_str().to_string(),
            receipt_number,
            amount,
        })
    }
}

fn receipt_field<'a>(response: &'a StatusResponse, key: &str) -> Option<&'a Value> {
    response
        .result()
        .and_then(|r| r.get(key))
        .filter(|v| !v.is_null())
        .or_else(|| response.field(key))
}
