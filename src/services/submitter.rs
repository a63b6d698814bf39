//! 任务提交 - 业务能力层
//!
//! 只负责"创建服务端任务"这一次网络调用，不轮询、不重试。
//! 重新提交创建请求可能带来重复副作用（例如重复的 STK push），由调用方决定。

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::OperationError;
use crate::infrastructure::OperationTransport;
use crate::models::{Operation, OperationInput};
use crate::utils::logging::mask_phone;

/// 任务提交器
pub struct OperationSubmitter {
    transport: Arc<dyn OperationTransport>,
}

impl OperationSubmitter {
    pub fn new(transport: Arc<dyn OperationTransport>) -> Self {
        Self { transport }
    }

    /// 提交任务
    ///
    /// # 返回
    /// - 成功：`submitted` 状态的操作，携带服务端 ID
    /// - 失败：`failed` 状态的操作，错误种类为 `SubmissionError`，从未进入轮询
    pub async fn submit(&self, input: &OperationInput) -> Operation {
        let kind = input.kind();
        match input {
            OperationInput::Diagnosis(image) => info!(
                "📤 上传诊断图片: {} ({} 字节, {})",
                image.file_name,
                image.bytes.len(),
                image.mime_type
            ),
            OperationInput::Payment(request) => info!(
                "📤 发起 STK push: 订单 {} | 手机 {}",
                request.order_id,
                mask_phone(&request.phone)
            ),
        }

        match self.transport.create(input).await {
            Ok(id) => {
                let operation = Operation::submitted(kind, id);
                info!("✓ 任务已创建 {}", operation);
                operation
            }
            Err(e) => {
                warn!("❌ {} 任务创建失败: {}", kind, e);
                Operation::submission_failed(kind, OperationError::submission(e.to_string()))
            }
        }
    }
}
