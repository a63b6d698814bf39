//! 传输能力 - 基础设施层
//!
//! 只暴露"创建任务"和"查询任务状态"两种能力，不关心轮询流程。

use async_trait::async_trait;

use crate::error::ApiResult;
use crate::models::{OperationId, OperationInput, OperationKind, StatusResponse};

/// 与后端交互的传输接口
///
/// 职责：
/// - 发送一次创建请求，返回服务端分配的 ID
/// - 发送一次幂等的状态读取
/// - 不重试、不等待、不解释状态
#[async_trait]
pub trait OperationTransport: Send + Sync {
    /// 创建服务端任务（上传诊断图片 / 发起 STK push）
    async fn create(&self, input: &OperationInput) -> ApiResult<OperationId>;

    /// 查询一次任务状态
    async fn fetch_status(
        &self,
        kind: OperationKind,
        id: &OperationId,
    ) -> ApiResult<StatusResponse>;
}
