//! 操作追踪器 - 编排层
//!
//! 对调用方（界面）暴露的唯一入口：
//! - `submit(input) -> Operation`
//! - `poll(operation) -> 快照流`
//! - `cancel(handle)`
//!
//! 每个操作都有独立的计数器与计时器，多个操作之间不共享可变状态，
//! 只共享传输层（其内部的 HTTP 连接池）。

use std::sync::Arc;

use tracing::info;

use crate::clients::ApiClient;
use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::{CancelHandle, OperationTransport};
use crate::models::{
    ImagePayload, Operation, OperationInput, OperationKind, PaymentOutcome, PaymentRequest,
};
use crate::services::OperationSubmitter;
use crate::workflow::{
    OperationPoller, OperationStream, PaymentConfirmationCoordinator, PollPolicy, WebhookReceiver,
};

/// 操作追踪器
pub struct OperationTracker {
    config: Config,
    transport: Arc<dyn OperationTransport>,
    submitter: OperationSubmitter,
}

impl OperationTracker {
    /// 使用任意传输实现创建
    pub fn new(config: Config, transport: Arc<dyn OperationTransport>) -> Self {
        Self {
            submitter: OperationSubmitter::new(Arc::clone(&transport)),
            config,
            transport,
        }
    }

    /// 使用 HTTP 客户端创建
    pub fn with_api_client(config: Config) -> AppResult<Self> {
        config.validate()?;
        let client = ApiClient::new(&config)?;
        Ok(Self::new(config, Arc::new(client)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 提交任务，返回 `submitted` 或（创建失败时）`failed` 的操作
    pub async fn submit(&self, input: impl Into<OperationInput>) -> Operation {
        self.submitter.submit(&input.into()).await
    }

    /// 轮询操作，返回以终态快照结束的惰性快照流
    pub fn poll(&self, operation: Operation) -> OperationStream {
        self.poller_for(operation.kind()).poll(operation)
    }

    /// 轮询直到终态，只返回最终快照
    pub async fn wait(&self, operation: Operation) -> Operation {
        self.poller_for(operation.kind())
            .run_to_end(operation)
            .await
    }

    /// 取消操作：不再发出查询，迟到的响应被丢弃
    pub fn cancel(&self, handle: &CancelHandle) {
        info!("🛑 调用方请求取消");
        handle.cancel();
    }

    /// 上传图片并等待诊断结束
    pub async fn diagnose(&self, image: ImagePayload) -> Operation {
        let operation = self.submit(image).await;
        self.wait(operation).await
    }

    /// 等待支付确认（回调与轮询先到者为准）
    pub async fn confirm_payment(
        &self,
        operation: Operation,
        webhooks: Option<WebhookReceiver>,
    ) -> (Operation, PaymentOutcome) {
        PaymentConfirmationCoordinator::new(
            Arc::clone(&self.transport),
            PollPolicy::payment(&self.config),
        )
        .confirm(operation, webhooks)
        .await
    }

    /// 发起 STK push 并等待确认
    pub async fn pay(
        &self,
        request: PaymentRequest,
        webhooks: Option<WebhookReceiver>,
    ) -> (Operation, PaymentOutcome) {
        let operation = self.submit(request).await;
        self.confirm_payment(operation, webhooks).await
    }

    fn poller_for(&self, kind: OperationKind) -> OperationPoller {
        OperationPoller::new(
            Arc::clone(&self.transport),
            PollPolicy::for_kind(kind, &self.config),
        )
    }
}
