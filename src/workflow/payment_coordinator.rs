//! 支付确认协调 - 流程层
//!
//! STK push 发出后有两条确认路径：
//! 1. 网关回调（由后端转发，到达时间不可预测）
//! 2. 客户端轮询支付状态接口，直到展示时限到期
//!
//! 先到的明确终态信号为准。展示时限到期只说明"尚未确认"，绝不能当作支付成功。

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::infrastructure::OperationTransport;
use crate::models::{
    Operation, OperationKind, OperationState, PaymentOutcome, WebhookConfirmation,
};
use crate::services::ResultInterpreter;
use crate::workflow::poller::{OperationPoller, PollPolicy};

/// 回调确认的接收端，由宿主应用（推送通道、WebSocket 等）写入
pub type WebhookReceiver = mpsc::Receiver<WebhookConfirmation>;

/// 支付确认协调器
pub struct PaymentConfirmationCoordinator {
    poller: OperationPoller,
    interpreter: ResultInterpreter,
}

impl PaymentConfirmationCoordinator {
    pub fn new(transport: Arc<dyn OperationTransport>, policy: PollPolicy) -> Self {
        Self {
            poller: OperationPoller::new(transport, policy),
            interpreter: ResultInterpreter::new(),
        }
    }

    /// 等待支付确认
    ///
    /// # 参数
    /// - `operation`: 已提交的支付操作（ID 为网关推送引用）
    /// - `webhooks`: 可选的回调确认通道
    ///
    /// # 返回
    /// 终态操作与面向界面的结论
    pub async fn confirm(
        &self,
        operation: Operation,
        mut webhooks: Option<WebhookReceiver>,
    ) -> (Operation, PaymentOutcome) {
        if operation.kind() != OperationKind::Payment {
            warn!("{} 不是支付操作，按普通轮询处理", operation);
        }

        let checkout_id = operation.id().cloned();
        let mut latest = operation.clone();
        let mut snapshots = self.poller.poll(operation);

        loop {
            tokio::select! {
                biased;
                confirmation = next_confirmation(&mut webhooks) => {
                    let id = match checkout_id.as_ref() {
                        Some(id) if id.as_str() == confirmation.checkout_request_id => id,
                        _ => {
                            debug!(
                                "忽略不属于本操作的回调: {}",
                                confirmation.checkout_request_id
                            );
                            continue;
                        }
                    };
                    let verdict = self.interpreter.interpret_webhook(&confirmation);
                    if latest.state() == OperationState::Submitted {
                        debug!("{} 在首次查询前收到回调", latest);
                        if let Err(e) = latest.start_polling() {
                            warn!("{} 无法应用回调: {}", latest, e);
                            continue;
                        }
                    }
                    if latest.apply_verdict(id, verdict) && latest.is_terminal() {
                        info!("📨 回调先到达: {}", latest);
                        break;
                    }
                }
                next = snapshots.next() => match next {
                    Some(snapshot) => {
                        latest = snapshot;
                        if latest.is_terminal() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        let outcome = PaymentOutcome::from_operation(&latest);
        if let PaymentOutcome::Pending { .. } = outcome {
            warn!("⌛ {} 展示时限内没有收到确认信号", latest);
        }
        (latest, outcome)
    }
}

/// 读取下一条回调；没有通道或通道已关闭时永远挂起
async fn next_confirmation(webhooks: &mut Option<WebhookReceiver>) -> WebhookConfirmation {
    if let Some(rx) = webhooks.as_mut() {
        if let Some(confirmation) = rx.recv().await {
            return confirmation;
        }
    }
    std::future::pending().await
}
