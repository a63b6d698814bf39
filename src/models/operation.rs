//! 外部操作模型
//!
//! 一个 `Operation` 代表一次在服务端异步执行的任务（作物诊断或移动支付），
//! 状态只能沿以下边前进：
//!
//! ```text
//! submitted ──► polling ──► polling (自环)
//!     │            ├──► succeeded
//!     │            ├──► failed
//!     │            ├──► timed_out
//!     │            └──► cancelled
//!     ├──► failed      (创建请求失败)
//!     └──► cancelled
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OperationError;
use crate::infrastructure::CancelHandle;
use crate::models::diagnosis::DiagnosisResult;
use crate::models::payment::PaymentReceipt;

/// 服务端分配的任务 ID，对客户端不透明
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 操作类型，决定状态接口与结果结构
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Diagnosis,
    Payment,
}

/// 失败后重新提交的策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResubmitPolicy {
    /// 重新提交对用户是安全的
    Safe,
    /// 重新提交可能导致重复扣款，必须先提醒用户
    WarnDuplicateCharge,
}

impl OperationKind {
    pub fn resubmit_policy(self) -> ResubmitPolicy {
        match self {
            OperationKind::Diagnosis => ResubmitPolicy::Safe,
            OperationKind::Payment => ResubmitPolicy::WarnDuplicateCharge,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Diagnosis => f.write_str("diagnosis"),
            OperationKind::Payment => f.write_str("payment"),
        }
    }
}

/// 操作状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Submitted,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationState::Succeeded
                | OperationState::Failed
                | OperationState::TimedOut
                | OperationState::Cancelled
        )
    }

    /// 判断 `self -> next` 是否为合法的状态边
    pub fn can_transition_to(self, next: OperationState) -> bool {
        use OperationState::*;
        match (self, next) {
            (Submitted, Polling | Failed | Cancelled) => true,
            (Polling, Polling | Succeeded | Failed | TimedOut | Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationState::Submitted => "submitted",
            OperationState::Polling => "polling",
            OperationState::Succeeded => "succeeded",
            OperationState::Failed => "failed",
            OperationState::TimedOut => "timed_out",
            OperationState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// 成功结果，按操作类型区分
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationResult {
    Diagnosis(DiagnosisResult),
    Payment(PaymentReceipt),
}

/// 一次轮询得到的、已解释过的结论
#[derive(Debug, Clone, PartialEq)]
pub enum PollVerdict {
    /// 仍在处理中
    InProgress,
    /// 成功且载荷合法
    Succeeded(OperationResult),
    /// 终止失败（服务端失败、传输失败、未知状态、载荷非法）
    Failed(OperationError),
    /// 查询预算耗尽
    TimedOut(OperationError),
}

/// 非法的状态迁移
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("非法的状态迁移: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: OperationState,
    pub to: OperationState,
}

/// 被追踪的外部操作
#[derive(Debug, Clone, Serialize)]
pub struct Operation {
    id: Option<OperationId>,
    kind: OperationKind,
    state: OperationState,
    attempts: u32,
    result: Option<OperationResult>,
    error: Option<OperationError>,
    submitted_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    cancel: CancelHandle,
}

impl Operation {
    /// 创建已提交的操作（携带服务端 ID）
    pub fn submitted(kind: OperationKind, id: OperationId) -> Self {
        Self {
            id: Some(id),
            kind,
            state: OperationState::Submitted,
            attempts: 0,
            result: None,
            error: None,
            submitted_at: Utc::now(),
            finished_at: None,
            cancel: CancelHandle::new(),
        }
    }

    /// 创建请求本身失败的操作：从未获得 ID，也从未进入轮询
    pub fn submission_failed(kind: OperationKind, error: OperationError) -> Self {
        let mut op = Self {
            id: None,
            kind,
            state: OperationState::Submitted,
            attempts: 0,
            result: None,
            error: None,
            submitted_at: Utc::now(),
            finished_at: None,
            cancel: CancelHandle::new(),
        };
        op.finish(OperationState::Failed, None, Some(error));
        op
    }

    pub fn id(&self) -> Option<&OperationId> {
        self.id.as_ref()
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn result(&self) -> Option<&OperationResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&OperationError> {
        self.error.as_ref()
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// 取消句柄，交给拥有该操作的视图 / 调用方
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// 调用方是否已请求取消
    pub fn cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 直接取消一个未在轮询中的操作；终态操作不受影响
    pub fn cancel(&mut self) -> bool {
        self.cancel.cancel();
        self.mark_cancelled()
    }

    /// 首次状态查询被安排时迁移到 `polling`
    pub(crate) fn start_polling(&mut self) -> Result<(), InvalidTransition> {
        self.transition(OperationState::Polling)
    }

    /// 登记一次新发出的状态查询，只能在 `polling` 中调用
    pub(crate) fn record_attempt(&mut self) -> Result<u32, InvalidTransition> {
        if self.state != OperationState::Polling {
            return Err(InvalidTransition {
                from: self.state,
                to: OperationState::Polling,
            });
        }
        self.attempts += 1;
        Ok(self.attempts)
    }

    /// 应用一次轮询结论
    ///
    /// 只有当 `for_id` 与本操作 ID 一致、操作仍处于 `polling` 且调用方未取消时才会生效，
    /// 迟到的响应会被丢弃。返回是否已应用。
    pub(crate) fn apply_verdict(&mut self, for_id: &OperationId, verdict: PollVerdict) -> bool {
        if self.id.as_ref() != Some(for_id)
            || self.state != OperationState::Polling
            || self.cancel.is_cancelled()
        {
            return false;
        }
        match verdict {
            PollVerdict::InProgress => true,
            PollVerdict::Succeeded(result) => {
                self.finish(OperationState::Succeeded, Some(result), None)
            }
            PollVerdict::Failed(error) => self.finish(OperationState::Failed, None, Some(error)),
            PollVerdict::TimedOut(error) => {
                self.finish(OperationState::TimedOut, None, Some(error))
            }
        }
    }

    /// 标记为已取消；终态操作返回 false
    pub(crate) fn mark_cancelled(&mut self) -> bool {
        self.finish(OperationState::Cancelled, None, None)
    }

    /// 用户可见的提示文本
    pub fn user_message(&self) -> String {
        match (self.state, self.error.as_ref()) {
            (OperationState::Submitted, _) => "已提交，等待处理".to_string(),
            (OperationState::Polling, _) => "处理中，请稍候".to_string(),
            (OperationState::Succeeded, _) => match self.kind {
                OperationKind::Diagnosis => "诊断完成".to_string(),
                OperationKind::Payment => "支付已确认".to_string(),
            },
            (OperationState::TimedOut, _) => match self.kind {
                OperationKind::Diagnosis => "仍在处理中，请稍后再查看".to_string(),
                OperationKind::Payment => "支付尚未确认，请稍后在交易记录中查看".to_string(),
            },
            (OperationState::Cancelled, _) => "已取消".to_string(),
            (OperationState::Failed, Some(err)) => match self.kind.resubmit_policy() {
                ResubmitPolicy::Safe => format!("处理失败: {}，可以重新提交", err.message),
                ResubmitPolicy::WarnDuplicateCharge => format!(
                    "支付失败: {}。重新支付前请确认未被扣款，避免重复扣费",
                    err.message
                ),
            },
            (OperationState::Failed, None) => "处理失败".to_string(),
        }
    }

    fn transition(&mut self, next: OperationState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    fn finish(
        &mut self,
        terminal: OperationState,
        result: Option<OperationResult>,
        error: Option<OperationError>,
    ) -> bool {
        debug_assert!(terminal.is_terminal());
        if self.transition(terminal).is_err() {
            return false;
        }
        self.result = result;
        self.error = match (terminal, error) {
            (OperationState::Cancelled, _) => Some(OperationError::cancelled()),
            (_, error) => error,
        };
        self.finished_at = Some(Utc::now());
        true
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.id.as_ref().map(OperationId::as_str).unwrap_or("-");
        write!(
            f,
            "[{} #{} 状态={} 查询={}]",
            self.kind, id, self.state, self.attempts
        )
    }
}
