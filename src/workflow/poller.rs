//! 任务轮询 - 流程层
//!
//! 核心职责：把一个 `submitted` 的操作驱动到终态，并以惰性、有限的快照流的形式交给调用方。
//!
//! 流程：
//! 1. 立即迁移到 `polling` 并发出第一份快照
//! 2. 立即发出第一次状态查询，之后每次响应返回后等待固定间隔再查询
//! 3. 同一时刻最多一个查询在途
//! 4. 成功 / 失败 / 次数耗尽 / 时限到达 / 取消 时发出终态快照并结束

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ErrorKind, OperationError};
use crate::infrastructure::{CancelHandle, OperationTransport};
use crate::models::{Operation, OperationKind, OperationState, PollVerdict};
use crate::services::ResultInterpreter;

/// 操作快照流，最后一项总是终态快照
pub type OperationStream = BoxStream<'static, Operation>;

/// 轮询策略
///
/// 固定间隔，不做指数退避也不加抖动。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// 两次查询之间的间隔（从上一次响应返回开始计）
    pub interval: Duration,
    /// 最多发出的查询次数
    pub max_attempts: u32,
    /// 从开始轮询起的总时限；到期即 `timed_out`
    pub deadline: Option<Duration>,
}

impl PollPolicy {
    /// 诊断任务：默认每 2 秒一次，最多 30 次
    pub fn diagnosis(config: &Config) -> Self {
        Self {
            interval: Duration::from_millis(config.diagnosis_poll_interval_ms),
            max_attempts: config.diagnosis_max_attempts,
            deadline: None,
        }
    }

    /// 支付确认：固定的展示时限，到期只表示"尚未确认"
    pub fn payment(config: &Config) -> Self {
        Self {
            interval: Duration::from_millis(config.payment_poll_interval_ms),
            max_attempts: config.payment_max_attempts,
            deadline: Some(Duration::from_secs(config.payment_display_timeout_secs)),
        }
    }

    pub fn for_kind(kind: OperationKind, config: &Config) -> Self {
        match kind {
            OperationKind::Diagnosis => Self::diagnosis(config),
            OperationKind::Payment => Self::payment(config),
        }
    }
}

/// 任务轮询器
///
/// - 不持有任何操作状态，每次 `poll` 都生成独立的运行
/// - 只依赖传输能力和结果解释器
#[derive(Clone)]
pub struct OperationPoller {
    transport: Arc<dyn OperationTransport>,
    interpreter: ResultInterpreter,
    policy: PollPolicy,
}

impl OperationPoller {
    pub fn new(transport: Arc<dyn OperationTransport>, policy: PollPolicy) -> Self {
        Self {
            transport,
            interpreter: ResultInterpreter::new(),
            policy,
        }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// 轮询操作，返回快照流
    ///
    /// 流是惰性的：不被消费就不会发出查询。丢弃流等同于放弃在途查询。
    /// 已是终态的操作只产出一份快照。
    pub fn poll(&self, operation: Operation) -> OperationStream {
        let run = PollRun {
            cancel: operation.cancel_handle(),
            operation,
            transport: Arc::clone(&self.transport),
            interpreter: self.interpreter,
            policy: self.policy,
            deadline: None,
            phase: Phase::Start,
        };

        stream::unfold(run, |mut run| async move {
            let snapshot = run.step().await?;
            Some((snapshot, run))
        })
        .boxed()
    }

    /// 轮询直到终态，只返回最终快照
    pub async fn run_to_end(&self, operation: Operation) -> Operation {
        let fallback = operation.clone();
        self.poll(operation)
            .fold(fallback, |_, snapshot| async move { snapshot })
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// 尚未产出任何快照
    Start,
    /// 下一次查询立即发出
    QueryNow,
    /// 下一次查询前需要等待一个间隔
    Waiting,
    /// 终态快照已产出
    Done,
}

/// 单个操作的一次轮询运行，独占自己的计数与计时器
struct PollRun {
    operation: Operation,
    cancel: CancelHandle,
    transport: Arc<dyn OperationTransport>,
    interpreter: ResultInterpreter,
    policy: PollPolicy,
    deadline: Option<Instant>,
    phase: Phase,
}

/// 一次等待或查询被什么打断
enum Interrupt {
    Cancelled,
    DeadlineReached,
}

impl PollRun {
    /// 推进到下一份快照；返回 None 表示流结束
    async fn step(&mut self) -> Option<Operation> {
        match self.phase {
            Phase::Done => return None,
            Phase::Start => return Some(self.start()),
            Phase::QueryNow => {}
            Phase::Waiting => {
                if let Err(interrupt) = self.wait_interval().await {
                    return Some(self.interrupt(interrupt));
                }
            }
        }

        if self.cancel.is_cancelled() {
            return Some(self.interrupt(Interrupt::Cancelled));
        }
        Some(self.query_once().await)
    }

    fn start(&mut self) -> Operation {
        if self.operation.is_terminal() {
            return self.finish();
        }
        if self.cancel.is_cancelled() {
            return self.interrupt(Interrupt::Cancelled);
        }
        // 已在轮询中的快照沿用原有计数继续
        if self.operation.state() == OperationState::Submitted {
            if let Err(e) = self.operation.start_polling() {
                warn!("{} 无法开始轮询: {}", self.operation, e);
                return self.finish();
            }
        }
        self.deadline = self.policy.deadline.map(|d| Instant::now() + d);
        self.phase = Phase::QueryNow;
        info!(
            "🔄 开始轮询 {} (间隔 {:?}, 最多 {} 次)",
            self.operation, self.policy.interval, self.policy.max_attempts
        );
        self.operation.clone()
    }

    /// 等待一个轮询间隔；时限先到则提前返回
    async fn wait_interval(&self) -> Result<(), Interrupt> {
        let wake = Instant::now() + self.policy.interval;
        let (until, hits_deadline) = match self.deadline {
            Some(deadline) if deadline <= wake => (deadline, true),
            _ => (wake, false),
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            _ = sleep_until(until) => {
                if hits_deadline {
                    Err(Interrupt::DeadlineReached)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// 发出一次状态查询并应用其结论
    async fn query_once(&mut self) -> Operation {
        let id = match self.operation.id().cloned() {
            Some(id) => id,
            None => return self.finish(),
        };
        if self.operation.attempts() >= self.policy.max_attempts {
            let error = OperationError::timeout(format!(
                "已查询 {} 次仍在处理中",
                self.operation.attempts()
            ));
            self.operation.apply_verdict(&id, PollVerdict::TimedOut(error));
            return self.finish();
        }
        let attempt = match self.operation.record_attempt() {
            Ok(attempt) => attempt,
            Err(e) => {
                warn!("{} 无法登记查询: {}", self.operation, e);
                return self.finish();
            }
        };
        let kind = self.operation.kind();
        debug!(
            "[{} #{}] 第 {}/{} 次查询",
            kind, id, attempt, self.policy.max_attempts
        );

        let reply = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            _ = until_deadline(self.deadline) => Err(Interrupt::DeadlineReached),
            reply = self.transport.fetch_status(kind, &id) => Ok(reply),
        };

        let reply = match reply {
            Ok(reply) => reply,
            Err(interrupt) => return self.interrupt(interrupt),
        };

        // 响应返回时调用方可能已经放弃
        if self.cancel.is_cancelled() {
            debug!("[{} #{}] 丢弃取消后到达的响应", kind, id);
            return self.interrupt(Interrupt::Cancelled);
        }

        let budget_spent = attempt >= self.policy.max_attempts;
        let verdict = match reply {
            Ok(response) => {
                debug!(
                    "[{} #{}] 状态: {}",
                    kind,
                    id,
                    response.status_text().unwrap_or("-")
                );
                match self.interpreter.interpret(kind, &id, &response) {
                    PollVerdict::InProgress if budget_spent => PollVerdict::TimedOut(
                        OperationError::timeout(format!("已查询 {} 次仍在处理中", attempt)),
                    ),
                    verdict => verdict,
                }
            }
            Err(e) if budget_spent && e.is_timeout() => PollVerdict::TimedOut(
                OperationError::timeout(format!("第 {} 次查询超时，任务可能仍在处理", attempt)),
            ),
            Err(e) if e.is_transport() => {
                PollVerdict::Failed(OperationError::transport(e.to_string()))
            }
            // 2xx 但响应体无法识别，按未知状态关闭
            Err(e) => PollVerdict::Failed(OperationError::new(
                ErrorKind::UnrecognizedStatus,
                format!("无法识别的状态响应: {}", e),
            )),
        };

        self.operation.apply_verdict(&id, verdict);
        if self.operation.is_terminal() {
            return self.finish();
        }

        self.phase = Phase::Waiting;
        self.operation.clone()
    }

    fn interrupt(&mut self, interrupt: Interrupt) -> Operation {
        match interrupt {
            Interrupt::Cancelled => {
                self.operation.mark_cancelled();
            }
            Interrupt::DeadlineReached => {
                if let Some(id) = self.operation.id().cloned() {
                    let error = OperationError::timeout(format!(
                        "{} 次查询后展示时限已到，尚无确认信号",
                        self.operation.attempts()
                    ));
                    self.operation
                        .apply_verdict(&id, PollVerdict::TimedOut(error));
                }
            }
        }
        self.finish()
    }

    fn finish(&mut self) -> Operation {
        self.phase = Phase::Done;
        info!("🏁 轮询结束 {}", self.operation);
        self.operation.clone()
    }
}

async fn until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
