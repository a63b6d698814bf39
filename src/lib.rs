//! # Agri Tracker
//!
//! 农业市场客户端中"慢速外部操作"的追踪核心：作物图片诊断任务与 M-Pesa 支付确认。
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `OperationTransport` - 创建任务 / 查询状态的能力接口
//! - `CancelHandle` - 协作式取消
//!
//! ### ② 业务能力层（Services）
//! - `OperationSubmitter` - 一次创建请求，不重试
//! - `ResultInterpreter` - 状态归类与载荷校验
//!
//! ### ③ 流程层（Workflow）
//! - `OperationPoller` - 固定间隔轮询，产出快照流
//! - `PaymentConfirmationCoordinator` - 回调与轮询先到者为准
//!
//! ### ④ 编排层（Orchestration）
//! - `OperationTracker` - submit / poll / cancel
//!
//! ## 模块结构

pub mod app;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use app::App;
pub use clients::ApiClient;
pub use config::Config;
pub use error::{AppError, AppResult, ErrorKind, OperationError};
pub use infrastructure::{CancelHandle, OperationTransport};
pub use models::{Operation, OperationId, OperationKind, OperationState, PaymentOutcome};
pub use orchestrator::OperationTracker;
pub use workflow::{OperationPoller, PaymentConfirmationCoordinator, PollPolicy};
