//! 编排层（Orchestration Layer）
//!
//! ## 层次关系
//!
//! ```text
//! orchestrator::OperationTracker (submit / poll / cancel)
//!     ↓
//! workflow (OperationPoller / PaymentConfirmationCoordinator)
//!     ↓
//! services (能力层：OperationSubmitter / ResultInterpreter)
//!     ↓
//! infrastructure (基础设施：OperationTransport / CancelHandle)
//! ```

pub mod tracker;

pub use tracker::OperationTracker;
