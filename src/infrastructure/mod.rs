//! 基础设施层
//!
//! - `OperationTransport` - 与后端交互的唯一能力接口（创建任务、查询状态）
//! - `CancelHandle` - 协作式取消句柄

pub mod cancel;
pub mod transport;

pub use cancel::CancelHandle;
pub use transport::OperationTransport;
