//! 协作式取消句柄
//!
//! 视图卸载或调用方放弃时调用 `cancel()`，轮询器在每次等待与查询时都会观察它。

use tokio_util::sync::CancellationToken;

/// 取消句柄，可廉价克隆，所有克隆共享同一个取消状态
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消，可重复调用
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 等待取消发生
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}
