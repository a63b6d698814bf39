//! 集成测试共用的脚本化传输实现
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agri_tracker::error::{ApiError, ApiResult};
use agri_tracker::models::{
    ImagePayload, OperationId, OperationInput, OperationKind, PaymentRequest, StatusResponse,
};
use agri_tracker::{CancelHandle, Config, OperationTracker, OperationTransport};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

/// 一次状态查询的预设响应
#[derive(Debug, Clone)]
pub enum Reply {
    Status(StatusResponse),
    /// 后端返回 502
    BadGateway,
    /// 客户端请求超时
    TimedOut,
    /// 2xx 但响应体不是 JSON
    Garbled,
    /// 永远不返回
    Hang,
    /// 等待一段时间后再给出内层响应
    Delayed(Duration, Box<Reply>),
    /// 先触发取消，再给出内层响应
    CancelFirst(CancelHandle, Box<Reply>),
}

/// 按脚本依次返回响应的传输实现
///
/// 脚本用完后一直重复 `fallback`。
pub struct ScriptedTransport {
    id: Option<OperationId>,
    replies: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    creates: AtomicU32,
    queries: AtomicU32,
    query_started: Notify,
}

impl ScriptedTransport {
    pub fn new(id: &str, replies: Vec<Reply>, fallback: Reply) -> Arc<Self> {
        Arc::new(Self {
            id: Some(OperationId::new(id)),
            replies: Mutex::new(replies.into()),
            fallback,
            creates: AtomicU32::new(0),
            queries: AtomicU32::new(0),
            query_started: Notify::new(),
        })
    }

    /// 创建请求总是失败
    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            id: None,
            replies: Mutex::new(VecDeque::new()),
            fallback: Reply::Hang,
            creates: AtomicU32::new(0),
            queries: AtomicU32::new(0),
            query_started: Notify::new(),
        })
    }

    pub fn creates(&self) -> u32 {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> u32 {
        self.queries.load(Ordering::SeqCst)
    }

    /// 等到第 `n` 次查询已经发出
    pub async fn wait_for_query(&self, n: u32) {
        while self.queries() < n {
            self.query_started.notified().await;
        }
    }

    /// 在脚本末尾追加一个响应
    pub fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    fn next_reply(&self) -> Reply {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl OperationTransport for ScriptedTransport {
    async fn create(&self, _input: &OperationInput) -> ApiResult<OperationId> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.id.clone().ok_or_else(|| ApiError::BadResponse {
            endpoint: "create".to_string(),
            status: 400,
            message: Some("Invalid phone number".to_string()),
        })
    }

    async fn fetch_status(
        &self,
        _kind: OperationKind,
        _id: &OperationId,
    ) -> ApiResult<StatusResponse> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.query_started.notify_one();

        let mut reply = self.next_reply();
        loop {
            reply = match reply {
                Reply::Status(response) => return Ok(response),
                Reply::BadGateway => {
                    return Err(ApiError::BadResponse {
                        endpoint: "status".to_string(),
                        status: 502,
                        message: Some("Bad Gateway".to_string()),
                    })
                }
                Reply::TimedOut => {
                    return Err(ApiError::RequestFailed {
                        endpoint: "status".to_string(),
                        timed_out: true,
                        source: "operation timed out".into(),
                    })
                }
                Reply::Garbled => {
                    let err = serde_json::from_str::<Value>("<html>502</html>").unwrap_err();
                    return Err(ApiError::from(err));
                }
                Reply::Hang => std::future::pending().await,
                Reply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    *inner
                }
                Reply::CancelFirst(handle, inner) => {
                    handle.cancel();
                    *inner
                }
            };
        }
    }
}

pub fn tracker(transport: &Arc<ScriptedTransport>) -> OperationTracker {
    OperationTracker::new(Config::default(), transport.clone())
}

pub fn in_progress() -> Reply {
    Reply::Status(StatusResponse::new("in_progress"))
}

pub fn diagnosis_payload() -> Value {
    json!({
        "predicted_label": "Maize Leaf Rust",
        "confidence": 0.87,
        "recommendations": {
            "issue": "Puccinia sorghi infection",
            "severity": "Moderate",
            "treatment": ["Apply fungicide", "Rotate crops"],
            "recommended_products": [{ "id": 7, "name": "Mancozeb 80WP", "category": "pesticides" }]
        }
    })
}

pub fn diagnosis_done() -> Reply {
    Reply::Status(StatusResponse::new("completed").with_result(diagnosis_payload()))
}

pub fn payment_done(receipt: &str, amount: f64) -> Reply {
    Reply::Status(
        StatusResponse::new("success")
            .with_field("mpesa_receipt_number", json!(receipt))
            .with_field("amount", json!(amount)),
    )
}

pub fn leaf_image() -> ImagePayload {
    ImagePayload::new(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00], "leaf.jpg", "image/jpeg")
}

pub fn payment_request() -> PaymentRequest {
    PaymentRequest::new("ORD-1001", "+254712345678")
}
