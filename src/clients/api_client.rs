/// 后端 API 客户端
///
/// 封装所有与诊断、支付接口相关的 HTTP 调用逻辑
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::infrastructure::OperationTransport;
use crate::models::{
    ImagePayload, OperationId, OperationInput, OperationKind, PaymentRequest, StatusResponse,
    Transaction,
};
use crate::utils::logging::truncate_text;

const DIAGNOSIS_UPLOAD: &str = "diagnosis/upload/";
const MPESA_INITIATE: &str = "payments/mpesa/initiate/";
const MPESA_CONFIRMATION_SIM: &str = "payments/mpesa/confirmation_sim/";
const TRANSACTIONS: &str = "payments/transactions/";

/// 后端 API 客户端
///
/// 内部的 `reqwest::Client` 自带连接池，可以在多个操作间共享。
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// 创建新的 API 客户端
    pub fn new(config: &Config) -> ApiResult<Self> {
        Self::with_timeout(config, config.request_timeout())
    }

    /// 使用自定义请求超时创建
    pub fn with_timeout(config: &Config, timeout: Duration) -> ApiResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::from_reqwest("client", e))?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone().filter(|t| !t.is_empty()),
        })
    }

    /// 上传诊断图片，返回诊断任务 ID
    ///
    /// # 参数
    /// - `image`: 已确认是受支持格式的图片
    pub async fn upload_diagnosis(&self, image: &ImagePayload) -> ApiResult<OperationId> {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.mime_type)
            .map_err(|e| ApiError::from_reqwest(DIAGNOSIS_UPLOAD, e))?;
        let form = Form::new().part("image", part);

        let request = self.http.post(self.url(DIAGNOSIS_UPLOAD)).multipart(form);
        let body: Value = self.send_json(DIAGNOSIS_UPLOAD, request).await?;

        extract_id(DIAGNOSIS_UPLOAD, &body, &["id", "diagnosis_id"])
    }

    /// 查询诊断任务状态
    pub async fn diagnosis_status(&self, id: &OperationId) -> ApiResult<StatusResponse> {
        let endpoint = format!("diagnosis/upload/{}/result/", id);
        let request = self.http.get(self.url(&endpoint));
        self.send_json(&endpoint, request).await
    }

    /// 发起 STK push，返回网关推送引用
    pub async fn initiate_payment(&self, payment: &PaymentRequest) -> ApiResult<OperationId> {
        let request = self.http.post(self.url(MPESA_INITIATE)).json(payment);
        let body: Value = self.send_json(MPESA_INITIATE, request).await?;

        extract_id(
            MPESA_INITIATE,
            &body,
            &["checkout_request_id", "CheckoutRequestID"],
        )
    }

    /// 查询支付状态
    pub async fn payment_status(
        &self,
        checkout_request_id: &OperationId,
    ) -> ApiResult<StatusResponse> {
        let endpoint = format!("payments/mpesa/status/{}/", checkout_request_id);
        let request = self.http.get(self.url(&endpoint));
        self.send_json(&endpoint, request).await
    }

    /// 模拟网关回调（仅沙箱环境）
    ///
    /// 其效果只能通过支付状态接口观察到。
    pub async fn simulate_confirmation(
        &self,
        checkout_request_id: &str,
        result_code: i64,
        receipt_number: &str,
    ) -> ApiResult<Value> {
        let payload = json!({
            "checkout_request_id": checkout_request_id,
            "result_code": result_code,
            "mpesa_receipt_number": receipt_number,
        });
        let request = self.http.post(self.url(MPESA_CONFIRMATION_SIM)).json(&payload);
        self.send_json(MPESA_CONFIRMATION_SIM, request).await
    }

    /// 获取交易记录，兼容分页（`results`）与纯列表两种格式
    pub async fn list_transactions(&self) -> ApiResult<Vec<Transaction>> {
        let request = self.http.get(self.url(TRANSACTIONS));
        let body: Value = self.send_json(TRANSACTIONS, request).await?;

        let list = match body {
            Value::Object(mut map) if map.contains_key("results") => {
                map.remove("results").unwrap_or(Value::Null)
            }
            other => other,
        };
        Ok(serde_json::from_value(list)?)
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// 发送请求并把 2xx 响应解析为 JSON
    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> ApiResult<T> {
        let response = self
            .authorize(request)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(endpoint, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::from_reqwest(endpoint, e))?;
        debug!("{} -> {} ({} 字节)", endpoint, status, text.len());

        if !status.is_success() {
            return Err(ApiError::BadResponse {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl OperationTransport for ApiClient {
    async fn create(&self, input: &OperationInput) -> ApiResult<OperationId> {
        match input {
            OperationInput::Diagnosis(image) => self.upload_diagnosis(image).await,
            OperationInput::Payment(payment) => self.initiate_payment(payment).await,
        }
    }

    async fn fetch_status(
        &self,
        kind: OperationKind,
        id: &OperationId,
    ) -> ApiResult<StatusResponse> {
        match kind {
            OperationKind::Diagnosis => self.diagnosis_status(id).await,
            OperationKind::Payment => self.payment_status(id).await,
        }
    }
}

/// 从响应中提取 ID（数字或字符串）
fn extract_id(endpoint: &str, body: &Value, fields: &[&str]) -> ApiResult<OperationId> {
    fields
        .iter()
        .filter_map(|field| body.get(*field))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(OperationId::new(s.trim())),
            Value::Number(n) => Some(OperationId::new(n.to_string())),
            _ => None,
        })
        .ok_or_else(|| ApiError::MissingField {
            endpoint: endpoint.to_string(),
            field: fields.join(" | "),
        })
}

/// 从错误响应体中提取可读信息（`error` / `detail` / `message`）
fn error_message(body: &str) -> Option<String> {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => {
            let trimmed = body.trim();
            return (!trimmed.is_empty()).then(|| truncate_text(trimmed, 200));
        }
    };
    ["error", "detail", "message"]
        .iter()
        .find_map(|key| value.get(*key))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_numeric_id() {
        let id = extract_id("x", &json!({ "id": 17, "status": "uploaded" }), &["id"]).unwrap();
        assert_eq!(id.as_str(), "17");
    }

    #[test]
    fn test_extract_id_falls_back_to_second_field() {
        let body = json!({ "CheckoutRequestID": "ws_CO_191220191020363925" });
        let id = extract_id("x", &body, &["checkout_request_id", "CheckoutRequestID"]).unwrap();
        assert_eq!(id.as_str(), "ws_CO_191220191020363925");
    }

    #[test]
    fn test_missing_id_is_an_error() {
        let err = extract_id("x", &json!({ "status": "ok" }), &["id"]).unwrap_err();
        assert!(matches!(err, ApiError::MissingField { .. }));
    }

    #[test]
    fn test_error_message_prefers_error_field() {
        assert_eq!(
            error_message(r#"{"error": "Invalid phone number"}"#).as_deref(),
            Some("Invalid phone number")
        );
        assert_eq!(error_message("Bad Gateway").as_deref(), Some("Bad Gateway"));
        assert_eq!(error_message("  "), None);
    }

    #[test]
    fn test_url_joining() {
        let config = Config {
            api_base_url: "http://localhost:8000/api/".to_string(),
            ..Config::default()
        };
        let client = ApiClient::new(&config).unwrap();
        assert_eq!(
            client.url(DIAGNOSIS_UPLOAD),
            "http://localhost:8000/api/diagnosis/upload/"
        );
    }
}
