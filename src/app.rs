use std::path::Path;

use anyhow::{Context, Result};
use futures::StreamExt;
use tracing::{info, warn};

use crate::clients::ApiClient;
use crate::config::Config;
use crate::models::{ImagePayload, Operation, PaymentOutcome, PaymentRequest, ResubmitPolicy};
use crate::orchestrator::OperationTracker;
use crate::utils::logging::{
    log_outcome, log_payment_outcome, log_snapshot, log_startup, truncate_text,
};

/// 应用主结构
pub struct App {
    tracker: OperationTracker,
    client: ApiClient,
}

impl App {
    /// 初始化应用
    pub fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let client = ApiClient::new(&config)?;
        let tracker = OperationTracker::with_api_client(config)?;

        Ok(Self { tracker, client })
    }

    /// 上传作物图片并等待诊断结果
    ///
    /// Ctrl-C 会取消轮询。
    pub async fn diagnose(&self, image_path: &Path) -> Result<Operation> {
        let image = load_image(image_path).await?;

        let operation = self.tracker.submit(image).await;
        let handle = operation.cancel_handle();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                handle.cancel();
            }
        });

        let mut snapshots = self.tracker.poll(operation.clone());
        let mut last = operation;
        while let Some(snapshot) = snapshots.next().await {
            log_snapshot(&snapshot);
            last = snapshot;
        }
        ctrl_c.abort();

        log_outcome(&last);
        if last.error().is_some() && last.kind().resubmit_policy() == ResubmitPolicy::Safe {
            info!("💡 可以重新上传图片再次诊断");
        }
        Ok(last)
    }

    /// 发起 M-Pesa 支付并等待确认
    pub async fn pay(&self, order_id: &str, phone: &str) -> Result<PaymentOutcome> {
        let operation = self
            .tracker
            .submit(PaymentRequest::new(order_id, phone))
            .await;
        if operation.is_terminal() {
            log_snapshot(&operation);
            warn!("⚠️ 重新发起支付前请确认手机上没有待处理的扣款请求");
            return Ok(PaymentOutcome::from_operation(&operation));
        }
        info!("📱 支付请求已发送，请在手机上确认");

        let handle = operation.cancel_handle();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                handle.cancel();
            }
        });

        let (last, outcome) = self.tracker.confirm_payment(operation, None).await;
        ctrl_c.abort();

        log_snapshot(&last);
        log_payment_outcome(&outcome);
        Ok(outcome)
    }

    /// 在沙箱环境模拟网关回调
    pub async fn simulate_webhook(
        &self,
        checkout_request_id: &str,
        result_code: i64,
        receipt_number: &str,
    ) -> Result<()> {
        let response = self
            .client
            .simulate_confirmation(checkout_request_id, result_code, receipt_number)
            .await
            .context("模拟回调失败")?;
        info!("✓ 模拟回调已发送: {}", truncate_text(&response.to_string(), 200));
        Ok(())
    }

    /// 打印交易记录
    pub async fn transactions(&self) -> Result<()> {
        let transactions = self
            .client
            .list_transactions()
            .await
            .context("获取交易记录失败")?;

        info!("📋 共 {} 条交易记录", transactions.len());
        for tx in &transactions {
            info!(
                "  #{} {} | 回执 {} | 金额 {}",
                tx.id,
                tx.status,
                tx.mpesa_receipt_number.as_deref().unwrap_or("-"),
                tx.amount
                    .map(|a| format!("{:.2}", a))
                    .unwrap_or_else(|| "-".to_string())
            );
        }
        Ok(())
    }

    pub fn tracker(&self) -> &OperationTracker {
        &self.tracker
    }
}

/// 读取图片文件并确认是 JPEG / PNG
async fn load_image(path: &Path) -> Result<ImagePayload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("无法读取图片: {}", path.display()))?;

    let mime_type = detect_image_mime(&bytes)
        .with_context(|| format!("不支持的图片格式（仅支持 JPEG/PNG）: {}", path.display()))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());

    Ok(ImagePayload::new(bytes, file_name, mime_type))
}

/// 根据文件头识别图片类型
pub fn detect_image_mime(bytes: &[u8]) -> Option<&'static str> {
    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF];

    if bytes.starts_with(PNG) {
        Some("image/png")
    } else if bytes.starts_with(JPEG) {
        Some("image/jpeg")
    } else {
        None
    }
}
