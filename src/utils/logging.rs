/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::{Operation, OperationResult, OperationState, PaymentOutcome};

/// 初始化 tracing 日志
///
/// 优先使用 `RUST_LOG`，否则按 `verbose` 选择 debug / info。
/// 重复调用是安全的（测试中会多次调用）。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!(
        "🚀 程序启动 - {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("🌐 API: {}", config.api_base_url);
    info!(
        "🔬 诊断轮询: 每 {} ms, 最多 {} 次",
        config.diagnosis_poll_interval_ms, config.diagnosis_max_attempts
    );
    info!(
        "💳 支付确认: 每 {} ms, 最多 {} 次, 展示时限 {} 秒",
        config.payment_poll_interval_ms,
        config.payment_max_attempts,
        config.payment_display_timeout_secs
    );
    info!("{}", "=".repeat(60));
}

/// 记录一次操作快照
pub fn log_snapshot(operation: &Operation) {
    match operation.state() {
        OperationState::Submitted | OperationState::Polling => {
            info!("⏳ {} {}", operation, operation.user_message())
        }
        OperationState::Succeeded => info!("✅ {} {}", operation, operation.user_message()),
        OperationState::TimedOut => warn!("⌛ {} {}", operation, operation.user_message()),
        OperationState::Failed | OperationState::Cancelled => {
            warn!("❌ {} {}", operation, operation.user_message())
        }
    }
}

/// 打印终态操作的结果
pub fn log_outcome(operation: &Operation) {
    info!("\n{}", "─".repeat(60));
    match operation.result() {
        Some(OperationResult::Diagnosis(d)) => {
            info!("🌱 诊断: {}", d.predicted_label);
            info!("📊 置信度: {}", d.confidence_percent());
            info!(
                "⚠️ 问题: {} (严重程度: {})",
                truncate_text(&d.recommendations.issue, 80),
                d.recommendations.severity.name()
            );
            for (i, step) in d.recommendations.treatment.iter().enumerate() {
                info!("  {}. {}", i + 1, step);
            }
            if let Some(products) = &d.recommendations.recommended_products {
                for product in products {
                    info!(
                        "  🛒 {} ({})",
                        product.name,
                        product.category.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        Some(OperationResult::Payment(receipt)) => {
            info!("🧾 回执号: {}", receipt.receipt_number);
            info!("💰 金额: {:.2}", receipt.amount);
        }
        None => log_snapshot(operation),
    }
    info!("{}", "─".repeat(60));
}

/// 打印支付确认结论
pub fn log_payment_outcome(outcome: &PaymentOutcome) {
    match outcome {
        PaymentOutcome::Confirmed(receipt) => info!(
            "✅ 支付已确认: 回执 {} 金额 {:.2}",
            receipt.receipt_number, receipt.amount
        ),
        PaymentOutcome::Declined(err) => warn!("❌ 支付未成功: {}", err),
        PaymentOutcome::Pending {
            checkout_request_id,
        } => warn!(
            "⌛ 支付尚未确认 ({})，请稍后在交易记录中查看",
            checkout_request_id
        ),
        PaymentOutcome::Cancelled => warn!("已取消等待支付确认"),
    }
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

/// 遮盖手机号中间的数字，只保留前 4 位与后 3 位
pub fn mask_phone(phone: &str) -> String {
    static PHONE_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = PHONE_RE.get_or_init(|| Regex::new(r"^(\+?\d{4})(\d+)(\d{3})$").ok());

    let compact: String = phone.chars().filter(|c| !c.is_whitespace()).collect();
    match re.as_ref().and_then(|re| re.captures(&compact)) {
        Some(caps) => format!("{}{}{}", &caps[1], "*".repeat(caps[2].len()), &caps[3]),
        None => "*".repeat(compact.chars().count()),
    }
}
