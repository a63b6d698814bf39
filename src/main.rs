use std::path::PathBuf;

use agri_tracker::models::{OperationState, PaymentOutcome};
use agri_tracker::utils::logging;
use agri_tracker::{App, Config};
use anyhow::Result;
use clap::{Parser, Subcommand};

/// 农业市场客户端 - 作物诊断与 M-Pesa 支付追踪
#[derive(Parser)]
#[command(name = "agri-tracker")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML 配置文件（环境变量优先）
    #[arg(long, global = true, env = "AGRI_CONFIG")]
    config: Option<PathBuf>,

    /// 输出详细日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 上传作物图片并等待诊断结果
    Diagnose {
        /// JPEG / PNG 图片路径
        #[arg(long)]
        image: PathBuf,
    },
    /// 为订单发起 M-Pesa STK push 并等待确认
    Pay {
        #[arg(long)]
        order: String,
        /// 付款手机号，例如 +254712345678
        #[arg(long)]
        phone: String,
    },
    /// 在沙箱环境模拟网关回调
    SimulateWebhook {
        #[arg(long)]
        checkout: String,
        #[arg(long, default_value_t = 0)]
        result_code: i64,
        #[arg(long, default_value = "QLTEST123")]
        receipt: String,
    },
    /// 查看交易记录
    Transactions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let config = match &cli.config {
        Some(path) => agri_tracker::models::load_config(path).await?,
        None => Config::from_env()?,
    };

    // 初始化日志
    logging::init(cli.verbose || config.verbose_logging);

    let app = App::initialize(config)?;

    match cli.command {
        Commands::Diagnose { image } => {
            let operation = app.diagnose(&image).await?;
            if operation.state() == OperationState::Failed {
                std::process::exit(1);
            }
        }
        Commands::Pay { order, phone } => {
            let outcome = app.pay(&order, &phone).await?;
            if let PaymentOutcome::Declined(_) = outcome {
                std::process::exit(1);
            }
        }
        Commands::SimulateWebhook {
            checkout,
            result_code,
            receipt,
        } => app.simulate_webhook(&checkout, result_code, &receipt).await?,
        Commands::Transactions => app.transactions().await?,
    }

    Ok(())
}
