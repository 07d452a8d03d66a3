// apps/hx_cli/src/main.rs

//! Helyx 命令行界面
//!
//! 运行内置演示算例、检查算例配置、显示默认设置。
//!
//! # 架构层级
//!
//! 本程序只负责参数解析与日志初始化，求解全部交给
//! `hx_core::control::FlowSolver`。求解核心用 `log` 记录，
//! 这里的 tracing 订阅器同时接收 `log` 记录。

mod cases;
mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::FmtSubscriber;

/// Helyx 分离式压力-速度耦合求解器命令行工具
#[derive(Parser)]
#[command(name = "hx_cli")]
#[command(author = "Helyx Core Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Helyx segregated pressure-velocity coupling solver", long_about = None)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 运行算例
    Run(commands::run::RunArgs),
    /// 显示信息
    Info(commands::info::InfoArgs),
    /// 验证配置
    Validate(commands::validate::ValidateArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish()
        .try_init()?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args),
        Commands::Info(args) => commands::info::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
    }
}
