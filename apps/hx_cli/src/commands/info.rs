// apps/hx_cli/src/commands/info.rs

//! 信息显示命令
//!
//! 显示系统信息、默认算例配置，以及给定配置解析出的求解顺序。

use crate::cases::{self, DemoCase};
use anyhow::{Context, Result};
use clap::Args;
use hx_config::CaseConfig;
use hx_core::control::FlowSolver;
use hx_core::energy::EnergyFormulation;
use hx_core::parallel::SerialCommunicator;
use std::path::PathBuf;
use tracing::info;

/// 信息显示参数
#[derive(Args)]
pub struct InfoArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 显示系统信息
    #[arg(long)]
    pub system: bool,

    /// 显示默认配置
    #[arg(long)]
    pub defaults: bool,

    /// 显示演示算例的求解顺序
    #[arg(long, value_enum)]
    pub case: Option<DemoCase>,
}

/// 执行信息命令
pub fn execute(args: InfoArgs) -> Result<()> {
    info!("=== Helyx 信息 ===");

    if args.system {
        print_system_info();
    }

    if args.defaults {
        print_default_config()?;
    }

    if let Some(path) = &args.config {
        let config = CaseConfig::from_file(path)
            .with_context(|| format!("读取配置文件 {} 失败", path.display()))?;
        print_case_summary(&config)?;
    }

    if let Some(case) = args.case {
        print_solve_order(case)?;
    }

    if args.config.is_none() && args.case.is_none() && !args.system && !args.defaults {
        // 默认显示所有信息
        print_system_info();
        println!();
        print_default_config()?;
    }

    Ok(())
}

fn print_system_info() {
    println!("=== 系统信息 ===");
    println!("Helyx CLI 版本: {}", env!("CARGO_PKG_VERSION"));
    println!("目标平台: {}", std::env::consts::ARCH);
    println!("操作系统: {}", std::env::consts::OS);
    println!("\n演示算例:");
    println!("  - cavity     顶盖驱动方腔（不可压 PISO）");
    println!("  - dam-break  二维溃坝（两相 MULES）");
    println!("  - closed-box 封闭理想气体方腔（质量通量）");
}

fn print_default_config() -> Result<()> {
    println!("=== 默认算例配置 ===");
    let json = serde_json::to_string_pretty(&CaseConfig::default()).context("序列化默认配置失败")?;
    println!("{}", json);
    Ok(())
}

fn print_case_summary(config: &CaseConfig) -> Result<()> {
    println!("=== 算例配置 ===");
    let c = &config.controls;
    println!("时间格式: {}", config.time.ddt_scheme.name());
    println!(
        "外迭代 {}，PISO 修正 {}，非正交修正 {}",
        c.n_outer_correctors, c.n_corr_piso, c.n_non_orth_correctors
    );
    println!("动量预测: {}，SIMPLEC: {}", c.momentum_predictor, c.consistent);
    if config.is_multiphase() {
        let names: Vec<&str> = config.phases.iter().map(|p| p.name.as_str()).collect();
        println!("相: {}", names.join(", "));
    } else {
        println!("物性: {:?}", config.fluid.material);
    }
    match EnergyFormulation::select(config).context("选择能量方程失败")? {
        Some(f) => println!("能量方程: {}", f.name()),
        None => println!("能量方程: 不求解"),
    }
    Ok(())
}

fn print_solve_order(case: DemoCase) -> Result<()> {
    let setup = cases::build(case, 4).context("构建演示算例失败")?;
    let solver = FlowSolver::new(setup.mesh, setup.config, setup.initial, Box::new(SerialCommunicator))
        .context("构建求解器失败")?;
    println!("=== {:?} 求解顺序 ===", case);
    for (i, (step, level)) in solver.graph().order().iter().enumerate() {
        println!("  {}. {} @ {}", i + 1, step, level);
    }
    Ok(())
}
