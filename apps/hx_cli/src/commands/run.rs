// apps/hx_cli/src/commands/run.rs

//! 运行算例命令
//!
//! 构建演示算例（可用 JSON 配置文件覆盖求解设置），推进到结束时间并
//! 按 `writeInterval` 写出场文件。

use crate::cases::{self, DemoCase};
use anyhow::{Context, Result};
use clap::Args;
use hx_config::CaseConfig;
use hx_core::control::FlowSolver;
use hx_core::parallel::SerialCommunicator;
use hx_core::pressure::mean_pressure;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

/// 运行参数
#[derive(Args)]
pub struct RunArgs {
    /// 演示算例
    #[arg(long, value_enum, default_value = "cavity")]
    pub case: DemoCase,

    /// 算例配置文件（JSON），替换演示算例的求解设置
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 每个方向的单元数
    #[arg(long, default_value = "20")]
    pub cells: usize,

    /// 输出目录
    #[arg(short, long, default_value = "output")]
    pub output: PathBuf,

    /// 结束时间 [s]，覆盖配置
    #[arg(short = 't', long)]
    pub end_time: Option<f64>,

    /// 不写出场文件
    #[arg(long)]
    pub no_write: bool,

    /// 从该时间层重启
    #[arg(long)]
    pub restart: Option<f64>,
}

/// 执行运行命令
pub fn execute(args: RunArgs) -> Result<()> {
    info!("=== Helyx 算例启动 ===");

    let mut setup = cases::build(args.case, args.cells).context("构建演示算例失败")?;
    if let Some(path) = &args.config {
        setup.config = CaseConfig::from_file(path)
            .with_context(|| format!("读取配置文件 {} 失败", path.display()))?;
        info!("使用配置文件: {}", path.display());
    }
    if let Some(t) = args.end_time {
        setup.config.time.end_time = t;
    }
    if let Some(t) = args.restart {
        setup.config.time.start_time = t;
    }
    info!(
        "算例 {:?}: {} 单元, {} 面, 结束时间 {} s",
        args.case,
        setup.mesh.n_cells(),
        setup.mesh.n_faces(),
        setup.config.time.end_time
    );

    let mut solver = FlowSolver::new(setup.mesh, setup.config, setup.initial, Box::new(SerialCommunicator))
        .context("构建求解器失败")?;
    info!("求解顺序: {}", solver.graph());

    if let Some(time) = args.restart {
        let n = solver
            .read_fields(&args.output, time)
            .with_context(|| format!("读取时间层 {} 失败", time))?;
        if n == 0 {
            warn!("时间层 {} 没有场文件，使用初始场", time);
        }
    }

    let case_dir = if args.no_write {
        None
    } else {
        std::fs::create_dir_all(&args.output)
            .with_context(|| format!("创建输出目录 {} 失败", args.output.display()))?;
        Some(args.output.as_path())
    };

    let start = Instant::now();
    let summary = solver.run(case_dir).context("求解失败")?;
    let elapsed = start.elapsed();

    let fields = solver.fields();
    let u_max = fields.u.internal().iter().map(|u| u.length()).fold(0.0_f64, f64::max);
    let p_mean = mean_pressure(solver.mesh(), &fields.p, &SerialCommunicator);

    info!("=== 求解完成 ===");
    info!("总步数: {}", summary.n_steps);
    info!("结束时间: {} s", summary.end_time);
    if summary.converged {
        info!("稳态残差已收敛");
    }
    info!("|U|max = {:.4e} m/s, 平均压力 = {:.6e}", u_max, p_mean);
    info!(
        "累计连续性误差: {:.4e}",
        solver.pressure().cumulative_continuity_error()
    );
    if let Some(mules) = solver.mules() {
        for alpha in mules.alphas() {
            info!(
                "{}: min = {:.4e}, max = {:.4e}, 平均 = {:.6}",
                alpha.name(),
                alpha.min(),
                alpha.max(),
                alpha.weighted_average(solver.mesh())
            );
        }
    }
    info!("计算时间: {:.2} s", elapsed.as_secs_f64());
    info!("写出时间层: {}", summary.written.len());

    Ok(())
}
