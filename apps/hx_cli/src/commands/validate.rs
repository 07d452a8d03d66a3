// apps/hx_cli/src/commands/validate.rs

//! 配置验证命令
//!
//! 解析算例配置并执行与求解器构造阶段相同的检查，另外给出
//! 一些不致命但通常不合理的设置警告。

use anyhow::{bail, Context, Result};
use clap::Args;
use hx_config::CaseConfig;
use hx_core::energy::EnergyFormulation;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// 验证参数
#[derive(Args)]
pub struct ValidateArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 严格模式（警告也视为错误）
    #[arg(long)]
    pub strict: bool,
}

/// 验证结果
#[derive(Default)]
struct ValidationResult {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidationResult {
    fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn is_ok_strict(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

/// 执行验证命令
pub fn execute(args: ValidateArgs) -> Result<()> {
    info!("=== Helyx 配置验证 ===");

    let Some(path) = &args.config else {
        println!("用法: hx_cli validate --config <配置文件> [--strict]");
        return Ok(());
    };

    let mut result = ValidationResult::default();
    if let Some(config) = parse_config(path, &mut result)? {
        check_config(&config, &mut result);
    }
    print_validation_result(&result, args.strict)
}

fn parse_config(path: &Path, result: &mut ValidationResult) -> Result<Option<CaseConfig>> {
    println!("\n检查配置文件: {}", path.display());

    if !path.exists() {
        result.add_error(format!("配置文件不存在: {}", path.display()));
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).context("无法读取配置文件")?;
    match serde_json::from_str::<CaseConfig>(&content) {
        Ok(config) => {
            println!("  ✓ 配置文件格式有效");
            Ok(Some(config))
        }
        Err(e) => {
            result.add_error(format!("JSON 解析错误: {}", e));
            Ok(None)
        }
    }
}

fn check_config(config: &CaseConfig, result: &mut ValidationResult) {
    if let Err(e) = config.validate() {
        result.add_error(e.to_string());
        return;
    }
    if let Err(e) = EnergyFormulation::select(config) {
        result.add_error(e.to_string());
    }

    let controls = &config.controls;
    let steady = config.time.ddt_scheme.is_steady();

    if steady {
        for field in ["p", "U"] {
            let relaxed = config.relaxation.field(field, false).is_some()
                || config.relaxation.equation(field, false).is_some();
            if !relaxed {
                result.add_warning(format!("稳态 SIMPLE 没有为 {} 设置亚松弛", field));
            }
        }
    } else if !controls.residual_control.is_empty() {
        result.add_warning("residualControl 只在稳态算例中生效");
    }

    if controls.n_outer_correctors <= 1 && !controls.outer_corrector_residual_control.is_empty() {
        result.add_warning("nOuterCorrectors = 1 时 outerCorrectorResidualControl 不起作用");
    }

    if config.adaptive_time.adjust_time_step && config.adaptive_time.max_co > 1.0 {
        result.add_warning(format!("maxCo = {} 大于 1", config.adaptive_time.max_co));
    }

    if config.time.ddt_scheme.is_local() && config.lts.r_delta_t_damping_coeff >= 1.0 {
        result.add_warning("rDeltaTDampingCoeff >= 1，局部时间步增长不受阻尼");
    }

    if config.is_multiphase() && config.mules.c_alpha.is_none() && config.mules.interface_compression.is_empty() {
        result.add_warning("多相算例没有界面压缩（cAlpha），界面会被数值扩散抹平");
    }
}

fn print_validation_result(result: &ValidationResult, strict: bool) -> Result<()> {
    println!();
    for e in &result.errors {
        error!("{}", e);
        println!("  ✗ {}", e);
    }
    for w in &result.warnings {
        warn!("{}", w);
        println!("  ! {}", w);
    }

    let ok = if strict {
        result.is_ok_strict()
    } else {
        result.is_ok()
    };
    if !ok {
        bail!(
            "验证失败: {} 个错误, {} 个警告{}",
            result.errors.len(),
            result.warnings.len(),
            if strict { "（严格模式）" } else { "" }
        );
    }
    println!(
        "\n验证通过: {} 个警告",
        result.warnings.len()
    );
    Ok(())
}
