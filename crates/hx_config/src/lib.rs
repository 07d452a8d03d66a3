// crates/hx_config/src/lib.rs

//! Helyx Config Layer
//!
//! 算例配置层：以只读字典的形式向求解核心提供全部控制参数。
//! 所有类型均可由 serde 从 JSON 读取，键名沿用求解器字典写法
//! （`nOuterCorr`、`nCorrPISO`、`MULESCorr`、`rDeltaTDampingCoeff` 等）。
//!
//! # 模块概览
//!
//! - [`controls`]: PIMPLE/PISO/SIMPLE 迭代控制与残差控制
//! - [`relaxation`]: 场/方程亚松弛因子
//! - [`linear_solver`]: 按场的线性求解器设置
//! - [`schemes`]: 时间与对流离散格式
//! - [`mules`]: 相分数输运
//! - [`time_step`]: 时间范围、全局自适应步长、局部时间步
//! - [`physics`]: 物性、相、能量、压力控制、旋转参考系
//! - [`case`]: 汇总与交叉验证
//!
//! # 层级架构
//!
//! ```text
//! hx_cli        ─> CaseConfig::from_file
//! hx_core       ─> 构造阶段读取配置，计算阶段不再查找
//! hx_config     ─> 本层
//! hx_foundation
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod case;
pub mod controls;
pub mod error;
pub mod linear_solver;
pub mod mules;
pub mod physics;
pub mod relaxation;
pub mod schemes;
pub mod time_step;

// 重导出核心类型
pub use case::CaseConfig;
pub use controls::{ResidualTolerance, SolutionControls};
pub use error::ConfigError;
pub use linear_solver::{
    LinearSolverConfig, LinearSolverKind, LinearSolverSettings, PreconditionerKind,
};
pub use mules::{MulesConfig, PhasePairCompression};
pub use physics::{
    CellSelection, EnergyConfig, EnergyFormulationKind, EnergyVariable, FluidConfig,
    MaterialModel, MrfZoneConfig, PhaseConfig, PressureControlConfig, ThermalProperties,
};
pub use relaxation::RelaxationFactors;
pub use schemes::{ConvectionScheme, DivSchemes, TimeScheme};
pub use time_step::{AdaptiveTimeConfig, LtsConfig, TimeConfig};
