// crates/hx_core/src/lib.rs

//! Helyx Core
//!
//! 非结构化有限体积网格上的分离式压力-速度耦合求解核心：
//!
//! - 网格与场 (mesh, field)
//! - 有限体积离散与线性求解 (fvm, linear_algebra)
//! - Rhie-Chow 面通量 (rhie_chow)
//! - 动量预测与压力修正 (momentum, pressure, pressure_control)
//! - 相分数输运 MULES (mules)
//! - 能量方程 (energy) 与物性 (properties)
//! - 时间步控制与局部时间步 (time_step)
//! - PIMPLE/PISO/非正交修正编排与求解图 (control)
//! - 网格拓扑变化后的场搬运 (topology)
//!
//! # 层级架构
//!
//! ```text
//! control::FlowSolver
//! ├── momentum ──┐
//! ├── pressure ──┴── rhie_chow
//! ├── mules
//! ├── energy ── properties
//! └── time_step
//!         └── fvm ── field ── mesh ── parallel
//! ```
//!
//! # 使用示例
//!
//! ```no_run
//! use hx_config::CaseConfig;
//! use hx_core::control::{FlowSolver, InitialFields};
//! use hx_core::mesh::BoxMeshBuilder;
//! use hx_core::parallel::SerialCommunicator;
//!
//! let mesh = BoxMeshBuilder::new([16, 16, 1], [1.0, 1.0, 0.1]).build().unwrap();
//! let initial = InitialFields::uniform(&mesh, 0.0, 300.0);
//! let mut config = CaseConfig::default();
//! config.pressure_control.p_ref_cell = Some(0);
//! let mut solver = FlowSolver::new(mesh, config, initial, Box::new(SerialCommunicator)).unwrap();
//! solver.run(None).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod control;
pub mod energy;
pub mod field;
pub mod fvm;
pub mod linear_algebra;
pub mod mesh;
pub mod momentum;
pub mod mrf;
pub mod mules;
pub mod parallel;
pub mod pressure;
pub mod pressure_control;
pub mod properties;
pub mod rhie_chow;
pub mod state;
pub mod time_step;
pub mod topology;
pub mod turbulence;

// 重导出常用类型
pub use control::{
    CorrectorLevel, CorrectorLimits, CorrectorState, FlowSolver, InitialFields, ResolvedGraph, RunSummary,
    SolveGraph, SolveStep, StepReport,
};
pub use energy::{EnergyFormulation, EnergySolver};
pub use field::{BoundaryKind, SurfaceField, VolField, VolScalarField, VolVectorField};
pub use fvm::{FvMatrix, SolverPerformance, TimeState};
pub use mesh::{BoxMeshBuilder, BoxSide, PatchKind, PolyMesh};
pub use mules::MulesSolver;
pub use parallel::{Parallel, SerialCommunicator};
pub use pressure::{ContinuityErrors, PressureCorrector};
pub use rhie_chow::RhieChowInterpolator;
pub use state::{FlowFields, FluxBasis, SolveContext};
pub use time_step::{CourantNumbers, TimeStepController};
pub use topology::{BestEffortInitialization, RemapStrategy, TopologyMap};
