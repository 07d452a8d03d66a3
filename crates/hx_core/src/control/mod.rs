// crates/hx_core/src/control/mod.rs

//! 压力-速度耦合的编排
//!
//! - [`correctors`]: 三层修正循环计数与"最后一次"判断
//! - [`solve_graph`]: 求解步依赖图，构造阶段解析一次
//! - [`flow_solver`]: 时间循环、外迭代、PISO 与非正交修正的执行器

pub mod correctors;
pub mod flow_solver;
pub mod solve_graph;

pub use correctors::{CorrectorLimits, CorrectorState};
pub use flow_solver::{FlowSolver, InitialFields, RunSummary, StepReport};
pub use solve_graph::{CorrectorLevel, ResolvedGraph, SolveGraph, SolveStep, StepDeclaration};
