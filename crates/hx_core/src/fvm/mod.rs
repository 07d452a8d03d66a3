// crates/hx_core/src/fvm/mod.rs

//! 有限体积离散层
//!
//! - [`matrix`]: LDU 矩阵、松弛、A/H/H1 算子与分量分离求解
//! - [`implicit`]: 隐式算子（`fvm::ddt`、`div`、`laplacian`、`Sp`、`Su`）
//! - [`explicit`]: 显式算子（插值、通量、散度、梯度、法向梯度）
//! - [`time`]: 时间状态与局部时间步场

pub mod explicit;
pub mod implicit;
pub mod matrix;
pub mod time;

pub use matrix::{normalised_residual, FvMatrix, SolverPerformance};
pub use time::TimeState;
