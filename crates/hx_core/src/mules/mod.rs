// crates/hx_core/src/mules/mod.rs

//! 相分数（VOF）输运
//!
//! - [`limiter`]: MULES 通量限制（`limit`、`limit_corr`、`limit_sum`）
//! - [`alpha_solver`]: 子循环、界面压缩、半隐式修正与被动相封闭

pub mod alpha_solver;
pub mod limiter;

pub use alpha_solver::MulesSolver;
pub use limiter::{LimiterControls, TransportTerms};
