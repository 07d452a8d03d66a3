// crates/hx_foundation/src/lib.rs

//! Helyx Foundation Layer
//!
//! 整个工作区共用的基础抽象，仅依赖 serde 和 thiserror。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型 `HxError`（配置错误、数值崩溃、网格不一致等）
//! - [`dimension`]: 场的量纲标记
//! - [`validation`]: 网格检查的验证报告
//!
//! # 示例
//!
//! ```
//! use hx_foundation::prelude::*;
//!
//! fn pressure_dimensions() -> HxResult<Dimensions> {
//!     let d = Dimensions::DENSITY * Dimensions::KINEMATIC_PRESSURE;
//!     d.check_same(&Dimensions::PRESSURE, "rho*p_k")?;
//!     Ok(d)
//! }
//! assert!(pressure_dimensions().is_ok());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dimension;
pub mod error;
pub mod validation;

/// 全工作区统一的浮点标量
pub type Scalar = f64;

/// 极小量，防止除零（对应 `SMALL`）
pub const SMALL: Scalar = 1e-15;

/// 极小正量，用于分母下限（对应 `VSMALL`）
pub const VSMALL: Scalar = 1e-300;

/// 极大量（对应 `GREAT`）
pub const GREAT: Scalar = 1e15;

// 重导出常用类型
pub use dimension::Dimensions;
pub use error::{HxError, HxResult};
pub use validation::{ValidationError, ValidationReport, ValidationWarning};

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::dimension::Dimensions;
    pub use crate::error::{HxError, HxResult};
    pub use crate::validation::{ValidationError, ValidationReport, ValidationWarning};
    pub use crate::{Scalar, GREAT, SMALL, VSMALL};
}
