// crates/hx_foundation/src/error.rs

//! 错误处理模块，定义统一错误类型
//!
//! 提供 `HxError` 枚举和 `HxResult` 类型别名，覆盖压力-速度耦合核心的全部错误分类：
//!
//! | 分类 | 变体 | 处理方式 |
//! |------|------|----------|
//! | 配置错误 | `MissingConfig` / `InvalidConfig` / `IncompatibleOptions` | 致命，报告出错的键 |
//! | 数值崩溃 | `NumericalBreakdown` / `NotConverged` | 致命，终止计算 |
//! | 网格/数据不一致 | `InvalidMesh` / `SizeMismatch` / `IndexOutOfBounds` | 致命 |
//! | 并行/拓扑同步失败 | `Parallel` | 致命 |
//!
//! 有界性修正（相分数轻微越界等）不属于错误，由调用方截断并 `log::warn!`。
//!
//! # 示例
//!
//! ```
//! use hx_foundation::error::{HxError, HxResult};
//!
//! fn read_controls() -> HxResult<()> {
//!     Err(HxError::missing_config("PIMPLE.nOuterCorrectors"))
//! }
//! assert!(read_controls().is_err());
//! ```

use thiserror::Error;

/// 统一结果类型
pub type HxResult<T> = Result<T, HxError>;

/// 核心错误类型
#[derive(Error, Debug)]
pub enum HxError {
    // ========================================================================
    // IO 相关错误
    // ========================================================================
    /// IO 错误
    #[error("IO错误: {message}")]
    Io {
        /// 描述性错误信息
        message: String,
        #[source]
        /// 可选的底层 IO 错误
        source: Option<std::io::Error>,
    },

    /// 序列化错误
    #[error("序列化错误: {message}")]
    Serialization {
        /// 失败原因
        message: String,
    },

    // ========================================================================
    // 数据一致性
    // ========================================================================
    /// 数组大小不匹配
    #[error("数组大小不匹配: {name} 期望{expected}, 实际{actual}")]
    SizeMismatch {
        /// 数据名称
        name: &'static str,
        /// 期望大小
        expected: usize,
        /// 实际大小
        actual: usize,
    },

    /// 索引越界
    #[error("索引越界: {index_type} 索引 {index} 超出范围 0..{len}")]
    IndexOutOfBounds {
        /// 索引类别描述
        index_type: &'static str,
        /// 访问的索引
        index: usize,
        /// 上界（长度）
        len: usize,
    },

    /// 无效网格拓扑
    #[error("无效的网格拓扑: {message}")]
    InvalidMesh {
        /// 具体错误信息
        message: String,
    },

    /// 量纲不一致
    #[error("量纲不一致: {operation} 左侧 {lhs}, 右侧 {rhs}")]
    DimensionMismatch {
        /// 出错的运算
        operation: String,
        /// 左操作数量纲
        lhs: String,
        /// 右操作数量纲
        rhs: String,
    },

    // ========================================================================
    // 配置错误（致命，不重试）
    // ========================================================================
    /// 缺少配置项
    #[error("缺少必需的配置项: {key}")]
    MissingConfig {
        /// 配置键名
        key: String,
    },

    /// 配置值无效
    #[error("配置值无效: {key}={value}, 原因: {reason}")]
    InvalidConfig {
        /// 配置键名
        key: String,
        /// 配置值
        value: String,
        /// 无效原因说明
        reason: String,
    },

    /// 互不兼容的选项组合
    #[error("选项不兼容: {first} 与 {second}: {reason}")]
    IncompatibleOptions {
        /// 第一个选项
        first: String,
        /// 第二个选项
        second: String,
        /// 原因
        reason: String,
    },

    // ========================================================================
    // 数值崩溃（致命，终止计算）
    // ========================================================================
    /// 数值崩溃：物理量超出允许范围或出现非有限值
    #[error("数值崩溃: {quantity} 在单元 {cell} 处取值 {value}: {reason}")]
    NumericalBreakdown {
        /// 物理量名称
        quantity: String,
        /// 单元编号
        cell: usize,
        /// 数值
        value: f64,
        /// 说明
        reason: String,
    },

    /// 迭代未在上限内收敛
    #[error("迭代未收敛: {what} 在 {iterations} 次迭代后残差 {residual:.3e}")]
    NotConverged {
        /// 迭代过程名称
        what: String,
        /// 已执行的迭代次数
        iterations: usize,
        /// 最终残差
        residual: f64,
    },

    // ========================================================================
    // 运行时
    // ========================================================================
    /// 并行一致性错误
    #[error("并行同步失败: {message}")]
    Parallel {
        /// 具体错误信息
        message: String,
    },

    /// 资源未找到
    #[error("资源未找到: {resource}")]
    NotFound {
        /// 资源名称
        resource: String,
    },

    /// 内部错误
    #[error("内部错误: {message}")]
    Internal {
        /// 内部错误描述
        message: String,
    },
}

// ========================================================================
// 便捷构造方法
// ========================================================================

impl HxError {
    /// 从 IO 错误创建（带源）
    pub fn io_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(source),
        }
    }

    /// 序列化错误
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// 无效网格
    pub fn invalid_mesh(message: impl Into<String>) -> Self {
        Self::InvalidMesh {
            message: message.into(),
        }
    }

    /// 量纲不一致
    pub fn dimension_mismatch(
        operation: impl Into<String>,
        lhs: impl Into<String>,
        rhs: impl Into<String>,
    ) -> Self {
        Self::DimensionMismatch {
            operation: operation.into(),
            lhs: lhs.into(),
            rhs: rhs.into(),
        }
    }

    /// 缺少配置
    pub fn missing_config(key: impl Into<String>) -> Self {
        Self::MissingConfig { key: key.into() }
    }

    /// 配置值无效
    pub fn invalid_config(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// 选项不兼容
    pub fn incompatible(
        first: impl Into<String>,
        second: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::IncompatibleOptions {
            first: first.into(),
            second: second.into(),
            reason: reason.into(),
        }
    }

    /// 数值崩溃
    pub fn breakdown(
        quantity: impl Into<String>,
        cell: usize,
        value: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self::NumericalBreakdown {
            quantity: quantity.into(),
            cell,
            value,
            reason: reason.into(),
        }
    }

    /// 迭代未收敛
    pub fn not_converged(what: impl Into<String>, iterations: usize, residual: f64) -> Self {
        Self::NotConverged {
            what: what.into(),
            iterations,
            residual,
        }
    }

    /// 并行同步失败
    pub fn parallel(message: impl Into<String>) -> Self {
        Self::Parallel {
            message: message.into(),
        }
    }

    /// 资源未找到
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// 内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// 是否属于配置类错误
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::MissingConfig { .. }
                | Self::InvalidConfig { .. }
                | Self::IncompatibleOptions { .. }
        )
    }

    /// 是否属于数值崩溃类错误
    pub fn is_numerical_breakdown(&self) -> bool {
        matches!(
            self,
            Self::NumericalBreakdown { .. } | Self::NotConverged { .. }
        )
    }
}

// ========================================================================
// 验证辅助方法
// ========================================================================

impl HxError {
    /// 检查数组大小是否匹配
    #[inline]
    pub fn check_size(name: &'static str, expected: usize, actual: usize) -> HxResult<()> {
        if expected != actual {
            Err(Self::SizeMismatch {
                name,
                expected,
                actual,
            })
        } else {
            Ok(())
        }
    }

    /// 检查索引是否在范围内
    #[inline]
    pub fn check_index(index_type: &'static str, index: usize, len: usize) -> HxResult<()> {
        if index >= len {
            Err(Self::IndexOutOfBounds {
                index_type,
                index,
                len,
            })
        } else {
            Ok(())
        }
    }

    /// 检查数值有限，否则视为数值崩溃
    #[inline]
    pub fn check_finite(quantity: &str, cell: usize, value: f64) -> HxResult<()> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(Self::breakdown(quantity, cell, value, "非有限值"))
        }
    }

    /// 检查物理量位于允许范围内，否则视为数值崩溃
    #[inline]
    pub fn check_admissible(
        quantity: &str,
        cell: usize,
        value: f64,
        min: f64,
        max: f64,
    ) -> HxResult<()> {
        if !value.is_finite() || value < min || value > max {
            Err(Self::breakdown(
                quantity,
                cell,
                value,
                format!("超出允许范围 [{min}, {max}]"),
            ))
        } else {
            Ok(())
        }
    }
}

// ========================================================================
// 标准库错误转换
// ========================================================================

impl From<std::io::Error> for HxError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

// ========================================================================
// 测试
// ========================================================================
