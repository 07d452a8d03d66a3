// crates/hx_foundation/src/validation.rs

//! 网格检查的验证报告
//!
//! 错误使报告无效，警告仅供提示。
//!
//! # 示例
//!
//! ```
//! use hx_foundation::validation::{ValidationError, ValidationReport};
//!
//! let mut report = ValidationReport::new();
//! report.add_error(ValidationError::Geometry {
//!     message: "体积非正".into(),
//!     element_id: 3,
//! });
//! assert!(!report.is_valid());
//! assert!(report.into_mesh_result().is_err());
//! ```

use crate::error::{HxError, HxResult};
use std::fmt;

/// 验证报告
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// 错误列表
    pub errors: Vec<ValidationError>,
    /// 警告列表
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    /// 创建空的验证报告
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加错误
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// 添加警告
    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// 是否通过（无错误）
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// 有错误时转换为 `HxError::InvalidMesh`，报告首个错误及总数
    pub fn into_mesh_result(self) -> HxResult<Vec<ValidationWarning>> {
        match self.errors.first() {
            None => Ok(self.warnings),
            Some(first) => Err(HxError::invalid_mesh(format!(
                "{first} (共 {} 个错误)",
                self.errors.len()
            ))),
        }
    }
}

/// 验证错误类型
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// 拓扑错误
    Topology {
        /// 错误描述
        message: String,
        /// 可选的元素 ID
        element_id: Option<usize>,
    },
    /// 几何错误（零体积、零面积等）
    Geometry {
        /// 错误描述
        message: String,
        /// 元素 ID
        element_id: usize,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Topology {
                message,
                element_id,
            } => match element_id {
                Some(id) => write!(f, "元素{}: 拓扑错误: {}", id, message),
                None => write!(f, "拓扑错误: {}", message),
            },
            Self::Geometry {
                message,
                element_id,
            } => write!(f, "元素{}: 几何错误: {}", element_id, message),
        }
    }
}

impl std::error::Error for ValidationError {}

/// 验证警告类型
#[derive(Debug, Clone)]
pub enum ValidationWarning {
    /// 面非正交角过大
    NonOrthogonality {
        /// 面 ID
        face_id: usize,
        /// 非正交角 [度]
        angle_deg: f64,
        /// 阈值 [度]
        threshold_deg: f64,
    },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonOrthogonality {
                face_id,
                angle_deg,
                threshold_deg,
            } => write!(
                f,
                "面{}: 非正交角 {:.1}° 超过 {:.1}°",
                face_id, angle_deg, threshold_deg
            ),
        }
    }
}

// ============================================================================
// 测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_report_new() {
        let report = ValidationReport::new();
        assert!(report.is_valid());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_into_mesh_result() {
        let mut report = ValidationReport::new();
        report.add_warning(ValidationWarning::NonOrthogonality {
            face_id: 7,
            angle_deg: 75.0,
            threshold_deg: 70.0,
        });
        let warnings = report.into_mesh_result().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].to_string().contains("75.0"));

        let mut report = ValidationReport::new();
        report.add_error(ValidationError::Geometry {
            message: "零体积".into(),
            element_id: 4,
        });
        report.add_error(ValidationError::Topology {
            message: "面没有所属单元".into(),
            element_id: Some(2),
        });
        let err = report.into_mesh_result().unwrap_err();
        assert!(err.to_string().contains("共 2 个错误"));
    }
}
