// crates/hx_config/src/relaxation.rs

//! 亚松弛因子
//!
//! 场松弛（`fields`，作用于求解后的场值，如 `p`）和方程松弛
//! （`equations`，作用于组装后的矩阵对角项，如 `U`）分开配置。
//! 最后一次外迭代查找 `<name>Final`，未配置时为 1（不松弛）。

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 亚松弛因子表
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelaxationFactors {
    /// 场松弛因子
    #[serde(default)]
    pub fields: BTreeMap<String, f64>,
    /// 方程松弛因子
    #[serde(default)]
    pub equations: BTreeMap<String, f64>,
}

impl RelaxationFactors {
    /// SIMPLE 常用组合：p 0.3、U 0.7
    pub fn steady_default() -> Self {
        let mut r = Self::default();
        r.fields.insert("p".into(), 0.3);
        r.equations.insert("U".into(), 0.7);
        r.equations.insert("T".into(), 0.9);
        r
    }

    /// 设置场松弛因子
    pub fn with_field(mut self, name: &str, factor: f64) -> Self {
        self.fields.insert(name.to_string(), factor);
        self
    }

    /// 设置方程松弛因子
    pub fn with_equation(mut self, name: &str, factor: f64) -> Self {
        self.equations.insert(name.to_string(), factor);
        self
    }

    /// 场松弛因子
    pub fn field(&self, name: &str, final_iter: bool) -> Option<f64> {
        Self::lookup(&self.fields, name, final_iter)
    }

    /// 方程松弛因子
    pub fn equation(&self, name: &str, final_iter: bool) -> Option<f64> {
        Self::lookup(&self.equations, name, final_iter)
    }

    fn lookup(table: &BTreeMap<String, f64>, name: &str, final_iter: bool) -> Option<f64> {
        if final_iter {
            table.get(&format!("{name}Final")).copied()
        } else {
            table.get(name).copied()
        }
    }

    /// 验证所有因子位于 (0, 1]
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (kind, table) in [("fields", &self.fields), ("equations", &self.equations)] {
            for (name, &f) in table {
                if !(f > 0.0 && f <= 1.0) {
                    return Err(ConfigError::invalid(
                        &format!("relaxationFactors.{kind}.{name}"),
                        f,
                        "松弛因子必须位于 (0, 1]",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_lookup() {
        let r = RelaxationFactors::default()
            .with_field("p", 0.3)
            .with_field("pFinal", 1.0);
        assert_eq!(r.field("p", false), Some(0.3));
        assert_eq!(r.field("p", true), Some(1.0));
        assert_eq!(r.equation("U", true), None);
    }

    #[test]
    fn test_validate_range() {
        assert!(RelaxationFactors::steady_default().validate().is_ok());
        let bad = RelaxationFactors::default().with_equation("U", 1.5);
        assert!(bad.validate().is_err());
    }
}
