// crates/hx_config/src/linear_solver.rs

//! 线性求解器设置（按场名配置）
//!
//! 与残差控制一样，最后一次外迭代优先查找 `<field>Final`。

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Krylov 求解器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinearSolverKind {
    /// 预条件共轭梯度（对称矩阵：压力）
    #[default]
    Pcg,
    /// 稳定双共轭梯度（非对称矩阵：动量、能量）
    BiCgStab,
}

/// 预条件器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PreconditionerKind {
    /// 无预条件
    Identity,
    /// 对角预条件
    #[default]
    Jacobi,
    /// 对称逐次超松弛
    Ssor,
}

/// 单个场的线性求解设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSolverConfig {
    /// 求解器
    #[serde(default)]
    pub solver: LinearSolverKind,
    /// 预条件器
    #[serde(default)]
    pub preconditioner: PreconditionerKind,
    /// 绝对容差
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// 相对容差
    #[serde(default, rename = "relTol")]
    pub rel_tol: f64,
    /// 最大迭代次数
    #[serde(default = "default_max_iter", rename = "maxIter")]
    pub max_iter: usize,
}

fn default_tolerance() -> f64 {
    1e-8
}

fn default_max_iter() -> usize {
    1000
}

impl Default for LinearSolverConfig {
    fn default() -> Self {
        Self {
            solver: LinearSolverKind::default(),
            preconditioner: PreconditionerKind::default(),
            tolerance: default_tolerance(),
            rel_tol: 0.0,
            max_iter: default_max_iter(),
        }
    }
}

impl LinearSolverConfig {
    /// 对称矩阵的默认设置
    pub fn symmetric(tolerance: f64, rel_tol: f64) -> Self {
        Self {
            solver: LinearSolverKind::Pcg,
            tolerance,
            rel_tol,
            ..Default::default()
        }
    }

    /// 非对称矩阵的默认设置
    pub fn asymmetric(tolerance: f64, rel_tol: f64) -> Self {
        Self {
            solver: LinearSolverKind::BiCgStab,
            tolerance,
            rel_tol,
            ..Default::default()
        }
    }
}

/// 全部场的线性求解设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSolverSettings {
    /// 按场名索引的设置
    #[serde(flatten)]
    pub fields: BTreeMap<String, LinearSolverConfig>,
}

impl Default for LinearSolverSettings {
    fn default() -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("p".to_string(), LinearSolverConfig::symmetric(1e-9, 0.01));
        fields.insert("pFinal".to_string(), LinearSolverConfig::symmetric(1e-10, 0.0));
        fields.insert("pcorr".to_string(), LinearSolverConfig::symmetric(1e-10, 0.0));
        fields.insert("U".to_string(), LinearSolverConfig::asymmetric(1e-9, 0.1));
        fields.insert("UFinal".to_string(), LinearSolverConfig::asymmetric(1e-10, 0.0));
        fields.insert("T".to_string(), LinearSolverConfig::asymmetric(1e-9, 0.0));
        fields.insert("alpha".to_string(), LinearSolverConfig::asymmetric(1e-12, 0.0));
        Self { fields }
    }
}

impl LinearSolverSettings {
    /// 查找设置：最后一次外迭代优先 `<name>Final`，再退回 `<name>`
    pub fn get(&self, name: &str, final_iter: bool) -> Result<&LinearSolverConfig, ConfigError> {
        if final_iter {
            if let Some(c) = self.fields.get(&format!("{name}Final")) {
                return Ok(c);
            }
        }
        self.fields
            .get(name)
            .ok_or_else(|| ConfigError::Missing(format!("solvers.{name}")))
    }

    /// 设置某个场的求解参数
    pub fn with(mut self, name: &str, config: LinearSolverConfig) -> Self {
        self.fields.insert(name.to_string(), config);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_falls_back_to_base() {
        let s = LinearSolverSettings::default();
        assert_eq!(s.get("p", true).unwrap().rel_tol, 0.0);
        assert_eq!(s.get("T", true).unwrap().solver, LinearSolverKind::BiCgStab);
        assert!(s.get("k", false).is_err());
    }

    #[test]
    fn test_parse_flattened() {
        let json = r#"{ "p": { "solver": "pcg", "preconditioner": "ssor", "tolerance": 1e-7 } }"#;
        let s: LinearSolverSettings = serde_json::from_str(json).unwrap();
        let p = s.get("p", false).unwrap();
        assert_eq!(p.preconditioner, PreconditionerKind::Ssor);
        assert_eq!(p.max_iter, 1000);
    }
}
