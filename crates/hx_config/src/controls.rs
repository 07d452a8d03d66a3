// crates/hx_config/src/controls.rs

//! 压力-速度耦合算法控制参数（SIMPLE / PISO / PIMPLE 字典）
//!
//! 键名沿用求解器字典的写法（`nOuterCorr`、`nCorrPISO` 等），
//! 便于直接读取现有算例。
//!
//! # 使用示例
//!
//! ```
//! use hx_config::SolutionControls;
//!
//! let steady = SolutionControls::simple();
//! assert_eq!(steady.n_outer_correctors, 1);
//! assert!(steady.consistent);
//!
//! let transient = SolutionControls::pimple(3, 2);
//! assert_eq!(transient.n_corr_piso, 2);
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 单个场的残差控制容差
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResidualTolerance {
    /// 绝对残差容差
    pub tolerance: f64,
    /// 相对残差容差（相对于首次外迭代的初始残差）
    #[serde(default, rename = "relTol")]
    pub rel_tol: f64,
}

/// 压力-速度耦合控制
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionControls {
    /// 外迭代次数（PIMPLE 外循环）
    #[serde(default = "default_one", rename = "nOuterCorr")]
    pub n_outer_correctors: usize,

    /// PISO 内迭代次数
    #[serde(default = "default_one", rename = "nCorrPISO")]
    pub n_corr_piso: usize,

    /// 非正交修正次数（额外次数，0 表示只求解一次）
    #[serde(default, rename = "nNonOrthCorr")]
    pub n_non_orth_correctors: usize,

    /// 能量方程修正次数
    #[serde(default = "default_one", rename = "nEnergyCorr")]
    pub n_energy_correctors: usize,

    /// 是否求解动量预测方程
    #[serde(default = "default_true", rename = "momentumPredictor")]
    pub momentum_predictor: bool,

    /// SIMPLEC 一致性修正
    #[serde(default)]
    pub consistent: bool,

    /// 拓扑变化或初始化后执行通量修正
    #[serde(default = "default_true", rename = "correctPhi")]
    pub correct_phi: bool,

    /// 瞬态通量修正（Rhie-Chow ddtCorr）
    #[serde(default = "default_true", rename = "ddtPhiCorr")]
    pub ddt_phi_corr: bool,

    /// 外迭代残差控制，满足后提前退出外循环
    #[serde(default, rename = "outerCorrectorResidualControl")]
    pub outer_corrector_residual_control: BTreeMap<String, ResidualTolerance>,

    /// 稳态残差控制，满足后结束计算
    #[serde(default, rename = "residualControl")]
    pub residual_control: BTreeMap<String, f64>,
}

fn default_one() -> usize {
    1
}

fn default_true() -> bool {
    true
}

impl Default for SolutionControls {
    fn default() -> Self {
        Self {
            n_outer_correctors: 1,
            n_corr_piso: 1,
            n_non_orth_correctors: 0,
            n_energy_correctors: 1,
            momentum_predictor: true,
            consistent: false,
            correct_phi: true,
            ddt_phi_corr: true,
            outer_corrector_residual_control: BTreeMap::new(),
            residual_control: BTreeMap::new(),
        }
    }
}

impl SolutionControls {
    /// 稳态 SIMPLEC 预设
    pub fn simple() -> Self {
        Self {
            consistent: true,
            ddt_phi_corr: false,
            ..Default::default()
        }
    }

    /// 瞬态 PISO 预设
    pub fn piso(n_corr: usize) -> Self {
        Self {
            n_corr_piso: n_corr,
            momentum_predictor: false,
            ..Default::default()
        }
    }

    /// 瞬态 PIMPLE 预设
    pub fn pimple(n_outer: usize, n_corr: usize) -> Self {
        Self {
            n_outer_correctors: n_outer,
            n_corr_piso: n_corr,
            ..Default::default()
        }
    }

    /// 设置非正交修正次数
    pub fn with_non_orth_correctors(mut self, n: usize) -> Self {
        self.n_non_orth_correctors = n;
        self
    }

    /// 设置外迭代残差控制
    pub fn with_outer_residual_control(mut self, field: &str, tolerance: f64) -> Self {
        self.outer_corrector_residual_control.insert(
            field.to_string(),
            ResidualTolerance {
                tolerance,
                rel_tol: 0.0,
            },
        );
        self
    }

    /// 验证
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_outer_correctors == 0 {
            return Err(ConfigError::invalid(
                "PIMPLE.nOuterCorr",
                self.n_outer_correctors,
                "外迭代次数至少为 1",
            ));
        }
        if self.n_corr_piso == 0 {
            return Err(ConfigError::invalid(
                "PIMPLE.nCorrPISO",
                self.n_corr_piso,
                "PISO 修正次数至少为 1",
            ));
        }
        if self.n_energy_correctors == 0 {
            return Err(ConfigError::invalid(
                "PIMPLE.nEnergyCorr",
                self.n_energy_correctors,
                "能量修正次数至少为 1",
            ));
        }
        for (field, tol) in &self.outer_corrector_residual_control {
            if tol.tolerance < 0.0 || tol.rel_tol < 0.0 {
                return Err(ConfigError::invalid(
                    &format!("PIMPLE.outerCorrectorResidualControl.{field}"),
                    tol.tolerance,
                    "容差不能为负",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dictionary_keys() {
        let json = r#"{
            "nOuterCorr": 2,
            "nCorrPISO": 3,
            "nNonOrthCorr": 1,
            "momentumPredictor": false,
            "consistent": true,
            "outerCorrectorResidualControl": { "p": { "tolerance": 1e-4, "relTol": 0 } }
        }"#;
        let c: SolutionControls = serde_json::from_str(json).unwrap();
        assert_eq!(c.n_outer_correctors, 2);
        assert_eq!(c.n_corr_piso, 3);
        assert_eq!(c.n_non_orth_correctors, 1);
        assert!(!c.momentum_predictor);
        assert!(c.consistent);
        assert!(c.correct_phi);
        assert_eq!(c.outer_corrector_residual_control["p"].tolerance, 1e-4);
    }

    #[test]
    fn test_validate_rejects_zero_outer() {
        let c = SolutionControls {
            n_outer_correctors: 0,
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_presets() {
        assert!(SolutionControls::simple().validate().is_ok());
        assert!(!SolutionControls::piso(2).momentum_predictor);
        assert_eq!(
            SolutionControls::pimple(2, 2)
                .with_non_orth_correctors(2)
                .n_non_orth_correctors,
            2
        );
    }
}
