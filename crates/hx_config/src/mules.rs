// crates/hx_config/src/mules.rs

//! 相分数（MULES）输运配置

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// 相对界面压缩系数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasePairCompression {
    /// 相对（无序）
    pub phases: [String; 2],
    /// 压缩系数
    #[serde(rename = "cAlpha")]
    pub c_alpha: f64,
}

/// MULES 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MulesConfig {
    /// 限制器外修正次数
    #[serde(default = "default_one", rename = "nAlphaCorr")]
    pub n_alpha_corr: usize,

    /// 子循环次数
    #[serde(default = "default_one", rename = "nAlphaSubCycles")]
    pub n_alpha_sub_cycles: usize,

    /// 半隐式 MULES：隐式迎风预测 + 限制后的高阶修正
    #[serde(default, rename = "MULESCorr")]
    pub mules_corr: bool,

    /// 半隐式时复用上一时间步的修正通量
    #[serde(default, rename = "alphaApplyPrevCorr")]
    pub alpha_apply_prev_corr: bool,

    /// 全局界面压缩系数
    #[serde(default, rename = "cAlpha")]
    pub c_alpha: Option<f64>,

    /// 按相对配置的界面压缩系数（覆盖全局值）
    #[serde(default, rename = "interfaceCompression")]
    pub interface_compression: Vec<PhasePairCompression>,

    /// 被动相：由 `1 - Σ其余相` 计算而不直接输运
    #[serde(default, rename = "passivePhase")]
    pub passive_phase: Option<String>,

    /// 限制器 λ 迭代次数
    #[serde(default = "default_limiter_iter", rename = "nLimiterIter")]
    pub n_limiter_iter: usize,

    /// 内部单元极值放宽系数
    #[serde(default, rename = "extremaCoeff")]
    pub extrema_coeff: f64,

    /// 边界单元极值放宽系数
    #[serde(default, rename = "boundaryExtremaCoeff")]
    pub boundary_extrema_coeff: f64,

    /// 限制器平滑系数（0 为不平滑）
    #[serde(default, rename = "smoothLimiter")]
    pub smooth_limiter: f64,

    /// 有界性容差，超出 [0,1] 不多于该值时截断并告警
    #[serde(default = "default_bound_tolerance", rename = "boundTolerance")]
    pub bound_tolerance: f64,
}

fn default_one() -> usize {
    1
}

fn default_limiter_iter() -> usize {
    3
}

fn default_bound_tolerance() -> f64 {
    1e-6
}

impl Default for MulesConfig {
    fn default() -> Self {
        Self {
            n_alpha_corr: 1,
            n_alpha_sub_cycles: 1,
            mules_corr: false,
            alpha_apply_prev_corr: false,
            c_alpha: None,
            interface_compression: Vec::new(),
            passive_phase: None,
            n_limiter_iter: default_limiter_iter(),
            extrema_coeff: 0.0,
            boundary_extrema_coeff: 0.0,
            smooth_limiter: 0.0,
            bound_tolerance: default_bound_tolerance(),
        }
    }
}

impl MulesConfig {
    /// 带全局界面压缩的常用设置
    pub fn with_compression(c_alpha: f64) -> Self {
        Self {
            c_alpha: Some(c_alpha),
            ..Default::default()
        }
    }

    /// 相对 (a, b) 的压缩系数：按相对配置优先，其次全局值
    pub fn c_alpha_for(&self, a: &str, b: &str) -> Option<f64> {
        self.interface_compression
            .iter()
            .find(|pc| {
                (pc.phases[0] == a && pc.phases[1] == b)
                    || (pc.phases[0] == b && pc.phases[1] == a)
            })
            .map(|pc| pc.c_alpha)
            .or(self.c_alpha)
    }

    /// 是否请求了任意界面压缩
    pub fn has_compression(&self) -> bool {
        self.c_alpha.map_or(false, |c| c > 0.0)
            || self.interface_compression.iter().any(|pc| pc.c_alpha > 0.0)
    }

    /// 验证
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_alpha_sub_cycles == 0 {
            return Err(ConfigError::invalid(
                "MULES.nAlphaSubCycles",
                self.n_alpha_sub_cycles,
                "子循环次数至少为 1",
            ));
        }
        if self.n_alpha_corr == 0 {
            return Err(ConfigError::invalid(
                "MULES.nAlphaCorr",
                self.n_alpha_corr,
                "修正次数至少为 1",
            ));
        }
        if self.n_limiter_iter == 0 {
            return Err(ConfigError::invalid(
                "MULES.nLimiterIter",
                self.n_limiter_iter,
                "限制器迭代次数至少为 1",
            ));
        }
        if let Some(c) = self.c_alpha {
            if c < 0.0 {
                return Err(ConfigError::invalid("MULES.cAlpha", c, "压缩系数不能为负"));
            }
        }
        for pc in &self.interface_compression {
            if pc.c_alpha < 0.0 {
                return Err(ConfigError::invalid(
                    &format!("MULES.interfaceCompression.{}-{}", pc.phases[0], pc.phases[1]),
                    pc.c_alpha,
                    "压缩系数不能为负",
                ));
            }
        }
        if !(0.0..1.0).contains(&self.smooth_limiter) {
            return Err(ConfigError::invalid(
                "MULES.smoothLimiter",
                self.smooth_limiter,
                "平滑系数必须位于 [0, 1)",
            ));
        }
        if self.alpha_apply_prev_corr && !self.mules_corr {
            return Err(ConfigError::Incompatible {
                first: "alphaApplyPrevCorr".into(),
                second: "MULESCorr".into(),
                reason: "复用上一步修正仅适用于半隐式 MULES".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_coefficient_overrides_global() {
        let mut c = MulesConfig::with_compression(1.0);
        c.interface_compression.push(PhasePairCompression {
            phases: ["water".into(), "oil".into()],
            c_alpha: 0.5,
        });
        assert_eq!(c.c_alpha_for("oil", "water"), Some(0.5));
        assert_eq!(c.c_alpha_for("water", "air"), Some(1.0));
        assert!(c.has_compression());
    }

    #[test]
    fn test_parse_keys() {
        let json = r#"{ "nAlphaCorr": 2, "nAlphaSubCycles": 3, "MULESCorr": true, "cAlpha": 1 }"#;
        let c: MulesConfig = serde_json::from_str(json).unwrap();
        assert_eq!(c.n_alpha_corr, 2);
        assert_eq!(c.n_alpha_sub_cycles, 3);
        assert!(c.mules_corr);
        assert_eq!(c.n_limiter_iter, 3);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_prev_corr_requires_semi_implicit() {
        let c = MulesConfig {
            alpha_apply_prev_corr: true,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::Incompatible { .. })));
    }
}
