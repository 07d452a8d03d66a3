// crates/hx_config/src/schemes.rs

//! 离散格式选择（时间项与对流项）

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// 时间离散格式
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TimeScheme {
    /// 稳态（无时间项）
    SteadyState,
    /// 一阶隐式 Euler
    #[default]
    Euler,
    /// Crank-Nicolson，`ocCoeff` 为偏心系数（1 为纯 CN，0 退化为 Euler）
    CrankNicolson {
        /// 偏心系数 ψ ∈ [0, 1]
        #[serde(rename = "ocCoeff", default = "default_oc_coeff")]
        oc_coeff: f64,
    },
    /// 局部时间步 Euler（伪瞬态，逐单元 rDeltaT）
    LocalEuler,
}

fn default_oc_coeff() -> f64 {
    0.9
}

impl TimeScheme {
    /// 是否稳态
    pub fn is_steady(&self) -> bool {
        matches!(self, Self::SteadyState)
    }

    /// 是否局部时间步
    pub fn is_local(&self) -> bool {
        matches!(self, Self::LocalEuler)
    }

    /// 名称（日志/报错用）
    pub fn name(&self) -> &'static str {
        match self {
            Self::SteadyState => "steadyState",
            Self::Euler => "Euler",
            Self::CrankNicolson { .. } => "CrankNicolson",
            Self::LocalEuler => "localEuler",
        }
    }

    /// 验证
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Self::CrankNicolson { oc_coeff } = self {
            if !(0.0..=1.0).contains(oc_coeff) {
                return Err(ConfigError::invalid(
                    "ddtSchemes.ocCoeff",
                    oc_coeff,
                    "偏心系数必须位于 [0, 1]",
                ));
            }
        }
        Ok(())
    }
}

/// 对流项插值格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ConvectionScheme {
    /// 一阶迎风
    #[default]
    Upwind,
    /// 线性（中心差分），延迟修正
    Linear,
    /// van Leer TVD 限制器，延迟修正
    VanLeer,
    /// minmod TVD 限制器，延迟修正
    Minmod,
}

/// 各方程的对流格式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DivSchemes {
    /// 动量
    #[serde(default = "default_momentum_scheme", rename = "div(phi,U)")]
    pub momentum: ConvectionScheme,
    /// 能量
    #[serde(default, rename = "div(phi,T)")]
    pub energy: ConvectionScheme,
    /// 相分数高阶通量
    #[serde(default = "default_alpha_scheme", rename = "div(phi,alpha)")]
    pub alpha: ConvectionScheme,
}

fn default_momentum_scheme() -> ConvectionScheme {
    ConvectionScheme::VanLeer
}

fn default_alpha_scheme() -> ConvectionScheme {
    ConvectionScheme::VanLeer
}

impl Default for DivSchemes {
    fn default() -> Self {
        Self {
            momentum: default_momentum_scheme(),
            energy: ConvectionScheme::Upwind,
            alpha: default_alpha_scheme(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crank_nicolson() {
        let s: TimeScheme =
            serde_json::from_str(r#"{ "type": "crankNicolson", "ocCoeff": 0.5 }"#).unwrap();
        assert_eq!(s, TimeScheme::CrankNicolson { oc_coeff: 0.5 });
        assert!(s.validate().is_ok());
        assert_eq!(s.name(), "CrankNicolson");
    }

    #[test]
    fn test_reject_bad_oc_coeff() {
        let s = TimeScheme::CrankNicolson { oc_coeff: 1.5 };
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_div_schemes_defaults() {
        let d: DivSchemes = serde_json::from_str("{}").unwrap();
        assert_eq!(d.alpha, ConvectionScheme::VanLeer);
        assert_eq!(d.energy, ConvectionScheme::Upwind);
    }
}
