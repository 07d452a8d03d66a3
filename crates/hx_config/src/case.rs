// crates/hx_config/src/case.rs

//! 算例配置：全部子配置的汇总，JSON 读写与交叉验证

use crate::controls::SolutionControls;
use crate::error::ConfigError;
use crate::linear_solver::LinearSolverSettings;
use crate::mules::MulesConfig;
use crate::physics::{
    EnergyConfig, FluidConfig, MrfZoneConfig, PhaseConfig, PressureControlConfig,
};
use crate::relaxation::RelaxationFactors;
use crate::schemes::{DivSchemes, TimeScheme};
use crate::time_step::{AdaptiveTimeConfig, LtsConfig, TimeConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 算例配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseConfig {
    /// 时间
    #[serde(default)]
    pub time: TimeConfig,
    /// 压力-速度耦合控制
    #[serde(default, rename = "PIMPLE")]
    pub controls: SolutionControls,
    /// 亚松弛
    #[serde(default, rename = "relaxationFactors")]
    pub relaxation: RelaxationFactors,
    /// 线性求解器
    #[serde(default)]
    pub solvers: LinearSolverSettings,
    /// 对流格式
    #[serde(default, rename = "divSchemes")]
    pub div_schemes: DivSchemes,
    /// 压力控制
    #[serde(default, rename = "pressureControl")]
    pub pressure_control: PressureControlConfig,
    /// 单相流体
    #[serde(default)]
    pub fluid: FluidConfig,
    /// 多相（空表示单相）
    #[serde(default)]
    pub phases: Vec<PhaseConfig>,
    /// MULES
    #[serde(default, rename = "MULES")]
    pub mules: MulesConfig,
    /// 全局自适应时间步
    #[serde(default, rename = "adaptiveTime")]
    pub adaptive_time: AdaptiveTimeConfig,
    /// 局部时间步
    #[serde(default, rename = "LTS")]
    pub lts: LtsConfig,
    /// 能量
    #[serde(default)]
    pub energy: EnergyConfig,
    /// 重力加速度 [m/s²]
    #[serde(default)]
    pub gravity: [f64; 3],
    /// 旋转参考系区域
    #[serde(default, rename = "MRF")]
    pub mrf: Vec<MrfZoneConfig>,
}

impl CaseConfig {
    /// 从 JSON 文件加载并验证
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: CaseConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 保存为 JSON 文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// 是否为多相算例
    pub fn is_multiphase(&self) -> bool {
        self.phases.len() > 1
    }

    /// 验证全部子配置及其交叉约束
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.time.validate()?;
        self.controls.validate()?;
        self.relaxation.validate()?;
        self.pressure_control.validate()?;
        self.mules.validate()?;
        self.lts.validate()?;
        self.energy.validate()?;
        for zone in &self.mrf {
            zone.validate()?;
        }

        if self.phases.len() == 1 {
            return Err(ConfigError::invalid(
                "phases",
                1,
                "多相算例至少需要两相；单相请使用 fluid",
            ));
        }
        for (i, a) in self.phases.iter().enumerate() {
            if self.phases[..i].iter().any(|b| b.name == a.name) {
                return Err(ConfigError::invalid("phases", &a.name, "相名重复"));
            }
            if !(a.rho > 0.0) {
                return Err(ConfigError::invalid(
                    &format!("phases.{}.rho", a.name),
                    a.rho,
                    "密度必须为正",
                ));
            }
        }
        if let Some(passive) = &self.mules.passive_phase {
            if !self.phases.iter().any(|p| &p.name == passive) {
                return Err(ConfigError::invalid(
                    "MULES.passivePhase",
                    passive,
                    "不是已定义的相",
                ));
            }
        }

        if self.is_multiphase() {
            if matches!(self.time.ddt_scheme, TimeScheme::CrankNicolson { .. })
                && self.mules.n_alpha_sub_cycles > 1
            {
                return Err(ConfigError::Incompatible {
                    first: "ddtSchemes.CrankNicolson".into(),
                    second: "MULES.nAlphaSubCycles".into(),
                    reason: "Crank-Nicolson 相分数输运不支持子循环".into(),
                });
            }
            if self.time.ddt_scheme.is_steady() {
                return Err(ConfigError::invalid(
                    "ddtSchemes",
                    self.time.ddt_scheme.name(),
                    "相分数输运只支持 Euler、CrankNicolson 与 localEuler",
                ));
            }
        }

        if self.adaptive_time.adjust_time_step && self.time.ddt_scheme.is_local() {
            return Err(ConfigError::Incompatible {
                first: "adaptiveTime.adjustTimeStep".into(),
                second: "ddtSchemes.localEuler".into(),
                reason: "局部时间步不使用全局时间步调整".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::ThermalProperties;

    fn two_phases() -> Vec<PhaseConfig> {
        vec![
            PhaseConfig {
                name: "water".into(),
                rho: 1000.0,
                nu: 1e-6,
                thermal: ThermalProperties::default(),
                phase_temperature: false,
            },
            PhaseConfig {
                name: "air".into(),
                rho: 1.0,
                nu: 1.5e-5,
                thermal: ThermalProperties::default(),
                phase_temperature: false,
            },
        ]
    }

    #[test]
    fn test_default_is_valid() {
        assert!(CaseConfig::default().validate().is_ok());
    }

    #[test]
    fn test_crank_nicolson_with_sub_cycles_is_fatal() {
        let mut c = CaseConfig::default();
        c.phases = two_phases();
        c.time.ddt_scheme = TimeScheme::CrankNicolson { oc_coeff: 0.9 };
        c.mules.n_alpha_sub_cycles = 2;
        assert!(matches!(c.validate(), Err(ConfigError::Incompatible { .. })));
    }

    #[test]
    fn test_unknown_passive_phase() {
        let mut c = CaseConfig::default();
        c.phases = two_phases();
        c.mules.passive_phase = Some("oil".into());
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_roundtrip_file() {
        let dir = std::env::temp_dir().join("hx_config_case_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("case.json");

        let mut c = CaseConfig::default();
        c.controls = SolutionControls::pimple(2, 2);
        c.save_to_file(&path).unwrap();

        let loaded = CaseConfig::from_file(&path).unwrap();
        assert_eq!(loaded.controls.n_outer_correctors, 2);
        let _ = std::fs::remove_file(&path);
    }
}
