// crates/hx_config/src/physics.rs

//! 物性、相、能量、压力控制与旋转参考系配置

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

// ============================================================================
// 物性模型
// ============================================================================

/// 物性模型（启动时解析为物性句柄，计算中不再按名称查找）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "camelCase")]
pub enum MaterialModel {
    /// 不可压缩、常密度
    Incompressible {
        /// 密度 [kg/m³]
        rho: f64,
        /// 运动黏度 [m²/s]
        nu: f64,
    },
    /// 理想气体 rho = p/(R T)
    PerfectGas {
        /// 气体常数 [J/(kg K)]
        #[serde(rename = "R")]
        r_gas: f64,
        /// 动力黏度 [Pa s]
        mu: f64,
    },
    /// Boussinesq：常密度 + 浮力密度 rho_k = 1 - beta (T - TRef)
    Boussinesq {
        /// 参考密度 [kg/m³]
        rho: f64,
        /// 运动黏度 [m²/s]
        nu: f64,
        /// 热膨胀系数 [1/K]
        beta: f64,
        /// 参考温度 [K]
        #[serde(rename = "TRef")]
        t_ref: f64,
    },
}

impl Default for MaterialModel {
    fn default() -> Self {
        Self::Incompressible { rho: 1.0, nu: 1e-3 }
    }
}

/// 热物性（定容比热为温度的线性函数 cv = cv0 + cv1 T）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThermalProperties {
    /// 定容比热常数项 [J/(kg K)]
    #[serde(default = "default_cv0")]
    pub cv0: f64,
    /// 定容比热线性项 [J/(kg K²)]
    #[serde(default)]
    pub cv1: f64,
    /// 导热系数 [W/(m K)]
    #[serde(default = "default_kappa")]
    pub kappa: f64,
}

fn default_cv0() -> f64 {
    718.0
}

fn default_kappa() -> f64 {
    0.026
}

impl Default for ThermalProperties {
    fn default() -> Self {
        Self {
            cv0: default_cv0(),
            cv1: 0.0,
            kappa: default_kappa(),
        }
    }
}

/// 单相流体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FluidConfig {
    /// 状态方程与输运性质
    #[serde(default)]
    pub material: MaterialModel,
    /// 热物性
    #[serde(default)]
    pub thermal: ThermalProperties,
}

/// 多相（VOF）中的一相
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// 相名
    pub name: String,
    /// 密度 [kg/m³]
    pub rho: f64,
    /// 运动黏度 [m²/s]
    pub nu: f64,
    /// 热物性
    #[serde(default)]
    pub thermal: ThermalProperties,
    /// 是否为该相单独定义温度场
    #[serde(default, rename = "phaseTemperature")]
    pub phase_temperature: bool,
}

// ============================================================================
// 能量方程
// ============================================================================

/// 能量方程形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnergyFormulationKind {
    /// 总能形式，求解内能
    TotalEnergyEnergy,
    /// 总能形式，求解温度
    TotalEnergyTemperature,
    /// Boussinesq 形式，求解内能
    BoussinesqEnergy,
    /// Boussinesq 形式，求解温度
    BoussinesqTemperature,
    /// 各相分别求解温度
    PhasicEnergy,
}

/// 能量变量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EnergyVariable {
    /// 内能 e
    #[default]
    #[serde(rename = "e")]
    InternalEnergy,
    /// 焓 h
    #[serde(rename = "h")]
    Enthalpy,
}

/// 能量方程配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyConfig {
    /// 是否求解能量
    #[serde(default)]
    pub solve: bool,
    /// 显式指定形式，缺省时自动选择
    #[serde(default)]
    pub formulation: Option<EnergyFormulationKind>,
    /// 能量变量
    #[serde(default)]
    pub variable: EnergyVariable,
    /// 由能量反算温度的 Newton 迭代上限
    #[serde(default = "default_newton_iter", rename = "maxNewtonIter")]
    pub max_newton_iter: usize,
    /// Newton 收敛容差 [K]
    #[serde(default = "default_newton_tol", rename = "newtonTolerance")]
    pub newton_tolerance: f64,
    /// 温度允许下限 [K]
    #[serde(default = "default_t_min", rename = "TMin")]
    pub t_min: f64,
    /// 温度允许上限 [K]
    #[serde(default = "default_t_max", rename = "TMax")]
    pub t_max: f64,
    /// 相间换热系数 [W/(m³ K)]（phasicEnergy）
    #[serde(default, rename = "interphaseHeatTransfer")]
    pub interphase_heat_transfer: f64,
}

fn default_newton_iter() -> usize {
    100
}
fn default_newton_tol() -> f64 {
    1e-4
}
fn default_t_min() -> f64 {
    1.0
}
fn default_t_max() -> f64 {
    1e4
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            solve: false,
            formulation: None,
            variable: EnergyVariable::default(),
            max_newton_iter: default_newton_iter(),
            newton_tolerance: default_newton_tol(),
            t_min: default_t_min(),
            t_max: default_t_max(),
            interphase_heat_transfer: 0.0,
        }
    }
}

impl EnergyConfig {
    /// 验证
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_newton_iter == 0 {
            return Err(ConfigError::invalid(
                "energy.maxNewtonIter",
                self.max_newton_iter,
                "至少为 1",
            ));
        }
        if !(self.t_min > 0.0 && self.t_min < self.t_max) {
            return Err(ConfigError::invalid(
                "energy.TMin",
                self.t_min,
                "必须为正且小于 TMax",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// 压力控制
// ============================================================================

/// 压力参考与限幅
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PressureControlConfig {
    /// 参考单元
    #[serde(default, rename = "pRefCell")]
    pub p_ref_cell: Option<usize>,
    /// 参考点（取包含该点的单元）
    #[serde(default, rename = "pRefPoint")]
    pub p_ref_point: Option<[f64; 3]>,
    /// 参考压力值
    #[serde(default, rename = "pRefValue")]
    pub p_ref_value: f64,
    /// 压力上限
    #[serde(default, rename = "pMax")]
    pub p_max: Option<f64>,
    /// 压力下限
    #[serde(default, rename = "pMin")]
    pub p_min: Option<f64>,
    /// 密度下限（可压缩，经状态方程换算为压力下限）
    #[serde(default, rename = "rhoMin")]
    pub rho_min: Option<f64>,
    /// 密度上限
    #[serde(default, rename = "rhoMax")]
    pub rho_max: Option<f64>,
}

impl PressureControlConfig {
    /// 验证
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let (Some(lo), Some(hi)) = (self.p_min, self.p_max) {
            if lo >= hi {
                return Err(ConfigError::invalid("pMin", lo, "必须小于 pMax"));
            }
        }
        if let (Some(lo), Some(hi)) = (self.rho_min, self.rho_max) {
            if lo >= hi {
                return Err(ConfigError::invalid("rhoMin", lo, "必须小于 rhoMax"));
            }
        }
        if let Some(lo) = self.rho_min {
            if lo <= 0.0 {
                return Err(ConfigError::invalid("rhoMin", lo, "必须为正"));
            }
        }
        Ok(())
    }
}

// ============================================================================
// 旋转参考系
// ============================================================================

/// 单元选择
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CellSelection {
    /// 全部单元
    All,
    /// 单元中心位于轴对齐包围盒内
    Box {
        /// 下角点
        min: [f64; 3],
        /// 上角点
        max: [f64; 3],
    },
    /// 显式单元列表
    Cells {
        /// 单元编号
        cells: Vec<usize>,
    },
}

/// MRF 区域
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MrfZoneConfig {
    /// 区域名
    pub name: String,
    /// 单元选择
    pub selection: CellSelection,
    /// 旋转原点
    pub origin: [f64; 3],
    /// 旋转轴（归一化前）
    pub axis: [f64; 3],
    /// 角速度 [rad/s]
    pub omega: f64,
}

impl MrfZoneConfig {
    /// 验证
    pub fn validate(&self) -> Result<(), ConfigError> {
        let n = (self.axis[0].powi(2) + self.axis[1].powi(2) + self.axis[2].powi(2)).sqrt();
        if n < 1e-12 {
            return Err(ConfigError::invalid(
                &format!("MRF.{}.axis", self.name),
                format!("{:?}", self.axis),
                "旋转轴长度为零",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_material_models() {
        let m: MaterialModel =
            serde_json::from_str(r#"{ "model": "perfectGas", "R": 287.0, "mu": 1.8e-5 }"#)
                .unwrap();
        assert!(matches!(m, MaterialModel::PerfectGas { .. }));

        let m: MaterialModel = serde_json::from_str(
            r#"{ "model": "boussinesq", "rho": 1.0, "nu": 1e-6, "beta": 3e-3, "TRef": 300 }"#,
        )
        .unwrap();
        assert!(matches!(m, MaterialModel::Boussinesq { .. }));
    }

    #[test]
    fn test_energy_formulation_names() {
        let f: EnergyFormulationKind = serde_json::from_str(r#""boussinesqTemperature""#).unwrap();
        assert_eq!(f, EnergyFormulationKind::BoussinesqTemperature);
    }

    #[test]
    fn test_pressure_control_validation() {
        let c = PressureControlConfig {
            rho_min: Some(2.0),
            rho_max: Some(1.0),
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_mrf_zero_axis() {
        let z = MrfZoneConfig {
            name: "rotor".into(),
            selection: CellSelection::All,
            origin: [0.0; 3],
            axis: [0.0; 3],
            omega: 10.0,
        };
        assert!(z.validate().is_err());
    }
}
