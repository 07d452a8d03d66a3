// crates/hx_core/src/properties.rs

//! 物性模型
//!
//! 求解核心只通过 [`FluidProperties`] 查询密度、可压缩性、粘度与比热，
//! 具体模型在启动时由 [`select`] 从配置解析为 trait 对象，
//! 逐单元计算不再做字符串查找。
//!
//! # 模型
//!
//! | 模型 | ρ | ψ = ∂ρ/∂p |
//! |------|---|-----------|
//! | [`ConstantDensity`] | ρ₀ | 0 |
//! | [`PerfectGas`] | p/(R T) | 1/(R T) |
//! | [`BoussinesqDensity`] | ρ₀ (1 - β (T - T_ref)) | 0 |
//!
//! 内能 `e(T) = cv0 T + cv1 T²/2`，比热 `cv(T) = cv0 + cv1 T`。

use crate::field::VolScalarField;
use crate::mesh::PolyMesh;
use hx_config::{EnergyConfig, FluidConfig, MaterialModel, PhaseConfig, ThermalProperties};
use hx_foundation::{HxError, HxResult, SMALL};
use std::fmt::Debug;

// ============================================================================
// trait
// ============================================================================

/// 单相物性
pub trait FluidProperties: Send + Sync + Debug {
    /// 模型名
    fn name(&self) -> &'static str;

    /// 密度与压力无关
    fn is_incompressible(&self) -> bool;

    /// Boussinesq 浮力近似
    fn is_boussinesq(&self) -> bool {
        false
    }

    /// 密度
    fn rho(&self, p: f64, t: f64) -> f64;

    /// 可压缩性 ∂ρ/∂p
    fn psi(&self, p: f64, t: f64) -> f64;

    /// 动力粘度
    fn mu(&self, p: f64, t: f64) -> f64;

    /// 热物性
    fn thermal(&self) -> &ThermalProperties;

    /// 气体常数（非气体为 0）
    fn gas_constant(&self) -> f64 {
        0.0
    }

    /// 定容比热
    fn cv(&self, t: f64) -> f64 {
        let th = self.thermal();
        th.cv0 + th.cv1 * t
    }

    /// 比内能
    fn internal_energy(&self, t: f64) -> f64 {
        let th = self.thermal();
        th.cv0 * t + 0.5 * th.cv1 * t * t
    }

    /// 导热系数
    fn kappa(&self) -> f64 {
        self.thermal().kappa
    }
}

// ============================================================================
// 模型
// ============================================================================

/// 常密度
#[derive(Debug, Clone)]
pub struct ConstantDensity {
    rho: f64,
    nu: f64,
    thermal: ThermalProperties,
}

impl ConstantDensity {
    /// 创建
    pub fn new(rho: f64, nu: f64, thermal: ThermalProperties) -> Self {
        Self { rho, nu, thermal }
    }
}

impl FluidProperties for ConstantDensity {
    fn name(&self) -> &'static str {
        "incompressible"
    }

    fn is_incompressible(&self) -> bool {
        true
    }

    fn rho(&self, _p: f64, _t: f64) -> f64 {
        self.rho
    }

    fn psi(&self, _p: f64, _t: f64) -> f64 {
        0.0
    }

    fn mu(&self, _p: f64, _t: f64) -> f64 {
        self.rho * self.nu
    }

    fn thermal(&self) -> &ThermalProperties {
        &self.thermal
    }
}

/// 完全气体
#[derive(Debug, Clone)]
pub struct PerfectGas {
    r_gas: f64,
    mu: f64,
    thermal: ThermalProperties,
}

impl PerfectGas {
    /// 创建
    pub fn new(r_gas: f64, mu: f64, thermal: ThermalProperties) -> Self {
        Self { r_gas, mu, thermal }
    }
}

impl FluidProperties for PerfectGas {
    fn name(&self) -> &'static str {
        "perfectGas"
    }

    fn is_incompressible(&self) -> bool {
        false
    }

    fn rho(&self, p: f64, t: f64) -> f64 {
        p * self.psi(p, t)
    }

    fn psi(&self, _p: f64, t: f64) -> f64 {
        1.0 / (self.r_gas * t.max(SMALL))
    }

    fn mu(&self, _p: f64, _t: f64) -> f64 {
        self.mu
    }

    fn thermal(&self) -> &ThermalProperties {
        &self.thermal
    }

    fn gas_constant(&self) -> f64 {
        self.r_gas
    }
}

/// Boussinesq 密度
#[derive(Debug, Clone)]
pub struct BoussinesqDensity {
    rho0: f64,
    nu: f64,
    beta: f64,
    t_ref: f64,
    thermal: ThermalProperties,
}

impl BoussinesqDensity {
    /// 创建
    pub fn new(rho0: f64, nu: f64, beta: f64, t_ref: f64, thermal: ThermalProperties) -> Self {
        Self {
            rho0,
            nu,
            beta,
            t_ref,
            thermal,
        }
    }

    /// 参考密度
    pub fn rho0(&self) -> f64 {
        self.rho0
    }
}

impl FluidProperties for BoussinesqDensity {
    fn name(&self) -> &'static str {
        "boussinesq"
    }

    fn is_incompressible(&self) -> bool {
        true
    }

    fn is_boussinesq(&self) -> bool {
        true
    }

    fn rho(&self, _p: f64, t: f64) -> f64 {
        self.rho0 * (1.0 - self.beta * (t - self.t_ref))
    }

    fn psi(&self, _p: f64, _t: f64) -> f64 {
        0.0
    }

    fn mu(&self, _p: f64, _t: f64) -> f64 {
        self.rho0 * self.nu
    }

    fn thermal(&self) -> &ThermalProperties {
        &self.thermal
    }
}

/// 由配置解析物性模型
pub fn select(config: &FluidConfig) -> Box<dyn FluidProperties> {
    let thermal = config.thermal.clone();
    let model: Box<dyn FluidProperties> = match config.material {
        MaterialModel::Incompressible { rho, nu } => Box::new(ConstantDensity::new(rho, nu, thermal)),
        MaterialModel::PerfectGas { r_gas, mu } => Box::new(PerfectGas::new(r_gas, mu, thermal)),
        MaterialModel::Boussinesq {
            rho,
            nu,
            beta,
            t_ref,
        } => Box::new(BoussinesqDensity::new(rho, nu, beta, t_ref, thermal)),
    };
    log::info!("物性模型: {}", model.name());
    model
}

// ============================================================================
// 整场与边界块求值
// ============================================================================

/// 按当前 p、T 更新密度场（内部与全部边界面）
pub fn update_density(
    props: &dyn FluidProperties,
    mesh: &PolyMesh,
    p: &VolScalarField,
    t: &VolScalarField,
    rho: &mut VolScalarField,
) {
    for (c, r) in rho.internal_mut().iter_mut().enumerate() {
        *r = props.rho(p.internal()[c], t.internal()[c]);
    }
    for pi in 0..mesh.patches().len() {
        let values = patch_density(props, p, t, pi);
        rho.boundary_mut(pi).values_mut().copy_from_slice(&values);
    }
}

/// 边界块上的密度
pub fn patch_density(
    props: &dyn FluidProperties,
    p: &VolScalarField,
    t: &VolScalarField,
    patch: usize,
) -> Vec<f64> {
    p.boundary(patch)
        .values()
        .iter()
        .zip(t.boundary(patch).values())
        .map(|(pv, tv)| props.rho(*pv, *tv))
        .collect()
}

/// 单元可压缩性
pub fn compressibility(props: &dyn FluidProperties, p: &VolScalarField, t: &VolScalarField) -> Vec<f64> {
    p.internal()
        .iter()
        .zip(t.internal())
        .map(|(pv, tv)| props.psi(*pv, *tv))
        .collect()
}

/// 单元动力粘度
pub fn dynamic_viscosity(props: &dyn FluidProperties, p: &VolScalarField, t: &VolScalarField) -> Vec<f64> {
    p.internal()
        .iter()
        .zip(t.internal())
        .map(|(pv, tv)| props.mu(*pv, *tv))
        .collect()
}

/// 由比内能反解温度（Newton 迭代）
///
/// 超过迭代上限返回 `NotConverged`，结果越出 `[TMin, TMax]` 返回数值崩溃。
pub fn temperature_from_energy(
    props: &dyn FluidProperties,
    e: f64,
    t_guess: f64,
    config: &EnergyConfig,
    cell: usize,
) -> HxResult<f64> {
    let mut t = t_guess;
    for _ in 0..config.max_newton_iter {
        let f = props.internal_energy(t) - e;
        let df = props.cv(t);
        if !(df.abs() > SMALL) {
            return Err(HxError::breakdown("cv", cell, df, "比热为零，无法反解温度"));
        }
        let t_new = t - f / df;
        HxError::check_finite("T", cell, t_new)?;
        if (t_new - t).abs() < config.newton_tolerance {
            HxError::check_admissible("T", cell, t_new, config.t_min, config.t_max)?;
            return Ok(t_new);
        }
        t = t_new;
    }
    Err(HxError::not_converged(
        format!("单元 {cell} 的温度 Newton 迭代"),
        config.max_newton_iter,
        (props.internal_energy(t) - e).abs(),
    ))
}

// ============================================================================
// 多相混合
// ============================================================================

/// 单相常物性
#[derive(Debug, Clone)]
pub struct PhaseProperties {
    /// 相名
    pub name: String,
    /// 密度
    pub rho: f64,
    /// 运动粘度
    pub nu: f64,
    /// 热物性
    pub thermal: ThermalProperties,
}

impl From<&PhaseConfig> for PhaseProperties {
    fn from(config: &PhaseConfig) -> Self {
        Self {
            name: config.name.clone(),
            rho: config.rho,
            nu: config.nu,
            thermal: config.thermal.clone(),
        }
    }
}

/// 不可压多相混合物：性质按体积分数加权
#[derive(Debug, Clone)]
pub struct PhaseMixture {
    phases: Vec<PhaseProperties>,
}

impl PhaseMixture {
    /// 由相配置创建
    pub fn new(phases: &[PhaseConfig]) -> HxResult<Self> {
        if phases.len() < 2 {
            return Err(HxError::invalid_config(
                "phases",
                phases.len().to_string(),
                "混合物至少需要两相",
            ));
        }
        Ok(Self {
            phases: phases.iter().map(PhaseProperties::from).collect(),
        })
    }

    /// 各相
    pub fn phases(&self) -> &[PhaseProperties] {
        &self.phases
    }

    /// 相数
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// 是否没有相
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// 混合物密度 Σ αᵢ ρᵢ
    pub fn rho(&self, alphas: &[&[f64]]) -> Vec<f64> {
        self.weighted(alphas, |p| p.rho)
    }

    /// 混合物动力粘度 Σ αᵢ ρᵢ νᵢ
    pub fn mu(&self, alphas: &[&[f64]]) -> Vec<f64> {
        self.weighted(alphas, |p| p.rho * p.nu)
    }

    /// 混合物体积比热 Σ αᵢ ρᵢ cvᵢ
    pub fn rho_cv(&self, alphas: &[&[f64]]) -> Vec<f64> {
        self.weighted(alphas, |p| p.rho * p.thermal.cv0)
    }

    /// 混合物导热系数
    pub fn kappa(&self, alphas: &[&[f64]]) -> Vec<f64> {
        self.weighted(alphas, |p| p.thermal.kappa)
    }

    fn weighted(&self, alphas: &[&[f64]], prop: impl Fn(&PhaseProperties) -> f64) -> Vec<f64> {
        let n = alphas.first().map_or(0, |a| a.len());
        let mut out = vec![0.0; n];
        for (phase, alpha) in self.phases.iter().zip(alphas) {
            let v = prop(phase);
            for (o, a) in out.iter_mut().zip(alpha.iter()) {
                *o += a * v;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_gas_state() {
        let gas = PerfectGas::new(287.0, 1.8e-5, ThermalProperties::default());
        let rho = gas.rho(1e5, 300.0);
        assert!((rho - 1e5 / (287.0 * 300.0)).abs() < 1e-12);
        assert!((gas.psi(1e5, 300.0) * 1e5 - rho).abs() < 1e-12);
        assert!(!gas.is_incompressible());
    }

    #[test]
    fn test_boussinesq_density() {
        let b = BoussinesqDensity::new(1000.0, 1e-6, 2e-4, 300.0, ThermalProperties::default());
        assert!((b.rho(0.0, 310.0) - 1000.0 * (1.0 - 2e-3)).abs() < 1e-10);
        assert!(b.is_boussinesq());
        assert_eq!(b.psi(0.0, 310.0), 0.0);
    }

    #[test]
    fn test_select_from_config() {
        let cfg = FluidConfig::default();
        let props = select(&cfg);
        assert!(props.is_incompressible());
        assert_eq!(props.name(), "incompressible");
    }

    #[test]
    fn test_temperature_from_energy() {
        let thermal = ThermalProperties {
            cv0: 700.0,
            cv1: 0.1,
            kappa: 0.02,
        };
        let gas = PerfectGas::new(287.0, 1.8e-5, thermal);
        let config = EnergyConfig::default();
        let e = gas.internal_energy(350.0);
        let t = temperature_from_energy(&gas, e, 300.0, &config, 0).unwrap();
        assert!((t - 350.0).abs() < 1e-3);

        // 超出温度上限
        let e_hot = gas.internal_energy(2e4);
        let err = temperature_from_energy(&gas, e_hot, 300.0, &config, 7).unwrap_err();
        assert!(err.is_numerical_breakdown());

        // 迭代上限过小
        let tight = EnergyConfig {
            max_newton_iter: 1,
            ..EnergyConfig::default()
        };
        assert!(temperature_from_energy(&gas, e, 300.0, &tight, 0).is_err());
    }

    #[test]
    fn test_mixture_weights() {
        let phases = vec![
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
        ];
        let mix = PhaseMixture::new(&phases).unwrap();
        let a1 = [1.0, 0.5];
        let a2 = [0.0, 0.5];
        let rho = mix.rho(&[&a1, &a2]);
        assert_eq!(rho[0], 1000.0);
        assert!((rho[1] - 500.5).abs() < 1e-12);
        assert!(PhaseMixture::new(&phases[..1]).is_err());
    }
}
