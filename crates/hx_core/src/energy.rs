// crates/hx_core/src/energy.rs

//! 能量方程
//!
//! 方程形式在初始化时由配置选定一次，之后每次修正按变体直接组装，
//! 热路径上没有动态分派。
//!
//! | 形式 | 求解变量 | 密度 | 压力功 |
//! |------|----------|------|--------|
//! | `TotalEnergyEnergy` | e | ρ | -p ∇·U |
//! | `TotalEnergyTemperature` | T | ρ | -p ∇·U |
//! | `BoussinesqEnergy` | e | ρ₀ | 无 |
//! | `BoussinesqTemperature` | T | ρ₀ | 无 |
//! | `PhasicEnergy` | 各相 Tᵢ | αᵢ ρᵢ | 无 |
//!
//! 求解内能的形式在每次求解后逐单元用 Newton 迭代反解温度；
//! 迭代不收敛或温度越界是致命错误。

use crate::field::{BoundaryKind, VolScalarField};
use crate::fvm::{explicit, implicit, FvMatrix, SolverPerformance};
use crate::parallel::collective_check;
use crate::properties::{temperature_from_energy, FluidProperties, PhaseMixture};
use crate::state::{FlowFields, SolveContext};
use crate::control::CorrectorState;
use hx_config::{
    CaseConfig, ConvectionScheme, EnergyConfig, EnergyFormulationKind, LinearSolverConfig,
    LinearSolverSettings, MaterialModel, RelaxationFactors,
};
use hx_foundation::{Dimensions, HxError, HxResult, SMALL};

// ============================================================================
// 形式选择
// ============================================================================

/// 能量方程形式
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnergyFormulation {
    /// 总能，求解内能
    TotalEnergyEnergy,
    /// 总能，求解温度
    TotalEnergyTemperature,
    /// Boussinesq，求解内能
    BoussinesqEnergy {
        /// 参考密度
        rho0: f64,
    },
    /// Boussinesq，求解温度
    BoussinesqTemperature {
        /// 参考密度
        rho0: f64,
    },
    /// 各相分别求解温度
    PhasicEnergy {
        /// 相间换热系数（单位体积）
        heat_transfer: f64,
    },
}

impl EnergyFormulation {
    /// 由配置选定形式；不求解能量时返回 `None`
    ///
    /// 自动选择：所有相都有相温度场时为 `PhasicEnergy`；单相 Boussinesq
    /// 流体为 `BoussinesqTemperature`；其余为 `TotalEnergyTemperature`。
    /// 只有部分相给出相温度场是配置错误。
    pub fn select(case: &CaseConfig) -> HxResult<Option<Self>> {
        let energy = &case.energy;
        if !energy.solve {
            return Ok(None);
        }
        let multiphase = case.is_multiphase();
        let n_phase_t = case.phases.iter().filter(|p| p.phase_temperature).count();
        if multiphase && n_phase_t > 0 && n_phase_t < case.phases.len() {
            return Err(HxError::invalid_config(
                "phases.phaseTemperature",
                format!("{}/{}", n_phase_t, case.phases.len()),
                "相温度场必须对所有相同时给出",
            ));
        }
        let all_phase_t = multiphase && n_phase_t == case.phases.len();
        let rho0 = match case.fluid.material {
            MaterialModel::Boussinesq { rho, .. } if !multiphase => Some(rho),
            _ => None,
        };
        let phasic = EnergyFormulation::PhasicEnergy {
            heat_transfer: energy.interphase_heat_transfer,
        };

        let selected = match energy.formulation {
            None if all_phase_t => phasic,
            None => match rho0 {
                Some(rho0) => Self::BoussinesqTemperature { rho0 },
                None => Self::TotalEnergyTemperature,
            },
            Some(EnergyFormulationKind::PhasicEnergy) => {
                if !all_phase_t {
                    return Err(HxError::missing_config("phases.phaseTemperature"));
                }
                phasic
            }
            Some(kind @ (EnergyFormulationKind::BoussinesqEnergy | EnergyFormulationKind::BoussinesqTemperature)) => {
                let rho0 = rho0.ok_or_else(|| {
                    HxError::incompatible(
                        "energy.formulation",
                        "fluid.material",
                        "Boussinesq 能量形式需要单相 Boussinesq 密度模型",
                    )
                })?;
                if kind == EnergyFormulationKind::BoussinesqEnergy {
                    Self::BoussinesqEnergy { rho0 }
                } else {
                    Self::BoussinesqTemperature { rho0 }
                }
            }
            Some(EnergyFormulationKind::TotalEnergyEnergy) if multiphase => {
                return Err(HxError::incompatible(
                    "energy.formulation",
                    "phases",
                    "多相混合物不能由内能反解温度",
                ));
            }
            Some(EnergyFormulationKind::TotalEnergyEnergy) => Self::TotalEnergyEnergy,
            Some(EnergyFormulationKind::TotalEnergyTemperature) => Self::TotalEnergyTemperature,
        };
        log::info!("能量方程形式: {}", selected.name());
        Ok(Some(selected))
    }

    /// 名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::TotalEnergyEnergy => "totalEnergyEnergy",
            Self::TotalEnergyTemperature => "totalEnergyTemperature",
            Self::BoussinesqEnergy { .. } => "boussinesqEnergy",
            Self::BoussinesqTemperature { .. } => "boussinesqTemperature",
            Self::PhasicEnergy { .. } => "phasicEnergy",
        }
    }

    /// 是否求解内能（之后反解温度）
    pub fn solves_energy(&self) -> bool {
        matches!(self, Self::TotalEnergyEnergy | Self::BoussinesqEnergy { .. })
    }

    /// Boussinesq 参考密度
    fn reference_density(&self) -> Option<f64> {
        match self {
            Self::BoussinesqEnergy { rho0 } | Self::BoussinesqTemperature { rho0 } => Some(*rho0),
            _ => None,
        }
    }

    /// 是否包含压力功
    fn has_pressure_work(&self) -> bool {
        matches!(self, Self::TotalEnergyEnergy | Self::TotalEnergyTemperature)
    }
}

// ============================================================================
// 求解器
// ============================================================================

/// 物性输入
#[derive(Debug, Clone, Copy)]
pub struct ThermoInputs<'a> {
    /// 单相物性
    pub props: &'a dyn FluidProperties,
    /// 多相混合物（多相算例）
    pub mixture: Option<&'a PhaseMixture>,
    /// 各相体积分数（与混合物相序一致）
    pub alphas: &'a [VolScalarField],
}

/// 能量求解器
#[derive(Debug)]
pub struct EnergySolver {
    formulation: EnergyFormulation,
    config: EnergyConfig,
    scheme: ConvectionScheme,
    energy: Option<VolScalarField>,
    phase_t: Vec<VolScalarField>,
}

impl EnergySolver {
    /// 创建；内能形式由初始温度生成内能场，相温度形式复制混合温度
    pub fn new(
        formulation: EnergyFormulation,
        config: &EnergyConfig,
        scheme: ConvectionScheme,
        fields: &FlowFields,
        thermo: &ThermoInputs<'_>,
    ) -> HxResult<Self> {
        let energy = if formulation.solves_energy() {
            let mut e = fields.t.like("e", Dimensions::SPECIFIC_ENERGY, 0.0);
            sync_energy_field(&mut e, &fields.t, thermo.props);
            Some(e)
        } else {
            None
        };
        let phase_t = match (formulation, thermo.mixture) {
            (EnergyFormulation::PhasicEnergy { .. }, Some(mixture)) => mixture
                .phases()
                .iter()
                .map(|ph| {
                    let mut t = fields.t.clone();
                    t.rename(&format!("T.{}", ph.name));
                    t
                })
                .collect(),
            (EnergyFormulation::PhasicEnergy { .. }, None) => {
                return Err(HxError::missing_config("phases"));
            }
            _ => Vec::new(),
        };
        Ok(Self {
            formulation,
            config: config.clone(),
            scheme,
            energy,
            phase_t,
        })
    }

    /// 方程形式
    pub fn formulation(&self) -> EnergyFormulation {
        self.formulation
    }

    /// 内能场（内能形式）
    pub fn energy(&self) -> Option<&VolScalarField> {
        self.energy.as_ref()
    }

    /// 各相温度（相温度形式）
    pub fn phase_temperatures(&self) -> &[VolScalarField] {
        &self.phase_t
    }

    /// 求解器持有的全部场（拓扑变化时重映射）
    pub fn fields_mut(&mut self) -> impl Iterator<Item = &mut VolScalarField> {
        self.energy.iter_mut().chain(self.phase_t.iter_mut())
    }

    /// 保存旧时间层
    pub fn store_old_time(&mut self) {
        for f in self.fields_mut() {
            f.store_old_time();
        }
    }

    /// 一次能量修正
    #[allow(clippy::too_many_arguments)]
    pub fn correct(
        &mut self,
        ctx: &SolveContext<'_>,
        fields: &mut FlowFields,
        thermo: &ThermoInputs<'_>,
        relaxation: &RelaxationFactors,
        solvers: &LinearSolverSettings,
        state: &CorrectorState,
    ) -> HxResult<Vec<SolverPerformance>> {
        let final_iter = state.final_iter();
        match self.formulation {
            EnergyFormulation::PhasicEnergy { heat_transfer } => {
                self.correct_phasic(ctx, fields, thermo, heat_transfer, relaxation, solvers, final_iter)
            }
            _ => {
                let perf = self.correct_single(ctx, fields, thermo, relaxation, solvers, final_iter)?;
                Ok(vec![perf])
            }
        }
    }

    /// 组装单一能量方程（温度或内能形式）
    pub fn assemble_energy_equation(
        &self,
        ctx: &SolveContext<'_>,
        fields: &FlowFields,
        thermo: &ThermoInputs<'_>,
    ) -> HxResult<FvMatrix<f64>> {
        let mesh = ctx.mesh;
        let n = mesh.n_cells();
        let t = fields.t.internal();

        // 单位质量的输运量系数：温度形式为 cv，内能形式为 1
        let (rho, rho_old, coeff, gamma_cells): (Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>) =
            match (thermo.mixture, self.formulation.reference_density()) {
                (Some(mixture), _) => {
                    let alphas: Vec<&[f64]> = thermo.alphas.iter().map(|a| a.internal()).collect();
                    let rho_cv = mixture.rho_cv(&alphas);
                    let rho = fields.rho.internal();
                    let cv: Vec<f64> = rho_cv.iter().zip(rho).map(|(a, r)| a / r.max(SMALL)).collect();
                    (rho.to_vec(), fields.rho.old_time_or_current().to_vec(), cv, mixture.kappa(&alphas))
                }
                (None, Some(rho0)) => {
                    let cv: Vec<f64> = t.iter().map(|tv| thermo.props.cv(*tv)).collect();
                    (vec![rho0; n], vec![rho0; n], cv, vec![thermo.props.kappa(); n])
                }
                (None, None) => {
                    let cv: Vec<f64> = t.iter().map(|tv| thermo.props.cv(*tv)).collect();
                    (
                        fields.rho.internal().to_vec(),
                        fields.rho.old_time_or_current().to_vec(),
                        cv,
                        vec![thermo.props.kappa(); n],
                    )
                }
            };

        let (target, coeff, gamma_cells) = match &self.energy {
            Some(e) => {
                let gamma: Vec<f64> = gamma_cells.iter().zip(&coeff).map(|(k, c)| k / c.max(SMALL)).collect();
                (e, vec![1.0; n], gamma)
            }
            None => (&fields.t, coeff, gamma_cells),
        };

        let mass_flux: Vec<f64> = match self.formulation.reference_density() {
            Some(rho0) => fields.phi.values().iter().map(|p| p * rho0).collect(),
            None => fields.rho_phi.values().to_vec(),
        };
        let coeff_f = explicit::interpolate_cells(mesh, &coeff);
        let flux: Vec<f64> = mass_flux.iter().zip(&coeff_f).map(|(m, c)| m * c).collect();
        let gamma_f = explicit::interpolate_cells(mesh, &gamma_cells);

        let rho_c: Vec<f64> = rho.iter().zip(&coeff).map(|(r, c)| r * c).collect();
        let rho_c_old: Vec<f64> = rho_old.iter().zip(&coeff).map(|(r, c)| r * c).collect();

        let mut eqn = implicit::ddt_rho(mesh, ctx.time, &rho_c, &rho_c_old, target);
        eqn += implicit::div(mesh, &flux, target, self.scheme);
        eqn -= implicit::laplacian(mesh, &gamma_f, target);

        // 连续性误差项保持输运有界
        let mut cont = explicit::div(mesh, &flux);
        let ddt_rho_c = explicit::ddt(mesh, ctx.time, &rho_c, &rho_c_old);
        for (c, d) in cont.iter_mut().zip(&ddt_rho_c) {
            *c += d;
        }
        let sp: Vec<f64> = cont.iter().map(|c| -c).collect();
        eqn.add_sp(mesh, &sp);

        if self.formulation.has_pressure_work() && thermo.mixture.is_none() && !thermo.props.is_incompressible() {
            let div_u = explicit::div(mesh, &explicit::flux(mesh, &fields.u));
            let work: Vec<f64> = (0..n)
                .map(|c| fields.p.internal()[c] * div_u[c] * mesh.cell_volumes()[c])
                .collect();
            eqn.add_explicit(&work);
        }
        Ok(eqn)
    }

    fn correct_single(
        &mut self,
        ctx: &SolveContext<'_>,
        fields: &mut FlowFields,
        thermo: &ThermoInputs<'_>,
        relaxation: &RelaxationFactors,
        solvers: &LinearSolverSettings,
        final_iter: bool,
    ) -> HxResult<SolverPerformance> {
        let mesh = ctx.mesh;
        if let Some(e) = self.energy.as_mut() {
            sync_energy_boundaries(e, &fields.t, thermo.props);
        }
        let mut eqn = self.assemble_energy_equation(ctx, fields, thermo)?;

        let name = if self.energy.is_some() { "e" } else { "T" };
        let config = solver_config(solvers, name, final_iter)?;
        let target = match self.energy.as_mut() {
            Some(e) => e,
            None => &mut fields.t,
        };
        target.store_prev_iter();
        if let Some(alpha) = relaxation.equation(name, final_iter) {
            eqn.relax(mesh, target, alpha);
        }
        let perf = eqn.solve(mesh, target, config)?;
        if let Some(alpha) = relaxation.field(name, final_iter) {
            target.relax(mesh, alpha);
        }

        if let Some(e) = &self.energy {
            let mut results = Vec::with_capacity(mesh.n_cells());
            let mut first_err = Ok(());
            for (c, ev) in e.internal().iter().enumerate() {
                match temperature_from_energy(thermo.props, *ev, fields.t.internal()[c], &self.config, c) {
                    Ok(tv) => results.push(tv),
                    Err(err) => {
                        first_err = Err(err);
                        break;
                    }
                }
            }
            collective_check(ctx.comm, first_err)?;
            fields.t.internal_mut().copy_from_slice(&results);
            fields.t.correct_boundary_conditions(mesh);
        }
        check_temperature(ctx, &fields.t, &self.config)?;
        Ok(perf)
    }

    #[allow(clippy::too_many_arguments)]
    fn correct_phasic(
        &mut self,
        ctx: &SolveContext<'_>,
        fields: &mut FlowFields,
        thermo: &ThermoInputs<'_>,
        heat_transfer: f64,
        relaxation: &RelaxationFactors,
        solvers: &LinearSolverSettings,
        final_iter: bool,
    ) -> HxResult<Vec<SolverPerformance>> {
        let mesh = ctx.mesh;
        let mixture = thermo
            .mixture
            .ok_or_else(|| HxError::missing_config("phases"))?;
        HxError::check_size("alphas", mixture.len(), thermo.alphas.len())?;
        let config = solver_config(solvers, "T", final_iter)?;
        let n = mesh.n_cells();
        let phi = fields.phi.values();

        let mut perfs = Vec::with_capacity(mixture.len());
        for (i, phase) in mixture.phases().iter().enumerate() {
            let alpha = &thermo.alphas[i];
            let rho_cv = phase.rho * phase.thermal.cv0;
            let a_rho_cv: Vec<f64> = alpha.internal().iter().map(|a| a * rho_cv).collect();
            let a_rho_cv_old: Vec<f64> = alpha.old_time_or_current().iter().map(|a| a * rho_cv).collect();
            let alpha_f = explicit::interpolate_upwind(mesh, alpha, phi);
            let flux: Vec<f64> = phi.iter().zip(&alpha_f).map(|(p, a)| p * a * rho_cv).collect();
            let gamma_f: Vec<f64> = explicit::interpolate(mesh, alpha)
                .iter()
                .map(|a| a.clamp(0.0, 1.0) * phase.thermal.kappa)
                .collect();

            // 其它相的混合温度
            let mut t_other = vec![0.0; n];
            let mut w_other = vec![0.0; n];
            for (j, tj) in self.phase_t.iter().enumerate() {
                if j == i {
                    continue;
                }
                for c in 0..n {
                    let w = thermo.alphas[j].internal()[c].max(0.0);
                    t_other[c] += w * tj.internal()[c];
                    w_other[c] += w;
                }
            }

            let t_i = &mut self.phase_t[i];
            let mut eqn = implicit::ddt_rho(mesh, ctx.time, &a_rho_cv, &a_rho_cv_old, t_i);
            eqn += implicit::div(mesh, &flux, t_i, self.scheme);
            eqn -= implicit::laplacian(mesh, &gamma_f, t_i);

            let mut cont = explicit::div(mesh, &flux);
            let ddt = explicit::ddt(mesh, ctx.time, &a_rho_cv, &a_rho_cv_old);
            for (c, d) in cont.iter_mut().zip(&ddt) {
                *c += d;
            }
            let mut sp: Vec<f64> = cont.iter().map(|c| -c).collect();
            let mut su = vec![0.0; n];
            if heat_transfer > 0.0 {
                for c in 0..n {
                    if w_other[c] > SMALL {
                        let h = heat_transfer * alpha.internal()[c].clamp(0.0, 1.0);
                        sp[c] += h;
                        su[c] += h * t_other[c] / w_other[c];
                    }
                }
            }
            eqn.add_sp(mesh, &sp);
            eqn.add_su(mesh, &su);

            t_i.store_prev_iter();
            if let Some(a) = relaxation.equation("T", final_iter) {
                eqn.relax(mesh, t_i, a);
            }
            perfs.push(eqn.solve(mesh, t_i, config)?);
            if let Some(a) = relaxation.field("T", final_iter) {
                t_i.relax(mesh, a);
            }
        }

        // 混合温度：按 αᵢ ρᵢ cvᵢ 加权
        for c in 0..n {
            let mut num = 0.0;
            let mut den = 0.0;
            for (i, phase) in mixture.phases().iter().enumerate() {
                let w = thermo.alphas[i].internal()[c].max(0.0) * phase.rho * phase.thermal.cv0;
                num += w * self.phase_t[i].internal()[c];
                den += w;
            }
            if den > SMALL {
                fields.t.internal_mut()[c] = num / den;
            }
        }
        fields.t.correct_boundary_conditions(mesh);
        check_temperature(ctx, &fields.t, &self.config)?;
        Ok(perfs)
    }
}

/// 能量变量的求解设置，未单独配置时沿用温度
fn solver_config<'a>(
    solvers: &'a LinearSolverSettings,
    name: &str,
    final_iter: bool,
) -> HxResult<&'a LinearSolverConfig> {
    match solvers.get(name, final_iter) {
        Ok(c) => Ok(c),
        Err(_) => Ok(solvers.get("T", final_iter)?),
    }
}

/// 温度越出 `[TMin, TMax]` 为致命错误（全局一致）
fn check_temperature(ctx: &SolveContext<'_>, t: &VolScalarField, config: &EnergyConfig) -> HxResult<()> {
    let local = t
        .internal()
        .iter()
        .enumerate()
        .try_for_each(|(c, tv)| HxError::check_admissible("T", c, *tv, config.t_min, config.t_max));
    collective_check(ctx.comm, local)
}

/// 由温度设置内能场（内部与边界）
fn sync_energy_field(e: &mut VolScalarField, t: &VolScalarField, props: &dyn FluidProperties) {
    for (ev, tv) in e.internal_mut().iter_mut().zip(t.internal()) {
        *ev = props.internal_energy(*tv);
    }
    sync_energy_boundaries(e, t, props);
}

/// 内能边界跟随温度边界：边界值取 e(T_b)，给定温度梯度换算为内能梯度
fn sync_energy_boundaries(e: &mut VolScalarField, t: &VolScalarField, props: &dyn FluidProperties) {
    for (pi, tp) in t.patches().iter().enumerate() {
        let ep = e.boundary_mut(pi);
        for (ev, tv) in ep.values_mut().iter_mut().zip(tp.values()) {
            *ev = props.internal_energy(*tv);
        }
        if tp.kind() == BoundaryKind::FixedGradient {
            let grads: Vec<f64> = tp
                .gradient()
                .iter()
                .zip(tp.values())
                .map(|(g, tv)| g * props.cv(*tv))
                .collect();
            ep.gradient_mut().copy_from_slice(&grads);
        }
    }
}
