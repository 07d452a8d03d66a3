// crates/hx_core/src/control/flow_solver.rs

//! 流动求解器
//!
//! 持有网格、流场与全部组件，按解析好的求解图推进时间：
//!
//! ```text
//! 时间步
//! ├── 时间步控制（Courant / LTS）
//! ├── 保存旧时间层
//! └── 外迭代 × nOuterCorrectors
//!     ├── 外层步：correctPhi → alpha → UPredictor → energy
//!     └── PISO × nCorrectors
//!         ├── p（非正交 × (1 + nNonOrthogonalCorrectors)）
//!         └── U
//! ```
//!
//! 外迭代残差控制满足时直接跳到最后一次外迭代；稳态算例的
//! `residualControl` 满足时结束运行。

use super::correctors::{CorrectorLimits, CorrectorState};
use super::solve_graph::{
    alpha_declaration, energy_declaration, flow_declarations, ResolvedGraph, SolveGraph, SolveStep,
};
use crate::energy::{EnergyFormulation, EnergySolver, ThermoInputs};
use crate::field::{io, VolScalarField, VolVectorField};
use crate::fvm::{SolverPerformance, TimeState};
use crate::mesh::PolyMesh;
use crate::momentum::{MomentumPredictor, MomentumSettings};
use crate::mrf::MrfCollection;
use crate::mules::MulesSolver;
use crate::parallel::{collective_check, Parallel};
use crate::pressure::{self, ContinuityErrors, PressureCorrector};
use crate::pressure_control::PressureControl;
use crate::properties::{self, FluidProperties, PhaseMixture};
use crate::rhie_chow::RhieChowInterpolator;
use crate::state::{FlowFields, FluxBasis, SolveContext};
use crate::time_step::{CourantNumbers, TimeStepController};
use crate::topology::{remap_surface_field, remap_vol_field, RemapStrategy, TopologyMap};
use crate::turbulence::{Laminar, TurbulenceModel};
use glam::DVec3;
use hx_config::CaseConfig;
use hx_foundation::{Dimensions, HxError, HxResult, VSMALL};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

// ============================================================================
// 输入与报告
// ============================================================================

/// 初始场
#[derive(Debug, Clone)]
pub struct InitialFields {
    /// 速度（含边界条件）
    pub u: VolVectorField,
    /// 压力（含边界条件）
    pub p: VolScalarField,
    /// 温度（含边界条件）
    pub t: VolScalarField,
    /// 相分数，与 `phases` 同序；单相为空
    pub alphas: Vec<VolScalarField>,
}

impl InitialFields {
    /// 静止、均匀压力与温度的初始场，边界条件取默认类型
    pub fn uniform(mesh: &PolyMesh, p: f64, t: f64) -> Self {
        Self {
            u: VolVectorField::new("U", Dimensions::VELOCITY, mesh, DVec3::ZERO),
            p: VolScalarField::new("p", Dimensions::PRESSURE, mesh, p),
            t: VolScalarField::new("T", Dimensions::TEMPERATURE, mesh, t),
            alphas: Vec::new(),
        }
    }
}

/// 单个时间步的报告
#[derive(Debug, Clone, Default)]
pub struct StepReport {
    /// 步末时间
    pub time: f64,
    /// 使用的时间步长
    pub delta_t: f64,
    /// 实际执行的外迭代次数
    pub outer_iterations: usize,
    /// 流动 Courant 数
    pub courant: CourantNumbers,
    /// 最后一次压力修正后的连续性误差
    pub continuity: ContinuityErrors,
    /// 最后一次外迭代中各场首次求解的初始残差
    pub residuals: BTreeMap<String, f64>,
    /// 最后一次外迭代中未达到容差的线性求解（场名）
    pub unconverged: Vec<String>,
    /// 稳态残差控制已满足
    pub converged: bool,
}

/// 整个运行的汇总
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// 时间步数
    pub n_steps: usize,
    /// 结束时间
    pub end_time: f64,
    /// 稳态收敛提前结束
    pub converged: bool,
    /// 写出的时间
    pub written: Vec<f64>,
}

// ============================================================================
// 求解器
// ============================================================================

/// 分离式压力-速度耦合求解器
#[derive(Debug)]
pub struct FlowSolver {
    mesh: PolyMesh,
    comm: Box<dyn Parallel>,
    config: CaseConfig,
    time: TimeState,
    fields: FlowFields,
    props: Box<dyn FluidProperties>,
    mixture: Option<PhaseMixture>,
    mules: Option<MulesSolver>,
    turbulence: Box<dyn TurbulenceModel>,
    mrf: MrfCollection,
    momentum: MomentumPredictor,
    pressure: PressureCorrector,
    energy: Option<EnergySolver>,
    time_step: TimeStepController,
    graph: ResolvedGraph,
    correctors: CorrectorState,
    needs_correct_phi: bool,
    unconverged: BTreeSet<String>,
}

impl FlowSolver {
    /// 由网格、配置与初始场创建
    ///
    /// 全部选项在此验证一次；多相算例使用体积通量，单相可压流体使用质量通量。
    pub fn new(
        mesh: PolyMesh,
        config: CaseConfig,
        initial: InitialFields,
        comm: Box<dyn Parallel>,
    ) -> HxResult<Self> {
        config.validate()?;
        let mesh_warnings = mesh.check().into_mesh_result()?;
        if comm.is_master() {
            for w in &mesh_warnings {
                warn!("网格检查: {w}");
            }
        }
        let time = TimeState::new(&config.time);
        let props = properties::select(&config.fluid);
        let multiphase = config.is_multiphase();

        let mixture = if multiphase {
            Some(PhaseMixture::new(&config.phases)?)
        } else {
            None
        };
        let basis = if multiphase || props.is_incompressible() {
            FluxBasis::Volumetric
        } else {
            FluxBasis::Mass
        };

        let InitialFields { u, p, t, alphas } = initial;
        HxError::check_size("U", mesh.n_cells(), u.internal().len())?;
        HxError::check_size("p", mesh.n_cells(), p.internal().len())?;
        HxError::check_size("T", mesh.n_cells(), t.internal().len())?;

        let mules = if multiphase {
            Some(MulesSolver::new(
                &mesh,
                &config.mules,
                config.div_schemes.alpha,
                config.time.ddt_scheme,
                &config.phases,
                alphas,
                true,
            )?)
        } else if !alphas.is_empty() {
            return Err(HxError::invalid_config(
                "alphas",
                alphas.len().to_string(),
                "单相算例不接受相分数场",
            ));
        } else {
            None
        };

        let mut rho = VolScalarField::new("rho", Dimensions::DENSITY, &mesh, 1.0);
        match (&mixture, &mules) {
            (Some(mixture), Some(mules)) => mixture_density(&mesh, mixture, mules.alphas(), &mut rho),
            _ => properties::update_density(props.as_ref(), &mesh, &p, &t, &mut rho),
        }
        let mut fields = FlowFields::new(&mesh, basis, u, p, t, rho);
        let alphas = mules.as_ref().map_or(&[][..], |m| m.alphas());
        update_thermo(&mesh, props.as_ref(), mixture.as_ref(), alphas, &mut fields);

        let energy = match EnergyFormulation::select(&config)? {
            Some(formulation) => {
                let thermo = ThermoInputs {
                    props: props.as_ref(),
                    mixture: mixture.as_ref(),
                    alphas,
                };
                info!("能量方程: {}", formulation.name());
                Some(EnergySolver::new(
                    formulation,
                    &config.energy,
                    config.div_schemes.energy,
                    &fields,
                    &thermo,
                )?)
            }
            None => None,
        };

        let steady = time.is_steady();
        let control = PressureControl::new(
            &mesh,
            &fields.p,
            &config.pressure_control,
            basis == FluxBasis::Volumetric,
            steady,
            comm.as_ref(),
        )?;
        let closed = comm.all_true(!fields.p.has_fixed_value_patch());
        let pressure = PressureCorrector::new(
            RhieChowInterpolator::new(basis, config.controls.ddt_phi_corr),
            control,
            closed,
        );

        let momentum = MomentumPredictor::new(MomentumSettings {
            predictor: config.controls.momentum_predictor,
            consistent: config.controls.consistent,
            scheme: config.div_schemes.momentum,
            gravity: DVec3::from_array(config.gravity),
        });
        let mrf = MrfCollection::from_config(&mesh, &config.mrf)?;
        let turbulence: Box<dyn TurbulenceModel> = Box::new(Laminar::new(&mesh));

        let mut graph = SolveGraph::new();
        for declaration in flow_declarations() {
            graph.declare(declaration)?;
        }
        if mules.is_some() {
            graph.declare(alpha_declaration())?;
        }
        if energy.is_some() {
            graph.declare(energy_declaration())?;
        }
        let graph = graph.resolve()?;
        info!("求解顺序: {}", graph);

        let correctors = CorrectorState::new(CorrectorLimits::from_controls(&config.controls, steady));
        let time_step = TimeStepController::from_config(&config);

        let mut solver = Self {
            mesh,
            comm,
            config,
            time,
            fields,
            props,
            mixture,
            mules,
            turbulence,
            mrf,
            momentum,
            pressure,
            energy,
            time_step,
            graph,
            correctors,
            needs_correct_phi: false,
            unconverged: BTreeSet::new(),
        };
        let ctx = SolveContext {
            mesh: &solver.mesh,
            time: &solver.time,
            comm: solver.comm.as_ref(),
        };
        solver.pressure.record_initial_mass(&ctx, &solver.fields);
        Ok(solver)
    }

    // ========================================================================
    // 访问
    // ========================================================================

    /// 网格
    pub fn mesh(&self) -> &PolyMesh {
        &self.mesh
    }

    /// 流场
    pub fn fields(&self) -> &FlowFields {
        &self.fields
    }

    /// 可变流场（设置初值或测试扰动）
    pub fn fields_mut(&mut self) -> &mut FlowFields {
        &mut self.fields
    }

    /// 时间状态
    pub fn time(&self) -> &TimeState {
        &self.time
    }

    /// 算例配置
    pub fn config(&self) -> &CaseConfig {
        &self.config
    }

    /// 相分数输运（多相算例）
    pub fn mules(&self) -> Option<&MulesSolver> {
        self.mules.as_ref()
    }

    /// 能量求解器
    pub fn energy(&self) -> Option<&EnergySolver> {
        self.energy.as_ref()
    }

    /// 压力修正器
    pub fn pressure(&self) -> &PressureCorrector {
        &self.pressure
    }

    /// 解析后的求解图
    pub fn graph(&self) -> &ResolvedGraph {
        &self.graph
    }

    /// 时间步控制器
    pub fn time_step(&self) -> &TimeStepController {
        &self.time_step
    }

    /// 下一次外迭代是否执行 correctPhi
    pub fn needs_correct_phi(&self) -> bool {
        self.needs_correct_phi
    }

    /// 请求在下一次外迭代开始时修正通量
    pub fn request_correct_phi(&mut self) {
        self.needs_correct_phi = true;
    }

    // ========================================================================
    // 时间推进
    // ========================================================================

    /// 推进一个时间步
    pub fn step(&mut self) -> HxResult<StepReport> {
        let phiv = self.mean_volumetric_flux();
        self.time.store_delta_t0();
        {
            let alphas = self.mules.as_ref().map_or(&[][..], |m| m.alphas());
            self.time_step
                .update(&self.mesh, self.comm.as_ref(), &mut self.time, &phiv, alphas)?;
        }
        self.time.advance();

        self.fields.store_old_time();
        if let Some(mules) = self.mules.as_mut() {
            mules.store_old_time();
        }
        if let Some(energy) = self.energy.as_mut() {
            energy.store_old_time();
        }
        if self.comm.is_master() {
            info!("Time = {}", io::time_name(self.time.value()));
        }

        let mut report = StepReport {
            time: self.time.value(),
            delta_t: self.time.delta_t(),
            courant: self.time_step.last_courant(),
            ..Default::default()
        };

        self.correctors.reset();
        let n_outer = self.correctors.limits().n_outer;
        let mut first: BTreeMap<String, f64> = BTreeMap::new();
        let mut outer = 0;
        while outer < n_outer {
            self.correctors.set_outer(outer);
            let mut residuals = BTreeMap::new();
            self.unconverged.clear();
            self.outer_iteration(&mut residuals, &mut report)?;
            if outer == 0 {
                first = residuals.clone();
            }
            report.outer_iterations += 1;
            report.residuals = residuals;
            report.unconverged = self.unconverged.iter().cloned().collect();

            if self.correctors.final_outer() {
                break;
            }
            if self.outer_converged(&report.residuals, &first) {
                if self.comm.is_master() {
                    info!("外迭代 {} 残差达标，进入最后一次外迭代", outer + 1);
                }
                outer = n_outer - 1;
            } else {
                outer += 1;
            }
        }

        self.turbulence.correct(&self.mesh, &self.fields.u);
        if self.time.is_steady() {
            report.converged = self.collective_converged() && self.steady_converged(&report.residuals);
        }
        Ok(report)
    }

    /// 运行到结束时间（稳态残差达标时提前结束）
    ///
    /// 给定算例目录时按 `writeInterval` 写出；`writeInterval` 为 0 只写首末时间。
    pub fn run(&mut self, case_dir: Option<&Path>) -> HxResult<RunSummary> {
        let mut summary = RunSummary::default();
        if let Some(dir) = case_dir {
            self.write(dir)?;
            summary.written.push(self.time.value());
        }

        let end_time = self.config.time.end_time;
        let write_interval = self.config.time.write_interval;
        while self.time.value() + 0.5 * self.time.delta_t() < end_time {
            let result = self.step();
            let report = collective_check(self.comm.as_ref(), result)?;
            summary.n_steps += 1;

            let last = report.converged || self.time.value() + 0.5 * self.time.delta_t() >= end_time;
            let due = write_interval > 0 && self.time.time_index() % write_interval == 0;
            if let Some(dir) = case_dir {
                if due || last {
                    self.write(dir)?;
                    summary.written.push(self.time.value());
                }
            }
            if report.converged {
                if self.comm.is_master() {
                    info!("稳态残差达标，{} 步后结束", summary.n_steps);
                }
                summary.converged = true;
                break;
            }
        }
        summary.end_time = self.time.value();
        Ok(summary)
    }

    fn outer_iteration(
        &mut self,
        residuals: &mut BTreeMap<String, f64>,
        report: &mut StepReport,
    ) -> HxResult<()> {
        for step in self.graph.outer_steps() {
            self.run_step(step, residuals, report)?;
        }
        let inner = self.graph.inner_steps();
        if inner.is_empty() {
            return Ok(());
        }
        for k in 0..self.correctors.limits().n_piso {
            self.correctors.set_piso(k);
            for (step, _) in &inner {
                self.run_step(*step, residuals, report)?;
            }
        }
        Ok(())
    }

    fn run_step(
        &mut self,
        step: SolveStep,
        residuals: &mut BTreeMap<String, f64>,
        report: &mut StepReport,
    ) -> HxResult<()> {
        debug!(
            "外迭代 {} PISO {}: {}",
            self.correctors.outer(),
            self.correctors.piso(),
            step
        );
        match step {
            SolveStep::CorrectPhi => self.correct_phi_step(),
            SolveStep::Alpha => self.alpha_step(),
            SolveStep::UPredictor => self.momentum_step(residuals),
            SolveStep::Energy => self.energy_step(residuals),
            SolveStep::Pressure => {
                report.continuity = self.pressure_step(residuals)?;
                Ok(())
            }
            SolveStep::Velocity => self.velocity_step(),
        }
    }

    // ========================================================================
    // 求解步
    // ========================================================================

    fn correct_phi_step(&mut self) -> HxResult<()> {
        if !self.needs_correct_phi {
            return Ok(());
        }
        let ctx = SolveContext {
            mesh: &self.mesh,
            time: &self.time,
            comm: self.comm.as_ref(),
        };
        let perf = pressure::correct_phi(
            &ctx,
            &mut self.fields,
            self.pressure.rhor_au_f(),
            self.pressure.control().ref_cell(),
            &self.config.solvers,
            self.correctors.limits().n_non_orth,
        )?;
        debug!("correctPhi: 初始残差 {:e}", perf.initial_residual);
        self.needs_correct_phi = false;
        Ok(())
    }

    fn alpha_step(&mut self) -> HxResult<()> {
        let Some(mules) = self.mules.as_mut() else {
            return Ok(());
        };
        let ctx = SolveContext {
            mesh: &self.mesh,
            time: &self.time,
            comm: self.comm.as_ref(),
        };
        mules.solve(
            &ctx,
            self.fields.phi.values(),
            self.fields.phi.old_time_or_current(),
            &self.config.solvers,
            self.correctors.final_iter(),
        )?;
        if let Some(mixture) = self.mixture.as_ref() {
            mixture_density(&self.mesh, mixture, mules.alphas(), &mut self.fields.rho);
            self.fields.mu = mixture.mu(&mules.alpha_slices());
            if let Some(flux) = mules.mixture_mass_flux(mixture) {
                self.fields.rho_phi.assign(&flux)?;
            }
        }
        Ok(())
    }

    fn momentum_step(&mut self, residuals: &mut BTreeMap<String, f64>) -> HxResult<()> {
        let ctx = SolveContext {
            mesh: &self.mesh,
            time: &self.time,
            comm: self.comm.as_ref(),
        };
        let perf = self.momentum.predict(
            &ctx,
            &mut self.fields,
            self.turbulence.as_ref(),
            &self.mrf,
            &self.config.relaxation,
            &self.config.solvers,
            self.correctors.final_iter(),
        )?;
        if let Some(perf) = perf {
            record_residual(residuals, &mut self.unconverged, &perf);
        }
        Ok(())
    }

    fn energy_step(&mut self, residuals: &mut BTreeMap<String, f64>) -> HxResult<()> {
        let Some(energy) = self.energy.as_mut() else {
            return Ok(());
        };
        let ctx = SolveContext {
            mesh: &self.mesh,
            time: &self.time,
            comm: self.comm.as_ref(),
        };
        let alphas = self.mules.as_ref().map_or(&[][..], |m| m.alphas());
        let thermo = ThermoInputs {
            props: self.props.as_ref(),
            mixture: self.mixture.as_ref(),
            alphas,
        };
        for k in 0..self.correctors.limits().n_energy {
            self.correctors.set_energy(k);
            let perfs = energy.correct(
                &ctx,
                &mut self.fields,
                &thermo,
                &self.config.relaxation,
                &self.config.solvers,
                &self.correctors,
            )?;
            for perf in &perfs {
                record_residual(residuals, &mut self.unconverged, perf);
            }
        }
        update_thermo(&self.mesh, self.props.as_ref(), self.mixture.as_ref(), alphas, &mut self.fields);
        Ok(())
    }

    fn pressure_step(&mut self, residuals: &mut BTreeMap<String, f64>) -> HxResult<ContinuityErrors> {
        let ctx = SolveContext {
            mesh: &self.mesh,
            time: &self.time,
            comm: self.comm.as_ref(),
        };
        let coeffs = self.momentum.coefficients(&ctx, &self.fields)?;
        self.pressure.prepare(&ctx, &mut self.fields, coeffs, &self.mrf)?;
        for k in 0..=self.correctors.limits().n_non_orth {
            self.correctors.set_non_orth(k);
            let perf = self.pressure.solve_pass(
                &ctx,
                &mut self.fields,
                &self.config.relaxation,
                &self.config.solvers,
                &self.correctors,
            )?;
            record_residual(residuals, &mut self.unconverged, &perf);
        }
        self.pressure
            .finish(&ctx, &mut self.fields, &self.config.relaxation, &self.correctors)
    }

    fn velocity_step(&mut self) -> HxResult<()> {
        let ctx = SolveContext {
            mesh: &self.mesh,
            time: &self.time,
            comm: self.comm.as_ref(),
        };
        self.pressure.correct_velocity(&ctx, &mut self.fields)
    }

    // ========================================================================
    // 收敛判断
    // ========================================================================

    /// `outerCorrectorResidualControl`：全部列出的场满足绝对或相对容差
    ///
    /// 本次外迭代有线性求解未收敛时不提前结束。
    fn outer_converged(&self, residuals: &BTreeMap<String, f64>, first: &BTreeMap<String, f64>) -> bool {
        let control = &self.config.controls.outer_corrector_residual_control;
        if control.is_empty() || !self.collective_converged() {
            return false;
        }
        control.iter().all(|(field, tol)| {
            let Some(r) = residuals.get(field) else {
                return false;
            };
            let r = self.comm.max(*r);
            let r0 = first.get(field).map_or(r, |x| self.comm.max(*x));
            r < tol.tolerance || (tol.rel_tol > 0.0 && r / r0.max(VSMALL) < tol.rel_tol)
        })
    }

    /// 全部进程的线性求解都已收敛
    fn collective_converged(&self) -> bool {
        let local = if self.unconverged.is_empty() { 0.0 } else { 1.0 };
        self.comm.max(local) == 0.0
    }

    /// 稳态 `residualControl`
    fn steady_converged(&self, residuals: &BTreeMap<String, f64>) -> bool {
        let control = &self.config.controls.residual_control;
        if control.is_empty() {
            return false;
        }
        control.iter().all(|(field, tol)| {
            residuals
                .get(field)
                .is_some_and(|r| self.comm.max(*r) < *tol)
        })
    }

    // ========================================================================
    // 场输入输出
    // ========================================================================

    /// 把当前时间层写到 `<case>/<time>/<field>.json`
    pub fn write(&self, case_dir: &Path) -> HxResult<Vec<PathBuf>> {
        let time = self.time.value();
        let mesh = &self.mesh;
        let mut written = vec![
            io::write_field(case_dir, time, mesh, &self.fields.u)?,
            io::write_field(case_dir, time, mesh, &self.fields.p)?,
            io::write_field(case_dir, time, mesh, &self.fields.t)?,
            io::write_field(case_dir, time, mesh, &self.fields.rho)?,
        ];
        if let Some(mules) = &self.mules {
            for alpha in mules.alphas() {
                written.push(io::write_field(case_dir, time, mesh, alpha)?);
            }
        }
        if let Some(energy) = &self.energy {
            for field in energy.energy().into_iter().chain(energy.phase_temperatures()) {
                written.push(io::write_field(case_dir, time, mesh, field)?);
            }
        }
        if self.comm.is_master() {
            info!("写出 {} 个场到时间 {}", written.len(), io::time_name(time));
        }
        Ok(written)
    }

    /// 从指定时间重启：读入 U、p、T 与相分数，刷新派生量
    ///
    /// 返回读到的场数；缺失的文件保留当前值。
    pub fn read_fields(&mut self, case_dir: &Path, time: f64) -> HxResult<usize> {
        let mesh = &self.mesh;
        let mut n = 0;
        n += usize::from(io::read_field(case_dir, time, mesh, &mut self.fields.u)?);
        n += usize::from(io::read_field(case_dir, time, mesh, &mut self.fields.p)?);
        n += usize::from(io::read_field(case_dir, time, mesh, &mut self.fields.t)?);
        if let Some(mules) = self.mules.as_mut() {
            for alpha in mules.alphas_mut() {
                n += usize::from(io::read_field(case_dir, time, mesh, alpha)?);
            }
            mules.reset_fluxes();
        }
        self.fields.clear_old_time();
        self.refresh_derived()?;
        self.needs_correct_phi = self.config.controls.correct_phi;
        info!("从时间 {} 读入 {} 个场", io::time_name(time), n);
        Ok(n)
    }

    /// 由当前 U、p、T 与相分数重算密度、物性与通量
    fn refresh_derived(&mut self) -> HxResult<()> {
        let mesh = &self.mesh;
        let alphas = self.mules.as_ref().map_or(&[][..], |m| m.alphas());
        update_thermo(mesh, self.props.as_ref(), self.mixture.as_ref(), alphas, &mut self.fields);
        let mut phi = crate::fvm::explicit::flux(mesh, &self.fields.u);
        if self.fields.basis == FluxBasis::Mass {
            let rho_f = self.fields.rho_f(mesh);
            for (f, r) in phi.iter_mut().zip(&rho_f) {
                *f *= r;
            }
        }
        self.fields.phi.assign(&phi)?;
        self.fields.update_rho_phi(mesh);
        Ok(())
    }

    /// 平均体积通量（时间步控制与相分数输运使用）
    fn mean_volumetric_flux(&self) -> Vec<f64> {
        match self.fields.basis {
            FluxBasis::Volumetric => self.fields.phi.values().to_vec(),
            FluxBasis::Mass => {
                let rho_f = self.fields.rho_f(&self.mesh);
                self.fields
                    .phi
                    .values()
                    .iter()
                    .zip(&rho_f)
                    .map(|(f, r)| f / r.max(VSMALL))
                    .collect()
            }
        }
    }

    // ========================================================================
    // 拓扑变化
    // ========================================================================

    /// 网格拓扑变化后搬运全部场并刷新派生数据
    ///
    /// 依次：计算供体、搬运体场与面场、替换网格、重建依赖网格的缓存、
    /// 重新定位压力参考单元，并在下一次外迭代开始时执行 correctPhi。
    pub fn on_topology_changed(
        &mut self,
        mut new_mesh: PolyMesh,
        map: &TopologyMap,
        strategy: &dyn RemapStrategy,
    ) -> HxResult<()> {
        map.validate(&self.mesh, &new_mesh)?;
        let old_mesh = &self.mesh;
        let donors = strategy.cell_donors(old_mesh, &new_mesh, map)?;
        let fallback = strategy.fallback();
        let n_fallback = self.comm.sum_usize(donors.n_fallback);
        if n_fallback > 0 && self.comm.is_master() {
            warn!(
                "拓扑变化: {} 个新单元没有供体，使用 {:?} 初始化（策略 {}）",
                n_fallback,
                fallback,
                strategy.name()
            );
        }

        let fields = &mut self.fields;
        remap_vol_field(&mut fields.u, old_mesh, &new_mesh, &donors, fallback)?;
        remap_vol_field(&mut fields.p, old_mesh, &new_mesh, &donors, fallback)?;
        remap_vol_field(&mut fields.t, old_mesh, &new_mesh, &donors, fallback)?;
        remap_vol_field(&mut fields.rho, old_mesh, &new_mesh, &donors, fallback)?;
        fields.phi = remap_surface_field(&fields.phi, &new_mesh, map)?;
        fields.rho_phi = remap_surface_field(&fields.rho_phi, &new_mesh, map)?;
        fields.clear_old_time();

        if let Some(mules) = self.mules.as_mut() {
            for alpha in mules.alphas_mut() {
                remap_vol_field(alpha, old_mesh, &new_mesh, &donors, fallback)?;
            }
            mules.reset_fluxes();
        }
        if let Some(energy) = self.energy.as_mut() {
            for field in energy.fields_mut() {
                remap_vol_field(field, old_mesh, &new_mesh, &donors, fallback)?;
                field.clear_old_time();
            }
        }

        new_mesh.set_topology_version(old_mesh.topology_version() + 1);
        self.mesh = new_mesh;

        let mesh = &self.mesh;
        let alphas = self.mules.as_ref().map_or(&[][..], |m| m.alphas());
        update_thermo(mesh, self.props.as_ref(), self.mixture.as_ref(), alphas, &mut self.fields);
        self.time.clear_r_delta_t();
        self.time_step.reset();
        self.mrf.rebuild(mesh, &self.config.mrf)?;
        self.momentum.clear();
        self.turbulence.correct(mesh, &self.fields.u);

        let control = PressureControl::new(
            mesh,
            &self.fields.p,
            &self.config.pressure_control,
            self.fields.basis == FluxBasis::Volumetric,
            self.time.is_steady(),
            self.comm.as_ref(),
        )?;
        let closed = self.comm.all_true(!self.fields.p.has_fixed_value_patch());
        self.pressure.rebind(control, closed);
        self.needs_correct_phi = self.config.controls.correct_phi;

        info!(
            "拓扑版本 {}: {} 个单元，{} 个新单元",
            mesh.topology_version(),
            mesh.n_cells(),
            map.n_new_cells()
        );
        Ok(())
    }
}

// ============================================================================
// 辅助
// ============================================================================

/// 按各相分数（内部与边界）计算混合物密度
fn mixture_density(mesh: &PolyMesh, mixture: &PhaseMixture, alphas: &[VolScalarField], rho: &mut VolScalarField) {
    let cells: Vec<&[f64]> = alphas.iter().map(|a| a.internal()).collect();
    rho.internal_mut().copy_from_slice(&mixture.rho(&cells));
    for pi in 0..mesh.patches().len() {
        let faces: Vec<&[f64]> = alphas.iter().map(|a| a.boundary(pi).values()).collect();
        let values = mixture.rho(&faces);
        rho.boundary_mut(pi).values_mut().copy_from_slice(&values);
    }
}

/// 刷新密度、可压缩性与粘度：多相按相分数加权，单相按 p、T 求值
fn update_thermo(
    mesh: &PolyMesh,
    props: &dyn FluidProperties,
    mixture: Option<&PhaseMixture>,
    alphas: &[VolScalarField],
    fields: &mut FlowFields,
) {
    match mixture {
        Some(mixture) if !alphas.is_empty() => {
            mixture_density(mesh, mixture, alphas, &mut fields.rho);
            let slices: Vec<&[f64]> = alphas.iter().map(|a| a.internal()).collect();
            fields.mu = mixture.mu(&slices);
            fields.psi = vec![0.0; mesh.n_cells()];
        }
        _ => {
            properties::update_density(props, mesh, &fields.p, &fields.t, &mut fields.rho);
            fields.psi = properties::compressibility(props, &fields.p, &fields.t);
            fields.mu = properties::dynamic_viscosity(props, &fields.p, &fields.t);
        }
    }
}

/// 每次外迭代中每个场只记录第一次求解的初始残差；未收敛的求解另行记录
fn record_residual(
    residuals: &mut BTreeMap<String, f64>,
    unconverged: &mut BTreeSet<String>,
    perf: &SolverPerformance,
) {
    residuals
        .entry(perf.field.clone())
        .or_insert(perf.initial_residual);
    if !perf.converged {
        unconverged.insert(perf.field.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{BoxMeshBuilder, BoxSide, PatchKind};
    use crate::parallel::SerialCommunicator;
    use crate::topology::BestEffortInitialization;
    use hx_config::{LinearSolverConfig, LinearSolverSettings, SolutionControls, TimeConfig, TimeScheme};

    fn cavity(n: usize) -> (PolyMesh, InitialFields) {
        let mesh = BoxMeshBuilder::new([n, n, 1], [1.0, 1.0, 0.1])
            .with_side(BoxSide::YMax, "lid", PatchKind::Wall)
            .with_side(BoxSide::ZMin, "frontAndBack", PatchKind::Symmetry)
            .with_side(BoxSide::ZMax, "frontAndBack", PatchKind::Symmetry)
            .build()
            .unwrap();
        let mut initial = InitialFields::uniform(&mesh, 0.0, 300.0);
        for wall in ["xmin", "xmax", "ymin"] {
            initial.u.set_fixed_value(&mesh, wall, DVec3::ZERO).unwrap();
        }
        initial.u.set_fixed_value(&mesh, "lid", DVec3::X).unwrap();
        (mesh, initial)
    }

    fn cavity_config() -> CaseConfig {
        let mut config = CaseConfig {
            time: TimeConfig {
                start_time: 0.0,
                end_time: 0.02,
                delta_t: 0.005,
                ddt_scheme: TimeScheme::Euler,
                ..Default::default()
            },
            controls: SolutionControls::piso(2),
            ..Default::default()
        };
        config.pressure_control.p_ref_cell = Some(0);
        config
    }

    #[test]
    fn test_single_phase_graph_has_no_alpha() {
        let (mesh, initial) = cavity(4);
        let solver = FlowSolver::new(mesh, cavity_config(), initial, Box::new(SerialCommunicator)).unwrap();
        assert!(!solver.graph().contains(SolveStep::Alpha));
        assert!(!solver.graph().contains(SolveStep::Energy));
        assert_eq!(solver.fields().basis, FluxBasis::Volumetric);
    }

    #[test]
    fn test_cavity_piso_keeps_continuity() {
        let (mesh, initial) = cavity(6);
        let mut solver = FlowSolver::new(mesh, cavity_config(), initial, Box::new(SerialCommunicator)).unwrap();
        let summary = solver.run(None).unwrap();
        assert_eq!(summary.n_steps, 4);
        assert!((summary.end_time - 0.02).abs() < 1e-12);
        let report = solver.step().unwrap();
        assert!(report.continuity.sum_local < 1e-4, "{:?}", report.continuity);
        assert!(report.residuals.contains_key("p"));
        // 顶盖带动流体
        let max_ux = solver.fields().u.internal().iter().map(|u| u.x).fold(f64::MIN, f64::max);
        assert!(max_ux > 0.0);
    }

    #[test]
    fn test_unconverged_pressure_blocks_early_outer_exit() {
        let mut capped = LinearSolverConfig::symmetric(1e-14, 0.0);
        capped.max_iter = 1;
        let run = |solvers: LinearSolverSettings| {
            let (mesh, initial) = cavity(6);
            let mut config = cavity_config();
            config.controls = SolutionControls::pimple(3, 1).with_outer_residual_control("p", 1e10);
            config.solvers = solvers;
            let mut solver = FlowSolver::new(mesh, config, initial, Box::new(SerialCommunicator)).unwrap();
            solver.step().unwrap()
        };

        let free = run(LinearSolverSettings::default());
        assert!(free.unconverged.is_empty(), "{:?}", free.unconverged);
        assert_eq!(free.outer_iterations, 2);

        let report = run(LinearSolverSettings::default().with("p", capped.clone()).with("pFinal", capped));
        assert!(report.unconverged.contains(&"p".to_string()));
        assert_eq!(report.outer_iterations, 3);
    }

    #[test]
    fn test_record_residual_keeps_first_and_flags_unconverged() {
        let perf = |residual: f64, converged: bool| SolverPerformance {
            solver: "PCG".to_string(),
            field: "p".to_string(),
            initial_residual: residual,
            final_residual: residual,
            iterations: 1,
            converged,
        };
        let mut residuals = BTreeMap::new();
        let mut unconverged = BTreeSet::new();
        record_residual(&mut residuals, &mut unconverged, &perf(0.5, true));
        assert!(unconverged.is_empty());
        record_residual(&mut residuals, &mut unconverged, &perf(0.1, false));
        assert_eq!(residuals["p"], 0.5);
        assert!(unconverged.contains("p"));
    }

    #[test]
    fn test_single_phase_rejects_alphas() {
        let (mesh, mut initial) = cavity(3);
        initial.alphas.push(VolScalarField::new("alpha.water", Dimensions::DIMLESS, &mesh, 1.0));
        let err = FlowSolver::new(mesh, cavity_config(), initial, Box::new(SerialCommunicator)).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_topology_change_requests_correct_phi() {
        let (mesh, initial) = cavity(4);
        let mut solver = FlowSolver::new(mesh.clone(), cavity_config(), initial, Box::new(SerialCommunicator)).unwrap();
        solver.step().unwrap();
        let map = TopologyMap::identity(&mesh);
        solver
            .on_topology_changed(mesh, &map, &BestEffortInitialization::new())
            .unwrap();
        assert!(solver.needs_correct_phi());
        assert_eq!(solver.mesh().topology_version(), 1);
        solver.step().unwrap();
        assert!(!solver.needs_correct_phi());
    }
}
