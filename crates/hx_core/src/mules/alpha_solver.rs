// crates/hx_core/src/mules/alpha_solver.rs

//! 相分数输运求解器
//!
//! 每个时间步（可子循环）推进全部被输运的相分数：
//!
//! 1. 高阶通量 `φ α_f` 加界面压缩项 `φ_r α_i α_j`（按相对系数）
//! 2. 修正量 = 高阶通量 - 有界迎风通量，经 MULES 限制
//! 3. 无被动相或多于两相时对修正量做 `limit_sum`（多于两相时被动相也参与）
//! 4. 被动相由 `1 - Σ其余相` 给出，其通量为 `φ - Σ其余相通量`
//!
//! 通量不满足无散时 `div(φ)` 作为源项进入各相方程；Crank-Nicolson 下
//! 高阶通量使用新旧时间层混合的通量与相分数。
//!
//! 半隐式（`MULESCorr`）先隐式求解迎风方程，再只限制并施加高阶修正，
//! `alphaApplyPrevCorr` 时先施加上一时间步的修正量。子循环时输出的
//! 相通量为各子步的时间平均，相分数的旧时间层在子循环结束后恢复。

use super::limiter::{self, LimiterControls, TransportTerms};
use crate::field::VolScalarField;
use crate::fvm::{explicit, implicit, TimeState};
use crate::mesh::PolyMesh;
use crate::parallel::{g_max, g_min, Parallel};
use crate::properties::PhaseMixture;
use crate::state::SolveContext;
use glam::DVec3;
use hx_config::{ConvectionScheme, LinearSolverSettings, MulesConfig, PhaseConfig, TimeScheme};
use hx_foundation::{HxError, HxResult, SMALL};
use log::{info, warn};

/// 相分数输运使用的通量
#[derive(Debug, Clone)]
struct AlphaFlux {
    /// 输运通量（Crank-Nicolson 时为新旧时间层混合）
    phiv: Vec<f64>,
    /// 逐单元 `div(φ)`，取自未混合的通量
    div_u: Vec<f64>,
    /// Crank-Nicolson 新时间层权重
    cn: Option<f64>,
}

/// 相对界面压缩
#[derive(Debug, Clone, Copy, PartialEq)]
struct CompressionPair {
    first: usize,
    second: usize,
    c_alpha: f64,
}

/// MULES 相分数求解器
#[derive(Debug)]
pub struct MulesSolver {
    config: MulesConfig,
    controls: LimiterControls,
    scheme: ConvectionScheme,
    alphas: Vec<VolScalarField>,
    passive: Option<usize>,
    pairs: Vec<CompressionPair>,
    alpha_phi: Vec<Vec<f64>>,
    prev_corr: Vec<Vec<f64>>,
    delta_n: f64,
}

impl MulesSolver {
    /// 创建并验证选项
    ///
    /// `alphas` 与 `phases` 一一对应；`mean_flux_available` 表示流动求解器
    /// 是否提供平均体积通量，界面压缩依赖它。
    pub fn new(
        mesh: &PolyMesh,
        config: &MulesConfig,
        scheme: ConvectionScheme,
        time_scheme: TimeScheme,
        phases: &[PhaseConfig],
        alphas: Vec<VolScalarField>,
        mean_flux_available: bool,
    ) -> HxResult<Self> {
        HxError::check_size("phase fractions", phases.len(), alphas.len())?;
        if phases.len() < 2 {
            return Err(HxError::invalid_config(
                "phases",
                phases.len().to_string(),
                "相分数输运至少需要两相",
            ));
        }
        config.validate()?;
        validate_time_scheme(time_scheme, config.n_alpha_sub_cycles)?;

        if config.has_compression() && !mean_flux_available {
            return Err(HxError::incompatible(
                "MULES.cAlpha",
                "phiv",
                "界面压缩需要流动求解器提供平均体积通量",
            ));
        }

        let passive = match &config.passive_phase {
            Some(name) => Some(phases.iter().position(|p| &p.name == name).ok_or_else(|| {
                HxError::invalid_config("MULES.passivePhase", name.clone(), "不是已定义的相")
            })?),
            None if phases.len() == 2 => Some(1),
            None => None,
        };

        let mut pairs = Vec::new();
        for i in 0..phases.len() {
            for j in 0..phases.len() {
                if i == j {
                    continue;
                }
                if let Some(c) = config.c_alpha_for(&phases[i].name, &phases[j].name) {
                    if c > 0.0 {
                        pairs.push(CompressionPair {
                            first: i,
                            second: j,
                            c_alpha: c,
                        });
                    }
                }
            }
        }

        let n_cells = mesh.n_cells().max(1) as f64;
        let mean_volume = mesh.total_volume() / n_cells;
        let delta_n = 1e-8 / mean_volume.cbrt();

        let mut solver = Self {
            config: config.clone(),
            controls: LimiterControls::from_config(config),
            scheme,
            alphas,
            passive,
            pairs,
            alpha_phi: Vec::new(),
            prev_corr: Vec::new(),
            delta_n,
        };
        for alpha in &mut solver.alphas {
            alpha.correct_boundary_conditions(mesh);
        }
        solver.update_passive(mesh);
        Ok(solver)
    }

    /// 相分数
    pub fn alphas(&self) -> &[VolScalarField] {
        &self.alphas
    }

    /// 相分数（可变，供拓扑重映射）
    pub fn alphas_mut(&mut self) -> &mut [VolScalarField] {
        &mut self.alphas
    }

    /// 被动相编号
    pub fn passive(&self) -> Option<usize> {
        self.passive
    }

    /// 各相面通量（子循环时为时间平均）
    pub fn alpha_phi(&self) -> &[Vec<f64>] {
        &self.alpha_phi
    }

    /// 各相内部值切片
    pub fn alpha_slices(&self) -> Vec<&[f64]> {
        self.alphas.iter().map(|a| a.internal()).collect()
    }

    /// 混合物质量通量 `Σ ρ_i φ_αi`；尚未求解时为 `None`
    pub fn mixture_mass_flux(&self, mixture: &PhaseMixture) -> Option<Vec<f64>> {
        let first = self.alpha_phi.first()?;
        let mut flux = vec![0.0; first.len()];
        for (phase, ap) in mixture.phases().iter().zip(&self.alpha_phi) {
            for (m, a) in flux.iter_mut().zip(ap) {
                *m += phase.rho * a;
            }
        }
        Some(flux)
    }

    /// 保存旧时间层
    pub fn store_old_time(&mut self) {
        for alpha in &mut self.alphas {
            alpha.store_old_time();
        }
    }

    /// 清空通量与修正历史（拓扑变化后尺寸失效）
    pub fn reset_fluxes(&mut self) {
        self.alpha_phi.clear();
        self.prev_corr.clear();
        for alpha in &mut self.alphas {
            alpha.clear_old_time();
        }
    }

    fn transported(&self) -> Vec<usize> {
        (0..self.alphas.len()).filter(|i| Some(*i) != self.passive).collect()
    }

    /// 参与修正通量计算与 `limit_sum` 的相：两相时跳过被动相，多于两相时全部参与
    fn corrected(&self) -> Vec<usize> {
        if self.alphas.len() > 2 {
            (0..self.alphas.len()).collect()
        } else {
            self.transported()
        }
    }

    fn needs_limit_sum(&self) -> bool {
        self.passive.is_none() || self.alphas.len() > 2
    }

    // ========================================================================
    // 求解
    // ========================================================================

    /// 推进一个时间步（含子循环）
    ///
    /// `phi` 为平均体积通量，`phi_old` 为其上一时间步值（Crank-Nicolson 使用）。
    /// 通量不满足无散时，`div(φ)` 作为各相的源项保证相分数之和不变。
    pub fn solve(
        &mut self,
        ctx: &SolveContext<'_>,
        phi: &[f64],
        phi_old: &[f64],
        solvers: &LinearSolverSettings,
        final_iter: bool,
    ) -> HxResult<()> {
        let mesh = ctx.mesh;
        HxError::check_size("phi", mesh.n_faces(), phi.len())?;
        validate_time_scheme(ctx.time.scheme(), self.config.n_alpha_sub_cycles)?;

        let cn = match ctx.time.scheme() {
            TimeScheme::CrankNicolson { oc_coeff } => Some(1.0 / (1.0 + oc_coeff)),
            _ => None,
        };
        let phiv: Vec<f64> = match cn {
            Some(cn) => {
                HxError::check_size("phi_0", phi.len(), phi_old.len())?;
                phi.iter()
                    .zip(phi_old)
                    .map(|(p, p0)| cn * p + (1.0 - cn) * p0)
                    .collect()
            }
            None => phi.to_vec(),
        };
        let transport = AlphaFlux {
            phiv,
            div_u: explicit::div(mesh, phi),
            cn,
        };

        let n_sub = self.config.n_alpha_sub_cycles;
        if n_sub > 1 {
            let saved: Vec<Vec<f64>> = self
                .alphas
                .iter()
                .map(|a| a.old_time_or_current().to_vec())
                .collect();
            let sub_time = sub_cycle_time(ctx.time, n_sub)?;
            let sub_ctx = SolveContext {
                mesh,
                time: &sub_time,
                comm: ctx.comm,
            };
            let mut total = vec![vec![0.0; mesh.n_faces()]; self.alphas.len()];
            for k in 0..n_sub {
                if k > 0 {
                    for alpha in &mut self.alphas {
                        let current = alpha.internal().to_vec();
                        alpha.set_old_time(&current);
                    }
                }
                self.solve_alphas(&sub_ctx, &transport, solvers, final_iter)?;
                for (t, ap) in total.iter_mut().zip(&self.alpha_phi) {
                    for (x, a) in t.iter_mut().zip(ap) {
                        *x += a / n_sub as f64;
                    }
                }
            }
            self.alpha_phi = total;
            for (alpha, old) in self.alphas.iter_mut().zip(&saved) {
                alpha.set_old_time(old);
            }
        } else {
            self.solve_alphas(ctx, &transport, solvers, final_iter)?;
        }

        self.report(mesh, ctx.comm);
        Ok(())
    }

    fn solve_alphas(
        &mut self,
        ctx: &SolveContext<'_>,
        transport: &AlphaFlux,
        solvers: &LinearSolverSettings,
        final_iter: bool,
    ) -> HxResult<()> {
        if self.config.mules_corr {
            self.solve_semi_implicit(ctx, transport, solvers, final_iter)?;
        } else {
            self.solve_explicit(ctx, transport)?;
        }
        self.clip(ctx.mesh, ctx.comm);
        self.update_passive(ctx.mesh);
        self.update_passive_flux(&transport.phiv);
        Ok(())
    }

    fn solve_explicit(&mut self, ctx: &SolveContext<'_>, transport: &AlphaFlux) -> HxResult<()> {
        let mesh = ctx.mesh;
        let n = mesh.n_cells();
        let r_delta_t = ctx.time.r_delta_t_cells(n);
        let zeros = vec![0.0; n];
        let phiv = &transport.phiv;
        let corrected = self.corrected();
        let max_phic = max_face_speed(mesh, ctx.comm, phiv);
        self.alpha_phi = vec![vec![0.0; mesh.n_faces()]; self.alphas.len()];

        for _ in 0..self.config.n_alpha_corr {
            let mut bd = Vec::with_capacity(corrected.len());
            let mut corr = Vec::with_capacity(corrected.len());
            let mut su = Vec::with_capacity(corrected.len());
            for &i in &corrected {
                let alpha = &self.alphas[i];
                let high = self.high_order_flux(mesh, phiv, i, max_phic, transport.cn);
                let upwind = upwind_flux(mesh, alpha, phiv);
                corr.push(high.iter().zip(&upwind).map(|(h, u)| h - u).collect::<Vec<f64>>());
                bd.push(upwind);
                su.push(dilatation_source(&transport.div_u, alpha.internal()));
            }
            for (k, &i) in corrected.iter().enumerate() {
                let alpha = &self.alphas[i];
                let psi0 = alpha.old_time_or_current().to_vec();
                limiter::limit(
                    mesh,
                    ctx.comm,
                    alpha,
                    &psi0,
                    phiv,
                    &bd[k],
                    &mut corr[k],
                    &bounded_terms(&r_delta_t, &zeros, &su[k]),
                    &self.controls,
                )?;
            }
            if self.needs_limit_sum() {
                limiter::limit_sum(&mut corr);
            }
            for (k, &i) in corrected.iter().enumerate() {
                if Some(i) == self.passive {
                    continue;
                }
                let flux: Vec<f64> = bd[k].iter().zip(&corr[k]).map(|(b, c)| b + c).collect();
                let alpha = &mut self.alphas[i];
                let psi0 = alpha.old_time_or_current().to_vec();
                limiter::explicit_solve(mesh, alpha, &psi0, &flux, &bounded_terms(&r_delta_t, &zeros, &su[k]))?;
                self.alpha_phi[i] = flux;
            }
            self.update_passive(mesh);
        }
        Ok(())
    }

    fn solve_semi_implicit(
        &mut self,
        ctx: &SolveContext<'_>,
        transport: &AlphaFlux,
        solvers: &LinearSolverSettings,
        final_iter: bool,
    ) -> HxResult<()> {
        let mesh = ctx.mesh;
        let n = mesh.n_cells();
        let r_delta_t = ctx.time.r_delta_t_cells(n);
        let zeros = vec![0.0; n];
        let unsourced = bounded_terms(&r_delta_t, &zeros, &zeros);
        let phiv = &transport.phiv;
        let transported = self.transported();
        let corrected = self.corrected();
        let max_phic = max_face_speed(mesh, ctx.comm, phiv);
        let config = solvers.get("alpha", final_iter)?;
        self.alpha_phi = vec![vec![0.0; mesh.n_faces()]; self.alphas.len()];

        // 隐式迎风预测：ddt(α) + div(φα) = div(φ) α
        for &i in &transported {
            let alpha = &mut self.alphas[i];
            let mut eqn = implicit::ddt(mesh, ctx.time, alpha);
            eqn += implicit::div(mesh, phiv, alpha, ConvectionScheme::Upwind);
            eqn -= implicit::sp(mesh, &transport.div_u, alpha);
            eqn.solve(mesh, alpha, config)?;
            self.alpha_phi[i] = eqn.flux(mesh, alpha);
        }

        let apply_prev = self.config.alpha_apply_prev_corr && self.prev_corr.len() == self.alphas.len();
        if apply_prev {
            for &i in &transported {
                limiter::correct(mesh, &mut self.alphas[i], &self.prev_corr[i], &unsourced)?;
                for (a, c) in self.alpha_phi[i].iter_mut().zip(&self.prev_corr[i]) {
                    *a += c;
                }
            }
        }
        self.update_passive(mesh);
        self.update_passive_flux(phiv);
        let predicted: Vec<Vec<f64>> = self.alpha_phi.clone();

        let mut last_start: Vec<Vec<f64>> = Vec::new();
        for a_corr in 0..self.config.n_alpha_corr {
            let start: Vec<Vec<f64>> = corrected
                .iter()
                .map(|&i| self.alphas[i].internal().to_vec())
                .collect();
            let mut corr = Vec::with_capacity(corrected.len());
            for &i in &corrected {
                let high = self.high_order_flux(mesh, phiv, i, max_phic, transport.cn);
                corr.push(
                    high.iter()
                        .zip(&self.alpha_phi[i])
                        .map(|(h, a)| h - a)
                        .collect::<Vec<f64>>(),
                );
            }
            for (k, &i) in corrected.iter().enumerate() {
                limiter::limit_corr(mesh, ctx.comm, &self.alphas[i], &mut corr[k], &unsourced, &self.controls)?;
            }
            if self.needs_limit_sum() {
                limiter::limit_sum(&mut corr);
            }
            for (k, &i) in corrected.iter().enumerate() {
                if Some(i) == self.passive {
                    continue;
                }
                // 第二次起补上相邻两次修正之间 α 变化对应的 div(φ) 源
                let su: Vec<f64> = match last_start.get(k) {
                    Some(prev) if a_corr > 0 => transport
                        .div_u
                        .iter()
                        .zip(&start[k])
                        .zip(prev)
                        .map(|((d, a), a0)| d * (a - a0))
                        .collect(),
                    _ => zeros.clone(),
                };
                let alpha = &mut self.alphas[i];
                limiter::correct(mesh, alpha, &corr[k], &bounded_terms(&r_delta_t, &zeros, &su))?;
                let weight = if a_corr == 0 { 1.0 } else { 0.5 };
                if a_corr > 0 {
                    for (x, x0) in alpha.internal_mut().iter_mut().zip(&start[k]) {
                        *x = 0.5 * *x + 0.5 * x0;
                    }
                    alpha.correct_boundary_conditions(mesh);
                }
                for (a, c) in self.alpha_phi[i].iter_mut().zip(&corr[k]) {
                    *a += weight * c;
                }
            }
            self.update_passive(mesh);
            last_start = start;
        }

        if self.config.alpha_apply_prev_corr {
            self.prev_corr = self
                .alpha_phi
                .iter()
                .zip(&predicted)
                .map(|(a, p)| a.iter().zip(p).map(|(x, y)| x - y).collect())
                .collect();
        }
        Ok(())
    }

    // ========================================================================
    // 通量
    // ========================================================================

    /// 第 i 相的高阶通量（含界面压缩）
    ///
    /// 给定 Crank-Nicolson 系数时，对流项使用新旧时间层混合的 α。
    fn high_order_flux(
        &self,
        mesh: &PolyMesh,
        phiv: &[f64],
        i: usize,
        max_phic: f64,
        cn: Option<f64>,
    ) -> Vec<f64> {
        let alpha = &self.alphas[i];
        let alpha_f = match cn {
            Some(cn) => {
                let mut blended = alpha.clone();
                for (x, x0) in blended.internal_mut().iter_mut().zip(alpha.old_time_or_current()) {
                    *x = cn * *x + (1.0 - cn) * x0;
                }
                blended.correct_boundary_conditions(mesh);
                explicit::interpolate_scheme(mesh, &blended, phiv, self.scheme)
            }
            None => explicit::interpolate_scheme(mesh, alpha, phiv, self.scheme),
        };
        let mut flux: Vec<f64> = phiv.iter().zip(&alpha_f).map(|(p, a)| p * a).collect();
        for pair in self.pairs.iter().filter(|p| p.first == i) {
            let comp = compression_flux(
                mesh,
                phiv,
                alpha,
                &self.alphas[pair.second],
                pair.c_alpha,
                max_phic,
                self.delta_n,
            );
            for (f, c) in flux.iter_mut().zip(comp) {
                *f += c;
            }
        }
        flux
    }

    // ========================================================================
    // 有界性与封闭
    // ========================================================================

    /// 超出 [0,1] 容差的值截断到 [0,1] 并告警
    fn clip(&mut self, mesh: &PolyMesh, comm: &dyn Parallel) {
        let tol = self.config.bound_tolerance;
        let transported = self.transported();
        let mut clipped_cells = vec![false; mesh.n_cells()];
        for &i in &transported {
            let alpha = &mut self.alphas[i];
            let mut count = 0usize;
            let mut lo = f64::MAX;
            let mut hi = f64::MIN;
            for (c, x) in alpha.internal_mut().iter_mut().enumerate() {
                if *x < -tol || *x > 1.0 + tol {
                    lo = lo.min(*x);
                    hi = hi.max(*x);
                    *x = x.clamp(0.0, 1.0);
                    clipped_cells[c] = true;
                    count += 1;
                }
            }
            let total = comm.sum_usize(count);
            if total > 0 {
                let (lo, hi) = (comm.min(lo), comm.max(hi));
                if comm.is_master() {
                    warn!(
                        "{} 超出 [0, 1] 容差 {:e}：{} 个单元已截断（min = {:e}, max = {:e}）",
                        alpha.name(),
                        tol,
                        total,
                        lo,
                        hi
                    );
                }
                alpha.correct_boundary_conditions(mesh);
            }
        }

        if self.passive.is_none() && clipped_cells.iter().any(|c| *c) {
            for c in (0..mesh.n_cells()).filter(|c| clipped_cells[*c]) {
                let sum: f64 = self.alphas.iter().map(|a| a.internal()[c]).sum();
                if sum > SMALL {
                    for alpha in &mut self.alphas {
                        alpha.internal_mut()[c] /= sum;
                    }
                }
            }
            for alpha in &mut self.alphas {
                alpha.correct_boundary_conditions(mesh);
            }
        }
    }

    fn update_passive(&mut self, mesh: &PolyMesh) {
        let Some(p) = self.passive else {
            return;
        };
        let n = mesh.n_cells();
        let mut rest = vec![1.0; n];
        for (i, alpha) in self.alphas.iter().enumerate() {
            if i == p {
                continue;
            }
            for (r, a) in rest.iter_mut().zip(alpha.internal()) {
                *r -= a;
            }
        }
        let passive = &mut self.alphas[p];
        passive.internal_mut().copy_from_slice(&rest);
        passive.correct_boundary_conditions(mesh);
    }

    fn update_passive_flux(&mut self, phiv: &[f64]) {
        let Some(p) = self.passive else {
            return;
        };
        let mut rest = phiv.to_vec();
        for (i, ap) in self.alpha_phi.iter().enumerate() {
            if i == p {
                continue;
            }
            for (r, a) in rest.iter_mut().zip(ap) {
                *r -= a;
            }
        }
        self.alpha_phi[p] = rest;
    }

    fn report(&self, mesh: &PolyMesh, comm: &dyn Parallel) {
        for alpha in &self.alphas {
            let vol = comm.sum(explicit::domain_integrate(mesh, alpha.internal()));
            let total = comm.sum(mesh.total_volume());
            let lo = g_min(comm, alpha.internal().iter().copied());
            let hi = g_max(comm, alpha.internal().iter().copied());
            if comm.is_master() {
                info!(
                    "Phase-fraction = {:e}  Min({}) = {:e}  Max({}) = {:e}",
                    vol / total.max(SMALL),
                    alpha.name(),
                    lo,
                    alpha.name(),
                    hi
                );
            }
        }
    }
}

// ============================================================================
// 辅助函数
// ============================================================================

/// 只接受 Euler、Crank-Nicolson 与 localEuler；Crank-Nicolson 不能子循环
fn validate_time_scheme(scheme: TimeScheme, n_sub_cycles: usize) -> HxResult<()> {
    match scheme {
        TimeScheme::Euler | TimeScheme::LocalEuler => Ok(()),
        TimeScheme::CrankNicolson { .. } if n_sub_cycles > 1 => Err(HxError::incompatible(
            "ddtSchemes.default CrankNicolson",
            format!("MULES.nAlphaSubCycles {n_sub_cycles}"),
            "Crank-Nicolson 时间格式不能与相分数子循环同时使用",
        )),
        TimeScheme::CrankNicolson { .. } => Ok(()),
        TimeScheme::SteadyState => Err(HxError::invalid_config(
            "ddtSchemes.default",
            scheme.name(),
            "相分数输运只支持 Euler、CrankNicolson 与 localEuler",
        )),
    }
}

/// 子循环使用的时间状态：全局与局部步长都缩小 n 倍
fn sub_cycle_time(time: &TimeState, n: usize) -> HxResult<TimeState> {
    let mut sub = time.clone();
    sub.set_delta_t(time.delta_t() / n as f64)?;
    if let Some(r) = time.r_delta_t_field() {
        sub.set_r_delta_t(r.iter().map(|x| x * n as f64).collect());
    }
    Ok(sub)
}

/// [0, 1] 有界的输运方程数据
fn bounded_terms<'a>(r_delta_t: &'a [f64], sp: &'a [f64], su: &'a [f64]) -> TransportTerms<'a> {
    TransportTerms {
        r_delta_t,
        sp,
        su,
        psi_max: 1.0,
        psi_min: 0.0,
    }
}

/// 显式 `div(φ)` 源 `div(φ) min(α, 1)`
fn dilatation_source(div_u: &[f64], alpha: &[f64]) -> Vec<f64> {
    div_u.iter().zip(alpha).map(|(d, a)| d * a.min(1.0)).collect()
}

/// 迎风通量 `φ α_U`
fn upwind_flux(mesh: &PolyMesh, alpha: &VolScalarField, phiv: &[f64]) -> Vec<f64> {
    explicit::interpolate_upwind(mesh, alpha, phiv)
        .iter()
        .zip(phiv)
        .map(|(a, p)| a * p)
        .collect()
}

/// 全局最大面法向速度 `max |φ|/|Sf|`
fn max_face_speed(mesh: &PolyMesh, comm: &dyn Parallel, phiv: &[f64]) -> f64 {
    g_max(
        comm,
        phiv.iter().zip(mesh.mag_sf()).map(|(p, a)| p.abs() / a.max(SMALL)),
    )
}

/// 界面压缩通量 `φ_r α_i α_j`，非耦合边界面为零
///
/// 界面法向取 `α_j ∇α_i - α_i ∇α_j` 的单位矢量，
/// `φ_r = min(c |φ|/|Sf|, max|φ|/|Sf|) n̂·Sf`，两次迎风插值保证有界。
fn compression_flux(
    mesh: &PolyMesh,
    phiv: &[f64],
    alpha_i: &VolScalarField,
    alpha_j: &VolScalarField,
    c_alpha: f64,
    max_phic: f64,
    delta_n: f64,
) -> Vec<f64> {
    let grad_i = explicit::interpolate_cells(mesh, &explicit::grad(mesh, alpha_i));
    let grad_j = explicit::interpolate_cells(mesh, &explicit::grad(mesh, alpha_j));
    let ai_f = explicit::interpolate(mesh, alpha_i);
    let aj_f = explicit::interpolate(mesh, alpha_j);
    let xi = alpha_i.internal();
    let xj = alpha_j.internal();

    let mut flux = vec![0.0; mesh.n_faces()];
    for f in 0..mesh.n_faces() {
        let coupled = match mesh.face_patch(f) {
            None => true,
            Some((pi, _)) => mesh.patches()[pi].kind.is_coupled(),
        };
        if !coupled {
            continue;
        }
        let g: DVec3 = grad_i[f] * aj_f[f] - grad_j[f] * ai_f[f];
        let n_hat = g / (g.length() + delta_n);
        let mag_sf = mesh.mag_sf()[f];
        let phic = (c_alpha * phiv[f].abs() / mag_sf.max(SMALL)).min(max_phic);
        let phir = phic * n_hat.dot(mesh.face_areas()[f]);

        let o = mesh.owner()[f];
        let (j_up, i_side) = match mesh.neighbour_of(f) {
            Some(n) => {
                let j_up = if -phir >= 0.0 { xj[o] } else { xj[n] };
                (j_up, Some(n))
            }
            None => (aj_f[f], None),
        };
        let g_flux = phir * j_up;
        let i_up = match i_side {
            Some(n) if g_flux < 0.0 => xi[n],
            Some(_) => xi[o],
            None => ai_f[f],
        };
        flux[f] = g_flux * i_up;
    }
    flux
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::VolField;
    use crate::mesh::BoxMeshBuilder;
    use crate::parallel::SerialCommunicator;
    use hx_foundation::Dimensions;

    fn phases(names: &[&str]) -> Vec<PhaseConfig> {
        names
            .iter()
            .map(|n| PhaseConfig {
                name: n.to_string(),
                rho: 1000.0,
                nu: 1e-6,
                thermal: Default::default(),
                phase_temperature: false,
            })
            .collect()
    }

    fn step_alphas(mesh: &PolyMesh, names: &[&str], split: usize) -> Vec<VolScalarField> {
        let mut first = VolField::new(&format!("alpha.{}", names[0]), Dimensions::DIMLESS, mesh, 0.0);
        for c in 0..split {
            first.internal_mut()[c] = 1.0;
        }
        let mut fields = vec![first];
        for n in &names[1..] {
            fields.push(VolField::new(&format!("alpha.{n}"), Dimensions::DIMLESS, mesh, 0.0));
        }
        fields
    }

    fn banded_alphas(mesh: &PolyMesh, names: &[&str], bands: &[usize]) -> Vec<VolScalarField> {
        names
            .iter()
            .enumerate()
            .map(|(k, n)| {
                let mut alpha = VolField::new(&format!("alpha.{n}"), Dimensions::DIMLESS, mesh, 0.0);
                for c in bands[k]..bands[k + 1] {
                    alpha.internal_mut()[c] = 1.0;
                }
                alpha
            })
            .collect()
    }

    /// `φ = x Sf·x̂`：单位散度的拉伸流动
    fn stretching_flux(mesh: &PolyMesh) -> Vec<f64> {
        mesh.face_areas()
            .iter()
            .zip(mesh.face_centres())
            .map(|(sf, xf)| sf.x * xf.x)
            .collect()
    }

    #[test]
    fn test_crank_nicolson_with_sub_cycles_is_fatal() {
        let mesh = BoxMeshBuilder::new([4, 1, 1], [1.0, 1.0, 1.0]).build().unwrap();
        let config = MulesConfig {
            n_alpha_sub_cycles: 2,
            ..Default::default()
        };
        let err = MulesSolver::new(
            &mesh,
            &config,
            ConvectionScheme::VanLeer,
            TimeScheme::CrankNicolson { oc_coeff: 0.9 },
            &phases(&["water", "air"]),
            step_alphas(&mesh, &["water", "air"], 2),
            true,
        )
        .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_compression_requires_mean_flux() {
        let mesh = BoxMeshBuilder::new([4, 1, 1], [1.0, 1.0, 1.0]).build().unwrap();
        let err = MulesSolver::new(
            &mesh,
            &MulesConfig::with_compression(1.0),
            ConvectionScheme::VanLeer,
            TimeScheme::Euler,
            &phases(&["water", "air"]),
            step_alphas(&mesh, &["water", "air"], 2),
            false,
        )
        .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_steady_scheme_rejected() {
        assert!(validate_time_scheme(TimeScheme::SteadyState, 1).is_err());
        assert!(validate_time_scheme(TimeScheme::LocalEuler, 3).is_ok());
    }

    #[test]
    fn test_two_phase_passive_closes_sum() {
        let mesh = BoxMeshBuilder::new([10, 1, 1], [1.0, 0.1, 0.1]).build().unwrap();
        let mut solver = MulesSolver::new(
            &mesh,
            &MulesConfig {
                n_alpha_sub_cycles: 2,
                ..MulesConfig::with_compression(1.0)
            },
            ConvectionScheme::VanLeer,
            TimeScheme::Euler,
            &phases(&["water", "air"]),
            step_alphas(&mesh, &["water", "air"], 4),
            true,
        )
        .unwrap();
        assert_eq!(solver.passive(), Some(1));
        solver.store_old_time();
        let old = solver.alphas()[0].old_time_or_current().to_vec();

        let phi: Vec<f64> = mesh.face_areas().iter().map(|sf| sf.x).collect();
        let time = TimeState::with_scheme(TimeScheme::Euler, 0.04);
        let ctx = SolveContext {
            mesh: &mesh,
            time: &time,
            comm: &SerialCommunicator,
        };
        solver
            .solve(&ctx, &phi, &phi, &LinearSolverSettings::default(), true)
            .unwrap();

        for c in 0..mesh.n_cells() {
            let s = solver.alphas()[0].internal()[c] + solver.alphas()[1].internal()[c];
            assert!((s - 1.0).abs() < 1e-12);
        }
        // 子循环后旧时间层恢复为时间步起点值
        assert_eq!(solver.alphas()[0].old_time_or_current(), old.as_slice());
        // 平均相通量之和等于平均通量
        for f in 0..mesh.n_faces() {
            let s = solver.alpha_phi()[0][f] + solver.alpha_phi()[1][f];
            assert!((s - phi[f]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_semi_implicit_stays_bounded() {
        let mesh = BoxMeshBuilder::new([20, 1, 1], [1.0, 0.05, 0.05]).build().unwrap();
        let mut solver = MulesSolver::new(
            &mesh,
            &MulesConfig {
                mules_corr: true,
                alpha_apply_prev_corr: true,
                n_alpha_corr: 2,
                ..MulesConfig::with_compression(1.0)
            },
            ConvectionScheme::VanLeer,
            TimeScheme::Euler,
            &phases(&["water", "air"]),
            step_alphas(&mesh, &["water", "air"], 8),
            true,
        )
        .unwrap();
        let phi: Vec<f64> = mesh.face_areas().iter().map(|sf| sf.x * 0.5).collect();
        let time = TimeState::with_scheme(TimeScheme::Euler, 0.02);
        let ctx = SolveContext {
            mesh: &mesh,
            time: &time,
            comm: &SerialCommunicator,
        };
        for _ in 0..5 {
            solver.store_old_time();
            solver
                .solve(&ctx, &phi, &phi, &LinearSolverSettings::default(), true)
                .unwrap();
            for a in solver.alphas()[0].internal() {
                assert!(*a >= -1e-6 && *a <= 1.0 + 1e-6, "alpha = {a}");
            }
        }
    }

    #[test]
    fn test_divergent_flux_keeps_uniform_phase() {
        let mesh = BoxMeshBuilder::new([10, 1, 1], [1.0, 0.1, 0.1]).build().unwrap();
        let phi = stretching_flux(&mesh);
        let time = TimeState::with_scheme(TimeScheme::Euler, 0.02);
        let ctx = SolveContext {
            mesh: &mesh,
            time: &time,
            comm: &SerialCommunicator,
        };
        for mules_corr in [false, true] {
            let mut solver = MulesSolver::new(
                &mesh,
                &MulesConfig {
                    mules_corr,
                    ..Default::default()
                },
                ConvectionScheme::VanLeer,
                TimeScheme::Euler,
                &phases(&["water", "air"]),
                step_alphas(&mesh, &["water", "air"], 10),
                true,
            )
            .unwrap();
            for _ in 0..3 {
                solver.store_old_time();
                solver
                    .solve(&ctx, &phi, &phi, &LinearSolverSettings::default(), true)
                    .unwrap();
            }
            for a in solver.alphas()[0].internal() {
                assert!((a - 1.0).abs() < 1e-10, "MULESCorr {mules_corr}: alpha = {a}");
            }
        }
    }

    #[test]
    fn test_three_phase_sum_preserved_in_divergent_flux() {
        let mesh = BoxMeshBuilder::new([12, 1, 1], [1.2, 0.1, 0.1]).build().unwrap();
        let names = ["water", "oil", "air"];
        let mut solver = MulesSolver::new(
            &mesh,
            &MulesConfig::default(),
            ConvectionScheme::VanLeer,
            TimeScheme::Euler,
            &phases(&names),
            banded_alphas(&mesh, &names, &[0, 4, 8, 12]),
            true,
        )
        .unwrap();
        assert_eq!(solver.passive(), None);
        let phi = stretching_flux(&mesh);
        let time = TimeState::with_scheme(TimeScheme::Euler, 0.01);
        let ctx = SolveContext {
            mesh: &mesh,
            time: &time,
            comm: &SerialCommunicator,
        };
        for _ in 0..5 {
            solver.store_old_time();
            solver
                .solve(&ctx, &phi, &phi, &LinearSolverSettings::default(), true)
                .unwrap();
        }
        for c in 0..mesh.n_cells() {
            let s: f64 = solver.alphas().iter().map(|a| a.internal()[c]).sum();
            assert!((s - 1.0).abs() < 1e-12, "cell {c}: sum = {s}");
        }
    }

    #[test]
    fn test_passive_phase_joins_multiphase_corrections() {
        let mesh = BoxMeshBuilder::new([12, 1, 1], [1.2, 0.1, 0.1]).build().unwrap();
        let names = ["water", "oil", "air"];
        let phi: Vec<f64> = mesh.face_areas().iter().map(|sf| sf.x).collect();
        let time = TimeState::with_scheme(TimeScheme::Euler, 0.02);
        let ctx = SolveContext {
            mesh: &mesh,
            time: &time,
            comm: &SerialCommunicator,
        };
        for mules_corr in [false, true] {
            let mut solver = MulesSolver::new(
                &mesh,
                &MulesConfig {
                    mules_corr,
                    passive_phase: Some("air".to_string()),
                    ..MulesConfig::with_compression(1.0)
                },
                ConvectionScheme::VanLeer,
                TimeScheme::Euler,
                &phases(&names),
                banded_alphas(&mesh, &names, &[0, 4, 8, 12]),
                true,
            )
            .unwrap();
            assert_eq!(solver.passive(), Some(2));
            assert_eq!(solver.corrected(), vec![0, 1, 2]);
            assert!(solver.needs_limit_sum());

            for _ in 0..5 {
                solver.store_old_time();
                solver
                    .solve(&ctx, &phi, &phi, &LinearSolverSettings::default(), true)
                    .unwrap();
                for alpha in solver.alphas() {
                    for a in alpha.internal() {
                        assert!(*a >= -1e-8 && *a <= 1.0 + 1e-8, "{}: {a}", alpha.name());
                    }
                }
            }
            for f in 0..mesh.n_faces() {
                let s: f64 = solver.alpha_phi().iter().map(|ap| ap[f]).sum();
                assert!((s - phi[f]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_two_phase_passive_skips_corrections() {
        let mesh = BoxMeshBuilder::new([4, 1, 1], [1.0, 1.0, 1.0]).build().unwrap();
        let solver = MulesSolver::new(
            &mesh,
            &MulesConfig::default(),
            ConvectionScheme::VanLeer,
            TimeScheme::Euler,
            &phases(&["water", "air"]),
            step_alphas(&mesh, &["water", "air"], 2),
            true,
        )
        .unwrap();
        assert_eq!(solver.corrected(), vec![0]);
        assert!(!solver.needs_limit_sum());
    }

    #[test]
    fn test_crank_nicolson_blends_old_phase_fraction() {
        let mesh = BoxMeshBuilder::new([6, 1, 1], [0.6, 0.1, 0.1]).build().unwrap();
        let mut alphas = step_alphas(&mesh, &["water", "air"], 0);
        alphas[0].internal_mut().fill(0.4);
        let mut solver = MulesSolver::new(
            &mesh,
            &MulesConfig::default(),
            ConvectionScheme::Upwind,
            TimeScheme::CrankNicolson { oc_coeff: 1.0 },
            &phases(&["water", "air"]),
            alphas,
            true,
        )
        .unwrap();
        solver.store_old_time();
        let water = &mut solver.alphas_mut()[0];
        water.internal_mut().fill(0.8);
        water.correct_boundary_conditions(&mesh);

        let phi: Vec<f64> = mesh.face_areas().iter().map(|sf| sf.x).collect();
        let flux = solver.high_order_flux(&mesh, &phi, 0, 1.0, Some(0.5));
        for f in 0..mesh.n_internal_faces() {
            assert!((flux[f] - 0.6 * phi[f]).abs() < 1e-14, "face {f}: {}", flux[f]);
        }
        let current = solver.high_order_flux(&mesh, &phi, 0, 1.0, None);
        for f in 0..mesh.n_internal_faces() {
            assert!((current[f] - 0.8 * phi[f]).abs() < 1e-14);
        }
    }
}
