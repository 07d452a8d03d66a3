// crates/hx_core/src/fvm/matrix.rs

//! 有限体积矩阵（LDU 存储）
//!
//! 矩阵表示算子 `R(x) = A x - b`，求解 `A x = b`：
//!
//! - `diag`: 对角元（每单元）
//! - `upper[f]`: owner 行中 neighbour 列的系数
//! - `lower[f]`: neighbour 行中 owner 列的系数
//! - `source`: 右端项 b（已按体积积分）
//! - 边界：每个边界面的 `internal_coeffs` 在求解时加到对角，
//!   `boundary_coeffs` 加到右端项
//! - `face_flux_correction`: 显式非正交修正对应的面通量
//!
//! 除求解外还提供 A/H/H1 算子、面通量重构、矩阵松弛与参考值设置，
//! 供动量-压力耦合使用。

use crate::field::{FieldValue, VolField};
use crate::linear_algebra::{residual_norm_factor, solve_with_config, CsrBuilder, CsrMatrix, SolverStatus};
use crate::mesh::PolyMesh;
use hx_config::{LinearSolverConfig, LinearSolverKind};
use hx_foundation::{HxError, HxResult, SMALL};
use std::ops::{AddAssign, Neg, SubAssign};

// ============================================================================
// 求解性能
// ============================================================================

/// 单次线性求解的性能记录
#[derive(Debug, Clone, PartialEq)]
pub struct SolverPerformance {
    /// 求解器名称
    pub solver: String,
    /// 场名（矢量为分量名）
    pub field: String,
    /// 归一化初始残差
    pub initial_residual: f64,
    /// 归一化最终残差
    pub final_residual: f64,
    /// 迭代次数
    pub iterations: usize,
    /// 是否收敛
    pub converged: bool,
}

impl SolverPerformance {
    fn log(&self) {
        log::info!(
            "{}: Solving for {}, Initial residual = {:.6e}, Final residual = {:.6e}, No Iterations {}",
            self.solver,
            self.field,
            self.initial_residual,
            self.final_residual,
            self.iterations
        );
    }

    /// 合并多个分量：残差取最大，迭代次数取最大
    pub fn merge(field: &str, parts: &[SolverPerformance]) -> Self {
        let mut merged = SolverPerformance {
            solver: parts.first().map(|p| p.solver.clone()).unwrap_or_default(),
            field: field.to_string(),
            initial_residual: 0.0,
            final_residual: 0.0,
            iterations: 0,
            converged: true,
        };
        for p in parts {
            merged.initial_residual = merged.initial_residual.max(p.initial_residual);
            merged.final_residual = merged.final_residual.max(p.final_residual);
            merged.iterations = merged.iterations.max(p.iterations);
            merged.converged &= p.converged;
        }
        merged
    }
}

fn solver_label(kind: LinearSolverKind) -> &'static str {
    match kind {
        LinearSolverKind::Pcg => "PCG",
        LinearSolverKind::BiCgStab => "PBiCGStab",
    }
}

const COMPONENT_SUFFIX: [&str; 3] = ["x", "y", "z"];

// ============================================================================
// 矩阵
// ============================================================================

/// 有限体积矩阵
#[derive(Debug, Clone)]
pub struct FvMatrix<T: FieldValue> {
    field_name: String,
    diag: Vec<f64>,
    upper: Vec<f64>,
    lower: Vec<f64>,
    source: Vec<T>,
    internal_coeffs: Vec<Vec<f64>>,
    boundary_coeffs: Vec<Vec<T>>,
    face_flux_correction: Option<Vec<T>>,
}

impl<T: FieldValue> FvMatrix<T> {
    /// 创建零矩阵
    pub fn new(field_name: &str, mesh: &PolyMesh) -> Self {
        Self {
            field_name: field_name.to_string(),
            diag: vec![0.0; mesh.n_cells()],
            upper: vec![0.0; mesh.n_internal_faces()],
            lower: vec![0.0; mesh.n_internal_faces()],
            source: vec![T::ZERO; mesh.n_cells()],
            internal_coeffs: mesh.patches().iter().map(|p| vec![0.0; p.size]).collect(),
            boundary_coeffs: mesh.patches().iter().map(|p| vec![T::ZERO; p.size]).collect(),
            face_flux_correction: None,
        }
    }

    /// 场名
    #[inline]
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// 对角元
    #[inline]
    pub fn diag(&self) -> &[f64] {
        &self.diag
    }

    /// 可变对角元
    #[inline]
    pub fn diag_mut(&mut self) -> &mut [f64] {
        &mut self.diag
    }

    /// 上三角系数
    #[inline]
    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// 可变上三角系数
    #[inline]
    pub fn upper_mut(&mut self) -> &mut [f64] {
        &mut self.upper
    }

    /// 下三角系数
    #[inline]
    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    /// 可变下三角系数
    #[inline]
    pub fn lower_mut(&mut self) -> &mut [f64] {
        &mut self.lower
    }

    /// 右端项
    #[inline]
    pub fn source(&self) -> &[T] {
        &self.source
    }

    /// 可变右端项
    #[inline]
    pub fn source_mut(&mut self) -> &mut [T] {
        &mut self.source
    }

    /// 边界对角贡献
    #[inline]
    pub fn internal_coeffs_mut(&mut self, patch: usize) -> &mut [f64] {
        &mut self.internal_coeffs[patch]
    }

    /// 边界右端项贡献
    #[inline]
    pub fn boundary_coeffs_mut(&mut self, patch: usize) -> &mut [T] {
        &mut self.boundary_coeffs[patch]
    }

    /// 累加显式面通量修正
    pub fn add_face_flux_correction(&mut self, correction: Vec<T>) {
        match &mut self.face_flux_correction {
            Some(existing) => {
                for (e, c) in existing.iter_mut().zip(correction) {
                    *e += c;
                }
            }
            None => self.face_flux_correction = Some(correction),
        }
    }

    /// 是否含有非对称系数
    pub fn is_asymmetric(&self) -> bool {
        self.upper
            .iter()
            .zip(&self.lower)
            .any(|(u, l)| (u - l).abs() > 1e-12 * (u.abs() + l.abs() + SMALL))
    }

    // ========================================================================
    // 源项
    // ========================================================================

    /// 隐式源项 `+ sp·x`（sp 为单位体积系数）
    pub fn add_sp(&mut self, mesh: &PolyMesh, sp: &[f64]) {
        for ((d, s), v) in self.diag.iter_mut().zip(sp).zip(mesh.cell_volumes()) {
            *d += s * v;
        }
    }

    /// 方程右端源项 `== su`（su 为单位体积源）
    pub fn add_su(&mut self, mesh: &PolyMesh, su: &[T]) {
        for ((b, s), v) in self.source.iter_mut().zip(su).zip(mesh.cell_volumes()) {
            *b += *s * *v;
        }
    }

    /// 显式项 `+ term`（已按体积积分），即 `R(x) += term`
    pub fn add_explicit(&mut self, integrated: &[T]) {
        for (b, t) in self.source.iter_mut().zip(integrated) {
            *b -= *t;
        }
    }

    /// 按行缩放（行系数乘以 `scale[cell]`）
    pub fn scale_rows(&mut self, mesh: &PolyMesh, scale: &[f64]) {
        for (c, s) in scale.iter().enumerate() {
            self.diag[c] *= s;
            self.source[c] *= *s;
        }
        let owner = mesh.owner();
        let neighbour = mesh.neighbour();
        for f in 0..self.upper.len() {
            self.upper[f] *= scale[owner[f]];
            self.lower[f] *= scale[neighbour[f]];
        }
        for (pi, _) in mesh.patches().iter().enumerate() {
            let cells = mesh.patch_face_cells(pi);
            for (i, &c) in cells.iter().enumerate() {
                self.internal_coeffs[pi][i] *= scale[c];
                self.boundary_coeffs[pi][i] *= scale[c];
            }
        }
        self.face_flux_correction = None;
    }

    // ========================================================================
    // 边界贡献
    // ========================================================================

    /// 单元上的边界对角贡献之和
    fn boundary_diag(&self, mesh: &PolyMesh) -> Vec<f64> {
        let mut bd = vec![0.0; self.diag.len()];
        for (pi, coeffs) in self.internal_coeffs.iter().enumerate() {
            for (&c, ic) in mesh.patch_face_cells(pi).iter().zip(coeffs) {
                bd[c] += ic;
            }
        }
        bd
    }

    /// 单元上的边界右端项贡献之和
    fn boundary_source(&self, mesh: &PolyMesh) -> Vec<T> {
        let mut bs = vec![T::ZERO; self.diag.len()];
        for (pi, coeffs) in self.boundary_coeffs.iter().enumerate() {
            for (&c, bc) in mesh.patch_face_cells(pi).iter().zip(coeffs) {
                bs[c] += *bc;
            }
        }
        bs
    }

    /// 每行非对角元绝对值之和
    fn sum_mag_off_diag(&self, mesh: &PolyMesh) -> Vec<f64> {
        let mut s = vec![0.0; self.diag.len()];
        for (f, (u, l)) in self.upper.iter().zip(&self.lower).enumerate() {
            s[mesh.owner()[f]] += u.abs();
            s[mesh.neighbour()[f]] += l.abs();
        }
        s
    }

    // ========================================================================
    // 松弛与参考值
    // ========================================================================

    /// 方程松弛：保证对角占优后除以 α，并把差值乘当前解移到右端
    ///
    /// 收敛时（x 不再变化）松弛项相互抵消，不改变解。
    pub fn relax(&mut self, mesh: &PolyMesh, field: &VolField<T>, alpha: f64) {
        if alpha <= 0.0 || alpha >= 1.0 {
            return;
        }
        let bd = self.boundary_diag(mesh);
        let sum_off = self.sum_mag_off_diag(mesh);
        let x = field.internal();
        for c in 0..self.diag.len() {
            let d0 = self.diag[c];
            let d = (d0 + bd[c]).abs().max(sum_off[c]) / alpha - bd[c];
            self.source[c] += x[c] * (d - d0);
            self.diag[c] = d;
        }
        log::trace!("{} 方程松弛 α = {}", self.field_name, alpha);
    }

    /// 固定参考单元的值（压力水平不定时）
    pub fn set_reference(&mut self, cell: usize, value: T) -> HxResult<()> {
        HxError::check_index("reference cell", cell, self.diag.len())?;
        let d = self.diag[cell];
        self.source[cell] += value * d;
        self.diag[cell] += d;
        Ok(())
    }

    // ========================================================================
    // A / H / H1
    // ========================================================================

    /// `A = (diag + 边界对角)/V`
    pub fn a(&self, mesh: &PolyMesh) -> Vec<f64> {
        let bd = self.boundary_diag(mesh);
        self.diag
            .iter()
            .zip(&bd)
            .zip(mesh.cell_volumes())
            .map(|((d, b), v)| (d + b) / v)
            .collect()
    }

    /// `H(x) = (b + 边界右端项 - Σ offdiag·x_N)/V`
    pub fn h(&self, mesh: &PolyMesh, field: &VolField<T>) -> Vec<T> {
        let x = field.internal();
        let mut h = self.source.clone();
        for (hc, bs) in h.iter_mut().zip(self.boundary_source(mesh)) {
            *hc += bs;
        }
        for f in 0..self.upper.len() {
            let o = mesh.owner()[f];
            let n = mesh.neighbour()[f];
            h[o] -= x[n] * self.upper[f];
            h[n] -= x[o] * self.lower[f];
        }
        for (hc, v) in h.iter_mut().zip(mesh.cell_volumes()) {
            *hc = *hc / *v;
        }
        h
    }

    /// `H1 = -Σ offdiag / V`
    pub fn h1(&self, mesh: &PolyMesh) -> Vec<f64> {
        let mut h1 = vec![0.0; self.diag.len()];
        for f in 0..self.upper.len() {
            h1[mesh.owner()[f]] -= self.upper[f];
            h1[mesh.neighbour()[f]] -= self.lower[f];
        }
        for (h, v) in h1.iter_mut().zip(mesh.cell_volumes()) {
            *h /= v;
        }
        h1
    }

    /// 残差 `R(x) = A x - b`（含边界贡献，已积分）
    pub fn residual(&self, mesh: &PolyMesh, field: &VolField<T>) -> Vec<T> {
        let x = field.internal();
        let bd = self.boundary_diag(mesh);
        let bs = self.boundary_source(mesh);
        let mut r: Vec<T> = (0..self.diag.len())
            .map(|c| x[c] * (self.diag[c] + bd[c]) - self.source[c] - bs[c])
            .collect();
        for f in 0..self.upper.len() {
            let o = mesh.owner()[f];
            let n = mesh.neighbour()[f];
            r[o] += x[n] * self.upper[f];
            r[n] += x[o] * self.lower[f];
        }
        r
    }

    // ========================================================================
    // 求解
    // ========================================================================

    fn csr(&self, mesh: &PolyMesh, bd: &[f64]) -> CsrMatrix {
        let n = self.diag.len();
        let mut builder = CsrBuilder::new_square(n);
        for c in 0..n {
            builder.add(c, c, self.diag[c] + bd[c]);
        }
        for f in 0..self.upper.len() {
            let o = mesh.owner()[f];
            let nb = mesh.neighbour()[f];
            builder.add(o, nb, self.upper[f]);
            builder.add(nb, o, self.lower[f]);
        }
        builder.build()
    }

    /// 分量分离求解，解写回场并更新边界
    pub fn solve(
        &self,
        mesh: &PolyMesh,
        field: &mut VolField<T>,
        config: &LinearSolverConfig,
    ) -> HxResult<SolverPerformance> {
        HxError::check_size("matrix rows", mesh.n_cells(), self.diag.len())?;
        let bd = self.boundary_diag(mesh);
        let bs = self.boundary_source(mesh);
        let matrix = self.csr(mesh, &bd);
        let n = self.diag.len();

        let mut parts = Vec::with_capacity(T::N_COMPONENTS);
        for d in 0..T::N_COMPONENTS {
            let b: Vec<f64> = (0..n)
                .map(|c| self.source[c].component(d) + bs[c].component(d))
                .collect();
            let mut x: Vec<f64> = field.internal().iter().map(|v| v.component(d)).collect();

            let initial = normalised_residual(&matrix, &b, &x);
            let result = solve_with_config(config, &matrix, &b, &mut x);
            let final_residual = normalised_residual(&matrix, &b, &x);
            match result.status {
                SolverStatus::Converged => {}
                SolverStatus::MaxIterationsReached => log::warn!(
                    "{} 达到最大迭代次数 {}，归一化残差 {:.3e} 未达到容差 {:.3e}",
                    self.field_name,
                    result.iterations,
                    final_residual,
                    config.tolerance
                ),
                SolverStatus::Stagnated | SolverStatus::Diverged => {
                    return Err(HxError::not_converged(
                        format!("{} 线性求解（{:?}）", self.field_name, result.status),
                        result.iterations,
                        final_residual,
                    ));
                }
            }

            for (c, xv) in x.iter().enumerate() {
                HxError::check_finite(field.name(), c, *xv)?;
                field.internal_mut()[c].set_component(d, *xv);
            }

            let name = if T::N_COMPONENTS == 1 {
                self.field_name.clone()
            } else {
                format!("{}{}", self.field_name, COMPONENT_SUFFIX[d])
            };
            let perf = SolverPerformance {
                solver: solver_label(config.solver).to_string(),
                field: name,
                initial_residual: initial,
                final_residual,
                iterations: result.iterations,
                converged: result.is_converged(),
            };
            perf.log();
            parts.push(perf);
        }
        field.correct_boundary_conditions(mesh);
        Ok(SolverPerformance::merge(&self.field_name, &parts))
    }
}

impl FvMatrix<f64> {
    /// 矩阵对应的面通量
    ///
    /// 内部面 `upper·x_N - lower·x_O`，边界面 `ic·x_P - bc`，再加显式修正通量。
    pub fn flux(&self, mesh: &PolyMesh, field: &VolField<f64>) -> Vec<f64> {
        let x = field.internal();
        let mut flux = vec![0.0; mesh.n_faces()];
        for f in 0..self.upper.len() {
            flux[f] = self.upper[f] * x[mesh.neighbour()[f]] - self.lower[f] * x[mesh.owner()[f]];
        }
        for (pi, patch) in mesh.patches().iter().enumerate() {
            let cells = mesh.patch_face_cells(pi);
            for (i, &c) in cells.iter().enumerate() {
                flux[patch.start + i] =
                    self.internal_coeffs[pi][i] * x[c] - self.boundary_coeffs[pi][i];
            }
        }
        if let Some(corr) = &self.face_flux_correction {
            for (f, c) in flux.iter_mut().zip(corr) {
                *f += c;
            }
        }
        flux
    }
}

/// 归一化残差 `Σ|b - Ax| / (Σ(|Ax - A x̄| + |b - A x̄|) + small)`
///
/// 分母消除了解的整体水平，使不同场的残差可以直接比较。
pub fn normalised_residual(matrix: &CsrMatrix, b: &[f64], x: &[f64]) -> f64 {
    let n = b.len();
    if n == 0 {
        return 0.0;
    }
    let mut ax = vec![0.0; n];
    matrix.mul_vec(x, &mut ax);
    let res: f64 = b.iter().zip(&ax).map(|(bi, ai)| (bi - ai).abs()).sum();
    res / residual_norm_factor(matrix, b, x)
}

// ============================================================================
// 矩阵代数
// ============================================================================

impl<T: FieldValue> Neg for FvMatrix<T> {
    type Output = Self;

    fn neg(mut self) -> Self {
        self.diag.iter_mut().for_each(|d| *d = -*d);
        self.upper.iter_mut().for_each(|u| *u = -*u);
        self.lower.iter_mut().for_each(|l| *l = -*l);
        self.source.iter_mut().for_each(|s| *s = -*s);
        for ic in &mut self.internal_coeffs {
            ic.iter_mut().for_each(|c| *c = -*c);
        }
        for bc in &mut self.boundary_coeffs {
            bc.iter_mut().for_each(|c| *c = -*c);
        }
        if let Some(corr) = &mut self.face_flux_correction {
            corr.iter_mut().for_each(|c| *c = -*c);
        }
        self
    }
}

impl<T: FieldValue> AddAssign<FvMatrix<T>> for FvMatrix<T> {
    fn add_assign(&mut self, rhs: FvMatrix<T>) {
        debug_assert_eq!(self.diag.len(), rhs.diag.len());
        for (a, b) in self.diag.iter_mut().zip(&rhs.diag) {
            *a += b;
        }
        for (a, b) in self.upper.iter_mut().zip(&rhs.upper) {
            *a += b;
        }
        for (a, b) in self.lower.iter_mut().zip(&rhs.lower) {
            *a += b;
        }
        for (a, b) in self.source.iter_mut().zip(&rhs.source) {
            *a += *b;
        }
        for (pa, pb) in self.internal_coeffs.iter_mut().zip(&rhs.internal_coeffs) {
            for (a, b) in pa.iter_mut().zip(pb) {
                *a += b;
            }
        }
        for (pa, pb) in self.boundary_coeffs.iter_mut().zip(&rhs.boundary_coeffs) {
            for (a, b) in pa.iter_mut().zip(pb) {
                *a += *b;
            }
        }
        if let Some(corr) = rhs.face_flux_correction {
            self.add_face_flux_correction(corr);
        }
    }
}

impl<T: FieldValue> SubAssign<FvMatrix<T>> for FvMatrix<T> {
    fn sub_assign(&mut self, rhs: FvMatrix<T>) {
        *self += -rhs;
    }
}
