// crates/hx_core/src/linear_algebra/solver.rs

//! 迭代线性求解器
//!
//! - [`PcgSolver`]: 预条件共轭梯度法，用于对称正定的压力方程
//! - [`BiCgStabSolver`]: 双共轭梯度稳定法，用于含对流项的非对称方程
//! - [`GaussSeidelSolver`]: 对称 Gauss-Seidel，Krylov 求解器崩溃时的兜底
//!
//! 收敛判据：`‖r‖ < atol` 或 `‖r‖/‖r₀‖ < rtol`。
//!
//! # 使用示例
//!
//! ```
//! use hx_core::linear_algebra::{
//!     CsrBuilder, IterativeSolver, JacobiPreconditioner, PcgSolver, SolverConfig,
//! };
//!
//! let mut builder = CsrBuilder::new_square(2);
//! builder.set(0, 0, 2.0);
//! builder.set(1, 1, 2.0);
//! let matrix = builder.build();
//!
//! let precond = JacobiPreconditioner::from_matrix(&matrix);
//! let mut solver = PcgSolver::new(SolverConfig::new(1e-10, 100));
//! let mut x = vec![0.0; 2];
//! let result = solver.solve(&matrix, &[2.0, 4.0], &mut x, &precond);
//! assert!(result.is_converged());
//! ```

use super::csr::CsrMatrix;
use super::preconditioner::Preconditioner;
use super::vector_ops::{axpy, copy, dot, norm2};
use serde::{Deserialize, Serialize};

/// 停滞判定阈值
const STAGNATION_TOL: f64 = 1e-30;

/// 发散判定倍数
const DIVERGENCE_FACTOR: f64 = 1e6;

/// 求解器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// 相对收敛容差
    pub rtol: f64,
    /// 绝对收敛容差
    pub atol: f64,
    /// 最大迭代次数
    pub max_iter: usize,
    /// 是否输出每次迭代的残差
    pub verbose: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            rtol: 1e-8,
            atol: 1e-14,
            max_iter: 1000,
            verbose: false,
        }
    }
}

impl SolverConfig {
    /// 创建求解器配置
    pub fn new(rtol: f64, max_iter: usize) -> Self {
        Self {
            rtol,
            max_iter,
            ..Default::default()
        }
    }

    /// 设置绝对容差
    pub fn with_atol(mut self, atol: f64) -> Self {
        self.atol = atol;
        self
    }

    /// 启用逐次迭代输出
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }
}

/// 求解器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    /// 收敛
    Converged,
    /// 达到最大迭代次数
    MaxIterationsReached,
    /// 发散
    Diverged,
    /// 停滞
    Stagnated,
}

/// 求解器结果
#[derive(Debug, Clone)]
pub struct SolverResult {
    /// 求解状态
    pub status: SolverStatus,
    /// 迭代次数
    pub iterations: usize,
    /// 最终残差范数
    pub residual_norm: f64,
    /// 初始残差范数
    pub initial_residual_norm: f64,
    /// 相对残差
    pub relative_residual: f64,
}

impl SolverResult {
    /// 是否收敛
    pub fn is_converged(&self) -> bool {
        self.status == SolverStatus::Converged
    }

    fn new(status: SolverStatus, iterations: usize, residual: f64, initial: f64) -> Self {
        Self {
            status,
            iterations,
            residual_norm: residual,
            initial_residual_norm: initial,
            relative_residual: if initial > 0.0 { residual / initial } else { 0.0 },
        }
    }
}

/// 迭代求解器 trait
pub trait IterativeSolver {
    /// 求解 `A x = b`，`x` 输入初值、输出解
    fn solve(
        &mut self,
        matrix: &CsrMatrix,
        b: &[f64],
        x: &mut [f64],
        precond: &dyn Preconditioner,
    ) -> SolverResult;

    /// 名称
    fn name(&self) -> &'static str;
}

// =============================================================================
// PCG
// =============================================================================

/// 预条件共轭梯度法求解器
pub struct PcgSolver {
    config: SolverConfig,
    r: Vec<f64>,
    z: Vec<f64>,
    p: Vec<f64>,
    ap: Vec<f64>,
}

impl PcgSolver {
    /// 创建 PCG 求解器
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            r: Vec::new(),
            z: Vec::new(),
            p: Vec::new(),
            ap: Vec::new(),
        }
    }

    fn ensure_workspace(&mut self, n: usize) {
        if self.r.len() != n {
            self.r = vec![0.0; n];
            self.z = vec![0.0; n];
            self.p = vec![0.0; n];
            self.ap = vec![0.0; n];
        }
    }
}

impl IterativeSolver for PcgSolver {
    fn solve(
        &mut self,
        matrix: &CsrMatrix,
        b: &[f64],
        x: &mut [f64],
        precond: &dyn Preconditioner,
    ) -> SolverResult {
        let n = b.len();
        self.ensure_workspace(n);
        let rtol = self.config.rtol;
        let atol = self.config.atol;

        // r = b - A*x
        matrix.mul_vec(x, &mut self.r);
        for i in 0..n {
            self.r[i] = b[i] - self.r[i];
        }

        let initial_norm = norm2(&self.r);
        if initial_norm < atol {
            return SolverResult::new(SolverStatus::Converged, 0, initial_norm, initial_norm);
        }

        precond.apply(&self.r, &mut self.z);
        copy(&self.z, &mut self.p);
        let mut rz = dot(&self.r, &self.z);

        for iter in 0..self.config.max_iter {
            matrix.mul_vec(&self.p, &mut self.ap);

            let pap = dot(&self.p, &self.ap);
            if pap.abs() < STAGNATION_TOL {
                return SolverResult::new(
                    SolverStatus::Stagnated,
                    iter,
                    norm2(&self.r),
                    initial_norm,
                );
            }

            let alpha = rz / pap;
            axpy(alpha, &self.p, x);
            axpy(-alpha, &self.ap, &mut self.r);

            let res_norm = norm2(&self.r);
            if self.config.verbose {
                log::trace!("PCG iter {}: residual = {:.6e}", iter + 1, res_norm);
            }

            if res_norm < atol || res_norm / initial_norm < rtol {
                return SolverResult::new(
                    SolverStatus::Converged,
                    iter + 1,
                    res_norm,
                    initial_norm,
                );
            }

            precond.apply(&self.r, &mut self.z);
            let rz_new = dot(&self.r, &self.z);
            let beta = rz_new / rz;
            rz = rz_new;

            for i in 0..n {
                self.p[i] = self.z[i] + beta * self.p[i];
            }
        }

        SolverResult::new(
            SolverStatus::MaxIterationsReached,
            self.config.max_iter,
            norm2(&self.r),
            initial_norm,
        )
    }

    fn name(&self) -> &'static str {
        "PCG"
    }
}

// =============================================================================
// BiCGStab
// =============================================================================

/// 双共轭梯度稳定法求解器（右预条件）
pub struct BiCgStabSolver {
    config: SolverConfig,
    r: Vec<f64>,
    r0: Vec<f64>,
    p: Vec<f64>,
    v: Vec<f64>,
    s: Vec<f64>,
    t: Vec<f64>,
    p_hat: Vec<f64>,
    s_hat: Vec<f64>,
}

impl BiCgStabSolver {
    /// 创建 BiCGStab 求解器
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            r: Vec::new(),
            r0: Vec::new(),
            p: Vec::new(),
            v: Vec::new(),
            s: Vec::new(),
            t: Vec::new(),
            p_hat: Vec::new(),
            s_hat: Vec::new(),
        }
    }

    fn ensure_workspace(&mut self, n: usize) {
        if self.r.len() != n {
            self.r = vec![0.0; n];
            self.r0 = vec![0.0; n];
            self.p = vec![0.0; n];
            self.v = vec![0.0; n];
            self.s = vec![0.0; n];
            self.t = vec![0.0; n];
            self.p_hat = vec![0.0; n];
            self.s_hat = vec![0.0; n];
        }
    }

    /// 以当前残差作为新的影子残差重新开始
    fn restart(&mut self, rho_old: &mut f64, alpha: &mut f64, omega: &mut f64) {
        copy(&self.r, &mut self.r0);
        self.p.fill(0.0);
        self.v.fill(0.0);
        *rho_old = 1.0;
        *alpha = 1.0;
        *omega = 1.0;
    }
}

impl IterativeSolver for BiCgStabSolver {
    fn solve(
        &mut self,
        matrix: &CsrMatrix,
        b: &[f64],
        x: &mut [f64],
        precond: &dyn Preconditioner,
    ) -> SolverResult {
        let n = b.len();
        self.ensure_workspace(n);
        let rtol = self.config.rtol;
        let atol = self.config.atol;

        matrix.mul_vec(x, &mut self.r);
        for i in 0..n {
            self.r[i] = b[i] - self.r[i];
        }

        let initial_norm = norm2(&self.r);
        if initial_norm < atol {
            return SolverResult::new(SolverStatus::Converged, 0, initial_norm, initial_norm);
        }

        // 影子残差取初始残差；发生崩溃时以当前残差重启
        copy(&self.r, &mut self.r0);

        let mut rho_old = 1.0;
        let mut alpha = 1.0;
        let mut omega = 1.0;
        let mut since_restart = 0usize;
        self.v.fill(0.0);
        self.p.fill(0.0);

        for iter in 0..self.config.max_iter {
            let rho = dot(&self.r0, &self.r);
            if rho.abs() < STAGNATION_TOL {
                if since_restart == 0 {
                    return SolverResult::new(SolverStatus::Stagnated, iter, norm2(&self.r), initial_norm);
                }
                self.restart(&mut rho_old, &mut alpha, &mut omega);
                since_restart = 0;
                continue;
            }

            let beta = if since_restart == 0 {
                0.0
            } else {
                (rho / rho_old) * (alpha / omega)
            };
            rho_old = rho;

            for i in 0..n {
                self.p[i] = self.r[i] + beta * (self.p[i] - omega * self.v[i]);
            }

            precond.apply(&self.p, &mut self.p_hat);
            matrix.mul_vec(&self.p_hat, &mut self.v);

            let r0v = dot(&self.r0, &self.v);
            if r0v.abs() < STAGNATION_TOL {
                if since_restart == 0 {
                    return SolverResult::new(SolverStatus::Stagnated, iter, norm2(&self.r), initial_norm);
                }
                self.restart(&mut rho_old, &mut alpha, &mut omega);
                since_restart = 0;
                continue;
            }
            alpha = rho / r0v;

            for i in 0..n {
                self.s[i] = self.r[i] - alpha * self.v[i];
            }

            let s_norm = norm2(&self.s);
            if s_norm < atol || s_norm / initial_norm < rtol {
                axpy(alpha, &self.p_hat, x);
                return SolverResult::new(SolverStatus::Converged, iter + 1, s_norm, initial_norm);
            }

            precond.apply(&self.s, &mut self.s_hat);
            matrix.mul_vec(&self.s_hat, &mut self.t);

            let tt = dot(&self.t, &self.t);
            omega = if tt.abs() < STAGNATION_TOL {
                0.0
            } else {
                dot(&self.t, &self.s) / tt
            };

            axpy(alpha, &self.p_hat, x);
            if omega.abs() < STAGNATION_TOL {
                // ω 崩溃：保留半步更新，以 s 为新残差重启
                copy(&self.s, &mut self.r);
                self.restart(&mut rho_old, &mut alpha, &mut omega);
                since_restart = 0;
                continue;
            }
            axpy(omega, &self.s_hat, x);

            for i in 0..n {
                self.r[i] = self.s[i] - omega * self.t[i];
            }
            since_restart += 1;

            let res_norm = norm2(&self.r);
            if self.config.verbose {
                log::trace!("BiCGStab iter {}: residual = {:.6e}", iter + 1, res_norm);
            }

            if res_norm < atol || res_norm / initial_norm < rtol {
                return SolverResult::new(
                    SolverStatus::Converged,
                    iter + 1,
                    res_norm,
                    initial_norm,
                );
            }

            if res_norm > initial_norm * DIVERGENCE_FACTOR {
                return SolverResult::new(SolverStatus::Diverged, iter + 1, res_norm, initial_norm);
            }
        }

        SolverResult::new(
            SolverStatus::MaxIterationsReached,
            self.config.max_iter,
            norm2(&self.r),
            initial_norm,
        )
    }

    fn name(&self) -> &'static str {
        "BiCGStab"
    }
}

// =============================================================================
// Gauss-Seidel
// =============================================================================

/// 对称 Gauss-Seidel 迭代（前扫 + 回扫），不使用预条件器
///
/// 收敛慢但不会崩溃，用作 Krylov 求解器失败后的兜底。
/// 对按迎风顺序编号的纯对流矩阵，一次前扫即得精确解。
pub struct GaussSeidelSolver {
    config: SolverConfig,
    r: Vec<f64>,
}

impl GaussSeidelSolver {
    /// 创建 Gauss-Seidel 求解器
    pub fn new(config: SolverConfig) -> Self {
        Self { config, r: Vec::new() }
    }

    fn sweep(matrix: &CsrMatrix, b: &[f64], x: &mut [f64], rows: impl Iterator<Item = usize>) {
        for i in rows {
            let row = matrix.row(i);
            let mut diag = 0.0;
            let mut sum = b[i];
            for (j, a) in row.iter() {
                if j == i {
                    diag += a;
                } else {
                    sum -= a * x[j];
                }
            }
            if diag.abs() > STAGNATION_TOL {
                x[i] = sum / diag;
            }
        }
    }
}

impl IterativeSolver for GaussSeidelSolver {
    fn solve(
        &mut self,
        matrix: &CsrMatrix,
        b: &[f64],
        x: &mut [f64],
        _precond: &dyn Preconditioner,
    ) -> SolverResult {
        let n = b.len();
        if self.r.len() != n {
            self.r = vec![0.0; n];
        }
        let residual = |x: &[f64], r: &mut [f64]| {
            matrix.mul_vec(x, r);
            for i in 0..n {
                r[i] = b[i] - r[i];
            }
            norm2(r)
        };

        let initial_norm = residual(x, &mut self.r);
        if initial_norm < self.config.atol {
            return SolverResult::new(SolverStatus::Converged, 0, initial_norm, initial_norm);
        }

        for iter in 0..self.config.max_iter {
            Self::sweep(matrix, b, x, 0..n);
            Self::sweep(matrix, b, x, (0..n).rev());
            let res_norm = residual(x, &mut self.r);
            if res_norm < self.config.atol || res_norm / initial_norm < self.config.rtol {
                return SolverResult::new(SolverStatus::Converged, iter + 1, res_norm, initial_norm);
            }
            if !res_norm.is_finite() || res_norm > initial_norm * DIVERGENCE_FACTOR {
                return SolverResult::new(SolverStatus::Diverged, iter + 1, res_norm, initial_norm);
            }
        }

        SolverResult::new(
            SolverStatus::MaxIterationsReached,
            self.config.max_iter,
            norm2(&self.r),
            initial_norm,
        )
    }

    fn name(&self) -> &'static str {
        "GaussSeidel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear_algebra::csr::CsrBuilder;
    use crate::linear_algebra::preconditioner::{
        IdentityPreconditioner, JacobiPreconditioner, SsorPreconditioner,
    };

    fn create_spd_matrix(n: usize) -> CsrMatrix {
        // 三对角对称正定矩阵
        let mut builder = CsrBuilder::new_square(n);
        for i in 0..n {
            builder.set(i, i, 4.0);
            if i > 0 {
                builder.set(i, i - 1, -1.0);
            }
            if i < n - 1 {
                builder.set(i, i + 1, -1.0);
            }
        }
        builder.build()
    }

    fn create_upwind_matrix(n: usize) -> CsrMatrix {
        // 对流扩散：非对称
        let mut builder = CsrBuilder::new_square(n);
        for i in 0..n {
            builder.set(i, i, 3.0);
            if i > 0 {
                builder.set(i, i - 1, -2.0);
            }
            if i < n - 1 {
                builder.set(i, i + 1, -0.5);
            }
        }
        builder.build()
    }

    fn residual(a: &CsrMatrix, b: &[f64], x: &[f64]) -> f64 {
        let mut ax = vec![0.0; b.len()];
        a.mul_vec(x, &mut ax);
        ax.iter().zip(b).map(|(l, r)| (l - r).powi(2)).sum::<f64>().sqrt()
    }

    #[test]
    fn test_pcg_simple() {
        let a = create_spd_matrix(10);
        let b = vec![1.0; 10];
        let mut x = vec![0.0; 10];
        let p = JacobiPreconditioner::from_matrix(&a);
        let result = PcgSolver::new(SolverConfig::new(1e-10, 100)).solve(&a, &b, &mut x, &p);
        assert!(result.is_converged());
        assert!(residual(&a, &b, &x) < 1e-8);
    }

    #[test]
    fn test_pcg_ssor() {
        let a = create_spd_matrix(30);
        let b: Vec<f64> = (0..30).map(|i| (i as f64).sin()).collect();
        let mut x = vec![0.0; 30];
        let p = SsorPreconditioner::from_matrix(&a, 1.2);
        let result = PcgSolver::new(SolverConfig::new(1e-12, 200)).solve(&a, &b, &mut x, &p);
        assert!(result.is_converged());
        assert!(residual(&a, &b, &x) < 1e-9);
    }

    #[test]
    fn test_bicgstab_nonsymmetric() {
        let a = create_upwind_matrix(20);
        let b = vec![1.0; 20];
        let mut x = vec![0.0; 20];
        let p = JacobiPreconditioner::from_matrix(&a);
        let result = BiCgStabSolver::new(SolverConfig::new(1e-12, 200)).solve(&a, &b, &mut x, &p);
        assert!(result.is_converged());
        assert!(residual(&a, &b, &x) < 1e-9);
    }

    /// 纯迎风输运：下二对角矩阵，影子残差与后续残差正交
    fn create_transport_matrix(n: usize) -> CsrMatrix {
        let mut builder = CsrBuilder::new_square(n);
        for i in 0..n {
            builder.set(i, i, 2.0);
            if i > 0 {
                builder.set(i, i - 1, -1.0);
            }
        }
        builder.build()
    }

    #[test]
    fn test_bicgstab_restarts_on_pure_transport() {
        let a = create_transport_matrix(8);
        let mut b = vec![0.0; 8];
        b[0] = 1.0;
        let mut x = vec![0.0; 8];
        let p = JacobiPreconditioner::from_matrix(&a);
        let result = BiCgStabSolver::new(SolverConfig::new(1e-12, 200)).solve(&a, &b, &mut x, &p);
        assert!(result.is_converged(), "{result:?}");
        // x_i = 0.5^(i+1)
        for (i, xi) in x.iter().enumerate() {
            assert!((xi - 0.5f64.powi(i as i32 + 1)).abs() < 1e-10, "x[{i}] = {xi}");
        }
    }

    #[test]
    fn test_gauss_seidel_solves_transport_in_one_sweep() {
        let a = create_transport_matrix(6);
        let b = vec![1.0; 6];
        let mut x = vec![0.0; 6];
        let result = GaussSeidelSolver::new(SolverConfig::new(1e-12, 50)).solve(
            &a,
            &b,
            &mut x,
            &IdentityPreconditioner,
        );
        assert!(result.is_converged());
        assert!(result.iterations <= 2);
        assert!(residual(&a, &b, &x) < 1e-12);
    }

    #[test]
    fn test_gauss_seidel_spd() {
        let a = create_spd_matrix(20);
        let b = vec![1.0; 20];
        let mut x = vec![0.0; 20];
        let result = GaussSeidelSolver::new(SolverConfig::new(1e-10, 500)).solve(
            &a,
            &b,
            &mut x,
            &IdentityPreconditioner,
        );
        assert!(result.is_converged());
        assert!(residual(&a, &b, &x) < 1e-8);
    }

    #[test]
    fn test_already_converged() {
        let a = create_spd_matrix(5);
        let mut x = vec![0.0; 5];
        let result = PcgSolver::new(SolverConfig::default()).solve(
            &a,
            &[0.0; 5],
            &mut x,
            &IdentityPreconditioner,
        );
        assert!(result.is_converged());
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn test_max_iterations() {
        let a = create_spd_matrix(50);
        let b = vec![1.0; 50];
        let mut x = vec![0.0; 50];
        let result = PcgSolver::new(SolverConfig::new(1e-14, 2).with_atol(0.0)).solve(
            &a,
            &b,
            &mut x,
            &IdentityPreconditioner,
        );
        assert_eq!(result.status, SolverStatus::MaxIterationsReached);
        assert_eq!(result.iterations, 2);
    }
}
