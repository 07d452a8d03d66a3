// crates/hx_core/src/linear_algebra/mod.rs

//! 稀疏线性代数模块
//!
//! 为有限体积矩阵 [`FvMatrix`](crate::fvm::FvMatrix) 的求解提供 CSR 存储、
//! 预条件器与 Krylov 迭代求解器。
//!
//! # 组成
//!
//! - [`csr`]: CSR 稀疏模式与矩阵、按行构建器
//! - [`vector_ops`]: 向量内积、范数与 axpy 等基本运算
//! - [`preconditioner`]: Identity / Jacobi / SSOR 预条件器
//! - [`solver`]: PCG（对称）、BiCGStab（非对称）与 Gauss-Seidel 兜底
//!
//! # 特性开关
//!
//! - `parallel`: 矩阵-向量乘法与内积使用 rayon 并行

pub mod csr;
pub mod preconditioner;
pub mod solver;
pub mod vector_ops;

pub use csr::{CsrBuilder, CsrMatrix, CsrPattern, RowView};
pub use preconditioner::{
    IdentityPreconditioner, JacobiPreconditioner, Preconditioner, SsorPreconditioner,
};
pub use solver::{
    BiCgStabSolver, GaussSeidelSolver, IterativeSolver, PcgSolver, SolverConfig, SolverResult,
    SolverStatus,
};
pub use vector_ops::{axpy, copy, dot, fill, norm1, norm2, norm_inf, xpay};

use hx_config::{LinearSolverConfig, LinearSolverKind, PreconditionerKind};

/// 归一化因子的下限
const NORM_SMALL: f64 = 1e-20;

/// 归一化因子 `Σ(|Ax - A x̄| + |b - A x̄|) + small`，`x̄` 为解的平均值
///
/// 以它除 `Σ|b - Ax|` 得到与解的整体水平无关的归一化残差。
pub fn residual_norm_factor(matrix: &CsrMatrix, b: &[f64], x: &[f64]) -> f64 {
    let n = b.len();
    if n == 0 {
        return NORM_SMALL;
    }
    let mut ax = vec![0.0; n];
    matrix.mul_vec(x, &mut ax);
    let x_ref = x.iter().sum::<f64>() / n as f64;
    let mut a_ref = vec![0.0; n];
    matrix.mul_vec(&vec![x_ref; n], &mut a_ref);
    let mut norm = 0.0;
    for i in 0..n {
        norm += (ax[i] - a_ref[i]).abs() + (b[i] - a_ref[i]).abs();
    }
    norm + NORM_SMALL
}

/// 按配置求解 `A x = b`
///
/// `x` 输入为初值，输出为解。`tolerance` 针对归一化残差：换算为
/// `‖r‖₂ < tolerance · normFactor / √n`，从而保证 `Σ|r| / normFactor < tolerance`。
/// Krylov 求解器停滞或发散时从初值改用 Gauss-Seidel 继续。
pub fn solve_with_config(
    config: &LinearSolverConfig,
    matrix: &CsrMatrix,
    b: &[f64],
    x: &mut [f64],
) -> SolverResult {
    let n = b.len().max(1) as f64;
    let atol = config.tolerance * residual_norm_factor(matrix, b, x) / n.sqrt();
    let solver_config = SolverConfig::new(config.rel_tol, config.max_iter).with_atol(atol);
    let precond: Box<dyn Preconditioner> = match config.preconditioner {
        PreconditionerKind::Identity => Box::new(IdentityPreconditioner),
        PreconditionerKind::Jacobi => Box::new(JacobiPreconditioner::from_matrix(matrix)),
        PreconditionerKind::Ssor => Box::new(SsorPreconditioner::from_matrix(matrix, 1.2)),
    };
    let x0 = x.to_vec();
    let result = match config.solver {
        LinearSolverKind::Pcg => PcgSolver::new(solver_config.clone()).solve(matrix, b, x, precond.as_ref()),
        LinearSolverKind::BiCgStab => {
            BiCgStabSolver::new(solver_config.clone()).solve(matrix, b, x, precond.as_ref())
        }
    };
    match result.status {
        SolverStatus::Stagnated | SolverStatus::Diverged => {
            log::warn!(
                "{:?} 在第 {} 次迭代 {:?}（残差 {:.3e}），改用 Gauss-Seidel",
                config.solver,
                result.iterations,
                result.status,
                result.residual_norm
            );
            x.copy_from_slice(&x0);
            let fallback = GaussSeidelSolver::new(solver_config).solve(matrix, b, x, &IdentityPreconditioner);
            SolverResult {
                iterations: result.iterations + fallback.iterations,
                ..fallback
            }
        }
        _ => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve_with_config_dispatch() {
        let mut builder = CsrBuilder::new_square(3);
        for i in 0..3 {
            builder.set(i, i, 4.0);
            if i > 0 {
                builder.set(i, i - 1, -1.0);
            }
            if i < 2 {
                builder.set(i, i + 1, -1.0);
            }
        }
        let a = builder.build();
        let b = vec![3.0, 2.0, 3.0];

        for cfg in [
            LinearSolverConfig::symmetric(1e-12, 0.0),
            LinearSolverConfig::asymmetric(1e-12, 0.0),
        ] {
            let mut x = vec![0.0; 3];
            let r = solve_with_config(&cfg, &a, &b, &mut x);
            assert!(r.is_converged());
            for xi in &x {
                assert!((xi - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_tolerance_applies_to_normalised_residual() {
        // 系数很小的方程：未归一化的残差一开始就低于容差
        let scale = 1e-12;
        let mut builder = CsrBuilder::new_square(4);
        for i in 0..4 {
            builder.set(i, i, 2.0 * scale);
            if i > 0 {
                builder.set(i, i - 1, -scale);
            }
            if i < 3 {
                builder.set(i, i + 1, -scale);
            }
        }
        let a = builder.build();
        let b = vec![scale, 0.0, 0.0, scale];
        let mut x = vec![0.0, 3.0, -2.0, 0.5];
        let cfg = LinearSolverConfig::symmetric(1e-10, 0.0);
        let r = solve_with_config(&cfg, &a, &b, &mut x);
        assert!(r.is_converged());
        assert!(r.iterations > 0);
        for xi in &x {
            assert!((xi - 1.0).abs() < 1e-8, "x = {xi}");
        }
    }
}
