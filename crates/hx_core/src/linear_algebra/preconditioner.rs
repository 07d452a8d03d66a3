// crates/hx_core/src/linear_algebra/preconditioner.rs

//! 预条件器
//!
//! 求解 `M z = r`，用 `M ≈ A` 改善 Krylov 方法的收敛。
//!
//! - [`IdentityPreconditioner`]: 不做预条件
//! - [`JacobiPreconditioner`]: 对角缩放
//! - [`SsorPreconditioner`]: 对称逐次超松弛，适合对称压力方程

use super::csr::CsrMatrix;

/// 对角元绝对值低于该阈值时按 1 处理
const DIAG_THRESHOLD: f64 = 1e-14;

/// 预条件器 trait
pub trait Preconditioner: Send + Sync {
    /// 应用预条件：z = M⁻¹ r
    fn apply(&self, r: &[f64], z: &mut [f64]);

    /// 名称
    fn name(&self) -> &'static str;

    /// 矩阵值改变后更新（稀疏模式不变）
    fn update(&mut self, matrix: &CsrMatrix);
}

// =============================================================================
// Identity
// =============================================================================

/// 恒等预条件器
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPreconditioner;

impl Preconditioner for IdentityPreconditioner {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        z.copy_from_slice(r);
    }

    fn name(&self) -> &'static str {
        "Identity"
    }

    fn update(&mut self, _matrix: &CsrMatrix) {}
}

// =============================================================================
// Jacobi
// =============================================================================

/// Jacobi（对角）预条件器
#[derive(Debug, Clone)]
pub struct JacobiPreconditioner {
    inv_diag: Vec<f64>,
}

impl JacobiPreconditioner {
    /// 从矩阵对角元构建
    pub fn from_matrix(matrix: &CsrMatrix) -> Self {
        let mut p = Self {
            inv_diag: vec![1.0; matrix.n_rows()],
        };
        p.update(matrix);
        p
    }

    /// 对角元倒数
    pub fn inv_diagonal(&self) -> &[f64] {
        &self.inv_diag
    }
}

impl Preconditioner for JacobiPreconditioner {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        debug_assert_eq!(r.len(), self.inv_diag.len());
        for ((zi, ri), inv_d) in z.iter_mut().zip(r).zip(&self.inv_diag) {
            *zi = ri * inv_d;
        }
    }

    fn name(&self) -> &'static str {
        "Jacobi"
    }

    fn update(&mut self, matrix: &CsrMatrix) {
        self.inv_diag.resize(matrix.n_rows(), 1.0);
        for (i, inv) in self.inv_diag.iter_mut().enumerate() {
            *inv = match matrix.diagonal_value(i) {
                Some(d) if d.abs() > DIAG_THRESHOLD => 1.0 / d,
                _ => 1.0,
            };
        }
    }
}

// =============================================================================
// SSOR
// =============================================================================

/// SSOR 预条件器
///
/// 前向扫描 `(D + ωL) y = r`，缩放 `y ← (2-ω) D y`，
/// 再后向扫描 `(D + ωU) z = y`。
#[derive(Debug, Clone)]
pub struct SsorPreconditioner {
    omega: f64,
    diag: Vec<f64>,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl SsorPreconditioner {
    /// 从矩阵构建，`omega` 通常取 1.0 ~ 1.8
    pub fn from_matrix(matrix: &CsrMatrix, omega: f64) -> Self {
        let mut p = Self {
            omega,
            diag: Vec::new(),
            row_ptr: Vec::new(),
            col_idx: Vec::new(),
            values: Vec::new(),
        };
        p.update(matrix);
        p
    }
}

impl Preconditioner for SsorPreconditioner {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        let n = self.diag.len();

        // 前向扫描
        for i in 0..n {
            let mut sum = r[i];
            for idx in self.row_ptr[i]..self.row_ptr[i + 1] {
                let j = self.col_idx[idx];
                if j < i {
                    sum -= self.omega * self.values[idx] * z[j];
                }
            }
            z[i] = sum / self.diag[i];
        }

        let scale = 2.0 - self.omega;
        for i in 0..n {
            z[i] *= self.diag[i] * scale;
        }

        // 后向扫描
        for i in (0..n).rev() {
            let mut sum = z[i];
            for idx in self.row_ptr[i]..self.row_ptr[i + 1] {
                let j = self.col_idx[idx];
                if j > i {
                    sum -= self.omega * self.values[idx] * z[j];
                }
            }
            z[i] = sum / self.diag[i];
        }
    }

    fn name(&self) -> &'static str {
        "SSOR"
    }

    fn update(&mut self, matrix: &CsrMatrix) {
        let n = matrix.n_rows();
        self.diag = (0..n)
            .map(|i| match matrix.diagonal_value(i) {
                Some(d) if d.abs() > DIAG_THRESHOLD => d,
                _ => 1.0,
            })
            .collect();
        self.row_ptr = Vec::with_capacity(n + 1);
        self.col_idx = Vec::with_capacity(matrix.nnz());
        self.values = Vec::with_capacity(matrix.nnz());
        self.row_ptr.push(0);
        for i in 0..n {
            for (j, v) in matrix.row(i).iter() {
                self.col_idx.push(j);
                self.values.push(v);
            }
            self.row_ptr.push(self.col_idx.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear_algebra::csr::CsrBuilder;

    fn diag_matrix() -> CsrMatrix {
        CsrMatrix::diagonal(&[2.0, 4.0, 0.0])
    }

    #[test]
    fn test_jacobi_zero_diagonal_falls_back() {
        let p = JacobiPreconditioner::from_matrix(&diag_matrix());
        let mut z = vec![0.0; 3];
        p.apply(&[2.0, 2.0, 3.0], &mut z);
        assert_eq!(z, vec![1.0, 0.5, 3.0]);
    }

    #[test]
    fn test_ssor_exact_for_diagonal() {
        let m = CsrMatrix::diagonal(&[2.0, 4.0]);
        let p = SsorPreconditioner::from_matrix(&m, 1.0);
        let mut z = vec![0.0; 2];
        p.apply(&[2.0, 4.0], &mut z);
        assert!((z[0] - 1.0).abs() < 1e-14);
        assert!((z[1] - 1.0).abs() < 1e-14);
    }

    #[test]
    fn test_ssor_symmetric_gauss_seidel() {
        let mut b = CsrBuilder::new_square(2);
        b.set(0, 0, 4.0);
        b.set(0, 1, -1.0);
        b.set(1, 0, -1.0);
        b.set(1, 1, 4.0);
        let m = b.build();
        let p = SsorPreconditioner::from_matrix(&m, 1.0);
        let mut z = vec![0.0; 2];
        p.apply(&[1.0, 0.0], &mut z);
        // (D+L) y = r: y = [0.25, 0.0625]; y ← D y; (D+U) z = y
        assert!((z[1] - 0.0625).abs() < 1e-14);
        assert!((z[0] - (1.0 + 0.0625) / 4.0).abs() < 1e-14);
        assert_eq!(p.name(), "SSOR");
    }
}
