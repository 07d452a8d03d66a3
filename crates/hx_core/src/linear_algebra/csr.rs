// crates/hx_core/src/linear_algebra/csr.rs

//! 压缩稀疏行（CSR）矩阵格式
//!
//! 有限体积离散得到的矩阵每行只含本单元与面相邻单元，
//! CSR 格式便于矩阵-向量乘法和按行遍历。
//!
//! # 格式说明
//!
//! - `row_ptr`: 行指针，长度 n_rows + 1
//! - `col_idx`: 列索引，每行内部升序
//! - `values`: 非零元值
//!
//! # 使用示例
//!
//! ```
//! use hx_core::linear_algebra::CsrBuilder;
//!
//! let mut builder = CsrBuilder::new_square(2);
//! builder.set(0, 0, 2.0);
//! builder.set(0, 1, -1.0);
//! builder.set(1, 0, -1.0);
//! builder.set(1, 1, 2.0);
//! let matrix = builder.build();
//!
//! let mut y = vec![0.0; 2];
//! matrix.mul_vec(&[1.0, 1.0], &mut y);
//! assert_eq!(y, vec![1.0, 1.0]);
//! ```

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use std::collections::BTreeMap;

// =============================================================================
// 稀疏模式
// =============================================================================

/// CSR 矩阵的稀疏模式（与值分离）
#[derive(Debug, Clone)]
pub struct CsrPattern {
    n_rows: usize,
    n_cols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
}

impl CsrPattern {
    /// 行数
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// 列数
    #[inline]
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// 非零元数量
    #[inline]
    pub fn nnz(&self) -> usize {
        self.col_idx.len()
    }

    /// 第 row 行的列索引
    #[inline]
    pub fn row_indices(&self, row: usize) -> &[usize] {
        &self.col_idx[self.row_ptr[row]..self.row_ptr[row + 1]]
    }

    /// 查找 (row, col) 对应的值索引
    pub fn find_index(&self, row: usize, col: usize) -> Option<usize> {
        let start = self.row_ptr[row];
        self.row_indices(row)
            .binary_search(&col)
            .ok()
            .map(|local| start + local)
    }
}

// =============================================================================
// CSR 矩阵
// =============================================================================

/// CSR 格式稀疏矩阵
#[derive(Debug, Clone)]
pub struct CsrMatrix {
    pattern: CsrPattern,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// 从原始 CSR 数据创建矩阵
    ///
    /// `row_ptr` 末尾必须等于 `col_idx.len()`，且每行列索引升序。
    pub fn from_raw(
        n_rows: usize,
        n_cols: usize,
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<f64>,
    ) -> Self {
        debug_assert_eq!(row_ptr.len(), n_rows + 1, "row_ptr 长度必须为 n_rows + 1");
        debug_assert_eq!(col_idx.len(), values.len(), "col_idx 和 values 长度必须相等");
        debug_assert_eq!(row_ptr[n_rows], col_idx.len(), "row_ptr 末尾必须等于 nnz");

        Self {
            pattern: CsrPattern {
                n_rows,
                n_cols,
                row_ptr,
                col_idx,
            },
            values,
        }
    }

    /// 对角矩阵
    pub fn diagonal(diag: &[f64]) -> Self {
        let n = diag.len();
        Self::from_raw(n, n, (0..=n).collect(), (0..n).collect(), diag.to_vec())
    }

    /// 行数
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.pattern.n_rows
    }

    /// 列数
    #[inline]
    pub fn n_cols(&self) -> usize {
        self.pattern.n_cols
    }

    /// 非零元数量
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// 稀疏模式
    #[inline]
    pub fn pattern(&self) -> &CsrPattern {
        &self.pattern
    }

    /// 非零元值
    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// 获取 (row, col) 处的值，不存在时为 0
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.pattern
            .find_index(row, col)
            .map_or(0.0, |idx| self.values[idx])
    }

    /// 设置已有非零元的值，位置不存在时返回 false
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> bool {
        match self.pattern.find_index(row, col) {
            Some(idx) => {
                self.values[idx] = value;
                true
            }
            None => false,
        }
    }

    /// 累加到已有非零元，位置不存在时返回 false
    pub fn add(&mut self, row: usize, col: usize, value: f64) -> bool {
        match self.pattern.find_index(row, col) {
            Some(idx) => {
                self.values[idx] += value;
                true
            }
            None => false,
        }
    }

    /// 行视图
    pub fn row(&self, row: usize) -> RowView<'_> {
        let start = self.pattern.row_ptr[row];
        let end = self.pattern.row_ptr[row + 1];
        RowView {
            col_idx: &self.pattern.col_idx[start..end],
            values: &self.values[start..end],
        }
    }

    /// 对角元
    pub fn diagonal_value(&self, row: usize) -> Option<f64> {
        self.pattern
            .find_index(row, row)
            .map(|idx| self.values[idx])
    }

    /// 提取全部对角元（缺失处为 0）
    pub fn extract_diagonal(&self) -> Vec<f64> {
        (0..self.n_rows())
            .map(|i| self.diagonal_value(i).unwrap_or(0.0))
            .collect()
    }

    /// 矩阵-向量乘法 y = A * x
    ///
    /// # Panics
    /// 向量长度与矩阵维度不符
    pub fn mul_vec(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.n_cols(), "x 长度必须等于矩阵列数");
        assert_eq!(y.len(), self.n_rows(), "y 长度必须等于矩阵行数");

        #[cfg(feature = "parallel")]
        {
            self.mul_vec_parallel(x, y);
        }
        #[cfg(not(feature = "parallel"))]
        {
            for (row, out) in y.iter_mut().enumerate() {
                *out = self.row_dot(row, x);
            }
        }
    }

    #[cfg(feature = "parallel")]
    fn mul_vec_parallel(&self, x: &[f64], y: &mut [f64]) {
        y.par_iter_mut()
            .enumerate()
            .for_each(|(row, out)| *out = self.row_dot(row, x));
    }

    #[inline]
    fn row_dot(&self, row: usize, x: &[f64]) -> f64 {
        let start = self.pattern.row_ptr[row];
        let end = self.pattern.row_ptr[row + 1];
        let mut sum = 0.0;
        for idx in start..end {
            sum += self.values[idx] * x[self.pattern.col_idx[idx]];
        }
        sum
    }

    /// 是否对称（容差内）
    pub fn is_symmetric(&self, tol: f64) -> bool {
        for row in 0..self.n_rows() {
            for (col, v) in self.row(row).iter() {
                if (v - self.get(col, row)).abs() > tol {
                    return false;
                }
            }
        }
        true
    }
}

/// 矩阵行视图
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    col_idx: &'a [usize],
    values: &'a [f64],
}

impl<'a> RowView<'a> {
    /// 列索引
    pub fn col_indices(&self) -> &'a [usize] {
        self.col_idx
    }

    /// 值
    pub fn values(&self) -> &'a [f64] {
        self.values
    }

    /// (列, 值) 迭代
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + 'a {
        self.col_idx.iter().copied().zip(self.values.iter().copied())
    }
}

// =============================================================================
// 构建器
// =============================================================================

/// 按行累加的矩阵构建器
///
/// 每行用有序映射保存非零元，`build` 时直接得到列有序的 CSR。
#[derive(Debug, Clone)]
pub struct CsrBuilder {
    n_cols: usize,
    rows: Vec<BTreeMap<usize, f64>>,
}

impl CsrBuilder {
    /// 创建 n_rows × n_cols 构建器
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_cols,
            rows: vec![BTreeMap::new(); n_rows],
        }
    }

    /// 创建方阵构建器
    pub fn new_square(n: usize) -> Self {
        Self::new(n, n)
    }

    /// 设置 (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(col < self.n_cols, "列索引越界");
        self.rows[row].insert(col, value);
    }

    /// 累加到 (row, col)
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(col < self.n_cols, "列索引越界");
        *self.rows[row].entry(col).or_insert(0.0) += value;
    }

    /// 生成 CSR 矩阵
    pub fn build(self) -> CsrMatrix {
        let n_rows = self.rows.len();
        let nnz: usize = self.rows.iter().map(|r| r.len()).sum();
        let mut row_ptr = Vec::with_capacity(n_rows + 1);
        let mut col_idx = Vec::with_capacity(nnz);
        let mut values = Vec::with_capacity(nnz);

        row_ptr.push(0);
        for row in self.rows {
            for (col, v) in row {
                col_idx.push(col);
                values.push(v);
            }
            row_ptr.push(col_idx.len());
        }
        CsrMatrix::from_raw(n_rows, self.n_cols, row_ptr, col_idx, values)
    }
}
