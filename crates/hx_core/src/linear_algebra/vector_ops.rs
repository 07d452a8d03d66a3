// crates/hx_core/src/linear_algebra/vector_ops.rs

//! 基本向量运算
//!
//! 迭代求解器使用的内积、范数和线性组合。
//! 启用 `parallel` 特性时内积与 axpy 使用 rayon。

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// 内积 x·y
#[inline]
pub fn dot(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len(), "向量长度必须相等");
    #[cfg(feature = "parallel")]
    {
        x.par_iter().zip(y.par_iter()).map(|(a, b)| a * b).sum()
    }
    #[cfg(not(feature = "parallel"))]
    {
        x.iter().zip(y).map(|(a, b)| a * b).sum()
    }
}

/// 2-范数
#[inline]
pub fn norm2(x: &[f64]) -> f64 {
    dot(x, x).sqrt()
}

/// 1-范数
#[inline]
pub fn norm1(x: &[f64]) -> f64 {
    x.iter().map(|v| v.abs()).sum()
}

/// 无穷范数
#[inline]
pub fn norm_inf(x: &[f64]) -> f64 {
    x.iter().fold(0.0, |m, v| m.max(v.abs()))
}

/// y = y + alpha * x
#[inline]
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len(), "向量长度必须相等");
    #[cfg(feature = "parallel")]
    {
        y.par_iter_mut().zip(x.par_iter()).for_each(|(yi, xi)| *yi += alpha * xi);
    }
    #[cfg(not(feature = "parallel"))]
    {
        for (yi, xi) in y.iter_mut().zip(x) {
            *yi += alpha * xi;
        }
    }
}

/// y = x + beta * y
#[inline]
pub fn xpay(x: &[f64], beta: f64, y: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len(), "向量长度必须相等");
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi = xi + beta * *yi;
    }
}

/// 复制 src 到 dst
#[inline]
pub fn copy(src: &[f64], dst: &mut [f64]) {
    dst.copy_from_slice(src);
}

/// 填充常数
#[inline]
pub fn fill(x: &mut [f64], value: f64) {
    x.fill(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_and_norms() {
        let x = [3.0, -4.0];
        assert_eq!(dot(&x, &x), 25.0);
        assert_eq!(norm2(&x), 5.0);
        assert_eq!(norm1(&x), 7.0);
        assert_eq!(norm_inf(&x), 4.0);
    }

    #[test]
    fn test_axpy_xpay() {
        let mut y = vec![1.0, 1.0];
        axpy(2.0, &[1.0, 2.0], &mut y);
        assert_eq!(y, vec![3.0, 5.0]);
        xpay(&[1.0, 1.0], 0.5, &mut y);
        assert_eq!(y, vec![2.5, 3.5]);
    }
}
