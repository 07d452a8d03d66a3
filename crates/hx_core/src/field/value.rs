// crates/hx_core/src/field/value.rs

//! 场值类型抽象：标量 `f64` 与矢量 `DVec3`

use glam::DVec3;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

/// 可存放在体场与矩阵中的值类型
pub trait FieldValue:
    Copy
    + Debug
    + Default
    + PartialEq
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<f64, Output = Self>
    + Div<f64, Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign<f64>
    + Serialize
    + DeserializeOwned
{
    /// 分量数
    const N_COMPONENTS: usize;

    /// 零值
    const ZERO: Self;

    /// 第 d 个分量
    fn component(&self, d: usize) -> f64;

    /// 设置第 d 个分量
    fn set_component(&mut self, d: usize, value: f64);

    /// 模
    fn mag(&self) -> f64;

    /// 去掉沿单位法向 `n` 的分量（标量不变）
    fn remove_normal(self, n: DVec3) -> Self;

    /// 与面积矢量的点积得到的通量（标量场返回自身乘面积）
    fn dot_area(self, sf: DVec3) -> f64;
}

impl FieldValue for f64 {
    const N_COMPONENTS: usize = 1;
    const ZERO: Self = 0.0;

    #[inline]
    fn component(&self, _d: usize) -> f64 {
        *self
    }

    #[inline]
    fn set_component(&mut self, _d: usize, value: f64) {
        *self = value;
    }

    #[inline]
    fn mag(&self) -> f64 {
        self.abs()
    }

    #[inline]
    fn remove_normal(self, _n: DVec3) -> Self {
        self
    }

    #[inline]
    fn dot_area(self, sf: DVec3) -> f64 {
        self * sf.length()
    }
}

impl FieldValue for DVec3 {
    const N_COMPONENTS: usize = 3;
    const ZERO: Self = DVec3::ZERO;

    #[inline]
    fn component(&self, d: usize) -> f64 {
        self[d]
    }

    #[inline]
    fn set_component(&mut self, d: usize, value: f64) {
        self[d] = value;
    }

    #[inline]
    fn mag(&self) -> f64 {
        self.length()
    }

    #[inline]
    fn remove_normal(self, n: DVec3) -> Self {
        self - n * n.dot(self)
    }

    #[inline]
    fn dot_area(self, sf: DVec3) -> f64 {
        self.dot(sf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components() {
        let mut v = DVec3::new(1.0, 2.0, 3.0);
        v.set_component(1, 5.0);
        assert_eq!(v.component(1), 5.0);
        let mut s = 2.0f64;
        s.set_component(0, 3.0);
        assert_eq!(s.component(0), 3.0);
    }

    #[test]
    fn test_remove_normal() {
        let v = DVec3::new(1.0, 2.0, 3.0).remove_normal(DVec3::X);
        assert_eq!(v, DVec3::new(0.0, 2.0, 3.0));
        assert_eq!(4.0f64.remove_normal(DVec3::X), 4.0);
    }
}
