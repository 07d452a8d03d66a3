// crates/hx_foundation/src/dimension.rs

//! 物理量纲标记
//!
//! 场携带量纲标记，仅用于一致性检查，不参与计算。
//! 指数顺序为 `[质量, 长度, 时间, 温度]`。
//!
//! ```
//! use hx_foundation::dimension::Dimensions;
//!
//! let flux = Dimensions::VELOCITY * Dimensions::AREA;
//! assert_eq!(flux, Dimensions::VOLUMETRIC_FLUX);
//! ```

use crate::error::{HxError, HxResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Div, Mul};

/// 量纲指数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Dimensions {
    /// 质量 [kg]
    pub mass: i8,
    /// 长度 [m]
    pub length: i8,
    /// 时间 [s]
    pub time: i8,
    /// 温度 [K]
    pub temperature: i8,
}

impl Dimensions {
    /// 构造
    pub const fn new(mass: i8, length: i8, time: i8, temperature: i8) -> Self {
        Self {
            mass,
            length,
            time,
            temperature,
        }
    }

    /// 无量纲
    pub const DIMLESS: Self = Self::new(0, 0, 0, 0);
    /// 长度
    pub const LENGTH: Self = Self::new(0, 1, 0, 0);
    /// 面积
    pub const AREA: Self = Self::new(0, 2, 0, 0);
    /// 体积
    pub const VOLUME: Self = Self::new(0, 3, 0, 0);
    /// 时间
    pub const TIME: Self = Self::new(0, 0, 1, 0);
    /// 速度
    pub const VELOCITY: Self = Self::new(0, 1, -1, 0);
    /// 密度
    pub const DENSITY: Self = Self::new(1, -3, 0, 0);
    /// 压力
    pub const PRESSURE: Self = Self::new(1, -1, -2, 0);
    /// 运动压力 p/rho
    pub const KINEMATIC_PRESSURE: Self = Self::new(0, 2, -2, 0);
    /// 体积通量
    pub const VOLUMETRIC_FLUX: Self = Self::new(0, 3, -1, 0);
    /// 质量通量
    pub const MASS_FLUX: Self = Self::new(1, 0, -1, 0);
    /// 压缩性 psi = drho/dp
    pub const COMPRESSIBILITY: Self = Self::new(0, -2, 2, 0);
    /// 温度
    pub const TEMPERATURE: Self = Self::new(0, 0, 0, 1);
    /// 比能
    pub const SPECIFIC_ENERGY: Self = Self::new(0, 2, -2, 0);
    /// 时间步长倒数
    pub const INV_TIME: Self = Self::new(0, 0, -1, 0);

    /// 检查与另一量纲相同（加减运算、赋值前调用）
    pub fn check_same(&self, other: &Self, operation: &str) -> HxResult<()> {
        if self == other {
            Ok(())
        } else {
            Err(HxError::dimension_mismatch(
                operation,
                self.to_string(),
                other.to_string(),
            ))
        }
    }

    /// 幂
    pub const fn pow(self, n: i8) -> Self {
        Self::new(
            self.mass * n,
            self.length * n,
            self.time * n,
            self.temperature * n,
        )
    }
}

impl Mul for Dimensions {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.mass + rhs.mass,
            self.length + rhs.length,
            self.time + rhs.time,
            self.temperature + rhs.temperature,
        )
    }
}

impl Div for Dimensions {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        Self::new(
            self.mass - rhs.mass,
            self.length - rhs.length,
            self.time - rhs.time,
            self.temperature - rhs.temperature,
        )
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {} {} {}]",
            self.mass, self.length, self.time, self.temperature
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mass_flux() {
        assert_eq!(
            Dimensions::DENSITY * Dimensions::VOLUMETRIC_FLUX,
            Dimensions::MASS_FLUX
        );
    }

    #[test]
    fn test_compressibility() {
        assert_eq!(
            Dimensions::DENSITY / Dimensions::PRESSURE,
            Dimensions::COMPRESSIBILITY
        );
    }

    #[test]
    fn test_check_same() {
        assert!(Dimensions::PRESSURE
            .check_same(&Dimensions::PRESSURE, "p + p")
            .is_ok());
        let err = Dimensions::PRESSURE
            .check_same(&Dimensions::KINEMATIC_PRESSURE, "p + p_rgh")
            .unwrap_err();
        assert!(err.to_string().contains("p + p_rgh"));
    }

    #[test]
    fn test_pow() {
        assert_eq!(Dimensions::LENGTH.pow(3), Dimensions::VOLUME);
    }
}
