// crates/hx_core/src/fvm/time.rs

//! 时间状态
//!
//! 保存当前时间、时间步长、上一步长与时间格式。局部时间步（localEuler）
//! 时另持有逐单元的 rDeltaT 场，由时间步控制器每步写入一次，
//! 所有输运方程的时间项从这里读取。

use hx_config::{TimeConfig, TimeScheme};
use hx_foundation::{HxError, HxResult};

/// 时间状态
#[derive(Debug, Clone)]
pub struct TimeState {
    value: f64,
    delta_t: f64,
    delta_t0: f64,
    time_index: usize,
    scheme: TimeScheme,
    r_delta_t: Option<Vec<f64>>,
}

impl TimeState {
    /// 由配置创建
    pub fn new(config: &TimeConfig) -> Self {
        Self {
            value: config.start_time,
            delta_t: config.delta_t,
            delta_t0: config.delta_t,
            time_index: 0,
            scheme: config.ddt_scheme,
            r_delta_t: None,
        }
    }

    /// 直接指定格式与步长（测试与演示算例使用）
    pub fn with_scheme(scheme: TimeScheme, delta_t: f64) -> Self {
        Self {
            value: 0.0,
            delta_t,
            delta_t0: delta_t,
            time_index: 0,
            scheme,
            r_delta_t: None,
        }
    }

    /// 当前时间
    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// 当前时间步长
    #[inline]
    pub fn delta_t(&self) -> f64 {
        self.delta_t
    }

    /// 上一时间步长
    #[inline]
    pub fn delta_t0(&self) -> f64 {
        self.delta_t0
    }

    /// 时间步序号
    #[inline]
    pub fn time_index(&self) -> usize {
        self.time_index
    }

    /// 时间格式
    #[inline]
    pub fn scheme(&self) -> TimeScheme {
        self.scheme
    }

    /// 是否稳态
    #[inline]
    pub fn is_steady(&self) -> bool {
        self.scheme.is_steady()
    }

    /// 是否局部时间步
    #[inline]
    pub fn is_local(&self) -> bool {
        self.scheme.is_local()
    }

    /// Crank-Nicolson 偏心系数，非 CN 格式为 0
    pub fn oc_coeff(&self) -> f64 {
        match self.scheme {
            TimeScheme::CrankNicolson { oc_coeff } => oc_coeff,
            _ => 0.0,
        }
    }

    /// 设置时间步长
    pub fn set_delta_t(&mut self, delta_t: f64) -> HxResult<()> {
        if !(delta_t > 0.0) || !delta_t.is_finite() {
            return Err(HxError::breakdown("deltaT", 0, delta_t, "时间步长必须为有限正数"));
        }
        self.delta_t = delta_t;
        Ok(())
    }

    /// 推进一个时间步
    pub fn advance(&mut self) {
        self.value += self.delta_t;
        self.time_index += 1;
    }

    /// 记录本步长为下一步的"上一步长"
    pub fn store_delta_t0(&mut self) {
        self.delta_t0 = self.delta_t;
    }

    /// 写入局部时间步场
    pub fn set_r_delta_t(&mut self, r_delta_t: Vec<f64>) {
        self.r_delta_t = Some(r_delta_t);
    }

    /// 局部时间步场
    pub fn r_delta_t_field(&self) -> Option<&[f64]> {
        self.r_delta_t.as_deref()
    }

    /// 取走局部时间步场（子循环临时替换时使用）
    pub fn take_r_delta_t(&mut self) -> Option<Vec<f64>> {
        self.r_delta_t.take()
    }

    /// 单元的 1/Δt：局部时间步取逐单元值，稳态为 0
    #[inline]
    pub fn r_delta_t(&self, cell: usize) -> f64 {
        match (&self.scheme, &self.r_delta_t) {
            (TimeScheme::SteadyState, _) => 0.0,
            (TimeScheme::LocalEuler, Some(r)) => r[cell],
            _ => 1.0 / self.delta_t,
        }
    }

    /// 逐单元 1/Δt 数组
    pub fn r_delta_t_cells(&self, n_cells: usize) -> Vec<f64> {
        (0..n_cells).map(|c| self.r_delta_t(c)).collect()
    }

    /// 拓扑变化后丢弃局部时间步场
    pub fn clear_r_delta_t(&mut self) {
        self.r_delta_t = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_r_delta_t_by_scheme() {
        let mut t = TimeState::with_scheme(TimeScheme::Euler, 0.5);
        assert_eq!(t.r_delta_t(3), 2.0);
        t.advance();
        assert_eq!(t.value(), 0.5);
        assert_eq!(t.time_index(), 1);

        let steady = TimeState::with_scheme(TimeScheme::SteadyState, 1.0);
        assert_eq!(steady.r_delta_t(0), 0.0);

        let mut lts = TimeState::with_scheme(TimeScheme::LocalEuler, 1.0);
        assert_eq!(lts.r_delta_t(0), 1.0);
        lts.set_r_delta_t(vec![4.0, 8.0]);
        assert_eq!(lts.r_delta_t(1), 8.0);
    }

    #[test]
    fn test_reject_bad_delta_t() {
        let mut t = TimeState::with_scheme(TimeScheme::Euler, 0.5);
        assert!(t.set_delta_t(0.0).is_err());
        assert!(t.set_delta_t(f64::NAN).is_err());
        assert!(t.set_delta_t(0.1).is_ok());
    }
}
