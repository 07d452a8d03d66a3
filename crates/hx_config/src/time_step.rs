// crates/hx_config/src/time_step.rs

//! 时间控制：时间范围、全局自适应步长与局部时间步（LTS）参数

use crate::error::ConfigError;
use crate::schemes::TimeScheme;
use serde::{Deserialize, Serialize};

/// 时间范围与时间格式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    /// 起始时间 [s]
    #[serde(default, rename = "startTime")]
    pub start_time: f64,
    /// 结束时间 [s]（稳态时为迭代次数）
    #[serde(default = "default_end_time", rename = "endTime")]
    pub end_time: f64,
    /// 初始时间步长 [s]
    #[serde(default = "default_delta_t", rename = "deltaT")]
    pub delta_t: f64,
    /// 时间离散格式
    #[serde(default, rename = "ddtScheme")]
    pub ddt_scheme: TimeScheme,
    /// 写出间隔（时间步数），0 表示只写首末时间层
    #[serde(default, rename = "writeInterval")]
    pub write_interval: usize,
}

fn default_end_time() -> f64 {
    1.0
}

fn default_delta_t() -> f64 {
    1e-3
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            end_time: default_end_time(),
            delta_t: default_delta_t(),
            ddt_scheme: TimeScheme::default(),
            write_interval: 0,
        }
    }
}

impl TimeConfig {
    /// 验证
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.delta_t > 0.0) {
            return Err(ConfigError::invalid("time.deltaT", self.delta_t, "时间步长必须为正"));
        }
        if self.end_time < self.start_time {
            return Err(ConfigError::invalid(
                "time.endTime",
                self.end_time,
                "结束时间早于起始时间",
            ));
        }
        self.ddt_scheme.validate()
    }
}

/// 全局自适应时间步（`adjustTimeStep`）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveTimeConfig {
    /// 是否按 Courant 数调整全局时间步
    #[serde(default, rename = "adjustTimeStep")]
    pub adjust_time_step: bool,
    /// 最大流动 Courant 数
    #[serde(default = "default_global_max_co", rename = "maxCo")]
    pub max_co: f64,
    /// 最大界面 Courant 数
    #[serde(default = "default_global_max_co", rename = "maxAlphaCo")]
    pub max_alpha_co: f64,
    /// 最大时间步 [s]
    #[serde(default = "default_max_delta_t", rename = "maxDeltaT")]
    pub max_delta_t: f64,
}

fn default_global_max_co() -> f64 {
    1.0
}

fn default_max_delta_t() -> f64 {
    hx_foundation::GREAT
}

impl Default for AdaptiveTimeConfig {
    fn default() -> Self {
        Self {
            adjust_time_step: false,
            max_co: default_global_max_co(),
            max_alpha_co: default_global_max_co(),
            max_delta_t: default_max_delta_t(),
        }
    }
}

/// 局部时间步（LTS）参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LtsConfig {
    /// 最大流动 Courant 数
    #[serde(default = "default_lts_max_co", rename = "maxCo")]
    pub max_co: f64,
    /// 界面附近最大 Courant 数
    #[serde(default = "default_lts_max_alpha_co", rename = "maxAlphaCo")]
    pub max_alpha_co: f64,
    /// 空间平滑系数（≥1 不平滑）
    #[serde(default = "default_smoothing", rename = "rDeltaTSmoothingCoeff")]
    pub r_delta_t_smoothing_coeff: f64,
    /// 阻尼系数（≥1 不阻尼）
    #[serde(default = "default_damping", rename = "rDeltaTDampingCoeff")]
    pub r_delta_t_damping_coeff: f64,
    /// 界面扩散层数
    #[serde(default = "default_spread_iter", rename = "nAlphaSpreadIter")]
    pub n_alpha_spread_iter: usize,
    /// 界面判定的相分数差阈值
    #[serde(default = "default_spread_diff", rename = "alphaSpreadDiff")]
    pub alpha_spread_diff: f64,
    /// 界面判定上限
    #[serde(default = "default_spread_max", rename = "alphaSpreadMax")]
    pub alpha_spread_max: f64,
    /// 界面判定下限
    #[serde(default = "default_spread_min", rename = "alphaSpreadMin")]
    pub alpha_spread_min: f64,
    /// 界面扫掠层数
    #[serde(default = "default_sweep_iter", rename = "nAlphaSweepIter")]
    pub n_alpha_sweep_iter: usize,
    /// 最大时间步 [s]
    #[serde(default = "default_max_delta_t", rename = "maxDeltaT")]
    pub max_delta_t: f64,
}

fn default_lts_max_co() -> f64 {
    0.9
}
fn default_lts_max_alpha_co() -> f64 {
    0.2
}
fn default_smoothing() -> f64 {
    0.1
}
fn default_damping() -> f64 {
    1.0
}
fn default_spread_iter() -> usize {
    1
}
fn default_spread_diff() -> f64 {
    0.2
}
fn default_spread_max() -> f64 {
    0.99
}
fn default_spread_min() -> f64 {
    0.01
}
fn default_sweep_iter() -> usize {
    5
}

impl Default for LtsConfig {
    fn default() -> Self {
        Self {
            max_co: default_lts_max_co(),
            max_alpha_co: default_lts_max_alpha_co(),
            r_delta_t_smoothing_coeff: default_smoothing(),
            r_delta_t_damping_coeff: default_damping(),
            n_alpha_spread_iter: default_spread_iter(),
            alpha_spread_diff: default_spread_diff(),
            alpha_spread_max: default_spread_max(),
            alpha_spread_min: default_spread_min(),
            n_alpha_sweep_iter: default_sweep_iter(),
            max_delta_t: default_max_delta_t(),
        }
    }
}

impl LtsConfig {
    /// 设置阻尼系数
    pub fn with_damping(mut self, coeff: f64) -> Self {
        self.r_delta_t_damping_coeff = coeff;
        self
    }

    /// 验证
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.max_co > 0.0) {
            return Err(ConfigError::invalid("LTS.maxCo", self.max_co, "必须为正"));
        }
        if !(self.max_alpha_co > 0.0) {
            return Err(ConfigError::invalid("LTS.maxAlphaCo", self.max_alpha_co, "必须为正"));
        }
        if self.r_delta_t_damping_coeff < 0.0 {
            return Err(ConfigError::invalid(
                "LTS.rDeltaTDampingCoeff",
                self.r_delta_t_damping_coeff,
                "不能为负",
            ));
        }
        if self.alpha_spread_min >= self.alpha_spread_max {
            return Err(ConfigError::invalid(
                "LTS.alphaSpreadMin",
                self.alpha_spread_min,
                "必须小于 alphaSpreadMax",
            ));
        }
        if !(self.max_delta_t > 0.0) {
            return Err(ConfigError::invalid("LTS.maxDeltaT", self.max_delta_t, "必须为正"));
        }
        Ok(())
    }
}
