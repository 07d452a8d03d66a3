// crates/hx_core/src/time_step/mod.rs

//! 时间步控制
//!
//! 每个时间步在修正循环之前运行一次：
//!
//! - 固定步长：只报告 Courant 数
//! - 全局自适应（`adjustTimeStep`）：按流动/界面 Courant 数调整 Δt
//! - 局部时间步（`localEuler`）：逐单元 rΔt，见 [`lts`]

pub mod courant;
pub mod lts;

pub use courant::{adjusted_delta_t, courant_number, interface_courant_number, CourantNumbers};

use crate::field::VolScalarField;
use crate::fvm::TimeState;
use crate::mesh::PolyMesh;
use crate::parallel::Parallel;
use hx_config::{AdaptiveTimeConfig, CaseConfig, LtsConfig};
use hx_foundation::{Dimensions, HxResult};
use log::info;

/// 时间步模式
#[derive(Debug, Clone)]
pub enum TimeStepMode {
    /// 固定步长
    Fixed,
    /// 全局自适应
    Adaptive(AdaptiveTimeConfig),
    /// 局部时间步
    Local(LtsConfig),
}

/// 时间步控制器
#[derive(Debug, Clone)]
pub struct TimeStepController {
    mode: TimeStepMode,
    r_delta_t: Option<VolScalarField>,
    previous: Option<Vec<f64>>,
    started: bool,
    last: CourantNumbers,
}

impl TimeStepController {
    /// 创建
    pub fn new(mode: TimeStepMode) -> Self {
        Self {
            mode,
            r_delta_t: None,
            previous: None,
            started: false,
            last: CourantNumbers::default(),
        }
    }

    /// 由算例配置选择模式：`localEuler` 优先，其次 `adjustTimeStep`
    pub fn from_config(config: &CaseConfig) -> Self {
        let mode = if config.time.ddt_scheme.is_local() {
            TimeStepMode::Local(config.lts.clone())
        } else if config.adaptive_time.adjust_time_step && !config.time.ddt_scheme.is_steady() {
            TimeStepMode::Adaptive(config.adaptive_time.clone())
        } else {
            TimeStepMode::Fixed
        };
        Self::new(mode)
    }

    /// 模式
    pub fn mode(&self) -> &TimeStepMode {
        &self.mode
    }

    /// 最近一次的流动 Courant 数
    pub fn last_courant(&self) -> CourantNumbers {
        self.last
    }

    /// 局部时间步倒数场
    pub fn r_delta_t(&self) -> Option<&VolScalarField> {
        self.r_delta_t.as_ref()
    }

    /// 拓扑变化后丢弃历史（尺寸失效）
    pub fn reset(&mut self) {
        self.r_delta_t = None;
        self.previous = None;
    }

    /// 更新时间步
    ///
    /// `phiv` 为体积通量，`alphas` 为相分数（单相时为空）。
    pub fn update(
        &mut self,
        mesh: &PolyMesh,
        comm: &dyn Parallel,
        time: &mut TimeState,
        phiv: &[f64],
        alphas: &[VolScalarField],
    ) -> HxResult<()> {
        if time.is_steady() {
            return Ok(());
        }
        match &self.mode {
            TimeStepMode::Fixed => {
                self.last = self.report(mesh, comm, phiv, alphas, time.delta_t());
            }
            TimeStepMode::Adaptive(cfg) => {
                let cfg = cfg.clone();
                let co = self.report(mesh, comm, phiv, alphas, time.delta_t());
                let interface = if alphas.len() >= 2 {
                    let aco = interface_courant_number(mesh, comm, phiv, alphas, time.delta_t());
                    Some((aco.max, cfg.max_alpha_co))
                } else {
                    None
                };
                let new_dt = if self.started {
                    adjusted_delta_t(time.delta_t(), co.max, cfg.max_co, interface, cfg.max_delta_t)
                } else {
                    let limit = interface.map_or(cfg.max_co, |(aco, max_aco)| {
                        if aco > 0.0 {
                            cfg.max_co.min(max_aco * co.max / aco)
                        } else {
                            cfg.max_co
                        }
                    });
                    courant::initial_delta_t(time.delta_t(), co.max, limit, cfg.max_delta_t)
                };
                time.set_delta_t(new_dt)?;
                if comm.is_master() {
                    info!("deltaT = {:e}", new_dt);
                }
                self.last = co;
            }
            TimeStepMode::Local(cfg) => {
                let cfg = cfg.clone();
                let mut field = match self.r_delta_t.take() {
                    Some(f) if f.internal().len() == mesh.n_cells() => f,
                    _ => VolScalarField::new("rDeltaT", Dimensions::INV_TIME, mesh, 1.0 / cfg.max_delta_t),
                };
                lts::reciprocal_time_step(
                    mesh,
                    comm,
                    &cfg,
                    phiv,
                    alphas,
                    self.previous.as_deref(),
                    &mut field,
                )?;
                time.set_r_delta_t(field.internal().to_vec());
                self.previous = Some(field.internal().to_vec());
                self.r_delta_t = Some(field);
            }
        }
        self.started = true;
        Ok(())
    }

    fn report(
        &self,
        mesh: &PolyMesh,
        comm: &dyn Parallel,
        phiv: &[f64],
        alphas: &[VolScalarField],
        delta_t: f64,
    ) -> CourantNumbers {
        let co = courant_number(mesh, comm, phiv, delta_t);
        if comm.is_master() {
            info!("Courant Number mean: {:e} max: {:e}", co.mean, co.max);
        }
        if alphas.len() >= 2 {
            let aco = interface_courant_number(mesh, comm, phiv, alphas, delta_t);
            if comm.is_master() {
                info!("Interface Courant Number mean: {:e} max: {:e}", aco.mean, aco.max);
            }
        }
        co
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::BoxMeshBuilder;
    use crate::parallel::SerialCommunicator;
    use hx_config::TimeScheme;

    #[test]
    fn test_adaptive_step_tracks_courant() {
        let mesh = BoxMeshBuilder::new([10, 1, 1], [1.0, 0.1, 0.1]).build().unwrap();
        let phi: Vec<f64> = mesh.face_areas().iter().map(|sf| sf.x).collect();
        let mut time = TimeState::with_scheme(TimeScheme::Euler, 0.01);
        let mut ctrl = TimeStepController::new(TimeStepMode::Adaptive(AdaptiveTimeConfig {
            adjust_time_step: true,
            max_co: 0.5,
            ..Default::default()
        }));
        // 首步直接缩放到 maxCo：Co = 0.1 → Δt = 0.05
        ctrl.update(&mesh, &SerialCommunicator, &mut time, &phi, &[]).unwrap();
        assert!((time.delta_t() - 0.05).abs() < 1e-9);
        // 之后已在 maxCo，保持不变
        ctrl.update(&mesh, &SerialCommunicator, &mut time, &phi, &[]).unwrap();
        assert!((time.delta_t() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_local_mode_sets_field() {
        let mesh = BoxMeshBuilder::new([4, 1, 1], [1.0, 0.25, 0.25]).build().unwrap();
        let phi: Vec<f64> = mesh.face_areas().iter().map(|sf| sf.x).collect();
        let mut time = TimeState::with_scheme(TimeScheme::LocalEuler, 1.0);
        let mut ctrl = TimeStepController::new(TimeStepMode::Local(LtsConfig::default()));
        ctrl.update(&mesh, &SerialCommunicator, &mut time, &phi, &[]).unwrap();
        let r = time.r_delta_t_field().unwrap();
        // Σ|φ|/(2 maxCo V) = 2·0.0625 / (1.8·0.015625)
        let expected = 2.0 * 0.0625 / (2.0 * 0.9 * 0.015625);
        for x in r {
            assert!((x - expected).abs() < 1e-9);
        }
        assert!(ctrl.r_delta_t().is_some());
    }
}
