// crates/hx_core/src/pressure_control.rs

//! 压力控制
//!
//! 决定压力水平是否需要固定（参考单元），并在求解后把压力限制在
//! 允许范围内。
//!
//! 需要参考值的条件：压力没有任何给定值边界（封闭域），且流体不可压
//! 或为稳态计算。参考单元由 `pRefCell` 给出，或取离 `pRefPoint`
//! 最近的单元；两者都未给出是致命配置错误。
//!
//! 限幅：`p ∈ [max(pMin, rhoMin/ψ), min(pMax, rhoMax/ψ)]`，
//! 密度界限只在 ψ > 0 的单元上起作用。

use crate::field::VolScalarField;
use crate::fvm::FvMatrix;
use crate::mesh::PolyMesh;
use crate::parallel::Parallel;
use glam::DVec3;
use hx_config::PressureControlConfig;
use hx_foundation::{HxError, HxResult, SMALL};

/// 压力控制
#[derive(Debug, Clone)]
pub struct PressureControl {
    ref_cell: Option<usize>,
    ref_value: f64,
    compressible: bool,
    p_min: Option<f64>,
    p_max: Option<f64>,
    rho_min: Option<f64>,
    rho_max: Option<f64>,
}

impl PressureControl {
    /// 由配置与压力场边界条件创建
    pub fn new(
        mesh: &PolyMesh,
        p: &VolScalarField,
        config: &PressureControlConfig,
        incompressible: bool,
        steady: bool,
        comm: &dyn Parallel,
    ) -> HxResult<Self> {
        let closed = comm.all_true(!p.has_fixed_value_patch());
        let needs_reference = closed && (incompressible || steady);

        let ref_cell = if needs_reference {
            let cell = match (config.p_ref_cell, config.p_ref_point) {
                (Some(cell), _) => {
                    HxError::check_index("pRefCell", cell, mesh.n_cells())?;
                    cell
                }
                (None, Some(point)) => mesh
                    .find_nearest_cell(DVec3::from_array(point))
                    .ok_or_else(|| HxError::missing_config("pRefPoint"))?,
                (None, None) => return Err(HxError::missing_config("pRefCell")),
            };
            log::info!("压力参考单元 {} (参考值 {})", cell, config.p_ref_value);
            Some(cell)
        } else {
            None
        };

        Ok(Self {
            ref_cell,
            ref_value: config.p_ref_value,
            compressible: !incompressible,
            p_min: config.p_min,
            p_max: config.p_max,
            rho_min: config.rho_min,
            rho_max: config.rho_max,
        })
    }

    /// 是否需要参考值
    pub fn needs_reference(&self) -> bool {
        self.ref_cell.is_some()
    }

    /// 参考单元
    pub fn ref_cell(&self) -> Option<usize> {
        self.ref_cell
    }

    /// 参考值：不可压取配置值，可压取参考单元当前压力
    pub fn ref_value(&self, p: &VolScalarField) -> f64 {
        match (self.compressible, self.ref_cell) {
            (true, Some(cell)) => p.internal()[cell],
            _ => self.ref_value,
        }
    }

    /// 需要时固定参考单元
    pub fn set_reference(&self, eqn: &mut FvMatrix<f64>, p: &VolScalarField) -> HxResult<()> {
        if let Some(cell) = self.ref_cell {
            eqn.set_reference(cell, self.ref_value(p))?;
        }
        Ok(())
    }

    /// 是否配置了任何界限
    pub fn has_limits(&self) -> bool {
        self.p_min.is_some() || self.p_max.is_some() || self.rho_min.is_some() || self.rho_max.is_some()
    }

    /// 单元压力界限
    pub fn bounds(&self, psi: f64) -> (f64, f64) {
        let mut lo = self.p_min.unwrap_or(f64::MIN);
        let mut hi = self.p_max.unwrap_or(f64::MAX);
        if psi > SMALL {
            if let Some(r) = self.rho_min {
                lo = lo.max(r / psi);
            }
            if let Some(r) = self.rho_max {
                hi = hi.min(r / psi);
            }
        }
        (lo, hi)
    }

    /// 限制压力，返回被限制的单元数（全局）
    pub fn limit(
        &self,
        mesh: &PolyMesh,
        p: &mut VolScalarField,
        psi: &[f64],
        comm: &dyn Parallel,
    ) -> usize {
        if !self.has_limits() {
            return 0;
        }
        let mut n_limited = 0;
        for (c, pv) in p.internal_mut().iter_mut().enumerate() {
            let (lo, hi) = self.bounds(psi.get(c).copied().unwrap_or(0.0));
            if *pv < lo || *pv > hi {
                *pv = pv.clamp(lo, hi.max(lo));
                n_limited += 1;
            }
        }
        let n_global = comm.sum_usize(n_limited);
        if n_global > 0 {
            p.correct_boundary_conditions(mesh);
            log::warn!("压力限幅: {} 个单元超出允许范围", n_global);
        }
        n_global
    }

    /// 把密度限制在 `[rhoMin, rhoMax]`（稳态可压使用）
    pub fn limit_rho(&self, rho: &mut [f64]) {
        let lo = self.rho_min.unwrap_or(0.0);
        let hi = self.rho_max.unwrap_or(f64::MAX);
        for r in rho.iter_mut() {
            *r = r.clamp(lo, hi);
        }
    }
}
