// crates/hx_core/src/time_step/courant.rs

//! Courant 数与全局自适应时间步
//!
//! 单元 Courant 数 `Co = 0.5 Σ|φ| / V · Δt`；界面 Courant 数只统计
//! 任一相分数处于 [0.01, 0.99] 的混合单元相邻面。

use crate::field::VolScalarField;
use crate::fvm::explicit;
use crate::mesh::PolyMesh;
use crate::parallel::{g_max, Parallel};
use hx_foundation::SMALL;

/// 混合单元判定下限
const MIXED_MIN: f64 = 0.01;
/// 混合单元判定上限
const MIXED_MAX: f64 = 0.99;

/// Courant 数统计
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CourantNumbers {
    /// 体积加权平均
    pub mean: f64,
    /// 最大值
    pub max: f64,
}

/// 流动 Courant 数
pub fn courant_number(mesh: &PolyMesh, comm: &dyn Parallel, phiv: &[f64], delta_t: f64) -> CourantNumbers {
    let sum_phi = explicit::surface_sum_mag(mesh, phiv);
    statistics(mesh, comm, &sum_phi, delta_t)
}

/// 界面 Courant 数（只统计混合单元相邻面）
pub fn interface_courant_number(
    mesh: &PolyMesh,
    comm: &dyn Parallel,
    phiv: &[f64],
    alphas: &[VolScalarField],
    delta_t: f64,
) -> CourantNumbers {
    let mask = mixed_cells(mesh, alphas);
    let mask_f = explicit::interpolate_cells(mesh, &mask);
    let masked: Vec<f64> = phiv.iter().zip(&mask_f).map(|(p, m)| p * m).collect();
    let sum_phi = explicit::surface_sum_mag(mesh, &masked);
    statistics(mesh, comm, &sum_phi, delta_t)
}

/// 混合单元标记：任一相分数位于 [0.01, 0.99] 时为 1
pub fn mixed_cells(mesh: &PolyMesh, alphas: &[VolScalarField]) -> Vec<f64> {
    (0..mesh.n_cells())
        .map(|c| {
            let mixed = alphas.iter().any(|a| {
                let x = a.internal()[c];
                (MIXED_MIN..=MIXED_MAX).contains(&x)
            });
            if mixed {
                1.0
            } else {
                0.0
            }
        })
        .collect()
}

fn statistics(mesh: &PolyMesh, comm: &dyn Parallel, sum_phi: &[f64], delta_t: f64) -> CourantNumbers {
    let vols = mesh.cell_volumes();
    let max = 0.5 * g_max(comm, sum_phi.iter().zip(vols).map(|(s, v)| s / v)) * delta_t;
    let total_phi = comm.sum(sum_phi.iter().sum());
    let total_vol = comm.sum(vols.iter().sum());
    let mean = 0.5 * total_phi / total_vol.max(SMALL) * delta_t;
    CourantNumbers {
        mean,
        max: max.max(0.0),
    }
}

/// 自适应时间步
///
/// `f = maxCo / (Co + small)`（界面 Courant 数取两者较小值），
/// 放大倍数限制为 `min(f, 1 + 0.1 f, 1.2)`，结果不超过 `max_delta_t`。
pub fn adjusted_delta_t(
    delta_t: f64,
    co: f64,
    max_co: f64,
    interface: Option<(f64, f64)>,
    max_delta_t: f64,
) -> f64 {
    let mut factor = max_co / (co + SMALL);
    if let Some((alpha_co, max_alpha_co)) = interface {
        factor = factor.min(max_alpha_co / (alpha_co + SMALL));
    }
    let growth = factor.min(1.0 + 0.1 * factor).min(1.2);
    (growth * delta_t).min(max_delta_t)
}

/// 计算开始时的时间步：直接缩放到 `maxCo`，不限制增长
pub fn initial_delta_t(delta_t: f64, co: f64, max_co: f64, max_delta_t: f64) -> f64 {
    if co > SMALL {
        (max_co * delta_t / co).min(max_delta_t)
    } else {
        delta_t.min(max_delta_t)
    }
}
