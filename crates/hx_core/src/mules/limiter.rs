// crates/hx_core/src/mules/limiter.rs

//! MULES 通量限制器
//!
//! 对高阶修正通量逐面求限制因子 λ ∈ [0, 1]，使修正后每个单元的值
//! 不超出由自身、邻居（显式形式还包括旧时间层）确定的局部极值。
//!
//! 输运方程约定为 `ddt(ψ) + div(φψ) = Su + Sp ψ`（ρ ≡ 1，静网格）：
//!
//! - [`limit`]: 显式形式，`phi_bd` 为有界（迎风）通量，`phi_corr` 为修正
//! - [`limit_corr`]: 半隐式形式，ψ 已由隐式预测给出，只限制修正量
//! - [`limit_sum`]: 多相修正通量逐面求和为零
//! - [`explicit_solve`] / [`correct`]: 用通量更新场

use crate::field::VolScalarField;
use crate::fvm::explicit;
use crate::mesh::PolyMesh;
use crate::parallel::Parallel;
use hx_config::MulesConfig;
use hx_foundation::{HxError, HxResult, SMALL};

/// λ 分母下限
const ROOT_VSMALL: f64 = 1e-150;

// ============================================================================
// 参数
// ============================================================================

/// 限制器控制参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimiterControls {
    /// λ 迭代次数
    pub n_iter: usize,
    /// 极值放宽系数
    pub extrema_coeff: f64,
    /// 边界单元极值放宽系数
    pub boundary_extrema_coeff: f64,
    /// 平滑系数
    pub smooth_limiter: f64,
}

impl LimiterControls {
    /// 由 MULES 配置提取
    pub fn from_config(config: &MulesConfig) -> Self {
        Self {
            n_iter: config.n_limiter_iter.max(1),
            extrema_coeff: config.extrema_coeff,
            boundary_extrema_coeff: config.boundary_extrema_coeff,
            smooth_limiter: config.smooth_limiter,
        }
    }
}

impl Default for LimiterControls {
    fn default() -> Self {
        Self::from_config(&MulesConfig::default())
    }
}

/// 输运方程的逐单元数据
#[derive(Debug, Clone, Copy)]
pub struct TransportTerms<'a> {
    /// 逐单元 1/Δt
    pub r_delta_t: &'a [f64],
    /// 隐式源项系数
    pub sp: &'a [f64],
    /// 显式源项
    pub su: &'a [f64],
    /// 全局上界
    pub psi_max: f64,
    /// 全局下界
    pub psi_min: f64,
}

impl TransportTerms<'_> {
    fn check(&self, mesh: &PolyMesh) -> HxResult<()> {
        HxError::check_size("rDeltaT", mesh.n_cells(), self.r_delta_t.len())?;
        HxError::check_size("Sp", mesh.n_cells(), self.sp.len())?;
        HxError::check_size("Su", mesh.n_cells(), self.su.len())
    }
}

// ============================================================================
// 局部极值
// ============================================================================

/// 每个单元允许的局部极值 (max, min)
fn local_extrema(
    mesh: &PolyMesh,
    comm: &dyn Parallel,
    psi: &VolScalarField,
    psi0: Option<&[f64]>,
    terms: &TransportTerms<'_>,
    controls: &LimiterControls,
) -> HxResult<(Vec<f64>, Vec<f64>)> {
    let x = psi.internal();
    let mut max_n = x.to_vec();
    let mut min_n = x.to_vec();
    if let Some(old) = psi0 {
        for c in 0..x.len() {
            max_n[c] = max_n[c].max(old[c]);
            min_n[c] = min_n[c].min(old[c]);
        }
    }

    for f in 0..mesh.n_internal_faces() {
        let o = mesh.owner()[f];
        let n = mesh.neighbour()[f];
        max_n[o] = max_n[o].max(x[n]);
        min_n[o] = min_n[o].min(x[n]);
        max_n[n] = max_n[n].max(x[o]);
        min_n[n] = min_n[n].min(x[o]);
    }

    let mut at_boundary = vec![false; x.len()];
    for (pi, patch) in mesh.patches().iter().enumerate() {
        let cells = mesh.patch_face_cells(pi);
        if patch.kind.is_coupled() {
            let local: Vec<f64> = cells.iter().map(|&c| x[c]).collect();
            let remote = comm.swap_patch_cell_values(mesh, pi, &local)?;
            HxError::check_size("swap", local.len(), remote.len())?;
            for (&c, r) in cells.iter().zip(remote) {
                max_n[c] = max_n[c].max(r);
                min_n[c] = min_n[c].min(r);
            }
        } else {
            let pf = psi.boundary(pi);
            if pf.fixes_value() {
                for (&c, v) in cells.iter().zip(pf.values()) {
                    max_n[c] = max_n[c].max(*v);
                    min_n[c] = min_n[c].min(*v);
                }
            }
            for &c in cells {
                at_boundary[c] = true;
            }
        }
    }

    let range = terms.psi_max - terms.psi_min;
    let smooth = controls.smooth_limiter;
    for c in 0..x.len() {
        let coeff = if at_boundary[c] {
            controls.extrema_coeff.max(controls.boundary_extrema_coeff)
        } else {
            controls.extrema_coeff
        };
        max_n[c] = (max_n[c] + coeff * range).min(terms.psi_max);
        min_n[c] = (min_n[c] - coeff * range).max(terms.psi_min);
        if smooth > SMALL {
            max_n[c] = (smooth * x[c] + (1.0 - smooth) * max_n[c]).min(terms.psi_max);
            min_n[c] = (smooth * x[c] + (1.0 - smooth) * min_n[c]).max(terms.psi_min);
        }
    }
    Ok((max_n, min_n))
}

// ============================================================================
// λ 迭代
// ============================================================================

/// 正/负修正通量逐单元累加：(流出和, 流入和)，均为非负
fn split_sums(mesh: &PolyMesh, flux: impl Fn(usize) -> f64) -> (Vec<f64>, Vec<f64>) {
    let mut out = vec![0.0; mesh.n_cells()];
    let mut inflow = vec![0.0; mesh.n_cells()];
    for f in 0..mesh.n_faces() {
        let pc = flux(f);
        let o = mesh.owner()[f];
        if pc > 0.0 {
            out[o] += pc;
        } else {
            inflow[o] -= pc;
        }
        if let Some(n) = mesh.neighbour_of(f) {
            if pc > 0.0 {
                inflow[n] += pc;
            } else {
                out[n] -= pc;
            }
        }
    }
    (out, inflow)
}

/// 由允许增量 `q_plus`、允许减量 `q_minus` 迭代求面限制因子
///
/// `boundary_flux` 为非耦合边界面上与修正量叠加的基础通量，只限制净流出面。
fn face_lambdas(
    mesh: &PolyMesh,
    comm: &dyn Parallel,
    phi_corr: &[f64],
    q_plus: &[f64],
    q_minus: &[f64],
    boundary_flux: Option<&[f64]>,
    n_iter: usize,
) -> HxResult<Vec<f64>> {
    let n_cells = mesh.n_cells();
    let (sum_phip, m_sum_phim) = split_sums(mesh, |f| phi_corr[f]);

    let mut lambda = vec![1.0; mesh.n_faces()];
    let mut lambda_p = vec![0.0; n_cells];
    let mut lambda_m = vec![0.0; n_cells];

    for _ in 0..n_iter.max(1) {
        let (sum_lphip, m_sum_lphim) = split_sums(mesh, |f| lambda[f] * phi_corr[f]);

        for c in 0..n_cells {
            lambda_m[c] = ((sum_lphip[c] + q_plus[c]) / (m_sum_phim[c] + ROOT_VSMALL)).clamp(0.0, 1.0);
            lambda_p[c] = ((m_sum_lphim[c] + q_minus[c]) / (sum_phip[c] + ROOT_VSMALL)).clamp(0.0, 1.0);
        }

        for f in 0..mesh.n_internal_faces() {
            let o = mesh.owner()[f];
            let n = mesh.neighbour()[f];
            lambda[f] = if phi_corr[f] >= 0.0 {
                lambda_p[o].min(lambda_m[n])
            } else {
                lambda_m[o].min(lambda_p[n])
            };
        }

        for (pi, patch) in mesh.patches().iter().enumerate() {
            let cells = mesh.patch_face_cells(pi);
            if patch.kind.is_coupled() {
                let lp: Vec<f64> = cells.iter().map(|&c| lambda_p[c]).collect();
                let lm: Vec<f64> = cells.iter().map(|&c| lambda_m[c]).collect();
                let remote_p = comm.swap_patch_cell_values(mesh, pi, &lp)?;
                let remote_m = comm.swap_patch_cell_values(mesh, pi, &lm)?;
                for (i, &c) in cells.iter().enumerate() {
                    let f = patch.start + i;
                    lambda[f] = if phi_corr[f] >= 0.0 {
                        lambda_p[c].min(remote_m[i])
                    } else {
                        lambda_m[c].min(remote_p[i])
                    };
                }
            } else {
                for (i, &c) in cells.iter().enumerate() {
                    let f = patch.start + i;
                    let base = boundary_flux.map_or(0.0, |b| b[f]);
                    if base + phi_corr[f] > SMALL * SMALL {
                        let l = if phi_corr[f] > 0.0 { lambda_p[c] } else { lambda_m[c] };
                        lambda[f] = lambda[f].min(l);
                    }
                }
            }
        }
    }
    Ok(lambda)
}

// ============================================================================
// 限制
// ============================================================================

/// 显式 MULES 限制：就地缩放 `phi_corr`
///
/// `psi` 为当前值（求极值用），`psi0` 为时间步起点值，
/// `phi_bd` 为有界低阶通量，`phi` 为平均体积通量（判断边界流出）。
#[allow(clippy::too_many_arguments)]
pub fn limit(
    mesh: &PolyMesh,
    comm: &dyn Parallel,
    psi: &VolScalarField,
    psi0: &[f64],
    phi: &[f64],
    phi_bd: &[f64],
    phi_corr: &mut [f64],
    terms: &TransportTerms<'_>,
    controls: &LimiterControls,
) -> HxResult<()> {
    terms.check(mesh)?;
    HxError::check_size("phiBD", mesh.n_faces(), phi_bd.len())?;
    HxError::check_size("phiCorr", mesh.n_faces(), phi_corr.len())?;

    let (max_n, min_n) = local_extrema(mesh, comm, psi, Some(psi0), terms, controls)?;
    let sum_phi_bd = explicit::surface_sum(mesh, phi_bd);
    let vols = mesh.cell_volumes();

    let mut q_plus = vec![0.0; mesh.n_cells()];
    let mut q_minus = vec![0.0; mesh.n_cells()];
    for c in 0..mesh.n_cells() {
        let a = terms.r_delta_t[c] - terms.sp[c];
        let old = vols[c] * terms.r_delta_t[c] * psi0[c];
        q_plus[c] = vols[c] * (a * max_n[c] - terms.su[c]) - old + sum_phi_bd[c];
        q_minus[c] = vols[c] * (terms.su[c] - a * min_n[c]) + old - sum_phi_bd[c];
    }

    let lambda = face_lambdas(mesh, comm, phi_corr, &q_plus, &q_minus, Some(phi), controls.n_iter)?;
    for (pc, l) in phi_corr.iter_mut().zip(&lambda) {
        *pc *= l;
    }
    Ok(())
}

/// 半隐式 MULES 限制：`psi` 已是隐式预测值，就地缩放 `phi_corr`
pub fn limit_corr(
    mesh: &PolyMesh,
    comm: &dyn Parallel,
    psi: &VolScalarField,
    phi_corr: &mut [f64],
    terms: &TransportTerms<'_>,
    controls: &LimiterControls,
) -> HxResult<()> {
    terms.check(mesh)?;
    HxError::check_size("phiCorr", mesh.n_faces(), phi_corr.len())?;

    let (max_n, min_n) = local_extrema(mesh, comm, psi, None, terms, controls)?;
    let x = psi.internal();
    let vols = mesh.cell_volumes();

    let mut q_plus = vec![0.0; mesh.n_cells()];
    let mut q_minus = vec![0.0; mesh.n_cells()];
    for c in 0..mesh.n_cells() {
        let a = terms.r_delta_t[c] - terms.sp[c];
        let cur = x[c] * terms.r_delta_t[c];
        q_plus[c] = vols[c] * (a * max_n[c] - terms.su[c] - cur);
        q_minus[c] = vols[c] * (terms.su[c] - a * min_n[c] + cur);
    }

    let lambda = face_lambdas(mesh, comm, phi_corr, &q_plus, &q_minus, None, controls.n_iter)?;
    for (pc, l) in phi_corr.iter_mut().zip(&lambda) {
        *pc *= l;
    }
    Ok(())
}

/// 逐面缩放多相修正通量，使其和为零
///
/// 净正时缩小正通量，净负时缩小负通量。
pub fn limit_sum(phi_corrs: &mut [Vec<f64>]) {
    let Some(n_faces) = phi_corrs.first().map(Vec::len) else {
        return;
    };
    for f in 0..n_faces {
        let mut sum_pos = 0.0;
        let mut sum_neg = 0.0;
        for pc in phi_corrs.iter() {
            let v = pc[f];
            if v > 0.0 {
                sum_pos += v;
            } else {
                sum_neg += v;
            }
        }
        let sum = sum_pos + sum_neg;
        if sum > 0.0 && sum_pos > SMALL {
            let lambda = -sum_neg / sum_pos;
            for pc in phi_corrs.iter_mut() {
                if pc[f] > 0.0 {
                    pc[f] *= lambda;
                }
            }
        } else if sum < 0.0 && sum_neg < -SMALL {
            let lambda = -sum_pos / sum_neg;
            for pc in phi_corrs.iter_mut() {
                if pc[f] < 0.0 {
                    pc[f] *= lambda;
                }
            }
        }
    }
}

// ============================================================================
// 更新
// ============================================================================

/// 显式推进：`ψ = (ψ0 rΔt + Su - div(φψ)) / (rΔt - Sp)`
pub fn explicit_solve(
    mesh: &PolyMesh,
    psi: &mut VolScalarField,
    psi0: &[f64],
    phi_psi: &[f64],
    terms: &TransportTerms<'_>,
) -> HxResult<()> {
    terms.check(mesh)?;
    HxError::check_size("phiPsi", mesh.n_faces(), phi_psi.len())?;
    let div = explicit::div(mesh, phi_psi);
    for (c, x) in psi.internal_mut().iter_mut().enumerate() {
        let r = terms.r_delta_t[c];
        *x = (psi0[c] * r + terms.su[c] - div[c]) / (r - terms.sp[c]);
    }
    psi.correct_boundary_conditions(mesh);
    Ok(())
}

/// 半隐式修正：`ψ = (ψ rΔt + Su - div(φ_corr)) / (rΔt - Sp)`
pub fn correct(
    mesh: &PolyMesh,
    psi: &mut VolScalarField,
    phi_corr: &[f64],
    terms: &TransportTerms<'_>,
) -> HxResult<()> {
    terms.check(mesh)?;
    HxError::check_size("phiCorr", mesh.n_faces(), phi_corr.len())?;
    let div = explicit::div(mesh, phi_corr);
    for (c, x) in psi.internal_mut().iter_mut().enumerate() {
        let r = terms.r_delta_t[c];
        *x = (*x * r + terms.su[c] - div[c]) / (r - terms.sp[c]);
    }
    psi.correct_boundary_conditions(mesh);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::VolField;
    use crate::mesh::BoxMeshBuilder;
    use crate::parallel::SerialCommunicator;
    use hx_foundation::Dimensions;

    #[test]
    fn test_limit_sum_balances_faces() {
        let mut corrs = vec![vec![0.3, -0.2, 0.0], vec![0.1, 0.1, -0.4], vec![-0.2, 0.0, 0.1]];
        limit_sum(&mut corrs);
        for f in 0..3 {
            let s: f64 = corrs.iter().map(|c| c[f]).sum();
            assert!(s.abs() < 1e-14, "face {f}: {s}");
        }
        // 净负面只缩小负通量
        assert_eq!(corrs[0][1], -0.1);
        assert_eq!(corrs[1][1], 0.1);
    }

    #[test]
    fn test_limit_keeps_step_bounded() {
        // 10 单元一维阶跃，中心格式修正在无限制时会过冲
        let mesh = BoxMeshBuilder::new([10, 1, 1], [1.0, 0.1, 0.1]).build().unwrap();
        let mut alpha = VolField::new("alpha", Dimensions::DIMLESS, &mesh, 0.0);
        for c in 0..5 {
            alpha.internal_mut()[c] = 1.0;
        }
        alpha.correct_boundary_conditions(&mesh);

        let u = 1.0;
        let dt = 0.5 * 0.1 / u;
        let phi: Vec<f64> = mesh.face_areas().iter().map(|sf| sf.x * u).collect();
        let phi_bd: Vec<f64> = explicit::interpolate_upwind(&mesh, &alpha, &phi)
            .iter()
            .zip(&phi)
            .map(|(a, p)| a * p)
            .collect();
        let linear = explicit::interpolate(&mesh, &alpha);
        let mut phi_corr: Vec<f64> = linear
            .iter()
            .zip(&phi)
            .zip(&phi_bd)
            .map(|((a, p), bd)| a * p - bd)
            .collect();

        let n = mesh.n_cells();
        let r = vec![1.0 / dt; n];
        let zeros = vec![0.0; n];
        let terms = TransportTerms {
            r_delta_t: &r,
            sp: &zeros,
            su: &zeros,
            psi_max: 1.0,
            psi_min: 0.0,
        };
        let psi0 = alpha.internal().to_vec();
        limit(
            &mesh,
            &SerialCommunicator,
            &alpha,
            &psi0,
            &phi,
            &phi_bd,
            &mut phi_corr,
            &terms,
            &LimiterControls::default(),
        )
        .unwrap();
        let total: Vec<f64> = phi_bd.iter().zip(&phi_corr).map(|(a, b)| a + b).collect();
        explicit_solve(&mesh, &mut alpha, &psi0, &total, &terms).unwrap();
        for a in alpha.internal() {
            assert!(*a >= -1e-12 && *a <= 1.0 + 1e-12, "alpha = {a}");
        }
    }
}
