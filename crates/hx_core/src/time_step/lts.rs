// crates/hx_core/src/time_step/lts.rs

//! 局部时间步（LTS）倒数场
//!
//! 计算顺序：
//!
//! 1. 流动 Courant 数约束 `rΔt = Σ|φ| / (2 maxCo V)`，不低于 `1/maxDeltaT`
//! 2. 多相时在界面附近（相分数乘积的面平均位于 [min, max]）按 `maxAlphaCo` 收紧
//! 3. 边界求值、空间平滑、界面扩散与扫掠
//! 4. 阻尼：`rΔt ≥ (1 - c) rΔt_old`，局部时间步每步最多增大到 `1/(1 - c)` 倍
//!
//! 阻尼只限制时间步增大，需要减小时间步时不受限制。

use crate::field::VolScalarField;
use crate::fvm::explicit;
use crate::mesh::PolyMesh;
use crate::parallel::{g_max, g_min, Parallel};
use hx_config::LtsConfig;
use hx_foundation::{HxError, HxResult};
use log::info;

/// 计算局部时间步倒数场
///
/// `previous` 为上一时间步的倒数场（阻尼使用），首个时间步为 `None`。
pub fn reciprocal_time_step(
    mesh: &PolyMesh,
    comm: &dyn Parallel,
    config: &LtsConfig,
    phiv: &[f64],
    alphas: &[VolScalarField],
    previous: Option<&[f64]>,
    r_delta_t: &mut VolScalarField,
) -> HxResult<()> {
    HxError::check_size("phiv", mesh.n_faces(), phiv.len())?;
    let sum_phi = explicit::surface_sum_mag(mesh, phiv);
    let vols = mesh.cell_volumes();
    let floor = 1.0 / config.max_delta_t;

    {
        let r = r_delta_t.internal_mut();
        for c in 0..mesh.n_cells() {
            r[c] = (sum_phi[c] / (2.0 * config.max_co * vols[c])).max(floor);
        }
    }

    let indicator = interface_indicator(mesh, alphas);
    if let Some(indicator) = &indicator {
        if config.max_alpha_co < config.max_co {
            let face_values = explicit::interpolate_cells(mesh, indicator);
            let alpha_bar = explicit::average(mesh, &face_values);
            let r = r_delta_t.internal_mut();
            for c in 0..mesh.n_cells() {
                let near = alpha_bar[c] >= config.alpha_spread_min && alpha_bar[c] <= config.alpha_spread_max;
                if near {
                    r[c] = r[c].max(sum_phi[c] / (2.0 * config.max_alpha_co * vols[c]));
                }
            }
        }
    }

    r_delta_t.correct_boundary_conditions(mesh);

    if config.r_delta_t_smoothing_coeff < 1.0 {
        smooth(mesh, comm, r_delta_t.internal_mut(), config.r_delta_t_smoothing_coeff)?;
    }
    if let Some(indicator) = &indicator {
        if config.n_alpha_spread_iter > 0 {
            spread(
                mesh,
                comm,
                r_delta_t.internal_mut(),
                indicator,
                config.n_alpha_spread_iter,
                config.alpha_spread_diff,
                config.alpha_spread_max,
                config.alpha_spread_min,
            )?;
        }
        if config.n_alpha_sweep_iter > 0 {
            sweep(
                mesh,
                comm,
                r_delta_t.internal_mut(),
                indicator,
                config.n_alpha_sweep_iter,
                config.alpha_spread_diff,
            )?;
        }
    }

    if config.r_delta_t_damping_coeff < 1.0 {
        if let Some(old) = previous {
            HxError::check_size("rDeltaT0", mesh.n_cells(), old.len())?;
            let keep = 1.0 - config.r_delta_t_damping_coeff;
            for (r, r0) in r_delta_t.internal_mut().iter_mut().zip(old) {
                *r = r.max(keep * r0);
            }
        }
    }
    r_delta_t.correct_boundary_conditions(mesh);

    let r = r_delta_t.internal();
    let dt_min = g_min(comm, r.iter().map(|x| 1.0 / x));
    let dt_max = g_max(comm, r.iter().map(|x| 1.0 / x));
    if comm.is_master() {
        info!("deltaT: Flow = {:e}, {:e}", dt_min, dt_max);
    }
    Ok(())
}

/// 界面指示量：全部相分数的乘积；单相时为 `None`
fn interface_indicator(mesh: &PolyMesh, alphas: &[VolScalarField]) -> Option<Vec<f64>> {
    if alphas.len() < 2 {
        return None;
    }
    let mut product = vec![1.0; mesh.n_cells()];
    for alpha in alphas {
        for (p, a) in product.iter_mut().zip(alpha.internal()) {
            *p *= a;
        }
    }
    Some(product)
}

// ============================================================================
// 平滑、扩散与扫掠
// ============================================================================

/// 空间平滑：相邻单元之比不超过 `1 + coeff`，较小值被抬高
pub fn smooth(mesh: &PolyMesh, comm: &dyn Parallel, field: &mut [f64], coeff: f64) -> HxResult<()> {
    let ratio = 1.0 + coeff;
    let max_sweeps = mesh.n_cells().max(1);
    for _ in 0..max_sweeps {
        let mut changed = false;
        for f in 0..mesh.n_internal_faces() {
            let o = mesh.owner()[f];
            let n = mesh.neighbour()[f];
            if field[o] > ratio * field[n] {
                field[n] = field[o] / ratio;
                changed = true;
            } else if field[n] > ratio * field[o] {
                field[o] = field[n] / ratio;
                changed = true;
            }
        }
        for (pi, patch) in mesh.patches().iter().enumerate() {
            if !patch.kind.is_coupled() {
                continue;
            }
            let cells = mesh.patch_face_cells(pi);
            let local: Vec<f64> = cells.iter().map(|&c| field[c]).collect();
            let remote = comm.swap_patch_cell_values(mesh, pi, &local)?;
            for (&c, r) in cells.iter().zip(remote) {
                if r > ratio * field[c] {
                    field[c] = r / ratio;
                    changed = true;
                }
            }
        }
        if !comm.any_true(changed) {
            break;
        }
    }
    Ok(())
}

/// 界面扩散：在界面区内相分数跳变明显的面上，把两侧较大值向外传播 `n_layers` 层
#[allow(clippy::too_many_arguments)]
pub fn spread(
    mesh: &PolyMesh,
    comm: &dyn Parallel,
    field: &mut [f64],
    indicator: &[f64],
    n_layers: usize,
    diff: f64,
    max: f64,
    min: f64,
) -> HxResult<()> {
    let inside = |a: f64| a > min && a < max;
    propagate_max(mesh, comm, field, indicator, n_layers, |a, b| {
        (inside(a) || inside(b)) && (a - b).abs() > diff
    })
}

/// 界面扫掠：相分数跳变超过 `diff` 的面上，把较大值传播 `n_layers` 层
pub fn sweep(
    mesh: &PolyMesh,
    comm: &dyn Parallel,
    field: &mut [f64],
    indicator: &[f64],
    n_layers: usize,
    diff: f64,
) -> HxResult<()> {
    propagate_max(mesh, comm, field, indicator, n_layers, |a, b| (a - b).abs() > diff)
}

/// 以满足 `seed(a_owner, a_neighbour)` 的面为源，逐层传播最大值
fn propagate_max(
    mesh: &PolyMesh,
    comm: &dyn Parallel,
    field: &mut [f64],
    indicator: &[f64],
    n_layers: usize,
    seed: impl Fn(f64, f64) -> bool,
) -> HxResult<()> {
    let n_faces = mesh.n_faces();
    let mut face_value: Vec<Option<f64>> = vec![None; n_faces];

    for f in 0..mesh.n_internal_faces() {
        let o = mesh.owner()[f];
        let n = mesh.neighbour()[f];
        if seed(indicator[o], indicator[n]) {
            face_value[f] = Some(field[o].max(field[n]));
        }
    }
    for (pi, patch) in mesh.patches().iter().enumerate() {
        if !patch.kind.is_coupled() {
            continue;
        }
        let cells = mesh.patch_face_cells(pi);
        let ind: Vec<f64> = cells.iter().map(|&c| indicator[c]).collect();
        let val: Vec<f64> = cells.iter().map(|&c| field[c]).collect();
        let remote_ind = comm.swap_patch_cell_values(mesh, pi, &ind)?;
        let remote_val = comm.swap_patch_cell_values(mesh, pi, &val)?;
        for (i, &c) in cells.iter().enumerate() {
            if seed(indicator[c], remote_ind[i]) {
                face_value[patch.start + i] = Some(field[c].max(remote_val[i]));
            }
        }
    }

    for _ in 0..n_layers {
        let mut changed_cells = Vec::new();
        for (f, v) in face_value.iter().enumerate() {
            let Some(v) = *v else { continue };
            let o = mesh.owner()[f];
            if v > field[o] {
                field[o] = v;
                changed_cells.push(o);
            }
            if let Some(n) = mesh.neighbour_of(f) {
                if v > field[n] {
                    field[n] = v;
                    changed_cells.push(n);
                }
            }
        }
        face_value.iter_mut().for_each(|v| *v = None);
        for c in changed_cells {
            for &f in mesh.cell_faces(c) {
                let cur = face_value[f].unwrap_or(f64::MIN);
                face_value[f] = Some(cur.max(field[c]));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::BoxMeshBuilder;
    use crate::parallel::SerialCommunicator;

    #[test]
    fn test_smooth_limits_neighbour_ratio() {
        let mesh = BoxMeshBuilder::new([5, 1, 1], [5.0, 1.0, 1.0]).build().unwrap();
        let mut field = vec![1.0, 1.0, 100.0, 1.0, 1.0];
        smooth(&mesh, &SerialCommunicator, &mut field, 0.1).unwrap();
        for w in field.windows(2) {
            let r = w[0].max(w[1]) / w[0].min(w[1]);
            assert!(r <= 1.1 + 1e-12, "{field:?}");
        }
        assert_eq!(field[2], 100.0);
    }

    #[test]
    fn test_sweep_spreads_layers() {
        let mesh = BoxMeshBuilder::new([8, 1, 1], [8.0, 1.0, 1.0]).build().unwrap();
        let mut field = vec![1.0; 8];
        field[4] = 5.0;
        let mut indicator = vec![0.0; 8];
        indicator[4] = 1.0;
        sweep(&mesh, &SerialCommunicator, &mut field, &indicator, 2, 0.5).unwrap();
        // 源面为 3|4 与 4|5，第一层到 3、5，第二层到 2、6
        assert_eq!(field, vec![1.0, 1.0, 5.0, 5.0, 5.0, 5.0, 5.0, 1.0]);
    }
}
