// crates/hx_core/src/fvm/implicit.rs

//! 隐式有限体积算子（fvm）
//!
//! 每个算子返回一个 [`FvMatrix`]，表示 `R(x)` 中的一项，
//! 可用 `+=` / `-=` / 取负组合成完整方程。
//!
//! - 时间项：Euler / localEuler 一阶隐式，稳态为零；
//!   Crank-Nicolson 在矩阵层按 Euler 处理
//! - 对流项：上游格式进矩阵，高阶格式差值作为延迟修正进右端
//! - 扩散项：正交部分隐式，非正交修正显式并记入面通量修正

use super::explicit::{face_normal, grad_component, interpolate_cells, scheme_correction};
use super::{FvMatrix, TimeState};
use crate::field::{FieldValue, VolField};
use crate::mesh::PolyMesh;
use hx_config::ConvectionScheme;

// ============================================================================
// 时间项
// ============================================================================

/// `ddt(x)`
pub fn ddt<T: FieldValue>(mesh: &PolyMesh, time: &TimeState, field: &VolField<T>) -> FvMatrix<T> {
    let ones = vec![1.0; mesh.n_cells()];
    ddt_rho(mesh, time, &ones, &ones, field)
}

/// `ddt(ρ, x)`：对角 `rΔt ρ V`，右端 `rΔt ρ_old x_old V`
pub fn ddt_rho<T: FieldValue>(
    mesh: &PolyMesh,
    time: &TimeState,
    rho: &[f64],
    rho_old: &[f64],
    field: &VolField<T>,
) -> FvMatrix<T> {
    let mut m = FvMatrix::new(field.name(), mesh);
    if time.is_steady() {
        return m;
    }
    let x_old = field.old_time_or_current();
    for (c, v) in mesh.cell_volumes().iter().enumerate() {
        let r_dt = time.r_delta_t(c);
        m.diag_mut()[c] += r_dt * rho[c] * v;
        m.source_mut()[c] += x_old[c] * (r_dt * rho_old[c] * v);
    }
    m
}

// ============================================================================
// 对流项
// ============================================================================

/// `div(φ, x)`
///
/// `phi` 为全部面上的通量（体积或质量通量均可）。
pub fn div<T: FieldValue>(
    mesh: &PolyMesh,
    phi: &[f64],
    field: &VolField<T>,
    scheme: ConvectionScheme,
) -> FvMatrix<T> {
    let mut m = FvMatrix::new(field.name(), mesh);
    let owner = mesh.owner();
    let neighbour = mesh.neighbour();

    for f in 0..mesh.n_internal_faces() {
        let flux = phi[f];
        m.diag_mut()[owner[f]] += flux.max(0.0);
        m.diag_mut()[neighbour[f]] += (-flux).max(0.0);
        m.upper_mut()[f] = flux.min(0.0);
        m.lower_mut()[f] = -flux.max(0.0);
    }

    let x = field.internal();
    for (pi, patch) in mesh.patches().iter().enumerate() {
        let cells = mesh.patch_face_cells(pi);
        let pf = field.boundary(pi);
        for (i, &c) in cells.iter().enumerate() {
            let face = patch.start + i;
            let (vic, vbc) =
                pf.value_coeffs(i, x[c], face_normal(mesh, face), mesh.delta_coeffs()[face]);
            m.internal_coeffs_mut(pi)[i] = phi[face] * vic;
            m.boundary_coeffs_mut(pi)[i] = -(vbc * phi[face]);
        }
    }

    if scheme != ConvectionScheme::Upwind {
        let corr = scheme_correction(mesh, field, phi, scheme);
        for f in 0..mesh.n_internal_faces() {
            let c = corr[f] * phi[f];
            m.source_mut()[owner[f]] -= c;
            m.source_mut()[neighbour[f]] += c;
        }
    }
    m
}

// ============================================================================
// 扩散项
// ============================================================================

/// `laplacian(γ, x)`，`gamma_f` 为面上扩散系数
pub fn laplacian<T: FieldValue>(mesh: &PolyMesh, gamma_f: &[f64], field: &VolField<T>) -> FvMatrix<T> {
    let mut m = FvMatrix::new(field.name(), mesh);
    let owner = mesh.owner();
    let neighbour = mesh.neighbour();
    let mag_sf = mesh.mag_sf();

    for f in 0..mesh.n_internal_faces() {
        let c = gamma_f[f] * mag_sf[f] * mesh.non_orth_delta_coeffs()[f];
        m.diag_mut()[owner[f]] -= c;
        m.diag_mut()[neighbour[f]] -= c;
        m.upper_mut()[f] = c;
        m.lower_mut()[f] = c;
    }

    let x = field.internal();
    for (pi, patch) in mesh.patches().iter().enumerate() {
        let cells = mesh.patch_face_cells(pi);
        let pf = field.boundary(pi);
        for (i, &c) in cells.iter().enumerate() {
            let face = patch.start + i;
            let (gic, gbc) =
                pf.gradient_coeffs(i, x[c], face_normal(mesh, face), mesh.delta_coeffs()[face]);
            let g = gamma_f[face] * mag_sf[face];
            m.internal_coeffs_mut(pi)[i] = g * gic;
            m.boundary_coeffs_mut(pi)[i] = -(gbc * g);
        }
    }

    if mesh.is_non_orthogonal() {
        let corr_vec = mesh.non_orth_correction_vectors();
        let mut correction = vec![T::ZERO; mesh.n_faces()];
        for d in 0..T::N_COMPONENTS {
            let grad_f = interpolate_cells(mesh, &grad_component(mesh, field, d));
            for f in 0..mesh.n_internal_faces() {
                let v = gamma_f[f] * mag_sf[f] * corr_vec[f].dot(grad_f[f]);
                correction[f].set_component(d, v);
            }
        }
        for f in 0..mesh.n_internal_faces() {
            m.source_mut()[owner[f]] -= correction[f];
            m.source_mut()[neighbour[f]] += correction[f];
        }
        m.add_face_flux_correction(correction);
    }
    m
}

// ============================================================================
// 源项
// ============================================================================

/// 隐式源 `Sp(sp, x)`：对角 `sp V`
pub fn sp<T: FieldValue>(mesh: &PolyMesh, sp: &[f64], field: &VolField<T>) -> FvMatrix<T> {
    let mut m = FvMatrix::new(field.name(), mesh);
    m.add_sp(mesh, sp);
    m
}

/// 显式源 `Su(su)`：右端项 `-su V`，即 `R(x) += su V`
pub fn su<T: FieldValue>(mesh: &PolyMesh, su: &[T], field: &VolField<T>) -> FvMatrix<T> {
    let mut m = FvMatrix::new(field.name(), mesh);
    let integrated: Vec<T> = su
        .iter()
        .zip(mesh.cell_volumes())
        .map(|(s, v)| *s * *v)
        .collect();
    m.add_explicit(&integrated);
    m
}
