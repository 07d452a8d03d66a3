// crates/hx_core/src/fvm/explicit.rs

//! 显式有限体积算子（fvc）
//!
//! 所有算子返回普通数组：面量按全局面编号（内部面在前），
//! 单元量按单元编号。散度与梯度已除以单元体积，
//! `surface_sum` 系列不除体积。
//!
//! 插值格式：
//!
//! - `Linear`: 几何权重线性插值
//! - `Upwind`: 按面通量方向取上游值
//! - `VanLeer` / `Minmod`: TVD 限制，`x_f = x_U + ψ(r)(x_lin - x_U)`，
//!   矢量取各分量限制因子的最小值

use crate::field::{FieldValue, VolField, VolScalarField};
use crate::fvm::TimeState;
use crate::mesh::PolyMesh;
use glam::DVec3;
use hx_config::ConvectionScheme;
use hx_foundation::{SMALL, VSMALL};

/// TVD 梯度比的稳定上限
const TVD_R_CAP: f64 = 1000.0;

/// 单位面法向
#[inline]
pub fn face_normal(mesh: &PolyMesh, face: usize) -> DVec3 {
    mesh.face_areas()[face] / mesh.mag_sf()[face].max(VSMALL)
}

// ============================================================================
// 插值
// ============================================================================

/// 线性插值到面，边界面取边界值
pub fn interpolate<T: FieldValue>(mesh: &PolyMesh, field: &VolField<T>) -> Vec<T> {
    let x = field.internal();
    let w = mesh.weights();
    let mut faces = Vec::with_capacity(mesh.n_faces());
    for f in 0..mesh.n_internal_faces() {
        let o = mesh.owner()[f];
        let n = mesh.neighbour()[f];
        faces.push(x[o] * w[f] + x[n] * (1.0 - w[f]));
    }
    for pf in field.patches() {
        faces.extend_from_slice(pf.values());
    }
    faces
}

/// 单元数组线性插值，边界面取所在单元值
pub fn interpolate_cells<T: FieldValue>(mesh: &PolyMesh, cells: &[T]) -> Vec<T> {
    let w = mesh.weights();
    (0..mesh.n_faces())
        .map(|f| match mesh.neighbour_of(f) {
            Some(n) => cells[mesh.owner()[f]] * w[f] + cells[n] * (1.0 - w[f]),
            None => cells[mesh.owner()[f]],
        })
        .collect()
}

/// 按面通量方向取上游值，边界面取边界值
pub fn interpolate_upwind<T: FieldValue>(mesh: &PolyMesh, field: &VolField<T>, phi: &[f64]) -> Vec<T> {
    let x = field.internal();
    let mut faces = Vec::with_capacity(mesh.n_faces());
    for f in 0..mesh.n_internal_faces() {
        let c = if phi[f] >= 0.0 {
            mesh.owner()[f]
        } else {
            mesh.neighbour()[f]
        };
        faces.push(x[c]);
    }
    for pf in field.patches() {
        faces.extend_from_slice(pf.values());
    }
    faces
}

/// TVD 限制函数
pub fn limiter(scheme: ConvectionScheme, r: f64) -> f64 {
    match scheme {
        ConvectionScheme::Upwind => 0.0,
        ConvectionScheme::Linear => 1.0,
        ConvectionScheme::VanLeer => (r + r.abs()) / (1.0 + r.abs()),
        ConvectionScheme::Minmod => r.min(1.0).max(0.0),
    }
}

/// 梯度比 `r = 2 (d·∇x_C)/(x_D - x_C) - 1`
fn gradient_ratio(face_flux: f64, x_p: f64, x_n: f64, grad_p: DVec3, grad_n: DVec3, d: DVec3) -> f64 {
    let grad_f = x_n - x_p;
    let grad_cf = if face_flux > 0.0 {
        d.dot(grad_p)
    } else {
        d.dot(grad_n)
    };
    if grad_cf.abs() >= TVD_R_CAP * grad_f.abs() {
        2.0 * TVD_R_CAP * grad_cf.signum() * grad_f.signum() - 1.0
    } else {
        2.0 * (grad_cf / grad_f) - 1.0
    }
}

/// 内部面上格式值与上游值之差 `x_f - x_U`（边界面为零）
///
/// 隐式对流项用上游格式进矩阵，此差值作为延迟修正。
pub fn scheme_correction<T: FieldValue>(
    mesh: &PolyMesh,
    field: &VolField<T>,
    phi: &[f64],
    scheme: ConvectionScheme,
) -> Vec<T> {
    let mut corr = vec![T::ZERO; mesh.n_faces()];
    if scheme == ConvectionScheme::Upwind {
        return corr;
    }
    let x = field.internal();
    let w = mesh.weights();
    let tvd = matches!(scheme, ConvectionScheme::VanLeer | ConvectionScheme::Minmod);
    let grads: Vec<Vec<DVec3>> = if tvd {
        (0..T::N_COMPONENTS).map(|d| grad_component(mesh, field, d)).collect()
    } else {
        Vec::new()
    };
    let centres = mesh.cell_centres();

    for f in 0..mesh.n_internal_faces() {
        let o = mesh.owner()[f];
        let n = mesh.neighbour()[f];
        let lin = x[o] * w[f] + x[n] * (1.0 - w[f]);
        let up = if phi[f] >= 0.0 { x[o] } else { x[n] };
        let psi = if tvd {
            let d = centres[n] - centres[o];
            (0..T::N_COMPONENTS)
                .map(|k| {
                    let r = gradient_ratio(
                        phi[f],
                        x[o].component(k),
                        x[n].component(k),
                        grads[k][o],
                        grads[k][n],
                        d,
                    );
                    limiter(scheme, r)
                })
                .fold(f64::MAX, f64::min)
        } else {
            1.0
        };
        corr[f] = (lin - up) * psi;
    }
    corr
}

/// 按格式插值到面
pub fn interpolate_scheme<T: FieldValue>(
    mesh: &PolyMesh,
    field: &VolField<T>,
    phi: &[f64],
    scheme: ConvectionScheme,
) -> Vec<T> {
    let mut faces = interpolate_upwind(mesh, field, phi);
    for (x, c) in faces.iter_mut().zip(scheme_correction(mesh, field, phi, scheme)) {
        *x += c;
    }
    faces
}

// ============================================================================
// 通量
// ============================================================================

/// 体积通量 `U_f · Sf`
pub fn flux(mesh: &PolyMesh, u: &VolField<DVec3>) -> Vec<f64> {
    flux_of(mesh, &interpolate(mesh, u))
}

/// 面矢量与面积矢量的点积
pub fn flux_of(mesh: &PolyMesh, face_values: &[DVec3]) -> Vec<f64> {
    face_values
        .iter()
        .zip(mesh.face_areas())
        .map(|(v, sf)| v.dot(*sf))
        .collect()
}

// ============================================================================
// 求和、散度、梯度
// ============================================================================

/// 有向面求和：owner 加、neighbour 减（不除体积）
pub fn surface_sum(mesh: &PolyMesh, face: &[f64]) -> Vec<f64> {
    let mut sum = vec![0.0; mesh.n_cells()];
    for (f, v) in face.iter().enumerate() {
        sum[mesh.owner()[f]] += v;
        if let Some(n) = mesh.neighbour_of(f) {
            sum[n] -= v;
        }
    }
    sum
}

/// 面值绝对值求和（不除体积）
pub fn surface_sum_mag(mesh: &PolyMesh, face: &[f64]) -> Vec<f64> {
    let mut sum = vec![0.0; mesh.n_cells()];
    for (f, v) in face.iter().enumerate() {
        sum[mesh.owner()[f]] += v.abs();
        if let Some(n) = mesh.neighbour_of(f) {
            sum[n] += v.abs();
        }
    }
    sum
}

/// 通量散度 `Σφ / V`
pub fn div(mesh: &PolyMesh, face_flux: &[f64]) -> Vec<f64> {
    let mut d = surface_sum(mesh, face_flux);
    for (x, v) in d.iter_mut().zip(mesh.cell_volumes()) {
        *x /= v;
    }
    d
}

/// 通量输运量的散度 `Σ φ x_f / V`，`x_f` 按格式插值
pub fn div_convection(
    mesh: &PolyMesh,
    phi: &[f64],
    field: &VolScalarField,
    scheme: ConvectionScheme,
) -> Vec<f64> {
    let xf = interpolate_scheme(mesh, field, phi, scheme);
    let fluxes: Vec<f64> = phi.iter().zip(&xf).map(|(p, x)| p * x).collect();
    div(mesh, &fluxes)
}

/// 由面值计算 Gauss 梯度 `Σ x_f Sf / V`
pub fn grad_of(mesh: &PolyMesh, face_values: &[f64]) -> Vec<DVec3> {
    let mut g = vec![DVec3::ZERO; mesh.n_cells()];
    for (f, (x, sf)) in face_values.iter().zip(mesh.face_areas()).enumerate() {
        g[mesh.owner()[f]] += *sf * *x;
        if let Some(n) = mesh.neighbour_of(f) {
            g[n] -= *sf * *x;
        }
    }
    for (gc, v) in g.iter_mut().zip(mesh.cell_volumes()) {
        *gc /= *v;
    }
    g
}

/// 标量场 Gauss 线性梯度
pub fn grad(mesh: &PolyMesh, field: &VolScalarField) -> Vec<DVec3> {
    grad_of(mesh, &interpolate(mesh, field))
}

/// 场第 d 个分量的 Gauss 线性梯度
pub fn grad_component<T: FieldValue>(mesh: &PolyMesh, field: &VolField<T>, d: usize) -> Vec<DVec3> {
    let faces: Vec<f64> = interpolate(mesh, field).iter().map(|v| v.component(d)).collect();
    grad_of(mesh, &faces)
}

/// 单元数组的梯度，边界面取所在单元值
pub fn grad_cells(mesh: &PolyMesh, cells: &[f64]) -> Vec<DVec3> {
    grad_of(mesh, &interpolate_cells(mesh, cells))
}

/// 法向梯度（含非正交修正），边界面按边界条件
pub fn sn_grad(mesh: &PolyMesh, field: &VolScalarField) -> Vec<f64> {
    let x = field.internal();
    let mut sn = vec![0.0; mesh.n_faces()];
    let corr_vec = mesh.non_orth_correction_vectors();
    let grad_f = if mesh.is_non_orthogonal() {
        Some(interpolate_cells(mesh, &grad(mesh, field)))
    } else {
        None
    };
    for f in 0..mesh.n_internal_faces() {
        let o = mesh.owner()[f];
        let n = mesh.neighbour()[f];
        sn[f] = (x[n] - x[o]) * mesh.non_orth_delta_coeffs()[f];
        if let Some(g) = &grad_f {
            sn[f] += corr_vec[f].dot(g[f]);
        }
    }
    for (pi, patch) in mesh.patches().iter().enumerate() {
        let pf = field.boundary(pi);
        for (i, &c) in mesh.patch_face_cells(pi).iter().enumerate() {
            let face = patch.start + i;
            let (ic, bc) =
                pf.gradient_coeffs(i, x[c], face_normal(mesh, face), mesh.delta_coeffs()[face]);
            sn[face] = ic * x[c] + bc;
        }
    }
    sn
}

/// 面积加权的面值平均到单元 `Σ|Sf| x_f / Σ|Sf|`
pub fn average(mesh: &PolyMesh, face_values: &[f64]) -> Vec<f64> {
    let mut num = vec![0.0; mesh.n_cells()];
    let mut den = vec![0.0; mesh.n_cells()];
    for (f, (x, a)) in face_values.iter().zip(mesh.mag_sf()).enumerate() {
        let o = mesh.owner()[f];
        num[o] += a * x;
        den[o] += a;
        if let Some(n) = mesh.neighbour_of(f) {
            num[n] += a * x;
            den[n] += a;
        }
    }
    num.iter().zip(&den).map(|(n, d)| n / d.max(SMALL)).collect()
}

/// 本进程体积积分 `Σ x V`
pub fn domain_integrate(mesh: &PolyMesh, cells: &[f64]) -> f64 {
    cells.iter().zip(mesh.cell_volumes()).map(|(x, v)| x * v).sum()
}

/// 显式时间导数 `(x - x_old) / Δt`（稳态为零）
pub fn ddt(mesh: &PolyMesh, time: &TimeState, current: &[f64], old: &[f64]) -> Vec<f64> {
    (0..mesh.n_cells())
        .map(|c| (current[c] - old[c]) * time.r_delta_t(c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::BoxMeshBuilder;
    use hx_config::TimeScheme;
    use hx_foundation::Dimensions;

    fn box_mesh() -> PolyMesh {
        BoxMeshBuilder::new([3, 2, 2], [3.0, 2.0, 2.0]).build().unwrap()
    }

    #[test]
    fn test_linear_field_gradient_is_exact() {
        let mesh = box_mesh();
        let x: Vec<f64> = mesh
            .cell_centres()
            .iter()
            .map(|c| 2.0 * c.x - c.y + 0.5 * c.z)
            .collect();
        let mut field = VolField::from_internal("T", Dimensions::DIMLESS, &mesh, x).unwrap();
        for name in ["xmin", "xmax", "ymin", "ymax", "zmin", "zmax"] {
            field
                .set_boundary_kind(&mesh, name, crate::field::BoundaryKind::Calculated)
                .unwrap();
        }
        // 边界值设为精确值
        for (pi, patch) in mesh.patches().iter().enumerate() {
            for (i, f) in patch.faces().enumerate() {
                let c = mesh.face_centres()[f];
                field.boundary_mut(pi).values_mut()[i] = 2.0 * c.x - c.y + 0.5 * c.z;
            }
        }
        let g = grad(&mesh, &field);
        for gc in g {
            assert!((gc - DVec3::new(2.0, -1.0, 0.5)).length() < 1e-10);
        }
        let sn = sn_grad(&mesh, &field);
        for f in 0..mesh.n_internal_faces() {
            let n = face_normal(&mesh, f);
            assert!((sn[f] - n.dot(DVec3::new(2.0, -1.0, 0.5))).abs() < 1e-10);
        }
    }

    #[test]
    fn test_div_of_uniform_flux_is_zero() {
        let mesh = box_mesh();
        let u = VolField::new("U", Dimensions::VELOCITY, &mesh, DVec3::new(1.0, 0.5, 0.0));
        let phi = flux(&mesh, &u);
        let d = div(&mesh, &phi);
        assert!(d.iter().all(|x| x.abs() < 1e-12));
        let mag = surface_sum_mag(&mesh, &phi);
        assert!(mag.iter().all(|x| *x > 0.0));
    }

    #[test]
    fn test_limiters() {
        assert_eq!(limiter(ConvectionScheme::Upwind, 3.0), 0.0);
        assert_eq!(limiter(ConvectionScheme::Linear, -3.0), 1.0);
        assert_eq!(limiter(ConvectionScheme::VanLeer, -1.0), 0.0);
        assert!((limiter(ConvectionScheme::VanLeer, 1.0) - 1.0).abs() < 1e-15);
        assert_eq!(limiter(ConvectionScheme::Minmod, 0.5), 0.5);
        assert_eq!(limiter(ConvectionScheme::Minmod, 4.0), 1.0);
    }

    #[test]
    fn test_tvd_face_values_bounded() {
        let mesh = BoxMeshBuilder::new([6, 1, 1], [6.0, 1.0, 1.0]).build().unwrap();
        let x = vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0];
        let field = VolField::from_internal("a", Dimensions::DIMLESS, &mesh, x).unwrap();
        let phi = vec![1.0; mesh.n_faces()];
        for scheme in [ConvectionScheme::VanLeer, ConvectionScheme::Minmod] {
            let xf = interpolate_scheme(&mesh, &field, &phi, scheme);
            for f in 0..mesh.n_internal_faces() {
                assert!(xf[f] >= -1e-12 && xf[f] <= 1.0 + 1e-12);
            }
        }
    }

    #[test]
    fn test_average_and_integrate() {
        let mesh = box_mesh();
        let faces = vec![2.0; mesh.n_faces()];
        assert!(average(&mesh, &faces).iter().all(|x| (x - 2.0).abs() < 1e-12));
        let ones = vec![1.0; mesh.n_cells()];
        assert!((domain_integrate(&mesh, &ones) - 12.0).abs() < 1e-10);

        let time = TimeState::with_scheme(TimeScheme::Euler, 0.5);
        let d = ddt(&mesh, &time, &ones, &vec![0.0; mesh.n_cells()]);
        assert!((d[0] - 2.0).abs() < 1e-14);
    }
}
