// crates/hx_core/src/rhie_chow.rs

//! Rhie-Chow 面通量重构
//!
//! 由动量矩阵的对角系数 A 与显式部分 H 构造不含压力梯度的面通量
//! `phiHbyA`，压力方程再以面上的 `rAU` 作扩散系数。由于压力梯度在面上
//! 用紧凑模板离散，奇偶解耦（棋盘格）被抑制。
//!
//! ```text
//! 体积基准: phiHbyA = (HbyA)_f·Sf + (ρ rAU)_f · ddtCorr
//!           系数    = (rAtU)_f
//! 质量基准: phiHbyA = ρ_f (HbyA)_f·Sf + (ρ rAU)_f · ddtCorr
//!           系数    = (ρ rAtU)_f
//! ddtCorr  = c · rΔt_f · (φ_old - ([ρ_old] U_old)_f·Sf)
//! c        = 1 - min(|φ_old - ([ρ_old] U_old)_f·Sf| / (|φ_old| + small), 1)
//! ```
//!
//! SIMPLEC（consistent）时 `rAtU = 1/max(A - H1, 0.01 A)`，并补上
//! `(rAtU - rAU)_f snGrad(p) |Sf|`。

use crate::field::{BoundaryKind, FieldValue, VolScalarField, VolVectorField};
use crate::fvm::{explicit, FvMatrix};
use crate::mesh::PolyMesh;
use crate::parallel::Parallel;
use crate::state::{FlowFields, FluxBasis, SolveContext};
use glam::DVec3;
use hx_foundation::{Dimensions, HxError, HxResult, SMALL, VSMALL};

/// SIMPLEC 中 `A - H1` 相对 A 的下限
const SIMPLEC_MIN_FRACTION: f64 = 0.01;

// ============================================================================
// 动量系数
// ============================================================================

/// 动量矩阵导出的系数
#[derive(Debug, Clone)]
pub struct MomentumCoefficients {
    /// 1/A
    pub r_au: Vec<f64>,
    /// SIMPLEC 的 1/(A - H1)，非 consistent 时等于 `r_au`
    pub r_at_u: Vec<f64>,
    /// H/A，边界按速度边界条件约束
    pub hby_a: VolVectorField,
    /// 是否 SIMPLEC
    pub consistent: bool,
}

impl MomentumCoefficients {
    /// 由动量矩阵（不含压力梯度）计算
    pub fn from_equation(
        mesh: &PolyMesh,
        eqn: &FvMatrix<DVec3>,
        u: &VolVectorField,
        consistent: bool,
    ) -> HxResult<Self> {
        let a = eqn.a(mesh);
        for (c, av) in a.iter().enumerate() {
            if !(*av > 0.0) || !av.is_finite() {
                return Err(HxError::breakdown("A(U)", c, *av, "动量矩阵对角系数非正"));
            }
        }
        let r_au: Vec<f64> = a.iter().map(|av| 1.0 / av).collect();
        let h = eqn.h(mesh, u);

        let r_at_u = if consistent {
            let h1 = eqn.h1(mesh);
            a.iter()
                .zip(&h1)
                .map(|(av, h1v)| 1.0 / (av - h1v).max(SIMPLEC_MIN_FRACTION * av))
                .collect()
        } else {
            r_au.clone()
        };

        let mut hby_a = u.like("HbyA", Dimensions::VELOCITY, DVec3::ZERO);
        for ((hb, hv), r) in hby_a.internal_mut().iter_mut().zip(&h).zip(&r_au) {
            *hb = *hv * *r;
        }
        constrain_hby_a(mesh, &mut hby_a, u);

        Ok(Self {
            r_au,
            r_at_u,
            hby_a,
            consistent,
        })
    }

    /// 压力梯度修正后的速度 `U = HbyA - rAtU ∇p`
    ///
    /// SIMPLEC 时 HbyA 已减去 `(rAU - rAtU)∇p`，因此统一乘 rAtU。
    pub fn corrected_velocity(&self, mesh: &PolyMesh, p: &VolScalarField) -> Vec<DVec3> {
        let grad_p = explicit::grad(mesh, p);
        self.hby_a
            .internal()
            .iter()
            .zip(&grad_p)
            .zip(&self.r_at_u)
            .map(|((h, g), r)| *h - *g * *r)
            .collect()
    }
}

/// HbyA 边界：给定速度边界取边界速度，滑移边界去掉法向分量，其余取单元值
pub fn constrain_hby_a(mesh: &PolyMesh, hby_a: &mut VolVectorField, u: &VolVectorField) {
    let internal = hby_a.internal().to_vec();
    for (pi, patch) in mesh.patches().iter().enumerate() {
        let cells = mesh.patch_face_cells(pi);
        let kind = u.boundary(pi).kind();
        let u_b = u.boundary(pi).values();
        let values = hby_a.boundary_mut(pi).values_mut();
        for (i, &c) in cells.iter().enumerate() {
            let face = patch.start + i;
            values[i] = match kind {
                BoundaryKind::FixedValue => u_b[i],
                BoundaryKind::Slip => internal[c].remove_normal(explicit::face_normal(mesh, face)),
                _ => internal[c],
            };
        }
    }
}

// ============================================================================
// 面通量
// ============================================================================

/// Rhie-Chow 结果
#[derive(Debug, Clone)]
pub struct RhieChowFlux {
    /// 不含压力梯度的面通量
    pub phi_hby_a: Vec<f64>,
    /// 压力方程扩散系数（面上）
    pub rhor_au_f: Vec<f64>,
}

/// Rhie-Chow 插值器
#[derive(Debug, Clone, Copy)]
pub struct RhieChowInterpolator {
    basis: FluxBasis,
    ddt_phi_corr: bool,
}

impl RhieChowInterpolator {
    /// 创建
    pub fn new(basis: FluxBasis, ddt_phi_corr: bool) -> Self {
        Self { basis, ddt_phi_corr }
    }

    /// 通量基准
    pub fn basis(&self) -> FluxBasis {
        self.basis
    }

    /// 时间项通量修正（内部面，边界面为零）
    pub fn ddt_corr(&self, ctx: &SolveContext<'_>, fields: &FlowFields) -> Vec<f64> {
        let mesh = ctx.mesh;
        let mut corr = vec![0.0; mesh.n_faces()];
        if !self.ddt_phi_corr || ctx.time.is_steady() || !fields.phi.has_old_time() {
            return corr;
        }
        let u_old = fields.u.old_time_or_current();
        let old_cells: Vec<DVec3> = match self.basis {
            FluxBasis::Volumetric => u_old.to_vec(),
            FluxBasis::Mass => u_old
                .iter()
                .zip(fields.rho.old_time_or_current())
                .map(|(u, r)| *u * *r)
                .collect(),
        };
        let old_f = explicit::interpolate_cells(mesh, &old_cells);
        let r_dt_f = explicit::interpolate_cells(mesh, &ctx.time.r_delta_t_cells(mesh.n_cells()));
        let phi_old = fields.phi.old_time_or_current();

        for f in 0..mesh.n_internal_faces() {
            let phi_corr = phi_old[f] - old_f[f].dot(mesh.face_areas()[f]);
            let coeff = 1.0 - (phi_corr.abs() / (phi_old[f].abs() + SMALL)).min(1.0);
            corr[f] = coeff * r_dt_f[f] * phi_corr;
        }
        corr
    }

    /// 计算 `phiHbyA` 与压力扩散系数
    pub fn face_flux(
        &self,
        ctx: &SolveContext<'_>,
        fields: &FlowFields,
        coeffs: &mut MomentumCoefficients,
    ) -> RhieChowFlux {
        let mesh = ctx.mesh;
        let rho = fields.rho.internal();
        let rho_f = fields.rho_f(mesh);

        let hby_a_f = explicit::interpolate(mesh, &coeffs.hby_a);
        let mut phi_hby_a: Vec<f64> = (0..mesh.n_faces())
            .map(|f| self.basis.face_weight(&rho_f, f) * hby_a_f[f].dot(mesh.face_areas()[f]))
            .collect();

        let ddt_corr = self.ddt_corr(ctx, fields);
        if ddt_corr.iter().any(|c| *c != 0.0) {
            let rho_r_au: Vec<f64> = rho.iter().zip(&coeffs.r_au).map(|(r, a)| r * a).collect();
            let rho_r_au_f = explicit::interpolate_cells(mesh, &rho_r_au);
            for f in 0..mesh.n_internal_faces() {
                phi_hby_a[f] += rho_r_au_f[f] * ddt_corr[f];
            }
        }

        let weighted = |r: &[f64]| -> Vec<f64> {
            let cells: Vec<f64> = match self.basis {
                FluxBasis::Volumetric => r.to_vec(),
                FluxBasis::Mass => r.iter().zip(rho).map(|(a, b)| a * b).collect(),
            };
            explicit::interpolate_cells(mesh, &cells)
        };

        if coeffs.consistent {
            let diff: Vec<f64> = coeffs
                .r_at_u
                .iter()
                .zip(&coeffs.r_au)
                .map(|(t, a)| t - a)
                .collect();
            let diff_f = weighted(&diff);
            let sn = explicit::sn_grad(mesh, &fields.p);
            for f in 0..mesh.n_faces() {
                if mesh.is_internal_face(f) || !fixes_flux(fields, mesh, f) {
                    phi_hby_a[f] += diff_f[f] * sn[f] * mesh.mag_sf()[f];
                }
            }
            let grad_p = explicit::grad(mesh, &fields.p);
            for (c, h) in coeffs.hby_a.internal_mut().iter_mut().enumerate() {
                *h -= grad_p[c] * diff[c];
            }
            constrain_hby_a(mesh, &mut coeffs.hby_a, &fields.u);
        }

        RhieChowFlux {
            phi_hby_a,
            rhor_au_f: weighted(&coeffs.r_at_u),
        }
    }
}

/// 边界面速度给定（通量由边界条件决定）
fn fixes_flux(fields: &FlowFields, mesh: &PolyMesh, face: usize) -> bool {
    mesh.face_patch(face)
        .map(|(p, _)| fields.u.boundary(p).fixes_value())
        .unwrap_or(false)
}

// ============================================================================
// 封闭域通量调整与压力边界约束
// ============================================================================

/// 调整出流通量使边界净通量为零（封闭或出流可调的不可压域）
///
/// 返回域是否完全封闭（边界无任何流量）。出流不可调且入流与给定出流
/// 不平衡时为致命配置错误。
pub fn adjust_phi(
    mesh: &PolyMesh,
    phi: &mut [f64],
    u: &VolVectorField,
    comm: &dyn Parallel,
) -> HxResult<bool> {
    let mut mass_in = 0.0;
    let mut fixed_out = 0.0;
    let mut adjustable_out = 0.0;
    for (pi, patch) in mesh.patches().iter().enumerate() {
        if patch.kind.is_coupled() {
            continue;
        }
        let fixed = u.boundary(pi).fixes_value();
        for f in patch.faces() {
            if phi[f] < 0.0 {
                mass_in -= phi[f];
            } else if fixed {
                fixed_out += phi[f];
            } else {
                adjustable_out += phi[f];
            }
        }
    }
    let mass_in = comm.sum(mass_in);
    let fixed_out = comm.sum(fixed_out);
    let adjustable_out = comm.sum(adjustable_out);
    let total = VSMALL + comm.sum(phi.iter().map(|p| p.abs()).sum());

    if adjustable_out > VSMALL && adjustable_out / total > SMALL {
        let corr = (mass_in - fixed_out) / adjustable_out;
        for (pi, patch) in mesh.patches().iter().enumerate() {
            if patch.kind.is_coupled() || u.boundary(pi).fixes_value() {
                continue;
            }
            for f in patch.faces() {
                if phi[f] > 0.0 {
                    phi[f] *= corr;
                }
            }
        }
    } else if (fixed_out - mass_in).abs() / total > 1e-8 {
        return Err(HxError::invalid_config(
            "adjustPhi",
            format!("入流 {mass_in:.6e}, 给定出流 {fixed_out:.6e}"),
            "连续性误差无法通过调整出流消除",
        ));
    }

    Ok(mass_in / total < SMALL && fixed_out / total < SMALL && adjustable_out / total < SMALL)
}

/// 给定梯度的压力边界：设置梯度使边界通量等于给定速度的通量
///
/// `snGrad(p) = (phiHbyA_b - [ρ_b] U_b·Sf) / (|Sf| rhorAUf_b)`
pub fn constrain_pressure(
    mesh: &PolyMesh,
    fields: &mut FlowFields,
    flux: &RhieChowFlux,
) {
    let basis = fields.basis;
    for (pi, patch) in mesh.patches().iter().enumerate() {
        if fields.p.boundary(pi).kind() != BoundaryKind::FixedGradient {
            continue;
        }
        let u_b = fields.u.boundary(pi).values().to_vec();
        let rho_b = fields.rho.boundary(pi).values().to_vec();
        let gradient = fields.p.boundary_mut(pi).gradient_mut();
        for (i, f) in patch.faces().enumerate() {
            let w = match basis {
                FluxBasis::Volumetric => 1.0,
                FluxBasis::Mass => rho_b[i],
            };
            let target = w * u_b[i].dot(mesh.face_areas()[f]);
            gradient[i] =
                (flux.phi_hby_a[f] - target) / (mesh.mag_sf()[f] * flux.rhor_au_f[f]).max(VSMALL);
        }
    }
    fields.p.correct_boundary_conditions(mesh);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::VolField;
    use crate::fvm::{implicit, TimeState};
    use crate::mesh::BoxMeshBuilder;
    use crate::parallel::SerialCommunicator;
    use hx_config::{ConvectionScheme, TimeScheme};

    fn fields(mesh: &PolyMesh, basis: FluxBasis) -> FlowFields {
        let u = VolField::new("U", Dimensions::VELOCITY, mesh, DVec3::ZERO);
        let p = VolField::new("p", Dimensions::PRESSURE, mesh, 0.0);
        let t = VolField::new("T", Dimensions::TEMPERATURE, mesh, 300.0);
        let rho = VolField::new("rho", Dimensions::DENSITY, mesh, 1.0);
        FlowFields::new(mesh, basis, u, p, t, rho)
    }

    #[test]
    fn test_coefficients_from_equation() {
        let mesh = BoxMeshBuilder::new([3, 1, 1], [3.0, 1.0, 1.0]).build().unwrap();
        let mut f = fields(&mesh, FluxBasis::Volumetric);
        f.u.set_fixed_value(&mesh, "xmin", DVec3::X).unwrap();
        f.u.store_old_time();
        let time = TimeState::with_scheme(TimeScheme::Euler, 0.5);
        let mut eqn = implicit::ddt(&mesh, &time, &f.u);
        eqn += -implicit::laplacian(&mesh, &vec![1.0; mesh.n_faces()], &f.u);
        let coeffs = MomentumCoefficients::from_equation(&mesh, &eqn, &f.u, true).unwrap();
        assert!(coeffs.r_au.iter().all(|r| *r > 0.0));
        for (a, t) in coeffs.r_au.iter().zip(&coeffs.r_at_u) {
            assert!(t >= a);
        }
        let xmin = mesh.find_patch("xmin").unwrap();
        assert_eq!(coeffs.hby_a.boundary(xmin).values()[0], DVec3::X);
    }

    #[test]
    fn test_zero_diagonal_is_breakdown() {
        let mesh = BoxMeshBuilder::new([2, 1, 1], [2.0, 1.0, 1.0]).build().unwrap();
        let f = fields(&mesh, FluxBasis::Volumetric);
        let eqn = implicit::div(&mesh, &vec![0.0; mesh.n_faces()], &f.u, ConvectionScheme::Upwind);
        let err = MomentumCoefficients::from_equation(&mesh, &eqn, &f.u, false).unwrap_err();
        assert!(err.is_numerical_breakdown());
    }

    #[test]
    fn test_ddt_corr_vanishes_for_consistent_old_flux() {
        let mesh = BoxMeshBuilder::new([3, 2, 1], [3.0, 2.0, 1.0]).build().unwrap();
        let mut f = fields(&mesh, FluxBasis::Volumetric);
        f.u.internal_mut().fill(DVec3::new(1.0, 0.5, 0.0));
        f.u.correct_boundary_conditions(&mesh);
        let phi = explicit::flux(&mesh, &f.u);
        f.phi.assign(&phi).unwrap();
        f.store_old_time();
        let time = TimeState::with_scheme(TimeScheme::Euler, 0.1);
        let ctx = SolveContext {
            mesh: &mesh,
            time: &time,
            comm: &SerialCommunicator,
        };
        let rc = RhieChowInterpolator::new(FluxBasis::Volumetric, true);
        assert!(rc.ddt_corr(&ctx, &f).iter().all(|c| c.abs() < 1e-12));

        // 旧通量偏离插值速度时产生修正
        f.phi.values_mut()[0] += 0.1;
        f.phi.store_old_time();
        assert!(rc.ddt_corr(&ctx, &f)[0].abs() > 0.0);

        let steady = TimeState::with_scheme(TimeScheme::SteadyState, 1.0);
        let ctx = SolveContext { time: &steady, ..ctx };
        assert!(rc.ddt_corr(&ctx, &f).iter().all(|c| *c == 0.0));
    }

    #[test]
    fn test_adjust_phi() {
        let mesh = BoxMeshBuilder::new([2, 1, 1], [2.0, 1.0, 1.0]).build().unwrap();
        let mut u = VolField::new("U", Dimensions::VELOCITY, &mesh, DVec3::ZERO);
        let comm = SerialCommunicator;
        let mut phi = vec![0.0; mesh.n_faces()];
        assert!(adjust_phi(&mesh, &mut phi, &u, &comm).unwrap());

        // 入流 1，出流 2 可调
        let xmin = mesh.patches()[mesh.find_patch("xmin").unwrap()].start;
        let xmax = mesh.patches()[mesh.find_patch("xmax").unwrap()].start;
        phi[xmin] = -1.0;
        phi[xmax] = 2.0;
        u.set_fixed_value(&mesh, "xmin", DVec3::X).unwrap();
        assert!(!adjust_phi(&mesh, &mut phi, &u, &comm).unwrap());
        assert!((phi[xmax] - 1.0).abs() < 1e-14);

        // 出流也给定且不平衡：无法消除
        u.set_fixed_value(&mesh, "xmax", DVec3::X).unwrap();
        phi[xmax] = 2.0;
        assert!(adjust_phi(&mesh, &mut phi, &u, &comm).unwrap_err().is_config_error());
    }
}
