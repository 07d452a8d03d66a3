// crates/hx_core/src/state.rs

//! 流场状态
//!
//! 各组件共享的场集合在构造阶段一次性建立并以类型化字段直接持有，
//! 计算中不按名字查找。写入顺序由编排器的阶段顺序保证。

use crate::field::{SurfaceField, VolScalarField, VolVectorField};
use crate::fvm::{explicit, TimeState};
use crate::mesh::PolyMesh;
use crate::parallel::Parallel;
use hx_foundation::Dimensions;
use serde::{Deserialize, Serialize};

/// 面通量的基准
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FluxBasis {
    /// 体积通量（不可压单相、不可压多相）
    Volumetric,
    /// 质量通量（可压）
    Mass,
}

impl FluxBasis {
    /// 通量量纲
    pub fn dimensions(self) -> Dimensions {
        match self {
            Self::Volumetric => Dimensions::VOLUMETRIC_FLUX,
            Self::Mass => Dimensions::MASS_FLUX,
        }
    }

    /// 面上的通量权重：体积基准为 1，质量基准为面密度
    pub fn face_weight(self, rho_f: &[f64], face: usize) -> f64 {
        match self {
            Self::Volumetric => 1.0,
            Self::Mass => rho_f[face],
        }
    }
}

/// 求解上下文：网格、时间与通信器
#[derive(Clone, Copy)]
pub struct SolveContext<'a> {
    /// 网格
    pub mesh: &'a PolyMesh,
    /// 时间状态
    pub time: &'a TimeState,
    /// 通信器
    pub comm: &'a dyn Parallel,
}

/// 流场
#[derive(Debug, Clone)]
pub struct FlowFields {
    /// 通量基准
    pub basis: FluxBasis,
    /// 速度
    pub u: VolVectorField,
    /// 压力
    pub p: VolScalarField,
    /// 温度
    pub t: VolScalarField,
    /// 密度
    pub rho: VolScalarField,
    /// 单元可压缩性
    pub psi: Vec<f64>,
    /// 单元动力粘度
    pub mu: Vec<f64>,
    /// 面通量（按基准）
    pub phi: SurfaceField,
    /// 质量通量（动量对流使用）
    pub rho_phi: SurfaceField,
}

impl FlowFields {
    /// 由初始场创建，通量由初始速度计算
    pub fn new(
        mesh: &PolyMesh,
        basis: FluxBasis,
        u: VolVectorField,
        p: VolScalarField,
        t: VolScalarField,
        rho: VolScalarField,
    ) -> Self {
        let vol_flux = explicit::flux(mesh, &u);
        let rho_f = explicit::interpolate(mesh, &rho);
        let mass_flux: Vec<f64> = vol_flux.iter().zip(&rho_f).map(|(f, r)| f * r).collect();
        let phi_values = match basis {
            FluxBasis::Volumetric => vol_flux,
            FluxBasis::Mass => mass_flux.clone(),
        };
        let n_cells = mesh.n_cells();
        Self {
            basis,
            phi: SurfaceField::from_parts("phi", basis.dimensions(), phi_values),
            rho_phi: SurfaceField::from_parts("rhoPhi", Dimensions::MASS_FLUX, mass_flux),
            u,
            p,
            t,
            rho,
            psi: vec![0.0; n_cells],
            mu: vec![0.0; n_cells],
        }
    }

    /// 面密度
    pub fn rho_f(&self, mesh: &PolyMesh) -> Vec<f64> {
        explicit::interpolate(mesh, &self.rho)
    }

    /// 按当前通量更新质量通量
    pub fn update_rho_phi(&mut self, mesh: &PolyMesh) {
        match self.basis {
            FluxBasis::Mass => {
                let phi = self.phi.values().to_vec();
                self.rho_phi.values_mut().copy_from_slice(&phi);
            }
            FluxBasis::Volumetric => {
                let rho_f = self.rho_f(mesh);
                for ((m, p), r) in self.rho_phi.values_mut().iter_mut().zip(self.phi.values()).zip(&rho_f) {
                    *m = p * r;
                }
            }
        }
    }

    /// 保存全部旧时间层
    pub fn store_old_time(&mut self) {
        self.u.store_old_time();
        self.p.store_old_time();
        self.t.store_old_time();
        self.rho.store_old_time();
        self.phi.store_old_time();
        self.rho_phi.store_old_time();
    }

    /// 清空全部旧时间层
    pub fn clear_old_time(&mut self) {
        self.u.clear_old_time();
        self.p.clear_old_time();
        self.t.clear_old_time();
        self.rho.clear_old_time();
        self.phi.clear_old_time();
        self.rho_phi.clear_old_time();
    }

    /// 全局总质量 ∫ρ dV
    pub fn total_mass(&self, mesh: &PolyMesh, comm: &dyn Parallel) -> f64 {
        comm.sum(explicit::domain_integrate(mesh, self.rho.internal()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::VolField;
    use crate::mesh::BoxMeshBuilder;
    use crate::parallel::SerialCommunicator;
    use glam::DVec3;

    #[test]
    fn test_initial_fluxes() {
        let mesh = BoxMeshBuilder::new([2, 1, 1], [2.0, 1.0, 1.0]).build().unwrap();
        let u = VolField::new("U", Dimensions::VELOCITY, &mesh, DVec3::X);
        let p = VolField::new("p", Dimensions::PRESSURE, &mesh, 0.0);
        let t = VolField::new("T", Dimensions::TEMPERATURE, &mesh, 300.0);
        let rho = VolField::new("rho", Dimensions::DENSITY, &mesh, 2.0);
        let mut fields = FlowFields::new(&mesh, FluxBasis::Volumetric, u, p, t, rho);
        assert!((fields.phi.values()[0] - 1.0).abs() < 1e-14);
        assert!((fields.rho_phi.values()[0] - 2.0).abs() < 1e-14);
        assert!((fields.total_mass(&mesh, &SerialCommunicator) - 4.0).abs() < 1e-12);

        fields.phi.values_mut()[0] = 3.0;
        fields.update_rho_phi(&mesh);
        assert!((fields.rho_phi.values()[0] - 6.0).abs() < 1e-14);
        assert_eq!(FluxBasis::Mass.face_weight(&[5.0], 0), 5.0);
    }
}
