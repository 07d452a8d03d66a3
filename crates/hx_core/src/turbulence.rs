// crates/hx_core/src/turbulence.rs

//! 湍流闭合接口
//!
//! 动量预测只需要两样东西：有效粘度与偏应力散度项。
//! 闭合模型内部不在本核心范围内，这里只提供层流实现。

use crate::field::VolVectorField;
use crate::fvm::{explicit, implicit, FvMatrix};
use crate::mesh::PolyMesh;
use glam::DVec3;
use std::fmt::Debug;

/// 湍流闭合模型
pub trait TurbulenceModel: Send + Sync + Debug {
    /// 模型名称
    fn name(&self) -> &'static str;

    /// 单元湍流粘度 μ_t（层流为零）
    fn mu_t(&self) -> &[f64];

    /// 按新速度场更新闭合量
    fn correct(&mut self, mesh: &PolyMesh, u: &VolVectorField);

    /// 偏应力散度 `-laplacian(μ_eff, U)`
    ///
    /// `mu` 为单元分子动力粘度，返回的矩阵直接加到动量方程。
    fn div_dev_stress(&self, mesh: &PolyMesh, mu: &[f64], u: &VolVectorField) -> FvMatrix<DVec3> {
        let mu_eff: Vec<f64> = mu.iter().zip(self.mu_t()).map(|(m, t)| m + t).collect();
        let mu_f = explicit::interpolate_cells(mesh, &mu_eff);
        -implicit::laplacian(mesh, &mu_f, u)
    }
}

/// 层流
#[derive(Debug, Clone)]
pub struct Laminar {
    mu_t: Vec<f64>,
}

impl Laminar {
    /// 创建
    pub fn new(mesh: &PolyMesh) -> Self {
        Self {
            mu_t: vec![0.0; mesh.n_cells()],
        }
    }
}

impl TurbulenceModel for Laminar {
    fn name(&self) -> &'static str {
        "laminar"
    }

    fn mu_t(&self) -> &[f64] {
        &self.mu_t
    }

    fn correct(&mut self, mesh: &PolyMesh, _u: &VolVectorField) {
        if self.mu_t.len() != mesh.n_cells() {
            self.mu_t = vec![0.0; mesh.n_cells()];
        }
    }
}
