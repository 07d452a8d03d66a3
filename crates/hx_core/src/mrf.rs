// crates/hx_core/src/mrf.rs

//! 多重旋转参考系（MRF）
//!
//! 区域内动量方程加科氏力 `ρ Ω × U`，面通量在绝对与相对坐标系间转换：
//!
//! ```text
//! φ_rel = φ_abs - (Ω × (C_f - origin)) · Sf
//! ```
//!
//! 转换只作用于至少一侧单元位于区域内的内部面，边界面保持不变。

use crate::field::VolVectorField;
use crate::fvm::FvMatrix;
use crate::mesh::PolyMesh;
use glam::DVec3;
use hx_config::{CellSelection, MrfZoneConfig};
use hx_foundation::{HxError, HxResult};

/// 单个旋转区域
#[derive(Debug, Clone)]
pub struct MrfZone {
    name: String,
    in_zone: Vec<bool>,
    origin: DVec3,
    omega: DVec3,
}

impl MrfZone {
    /// 由配置解析区域单元
    pub fn from_config(mesh: &PolyMesh, config: &MrfZoneConfig) -> HxResult<Self> {
        let axis = DVec3::from_array(config.axis);
        if axis.length() < 1e-12 {
            return Err(HxError::invalid_config(
                format!("MRF.{}.axis", config.name),
                format!("{:?}", config.axis),
                "旋转轴长度为零",
            ));
        }
        let mut in_zone = vec![false; mesh.n_cells()];
        match &config.selection {
            CellSelection::All => in_zone.fill(true),
            CellSelection::Box { min, max } => {
                let lo = DVec3::from_array(*min);
                let hi = DVec3::from_array(*max);
                for (c, centre) in mesh.cell_centres().iter().enumerate() {
                    in_zone[c] = centre.cmpge(lo).all() && centre.cmple(hi).all();
                }
            }
            CellSelection::Cells { cells } => {
                for &c in cells {
                    HxError::check_index("MRF cell", c, mesh.n_cells())?;
                    in_zone[c] = true;
                }
            }
        }
        let n = in_zone.iter().filter(|b| **b).count();
        log::info!("MRF 区域 {}: {} 个单元, Ω = {}", config.name, n, config.omega);
        Ok(Self {
            name: config.name.clone(),
            in_zone,
            origin: DVec3::from_array(config.origin),
            omega: axis.normalize() * config.omega,
        })
    }

    /// 区域名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 角速度矢量
    pub fn omega(&self) -> DVec3 {
        self.omega
    }

    /// 单元是否在区域内
    pub fn contains(&self, cell: usize) -> bool {
        self.in_zone[cell]
    }

    /// 动量方程加科氏力 `ρ Ω × U`
    pub fn add_coriolis(
        &self,
        mesh: &PolyMesh,
        rho: &[f64],
        u: &VolVectorField,
        eqn: &mut FvMatrix<DVec3>,
    ) {
        let force: Vec<DVec3> = (0..mesh.n_cells())
            .map(|c| {
                if self.in_zone[c] {
                    self.omega.cross(u.internal()[c]) * (rho[c] * mesh.cell_volumes()[c])
                } else {
                    DVec3::ZERO
                }
            })
            .collect();
        eqn.add_explicit(&force);
    }

    fn frame_flux(&self, mesh: &PolyMesh, face: usize) -> f64 {
        let r = mesh.face_centres()[face] - self.origin;
        self.omega.cross(r).dot(mesh.face_areas()[face])
    }

    fn face_in_zone(&self, mesh: &PolyMesh, face: usize) -> bool {
        self.in_zone[mesh.owner()[face]] || self.in_zone[mesh.neighbour()[face]]
    }

    /// 绝对通量转为相对通量；质量通量需传入面密度
    pub fn make_relative(&self, mesh: &PolyMesh, phi: &mut [f64], rho_f: Option<&[f64]>) {
        for f in 0..mesh.n_internal_faces() {
            if self.face_in_zone(mesh, f) {
                let w = rho_f.map_or(1.0, |r| r[f]);
                phi[f] -= w * self.frame_flux(mesh, f);
            }
        }
    }

    /// 相对通量转为绝对通量
    pub fn make_absolute(&self, mesh: &PolyMesh, phi: &mut [f64], rho_f: Option<&[f64]>) {
        for f in 0..mesh.n_internal_faces() {
            if self.face_in_zone(mesh, f) {
                let w = rho_f.map_or(1.0, |r| r[f]);
                phi[f] += w * self.frame_flux(mesh, f);
            }
        }
    }
}

/// 全部旋转区域
#[derive(Debug, Clone, Default)]
pub struct MrfCollection {
    zones: Vec<MrfZone>,
}

impl MrfCollection {
    /// 由配置创建
    pub fn from_config(mesh: &PolyMesh, configs: &[MrfZoneConfig]) -> HxResult<Self> {
        let zones = configs
            .iter()
            .map(|c| MrfZone::from_config(mesh, c))
            .collect::<HxResult<Vec<_>>>()?;
        Ok(Self { zones })
    }

    /// 是否存在区域
    pub fn is_active(&self) -> bool {
        !self.zones.is_empty()
    }

    /// 区域列表
    pub fn zones(&self) -> &[MrfZone] {
        &self.zones
    }

    /// 全部区域加科氏力
    pub fn add_coriolis(
        &self,
        mesh: &PolyMesh,
        rho: &[f64],
        u: &VolVectorField,
        eqn: &mut FvMatrix<DVec3>,
    ) {
        for z in &self.zones {
            z.add_coriolis(mesh, rho, u, eqn);
        }
    }

    /// 全部区域转为相对通量
    pub fn make_relative(&self, mesh: &PolyMesh, phi: &mut [f64], rho_f: Option<&[f64]>) {
        for z in &self.zones {
            z.make_relative(mesh, phi, rho_f);
        }
    }

    /// 全部区域转为绝对通量
    pub fn make_absolute(&self, mesh: &PolyMesh, phi: &mut [f64], rho_f: Option<&[f64]>) {
        for z in &self.zones {
            z.make_absolute(mesh, phi, rho_f);
        }
    }

    /// 拓扑变化后按新网格重新解析区域
    pub fn rebuild(&mut self, mesh: &PolyMesh, configs: &[MrfZoneConfig]) -> HxResult<()> {
        *self = Self::from_config(mesh, configs)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::VolField;
    use crate::mesh::BoxMeshBuilder;
    use hx_foundation::Dimensions;

    fn zone_config(selection: CellSelection) -> MrfZoneConfig {
        MrfZoneConfig {
            name: "rotor".into(),
            selection,
            origin: [0.0; 3],
            axis: [0.0, 0.0, 2.0],
            omega: 3.0,
        }
    }

    #[test]
    fn test_relative_absolute_round_trip() {
        let mesh = BoxMeshBuilder::new([4, 4, 1], [1.0, 1.0, 0.25]).build().unwrap();
        let zones = MrfCollection::from_config(&mesh, &[zone_config(CellSelection::All)]).unwrap();
        assert!(zones.is_active());
        assert_eq!(zones.zones()[0].omega(), DVec3::new(0.0, 0.0, 3.0));
        let phi0: Vec<f64> = (0..mesh.n_faces()).map(|f| f as f64 * 0.01).collect();
        let mut phi = phi0.clone();
        zones.make_relative(&mesh, &mut phi, None);
        assert!(phi.iter().zip(&phi0).any(|(a, b)| (a - b).abs() > 1e-6));
        zones.make_absolute(&mesh, &mut phi, None);
        for (a, b) in phi.iter().zip(&phi0) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_box_selection_and_coriolis() {
        let mesh = BoxMeshBuilder::new([2, 1, 1], [2.0, 1.0, 1.0]).build().unwrap();
        let cfg = zone_config(CellSelection::Box {
            min: [0.0, 0.0, 0.0],
            max: [1.0, 1.0, 1.0],
        });
        let zone = MrfZone::from_config(&mesh, &cfg).unwrap();
        assert!(zone.contains(0));
        assert!(!zone.contains(1));

        let u = VolField::new("U", Dimensions::VELOCITY, &mesh, DVec3::X);
        let mut eqn = FvMatrix::new("U", &mesh);
        zone.add_coriolis(&mesh, &[1.0, 1.0], &u, &mut eqn);
        // Ω×U = 3 ẑ × x̂ = 3 ŷ，移到右端为负
        assert!((eqn.source()[0] - DVec3::new(0.0, -3.0, 0.0)).length() < 1e-12);
        assert_eq!(eqn.source()[1], DVec3::ZERO);
    }

    #[test]
    fn test_bad_cell_index() {
        let mesh = BoxMeshBuilder::new([2, 1, 1], [2.0, 1.0, 1.0]).build().unwrap();
        let cfg = zone_config(CellSelection::Cells { cells: vec![5] });
        assert!(MrfZone::from_config(&mesh, &cfg).is_err());
    }
}
