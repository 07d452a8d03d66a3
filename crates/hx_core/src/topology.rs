// crates/hx_core/src/topology.rs

//! 拓扑变化后的场重映射
//!
//! 网格拓扑变化时由外部提供新旧编号映射 [`TopologyMap`]，求解器按
//! [`RemapStrategy`] 给出的供体权重把全部体场搬到新网格，面通量按面映射
//! 复制（翻转面取反，新生面为零），随后强制一次 correctPhi。
//!
//! 默认策略 [`BestEffortInitialization`]：
//!
//! - 有旧单元对应的新单元直接取旧值；
//! - 新生单元取已映射的面相邻单元的体积加权平均；
//! - 没有任何已映射相邻单元时取回退值（旧场体积加权平均或零），
//!   并统计个数由调用方发出警告。

use crate::field::{FieldValue, SurfaceField, VolField};
use crate::mesh::PolyMesh;
use hx_foundation::{HxError, HxResult};
use std::fmt::Debug;

// ============================================================================
// 映射
// ============================================================================

/// 新旧网格编号映射
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyMap {
    /// 新单元对应的旧单元；新生单元为 `None`
    pub cell_map: Vec<Option<usize>>,
    /// 新面对应的旧面及是否翻转；新生面为 `None`
    pub face_map: Vec<Option<(usize, bool)>>,
}

impl TopologyMap {
    /// 恒等映射（网格未变，只需刷新派生数据）
    pub fn identity(mesh: &PolyMesh) -> Self {
        Self {
            cell_map: (0..mesh.n_cells()).map(Some).collect(),
            face_map: (0..mesh.n_faces()).map(|f| Some((f, false))).collect(),
        }
    }

    /// 检查映射与新旧网格尺寸一致、旧编号不越界
    pub fn validate(&self, old_mesh: &PolyMesh, new_mesh: &PolyMesh) -> HxResult<()> {
        HxError::check_size("cellMap", new_mesh.n_cells(), self.cell_map.len())?;
        HxError::check_size("faceMap", new_mesh.n_faces(), self.face_map.len())?;
        for old in self.cell_map.iter().flatten() {
            HxError::check_index("cellMap", *old, old_mesh.n_cells())?;
        }
        for (old, _) in self.face_map.iter().flatten() {
            HxError::check_index("faceMap", *old, old_mesh.n_faces())?;
        }
        Ok(())
    }

    /// 新生单元个数
    pub fn n_new_cells(&self) -> usize {
        self.cell_map.iter().filter(|c| c.is_none()).count()
    }
}

// ============================================================================
// 策略
// ============================================================================

/// 无供体单元的回退值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fallback {
    /// 旧场的体积加权平均
    #[default]
    DomainAverage,
    /// 零
    Zero,
}

/// 每个新单元的供体（旧单元编号与权重，权重和为 1）
#[derive(Debug, Clone, PartialEq)]
pub struct CellDonors {
    /// 供体列表；空表示使用回退值
    pub donors: Vec<Vec<(usize, f64)>>,
    /// 使用回退值的单元数（本进程）
    pub n_fallback: usize,
}

/// 重映射策略
pub trait RemapStrategy: Send + Sync + Debug {
    /// 策略名
    fn name(&self) -> &'static str;

    /// 计算新单元的供体
    fn cell_donors(&self, old_mesh: &PolyMesh, new_mesh: &PolyMesh, map: &TopologyMap) -> HxResult<CellDonors>;

    /// 无供体单元的回退值
    fn fallback(&self) -> Fallback {
        Fallback::DomainAverage
    }
}

/// 尽力初始化策略
#[derive(Debug, Clone, Copy, Default)]
pub struct BestEffortInitialization {
    fallback: Fallback,
}

impl BestEffortInitialization {
    /// 回退值取旧场平均
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定回退值
    pub fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = fallback;
        self
    }
}

impl RemapStrategy for BestEffortInitialization {
    fn name(&self) -> &'static str {
        "bestEffortInitialization"
    }

    fn cell_donors(&self, old_mesh: &PolyMesh, new_mesh: &PolyMesh, map: &TopologyMap) -> HxResult<CellDonors> {
        map.validate(old_mesh, new_mesh)?;
        let vols = new_mesh.cell_volumes();
        let mut donors = Vec::with_capacity(new_mesh.n_cells());
        let mut n_fallback = 0;

        for (c, mapped) in map.cell_map.iter().enumerate() {
            if let Some(old) = mapped {
                donors.push(vec![(*old, 1.0)]);
                continue;
            }
            let mut list: Vec<(usize, f64)> = Vec::new();
            for &f in new_mesh.cell_faces(c) {
                let Some(n) = new_mesh.neighbour_of(f) else { continue };
                let other = if new_mesh.owner()[f] == c { n } else { new_mesh.owner()[f] };
                if let Some(old) = map.cell_map[other] {
                    if !list.iter().any(|(o, _)| *o == old) {
                        list.push((old, vols[other]));
                    }
                }
            }
            let total: f64 = list.iter().map(|(_, w)| w).sum();
            if list.is_empty() || total <= 0.0 {
                n_fallback += 1;
                donors.push(Vec::new());
            } else {
                donors.push(list.into_iter().map(|(o, w)| (o, w / total)).collect());
            }
        }
        Ok(CellDonors { donors, n_fallback })
    }

    fn fallback(&self) -> Fallback {
        self.fallback
    }
}

// ============================================================================
// 场搬运
// ============================================================================

/// 按供体把体场搬到新网格；边界块按名字继承类型与值
pub fn remap_vol_field<T: FieldValue>(
    field: &mut VolField<T>,
    old_mesh: &PolyMesh,
    new_mesh: &PolyMesh,
    donors: &CellDonors,
    fallback: Fallback,
) -> HxResult<()> {
    HxError::check_size("donors", new_mesh.n_cells(), donors.donors.len())?;
    HxError::check_size("field internal", old_mesh.n_cells(), field.internal().len())?;
    let old = field.internal();

    let fallback_value = match fallback {
        Fallback::Zero => T::ZERO,
        Fallback::DomainAverage => {
            let vols = old_mesh.cell_volumes();
            let total: f64 = vols.iter().sum();
            if total > 0.0 {
                let mut sum = T::ZERO;
                for (x, v) in old.iter().zip(vols) {
                    sum += *x * *v;
                }
                sum / total
            } else {
                T::ZERO
            }
        }
    };

    let internal: Vec<T> = donors
        .donors
        .iter()
        .map(|list| {
            if list.is_empty() {
                return fallback_value;
            }
            let mut v = T::ZERO;
            for (o, w) in list {
                v += old[*o] * *w;
            }
            v
        })
        .collect();

    let patches = new_mesh
        .patches()
        .iter()
        .enumerate()
        .map(|(new_pi, p)| match old_mesh.find_patch(&p.name) {
            Some(pi) => {
                let old_pf = field.boundary(pi);
                let mut pf = VolField::<T>::rebuild_patch(old_pf.kind(), p.size, T::ZERO);
                if old_pf.values().len() == p.size {
                    pf.values_mut().copy_from_slice(old_pf.values());
                    pf.gradient_mut().copy_from_slice(old_pf.gradient());
                } else {
                    // 面数变化：给定值与梯度按旧边界首值均匀延拓
                    let value = old_pf.values().first().copied().unwrap_or(fallback_value);
                    let gradient = old_pf.gradient().first().copied().unwrap_or(T::ZERO);
                    pf.values_mut().fill(value);
                    pf.gradient_mut().fill(gradient);
                }
                pf
            }
            None => {
                // 新边界块取默认类型
                let like = VolField::<T>::new(field.name(), field.dimensions(), new_mesh, fallback_value);
                like.boundary(new_pi).clone()
            }
        })
        .collect();

    field.remap(new_mesh, internal, patches);
    Ok(())
}

/// 按面映射搬运面通量：翻转面取反，新生面为零
pub fn remap_surface_field(field: &SurfaceField, new_mesh: &PolyMesh, map: &TopologyMap) -> HxResult<SurfaceField> {
    HxError::check_size("faceMap", new_mesh.n_faces(), map.face_map.len())?;
    let old = field.values();
    let values = map
        .face_map
        .iter()
        .map(|m| match m {
            Some((f, flip)) => {
                let v = old.get(*f).copied().unwrap_or(0.0);
                if *flip {
                    -v
                } else {
                    v
                }
            }
            None => 0.0,
        })
        .collect();
    SurfaceField::from_values(field.name(), field.dimensions(), new_mesh, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::VolScalarField;
    use crate::mesh::BoxMeshBuilder;
    use hx_foundation::Dimensions;

    #[test]
    fn test_new_cell_takes_neighbour_mean() {
        let old_mesh = BoxMeshBuilder::new([3, 1, 1], [3.0, 1.0, 1.0]).build().unwrap();
        let new_mesh = BoxMeshBuilder::new([4, 1, 1], [4.0, 1.0, 1.0]).build().unwrap();
        // 新网格在末尾多出一个单元
        let map = TopologyMap {
            cell_map: vec![Some(0), Some(1), Some(2), None],
            face_map: vec![None; new_mesh.n_faces()],
        };
        let donors = BestEffortInitialization::new()
            .cell_donors(&old_mesh, &new_mesh, &map)
            .unwrap();
        assert_eq!(donors.n_fallback, 0);

        let mut f = VolScalarField::from_internal("T", Dimensions::TEMPERATURE, &old_mesh, vec![1.0, 2.0, 3.0])
            .unwrap();
        remap_vol_field(&mut f, &old_mesh, &new_mesh, &donors, Fallback::DomainAverage).unwrap();
        assert_eq!(f.internal(), &[1.0, 2.0, 3.0, 3.0]);
        assert_eq!(f.patches().len(), new_mesh.patches().len());
        assert!(f.old_time(1).is_none());
    }

    #[test]
    fn test_isolated_cell_uses_fallback() {
        let old_mesh = BoxMeshBuilder::new([2, 1, 1], [2.0, 1.0, 1.0]).build().unwrap();
        let new_mesh = BoxMeshBuilder::new([2, 1, 1], [2.0, 1.0, 1.0]).build().unwrap();
        let map = TopologyMap {
            cell_map: vec![None, None],
            face_map: vec![None; new_mesh.n_faces()],
        };
        let strategy = BestEffortInitialization::new();
        let donors = strategy.cell_donors(&old_mesh, &new_mesh, &map).unwrap();
        assert_eq!(donors.n_fallback, 2);

        let mut f = VolScalarField::from_internal("p", Dimensions::PRESSURE, &old_mesh, vec![1.0, 3.0]).unwrap();
        remap_vol_field(&mut f, &old_mesh, &new_mesh, &donors, strategy.fallback()).unwrap();
        assert_eq!(f.internal(), &[2.0, 2.0]);

        let mut g = VolScalarField::from_internal("p", Dimensions::PRESSURE, &old_mesh, vec![1.0, 3.0]).unwrap();
        remap_vol_field(&mut g, &old_mesh, &new_mesh, &donors, Fallback::Zero).unwrap();
        assert_eq!(g.internal(), &[0.0, 0.0]);
    }

    #[test]
    fn test_surface_remap_flips_and_zeroes() {
        let mesh = BoxMeshBuilder::new([2, 1, 1], [2.0, 1.0, 1.0]).build().unwrap();
        let values: Vec<f64> = (0..mesh.n_faces()).map(|f| f as f64 + 1.0).collect();
        let phi = SurfaceField::from_values("phi", Dimensions::VOLUMETRIC_FLUX, &mesh, values).unwrap();
        let mut map = TopologyMap::identity(&mesh);
        map.face_map[0] = Some((0, true));
        map.face_map[1] = None;
        let out = remap_surface_field(&phi, &mesh, &map).unwrap();
        assert_eq!(out.values()[0], -1.0);
        assert_eq!(out.values()[1], 0.0);
        assert_eq!(out.values()[2], 3.0);
    }

    #[test]
    fn test_map_validation() {
        let mesh = BoxMeshBuilder::new([2, 1, 1], [2.0, 1.0, 1.0]).build().unwrap();
        let mut map = TopologyMap::identity(&mesh);
        map.cell_map[1] = Some(7);
        assert!(map.validate(&mesh, &mesh).is_err());
        assert_eq!(TopologyMap::identity(&mesh).n_new_cells(), 0);
    }
}
