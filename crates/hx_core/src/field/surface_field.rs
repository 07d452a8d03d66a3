// crates/hx_core/src/field/surface_field.rs

//! 面标量场（通量）
//!
//! 按全局面编号存放，内部面在前、边界面在后，与网格面编号一致。
//! 正值表示从 owner 流向 neighbour（边界面为流出）。

use super::old_time::OldTimeRing;
use crate::mesh::PolyMesh;
use hx_foundation::{Dimensions, HxError, HxResult};

/// 面标量场
#[derive(Debug, Clone)]
pub struct SurfaceField {
    name: String,
    dimensions: Dimensions,
    values: Vec<f64>,
    old: OldTimeRing<f64>,
}

impl SurfaceField {
    /// 创建均匀面场
    pub fn new(name: &str, dimensions: Dimensions, mesh: &PolyMesh, value: f64) -> Self {
        Self {
            name: name.to_string(),
            dimensions,
            values: vec![value; mesh.n_faces()],
            old: OldTimeRing::default(),
        }
    }

    /// 由面值创建
    pub fn from_values(
        name: &str,
        dimensions: Dimensions,
        mesh: &PolyMesh,
        values: Vec<f64>,
    ) -> HxResult<Self> {
        HxError::check_size("surface values", mesh.n_faces(), values.len())?;
        Ok(Self {
            name: name.to_string(),
            dimensions,
            values,
            old: OldTimeRing::default(),
        })
    }

    /// 由已按网格面数计算好的面值创建
    pub(crate) fn from_parts(name: &str, dimensions: Dimensions, values: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            dimensions,
            values,
            old: OldTimeRing::default(),
        }
    }

    /// 名称
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 量纲
    #[inline]
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// 全部面值
    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// 可变面值
    #[inline]
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// 整体替换
    pub fn assign(&mut self, values: &[f64]) -> HxResult<()> {
        HxError::check_size("surface values", self.values.len(), values.len())?;
        self.values.copy_from_slice(values);
        Ok(())
    }

    /// 保存旧时间层
    pub fn store_old_time(&mut self) {
        self.old.store(&self.values);
    }

    /// 上一时间步的值；尚未保存时为当前值
    pub fn old_time_or_current(&self) -> &[f64] {
        self.old.level(1).unwrap_or(&self.values)
    }

    /// 是否保存过旧时间层
    pub fn has_old_time(&self) -> bool {
        !self.old.is_empty()
    }

    /// 清空旧时间层
    pub fn clear_old_time(&mut self) {
        self.old.clear();
    }

    /// 边界面上的净流出量 Σ_boundary φ
    pub fn boundary_sum(&self, mesh: &PolyMesh) -> f64 {
        self.values[mesh.n_internal_faces()..].iter().sum()
    }

    /// 替换网格后的面值（拓扑变化时调用）
    pub(crate) fn remap(&mut self, values: Vec<f64>) {
        self.values = values;
        self.old.clear();
    }
}
