// crates/hx_core/src/field/vol_field.rs

//! 单元中心体场与边界条件
//!
//! 每个体场持有内部值、每个边界块的边界值、量纲标记、
//! 旧时间层环形缓冲与上一次外迭代的值（用于场松弛）。
//!
//! 边界条件以 "面值 = 内部系数·x_P + 边界系数" 与
//! "法向梯度 = 内部系数·x_P + 边界系数" 两组线性系数提供给隐式算子。

use super::old_time::OldTimeRing;
use super::value::FieldValue;
use crate::mesh::{PatchKind, PolyMesh};
use crate::parallel::Parallel;
use glam::DVec3;
use hx_foundation::{Dimensions, HxError, HxResult};
use serde::{Deserialize, Serialize};

// ============================================================================
// 边界条件
// ============================================================================

/// 边界条件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BoundaryKind {
    /// 给定值
    FixedValue,
    /// 零法向梯度
    ZeroGradient,
    /// 给定法向梯度（压力的固定通量条件即为此类，梯度由通量约束求得）
    FixedGradient,
    /// 由求解器直接赋值的派生量
    Calculated,
    /// 滑移：矢量去掉法向分量，标量为零梯度
    Slip,
    /// 进程间耦合
    Coupled,
}

/// 单个边界块上的场
#[derive(Debug, Clone)]
pub struct PatchField<T: FieldValue> {
    kind: BoundaryKind,
    values: Vec<T>,
    gradient: Vec<T>,
}

impl<T: FieldValue> PatchField<T> {
    fn new(kind: BoundaryKind, size: usize, value: T) -> Self {
        Self {
            kind,
            values: vec![value; size],
            gradient: vec![T::ZERO; size],
        }
    }

    /// 类型
    #[inline]
    pub fn kind(&self) -> BoundaryKind {
        self.kind
    }

    /// 边界值
    #[inline]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// 可变边界值
    #[inline]
    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// 给定梯度
    #[inline]
    pub fn gradient(&self) -> &[T] {
        &self.gradient
    }

    /// 可变给定梯度
    #[inline]
    pub fn gradient_mut(&mut self) -> &mut [T] {
        &mut self.gradient
    }

    /// 是否给定值
    #[inline]
    pub fn fixes_value(&self) -> bool {
        self.kind == BoundaryKind::FixedValue
    }

    /// 面值线性系数：`x_f = ic·x_P + bc`
    ///
    /// 滑移条件的法向部分按当前 `x_P` 显式处理。
    pub fn value_coeffs(&self, i: usize, x_p: T, n_hat: DVec3, delta_coeff: f64) -> (f64, T) {
        match self.kind {
            BoundaryKind::FixedValue | BoundaryKind::Calculated => (0.0, self.values[i]),
            BoundaryKind::ZeroGradient | BoundaryKind::Coupled => (1.0, T::ZERO),
            BoundaryKind::FixedGradient => (1.0, self.gradient[i] / delta_coeff),
            BoundaryKind::Slip => (1.0, x_p.remove_normal(n_hat) - x_p),
        }
    }

    /// 法向梯度线性系数：`snGrad = ic·x_P + bc`
    pub fn gradient_coeffs(&self, i: usize, x_p: T, n_hat: DVec3, delta_coeff: f64) -> (f64, T) {
        match self.kind {
            BoundaryKind::FixedValue | BoundaryKind::Calculated => {
                (-delta_coeff, self.values[i] * delta_coeff)
            }
            BoundaryKind::ZeroGradient | BoundaryKind::Coupled => (0.0, T::ZERO),
            BoundaryKind::FixedGradient => (0.0, self.gradient[i]),
            BoundaryKind::Slip => (0.0, (x_p.remove_normal(n_hat) - x_p) * delta_coeff),
        }
    }
}

// ============================================================================
// 体场
// ============================================================================

/// 单元中心体场
#[derive(Debug, Clone)]
pub struct VolField<T: FieldValue> {
    name: String,
    dimensions: Dimensions,
    internal: Vec<T>,
    patches: Vec<PatchField<T>>,
    old: OldTimeRing<T>,
    prev_iter: Option<Vec<T>>,
}

/// 标量体场
pub type VolScalarField = VolField<f64>;

/// 矢量体场
pub type VolVectorField = VolField<DVec3>;

impl<T: FieldValue> VolField<T> {
    /// 创建均匀场
    ///
    /// 默认边界：对称面为滑移，进程边界为耦合，其余为零梯度。
    pub fn new(name: &str, dimensions: Dimensions, mesh: &PolyMesh, value: T) -> Self {
        let patches = mesh
            .patches()
            .iter()
            .map(|p| {
                let kind = match p.kind {
                    PatchKind::Symmetry => BoundaryKind::Slip,
                    PatchKind::Processor { .. } => BoundaryKind::Coupled,
                    PatchKind::Wall | PatchKind::Patch => BoundaryKind::ZeroGradient,
                };
                PatchField::new(kind, p.size, value)
            })
            .collect();
        Self {
            name: name.to_string(),
            dimensions,
            internal: vec![value; mesh.n_cells()],
            patches,
            old: OldTimeRing::default(),
            prev_iter: None,
        }
    }

    /// 由内部值创建，边界按默认类型并立即求值
    pub fn from_internal(
        name: &str,
        dimensions: Dimensions,
        mesh: &PolyMesh,
        internal: Vec<T>,
    ) -> HxResult<Self> {
        HxError::check_size("internal", mesh.n_cells(), internal.len())?;
        let mut f = Self::new(name, dimensions, mesh, T::ZERO);
        f.internal = internal;
        f.correct_boundary_conditions(mesh);
        Ok(f)
    }

    /// 以相同边界条件类型复制出新场（派生量使用）
    pub fn like(&self, name: &str, dimensions: Dimensions, value: T) -> Self {
        Self {
            name: name.to_string(),
            dimensions,
            internal: vec![value; self.internal.len()],
            patches: self
                .patches
                .iter()
                .map(|p| PatchField::new(p.kind, p.values.len(), value))
                .collect(),
            old: OldTimeRing::default(),
            prev_iter: None,
        }
    }

    // ========================================================================
    // 边界条件设置
    // ========================================================================

    fn patch_index(&self, mesh: &PolyMesh, patch: &str) -> HxResult<usize> {
        mesh.find_patch(patch)
            .ok_or_else(|| HxError::not_found(format!("场 {} 的边界块 {}", self.name, patch)))
    }

    /// 设置给定值边界
    pub fn set_fixed_value(&mut self, mesh: &PolyMesh, patch: &str, value: T) -> HxResult<()> {
        let i = self.patch_index(mesh, patch)?;
        let pf = &mut self.patches[i];
        pf.kind = BoundaryKind::FixedValue;
        pf.values.fill(value);
        Ok(())
    }

    /// 设置给定梯度边界
    pub fn set_fixed_gradient(&mut self, mesh: &PolyMesh, patch: &str, gradient: T) -> HxResult<()> {
        let i = self.patch_index(mesh, patch)?;
        let pf = &mut self.patches[i];
        pf.kind = BoundaryKind::FixedGradient;
        pf.gradient.fill(gradient);
        Ok(())
    }

    /// 设置边界类型
    pub fn set_boundary_kind(
        &mut self,
        mesh: &PolyMesh,
        patch: &str,
        kind: BoundaryKind,
    ) -> HxResult<()> {
        let i = self.patch_index(mesh, patch)?;
        self.patches[i].kind = kind;
        Ok(())
    }

    // ========================================================================
    // 访问
    // ========================================================================

    /// 名称
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 改名（派生场复制后使用）
    pub fn rename(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// 量纲
    #[inline]
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// 内部值
    #[inline]
    pub fn internal(&self) -> &[T] {
        &self.internal
    }

    /// 可变内部值
    #[inline]
    pub fn internal_mut(&mut self) -> &mut [T] {
        &mut self.internal
    }

    /// 全部边界块
    #[inline]
    pub fn patches(&self) -> &[PatchField<T>] {
        &self.patches
    }

    /// 边界块
    #[inline]
    pub fn boundary(&self, patch: usize) -> &PatchField<T> {
        &self.patches[patch]
    }

    /// 可变边界块
    #[inline]
    pub fn boundary_mut(&mut self, patch: usize) -> &mut PatchField<T> {
        &mut self.patches[patch]
    }

    /// 边界面值（全局面编号）
    pub fn boundary_face_value(&self, mesh: &PolyMesh, face: usize) -> Option<T> {
        mesh.face_patch(face)
            .map(|(p, i)| self.patches[p].values[i])
    }

    /// 是否有任一边界给定值（否则压力需参考点）
    pub fn has_fixed_value_patch(&self) -> bool {
        self.patches.iter().any(|p| p.fixes_value())
    }

    /// 整体赋值内部值并更新边界
    pub fn assign(&mut self, mesh: &PolyMesh, values: &[T]) -> HxResult<()> {
        HxError::check_size("values", self.internal.len(), values.len())?;
        self.internal.copy_from_slice(values);
        self.correct_boundary_conditions(mesh);
        Ok(())
    }

    /// 求值非耦合边界
    pub fn correct_boundary_conditions(&mut self, mesh: &PolyMesh) {
        for (pi, patch) in mesh.patches().iter().enumerate() {
            let pf = &mut self.patches[pi];
            let cells = mesh.patch_face_cells(pi);
            for (i, &c) in cells.iter().enumerate() {
                let f = patch.start + i;
                let x_p = self.internal[c];
                match pf.kind {
                    BoundaryKind::FixedValue | BoundaryKind::Calculated => {}
                    BoundaryKind::ZeroGradient | BoundaryKind::Coupled => pf.values[i] = x_p,
                    BoundaryKind::FixedGradient => {
                        pf.values[i] = x_p + pf.gradient[i] / mesh.delta_coeffs()[f];
                    }
                    BoundaryKind::Slip => {
                        let n = mesh.face_areas()[f] / mesh.mag_sf()[f];
                        pf.values[i] = x_p.remove_normal(n);
                    }
                }
            }
        }
    }

    /// 交换进程边界并以两侧平均作为边界值
    pub fn update_coupled(&mut self, mesh: &PolyMesh, comm: &dyn Parallel) -> HxResult<()> {
        for (pi, patch) in mesh.patches().iter().enumerate() {
            if !patch.kind.is_coupled() {
                continue;
            }
            let cells = mesh.patch_face_cells(pi);
            let mut remote = vec![T::ZERO; cells.len()];
            for d in 0..T::N_COMPONENTS {
                let local: Vec<f64> = cells.iter().map(|&c| self.internal[c].component(d)).collect();
                let other = comm.swap_patch_cell_values(mesh, pi, &local)?;
                HxError::check_size("swap", local.len(), other.len())?;
                for (r, v) in remote.iter_mut().zip(other) {
                    r.set_component(d, v);
                }
            }
            let pf = &mut self.patches[pi];
            for (i, &c) in cells.iter().enumerate() {
                pf.values[i] = (self.internal[c] + remote[i]) * 0.5;
            }
        }
        Ok(())
    }

    // ========================================================================
    // 时间层与迭代层
    // ========================================================================

    /// 保存当前值为旧时间层
    pub fn store_old_time(&mut self) {
        self.old.store(&self.internal);
    }

    /// 第 k 层旧时间值
    pub fn old_time(&self, k: usize) -> Option<&[T]> {
        self.old.level(k)
    }

    /// 上一时间步的值；尚未保存时为当前值
    pub fn old_time_or_current(&self) -> &[T] {
        self.old.level(1).unwrap_or(&self.internal)
    }

    /// 覆盖第 1 层旧时间值
    pub fn set_old_time(&mut self, values: &[T]) {
        self.old.overwrite_latest(values);
    }

    /// 清空旧时间层（拓扑变化后）
    pub fn clear_old_time(&mut self) {
        self.old.clear();
    }

    /// 保存上一次迭代值
    pub fn store_prev_iter(&mut self) {
        match &mut self.prev_iter {
            Some(prev) => {
                prev.clear();
                prev.extend_from_slice(&self.internal);
            }
            None => self.prev_iter = Some(self.internal.clone()),
        }
    }

    /// 上一次迭代值
    pub fn prev_iter(&self) -> Option<&[T]> {
        self.prev_iter.as_deref()
    }

    /// 场松弛：`x = x_prev + α (x - x_prev)`，未保存上一次迭代时不做处理
    pub fn relax(&mut self, mesh: &PolyMesh, alpha: f64) {
        if alpha >= 1.0 {
            return;
        }
        if let Some(prev) = &self.prev_iter {
            for (x, p) in self.internal.iter_mut().zip(prev) {
                *x = *p + (*x - *p) * alpha;
            }
            self.correct_boundary_conditions(mesh);
        }
    }

    /// 替换网格后的内部值与边界（拓扑变化时调用）
    pub(crate) fn remap(&mut self, mesh: &PolyMesh, internal: Vec<T>, patches: Vec<PatchField<T>>) {
        self.internal = internal;
        self.patches = patches;
        self.old.clear();
        self.prev_iter = None;
        self.correct_boundary_conditions(mesh);
    }

    pub(crate) fn rebuild_patch(kind: BoundaryKind, size: usize, value: T) -> PatchField<T> {
        PatchField::new(kind, size, value)
    }
}

impl VolField<f64> {
    /// 内部最大值
    pub fn max(&self) -> f64 {
        self.internal.iter().copied().fold(f64::MIN, f64::max)
    }

    /// 内部最小值
    pub fn min(&self) -> f64 {
        self.internal.iter().copied().fold(f64::MAX, f64::min)
    }

    /// 体积加权平均
    pub fn weighted_average(&self, mesh: &PolyMesh) -> f64 {
        let v = mesh.cell_volumes();
        let total: f64 = v.iter().sum();
        self.internal.iter().zip(v).map(|(x, v)| x * v).sum::<f64>() / total
    }
}
