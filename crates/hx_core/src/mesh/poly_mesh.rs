// crates/hx_core/src/mesh/poly_mesh.rs

//! 多面体网格
//!
//! 面编号约定：内部面在前（每个面有 owner 与 neighbour），
//! 边界面按边界块连续排列在后。面积矢量 `Sf` 从 owner 指向 neighbour，
//! 边界面指向域外。
//!
//! 几何由点与面的连接关系计算：面心与面积矢量按三角形分解，
//! 单元中心与体积按以估计中心为顶点的棱锥分解。
//! 插值权重、`deltaCoeffs`、非正交修正矢量在构造时一次性缓存。

use glam::DVec3;
use hx_foundation::validation::{ValidationError, ValidationReport, ValidationWarning};
use hx_foundation::{HxError, HxResult, VSMALL};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// 非正交角告警阈值 [度]
pub const NON_ORTH_WARN_DEG: f64 = 70.0;

// ============================================================================
// 边界块
// ============================================================================

/// 边界块的耦合类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PatchKind {
    /// 固壁
    Wall,
    /// 一般物理边界（入口、出口、开边界）
    Patch,
    /// 对称面
    Symmetry,
    /// 进程间边界，值由通信器交换
    Processor {
        /// 相邻进程号
        neighbour_rank: usize,
    },
}

impl PatchKind {
    /// 是否为耦合边界
    pub fn is_coupled(&self) -> bool {
        matches!(self, Self::Processor { .. })
    }
}

/// 边界块
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// 名称
    pub name: String,
    /// 类型
    pub kind: PatchKind,
    /// 首个面的全局编号
    pub start: usize,
    /// 面数
    pub size: usize,
}

impl Patch {
    /// 全局面编号范围
    #[inline]
    pub fn faces(&self) -> Range<usize> {
        self.start..self.start + self.size
    }
}

// ============================================================================
// 网格
// ============================================================================

/// 多面体有限体积网格
#[derive(Debug, Clone)]
pub struct PolyMesh {
    points: Vec<DVec3>,
    faces: Vec<Vec<usize>>,
    owner: Vec<usize>,
    neighbour: Vec<usize>,
    patches: Vec<Patch>,
    n_cells: usize,

    cell_centres: Vec<DVec3>,
    cell_volumes: Vec<f64>,
    face_centres: Vec<DVec3>,
    face_areas: Vec<DVec3>,
    mag_sf: Vec<f64>,

    weights: Vec<f64>,
    delta_coeffs: Vec<f64>,
    non_orth_delta_coeffs: Vec<f64>,
    non_orth_correction_vectors: Vec<DVec3>,

    cell_face_ptr: Vec<usize>,
    cell_face_idx: Vec<usize>,

    topology_version: u64,
}

impl PolyMesh {
    /// 由点、面与连接关系构造网格并计算全部几何量
    ///
    /// 要求：`neighbour.len()` 为内部面数，内部面在前；
    /// 边界块按顺序覆盖其余全部面。
    pub fn from_polyhedra(
        points: Vec<DVec3>,
        faces: Vec<Vec<usize>>,
        owner: Vec<usize>,
        neighbour: Vec<usize>,
        patches: Vec<Patch>,
        n_cells: usize,
    ) -> HxResult<Self> {
        HxError::check_size("owner", faces.len(), owner.len())?;
        let n_internal = neighbour.len();
        if n_internal > faces.len() {
            return Err(HxError::invalid_mesh("内部面数超过总面数"));
        }
        let mut expected_start = n_internal;
        for p in &patches {
            if p.start != expected_start {
                return Err(HxError::invalid_mesh(format!(
                    "边界块 {} 起始面 {} 与期望 {} 不符",
                    p.name, p.start, expected_start
                )));
            }
            expected_start += p.size;
        }
        if expected_start != faces.len() {
            return Err(HxError::invalid_mesh("边界块未覆盖全部边界面"));
        }
        for (f, face) in faces.iter().enumerate() {
            if face.len() < 3 {
                return Err(HxError::invalid_mesh(format!("面 {f} 顶点数少于 3")));
            }
            for &pt in face {
                HxError::check_index("point", pt, points.len())?;
            }
        }
        for &c in owner.iter().chain(neighbour.iter()) {
            HxError::check_index("cell", c, n_cells)?;
        }

        let mut mesh = Self {
            points,
            faces,
            owner,
            neighbour,
            patches,
            n_cells,
            cell_centres: Vec::new(),
            cell_volumes: Vec::new(),
            face_centres: Vec::new(),
            face_areas: Vec::new(),
            mag_sf: Vec::new(),
            weights: Vec::new(),
            delta_coeffs: Vec::new(),
            non_orth_delta_coeffs: Vec::new(),
            non_orth_correction_vectors: Vec::new(),
            cell_face_ptr: Vec::new(),
            cell_face_idx: Vec::new(),
            topology_version: 0,
        };
        mesh.build_cell_faces();
        mesh.compute_face_geometry();
        mesh.compute_cell_geometry()?;
        mesh.compute_interpolation_geometry();
        Ok(mesh)
    }

    fn build_cell_faces(&mut self) {
        let mut counts = vec![0usize; self.n_cells];
        for f in 0..self.faces.len() {
            counts[self.owner[f]] += 1;
            if let Some(n) = self.neighbour_of(f) {
                counts[n] += 1;
            }
        }
        let mut ptr = Vec::with_capacity(self.n_cells + 1);
        ptr.push(0);
        for c in &counts {
            let last = ptr[ptr.len() - 1];
            ptr.push(last + c);
        }
        let mut fill = ptr.clone();
        let mut idx = vec![0usize; ptr[self.n_cells]];
        for f in 0..self.faces.len() {
            let o = self.owner[f];
            idx[fill[o]] = f;
            fill[o] += 1;
            if let Some(n) = self.neighbour_of(f) {
                idx[fill[n]] = f;
                fill[n] += 1;
            }
        }
        self.cell_face_ptr = ptr;
        self.cell_face_idx = idx;
    }

    fn compute_face_geometry(&mut self) {
        let n_faces = self.faces.len();
        self.face_centres = Vec::with_capacity(n_faces);
        self.face_areas = Vec::with_capacity(n_faces);
        for face in &self.faces {
            let pts: Vec<DVec3> = face.iter().map(|&i| self.points[i]).collect();
            let (centre, area) = face_centre_and_area(&pts);
            self.face_centres.push(centre);
            self.face_areas.push(area);
        }
        self.mag_sf = self.face_areas.iter().map(|s| s.length()).collect();
    }

    fn compute_cell_geometry(&mut self) -> HxResult<()> {
        let n = self.n_cells;
        // 估计中心：面心平均
        let mut c_est = vec![DVec3::ZERO; n];
        for c in 0..n {
            let faces = self.cell_faces(c);
            let sum: DVec3 = faces.iter().map(|&f| self.face_centres[f]).sum();
            c_est[c] = sum / faces.len().max(1) as f64;
        }

        let mut centres = vec![DVec3::ZERO; n];
        let mut volumes = vec![0.0; n];
        for f in 0..self.faces.len() {
            let cf = self.face_centres[f];
            let sf = self.face_areas[f];

            let o = self.owner[f];
            let pyr3 = sf.dot(cf - c_est[o]);
            centres[o] += pyr3 * (0.75 * cf + 0.25 * c_est[o]);
            volumes[o] += pyr3;

            if let Some(nb) = self.neighbour_of(f) {
                let pyr3 = sf.dot(c_est[nb] - cf);
                centres[nb] += pyr3 * (0.75 * cf + 0.25 * c_est[nb]);
                volumes[nb] += pyr3;
            }
        }
        for c in 0..n {
            if !(volumes[c] > VSMALL) {
                return Err(HxError::invalid_mesh(format!(
                    "单元 {c} 体积非正: {:.3e}",
                    volumes[c] / 3.0
                )));
            }
            centres[c] /= volumes[c];
            volumes[c] /= 3.0;
        }
        self.cell_centres = centres;
        self.cell_volumes = volumes;
        Ok(())
    }

    fn compute_interpolation_geometry(&mut self) {
        let n_faces = self.faces.len();
        self.weights = vec![1.0; n_faces];
        self.delta_coeffs = vec![0.0; n_faces];
        self.non_orth_delta_coeffs = vec![0.0; n_faces];
        self.non_orth_correction_vectors = vec![DVec3::ZERO; n_faces];

        for f in 0..n_faces {
            let o = self.owner[f];
            let cf = self.face_centres[f];
            let sf = self.face_areas[f];
            let n_hat = sf / self.mag_sf[f].max(VSMALL);

            let delta = match self.neighbour_of(f) {
                Some(nb) => {
                    let d_own = sf.dot(cf - self.cell_centres[o]).abs();
                    let d_nei = sf.dot(self.cell_centres[nb] - cf).abs();
                    self.weights[f] = d_nei / (d_own + d_nei).max(VSMALL);
                    self.cell_centres[nb] - self.cell_centres[o]
                }
                None => cf - self.cell_centres[o],
            };

            self.delta_coeffs[f] = 1.0 / delta.length().max(VSMALL);
            let nd = n_hat.dot(delta).max(0.05 * delta.length());
            self.non_orth_delta_coeffs[f] = 1.0 / nd.max(VSMALL);
            if self.is_internal_face(f) {
                self.non_orth_correction_vectors[f] = n_hat - delta * self.non_orth_delta_coeffs[f];
            }
        }
    }

    // ========================================================================
    // 拓扑查询
    // ========================================================================

    /// 单元数
    #[inline]
    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    /// 总面数
    #[inline]
    pub fn n_faces(&self) -> usize {
        self.faces.len()
    }

    /// 内部面数
    #[inline]
    pub fn n_internal_faces(&self) -> usize {
        self.neighbour.len()
    }

    /// 是否为内部面
    #[inline]
    pub fn is_internal_face(&self, face: usize) -> bool {
        face < self.neighbour.len()
    }

    /// 全部面的 owner
    #[inline]
    pub fn owner(&self) -> &[usize] {
        &self.owner
    }

    /// 内部面的 neighbour
    #[inline]
    pub fn neighbour(&self) -> &[usize] {
        &self.neighbour
    }

    /// 面的 neighbour，边界面返回 None
    #[inline]
    pub fn neighbour_of(&self, face: usize) -> Option<usize> {
        self.neighbour.get(face).copied()
    }

    /// 单元的全部面
    #[inline]
    pub fn cell_faces(&self, cell: usize) -> &[usize] {
        &self.cell_face_idx[self.cell_face_ptr[cell]..self.cell_face_ptr[cell + 1]]
    }

    /// 边界块列表
    #[inline]
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    /// 按名称查找边界块
    pub fn find_patch(&self, name: &str) -> Option<usize> {
        self.patches.iter().position(|p| p.name == name)
    }

    /// 边界面所属的边界块及块内序号，内部面返回 None
    pub fn face_patch(&self, face: usize) -> Option<(usize, usize)> {
        if self.is_internal_face(face) {
            return None;
        }
        let idx = self.patches.partition_point(|p| p.start + p.size <= face);
        let p = self.patches.get(idx)?;
        Some((idx, face - p.start))
    }

    /// 边界块的相邻单元
    #[inline]
    pub fn patch_face_cells(&self, patch: usize) -> &[usize] {
        &self.owner[self.patches[patch].faces()]
    }

    /// 点坐标
    #[inline]
    pub fn points(&self) -> &[DVec3] {
        &self.points
    }

    /// 面的顶点
    #[inline]
    pub fn faces(&self) -> &[Vec<usize>] {
        &self.faces
    }

    /// 拓扑版本号，每次拓扑变化递增
    #[inline]
    pub fn topology_version(&self) -> u64 {
        self.topology_version
    }

    /// 设置拓扑版本号（拓扑变化后由网格提供方调用）
    pub fn set_topology_version(&mut self, version: u64) {
        self.topology_version = version;
    }

    // ========================================================================
    // 几何查询
    // ========================================================================

    /// 单元中心
    #[inline]
    pub fn cell_centres(&self) -> &[DVec3] {
        &self.cell_centres
    }

    /// 单元体积
    #[inline]
    pub fn cell_volumes(&self) -> &[f64] {
        &self.cell_volumes
    }

    /// 面心
    #[inline]
    pub fn face_centres(&self) -> &[DVec3] {
        &self.face_centres
    }

    /// 面积矢量 Sf
    #[inline]
    pub fn face_areas(&self) -> &[DVec3] {
        &self.face_areas
    }

    /// 面积 |Sf|
    #[inline]
    pub fn mag_sf(&self) -> &[f64] {
        &self.mag_sf
    }

    /// 线性插值权重（owner 一侧），边界面为 1
    #[inline]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// 1/|d|
    #[inline]
    pub fn delta_coeffs(&self) -> &[f64] {
        &self.delta_coeffs
    }

    /// 1/(n·d)，带 0.05|d| 下限
    #[inline]
    pub fn non_orth_delta_coeffs(&self) -> &[f64] {
        &self.non_orth_delta_coeffs
    }

    /// 非正交修正矢量 n - d/(n·d)，边界面为零
    #[inline]
    pub fn non_orth_correction_vectors(&self) -> &[DVec3] {
        &self.non_orth_correction_vectors
    }

    /// 总体积（本进程）
    pub fn total_volume(&self) -> f64 {
        self.cell_volumes.iter().sum()
    }

    /// 是否存在非正交面（修正矢量非零）
    pub fn is_non_orthogonal(&self) -> bool {
        self.non_orth_correction_vectors
            .iter()
            .any(|v| v.length_squared() > 1e-20)
    }

    /// 距离给定点最近的单元中心
    pub fn find_nearest_cell(&self, point: DVec3) -> Option<usize> {
        self.cell_centres
            .iter()
            .enumerate()
            .min_by(|a, b| {
                a.1.distance_squared(point)
                    .total_cmp(&b.1.distance_squared(point))
            })
            .map(|(i, _)| i)
    }

    /// 网格质量检查：体积、面积、闭合性与非正交角
    pub fn check(&self) -> ValidationReport {
        let mut report = ValidationReport::new();

        for (c, &v) in self.cell_volumes.iter().enumerate() {
            if !(v > 0.0) {
                report.add_error(ValidationError::Geometry {
                    message: format!("体积非正 {v:.3e}"),
                    element_id: c,
                });
            }
        }
        for (f, &a) in self.mag_sf.iter().enumerate() {
            if !(a > 0.0) {
                report.add_error(ValidationError::Geometry {
                    message: "面积为零".into(),
                    element_id: f,
                });
            }
        }

        // 单元闭合：ΣSf(外法向) = 0
        let mut sum_sf = vec![DVec3::ZERO; self.n_cells];
        let mut sum_mag = vec![0.0; self.n_cells];
        for f in 0..self.n_faces() {
            sum_sf[self.owner[f]] += self.face_areas[f];
            sum_mag[self.owner[f]] += self.mag_sf[f];
            if let Some(n) = self.neighbour_of(f) {
                sum_sf[n] -= self.face_areas[f];
                sum_mag[n] += self.mag_sf[f];
            }
        }
        for c in 0..self.n_cells {
            if sum_sf[c].length() > 1e-8 * sum_mag[c] {
                report.add_error(ValidationError::Topology {
                    message: format!("单元不闭合 |ΣSf| = {:.3e}", sum_sf[c].length()),
                    element_id: Some(c),
                });
            }
        }

        for f in 0..self.n_internal_faces() {
            let d = self.cell_centres[self.neighbour[f]] - self.cell_centres[self.owner[f]];
            let cos = (d.dot(self.face_areas[f]) / (d.length() * self.mag_sf[f]).max(VSMALL))
                .clamp(-1.0, 1.0);
            let angle = cos.acos().to_degrees();
            if angle > NON_ORTH_WARN_DEG {
                report.add_warning(ValidationWarning::NonOrthogonality {
                    face_id: f,
                    angle_deg: angle,
                    threshold_deg: NON_ORTH_WARN_DEG,
                });
            }
        }
        report
    }
}

/// 多边形面心与面积矢量
///
/// 三角形直接计算；多边形以顶点平均为公共顶点分解为三角形，
/// 面心按三角形面积加权。
fn face_centre_and_area(pts: &[DVec3]) -> (DVec3, DVec3) {
    if pts.len() == 3 {
        let centre = (pts[0] + pts[1] + pts[2]) / 3.0;
        let area = 0.5 * (pts[1] - pts[0]).cross(pts[2] - pts[0]);
        return (centre, area);
    }

    let n = pts.len();
    let f_centre: DVec3 = pts.iter().copied().sum::<DVec3>() / n as f64;

    let mut sum_n = DVec3::ZERO;
    let mut sum_a = 0.0;
    let mut sum_ac = DVec3::ZERO;
    for i in 0..n {
        let this = pts[i];
        let next = pts[(i + 1) % n];
        let c = this + next + f_centre;
        let tri_n = (next - this).cross(f_centre - this);
        let a = tri_n.length();
        sum_n += tri_n;
        sum_a += a;
        sum_ac += a * c;
    }

    if sum_a < VSMALL {
        (f_centre, DVec3::ZERO)
    } else {
        (sum_ac / (3.0 * sum_a), 0.5 * sum_n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::BoxMeshBuilder;

    #[test]
    fn test_unit_cube_geometry() {
        let mesh = BoxMeshBuilder::new([1, 1, 1], [1.0, 1.0, 1.0]).build().unwrap();
        assert_eq!(mesh.n_cells(), 1);
        assert_eq!(mesh.n_faces(), 6);
        assert_eq!(mesh.n_internal_faces(), 0);
        assert!((mesh.cell_volumes()[0] - 1.0).abs() < 1e-12);
        assert!(mesh.cell_centres()[0].distance(DVec3::splat(0.5)) < 1e-12);
        for f in 0..6 {
            assert!((mesh.mag_sf()[f] - 1.0).abs() < 1e-12);
            // 边界面向外
            let out = mesh.face_centres()[f] - mesh.cell_centres()[0];
            assert!(out.dot(mesh.face_areas()[f]) > 0.0);
        }
    }

    #[test]
    fn test_internal_face_weights_and_deltas() {
        let mesh = BoxMeshBuilder::new([4, 1, 1], [2.0, 1.0, 1.0]).build().unwrap();
        assert_eq!(mesh.n_internal_faces(), 3);
        for f in 0..3 {
            assert!((mesh.weights()[f] - 0.5).abs() < 1e-12);
            assert!((mesh.delta_coeffs()[f] - 2.0).abs() < 1e-12);
            assert!(mesh.non_orth_correction_vectors()[f].length() < 1e-12);
            assert!(mesh.owner()[f] < mesh.neighbour()[f]);
        }
        // 边界面 delta = 半个单元
        let xmin = mesh.find_patch("xmin").unwrap();
        let f = mesh.patches()[xmin].start;
        assert!((mesh.delta_coeffs()[f] - 4.0).abs() < 1e-12);
        assert!(!mesh.is_non_orthogonal());
        assert!(mesh.check().is_valid());
    }

    #[test]
    fn test_distorted_mesh_is_closed_and_non_orthogonal() {
        let mesh = BoxMeshBuilder::new([4, 4, 1], [1.0, 1.0, 0.1])
            .with_distortion(|p| DVec3::new(p.x + 0.1 * p.y * (std::f64::consts::PI * p.x).sin(), p.y, p.z))
            .build()
            .unwrap();
        assert!(mesh.check().is_valid());
        assert!(mesh.is_non_orthogonal());
        assert!((mesh.total_volume() - 0.1).abs() < 1e-10);
    }

    #[test]
    fn test_cell_faces_and_nearest_cell() {
        let mesh = BoxMeshBuilder::new([2, 2, 1], [1.0, 1.0, 1.0]).build().unwrap();
        for c in 0..mesh.n_cells() {
            assert_eq!(mesh.cell_faces(c).len(), 6);
        }
        let c = mesh.find_nearest_cell(DVec3::new(0.9, 0.9, 0.5)).unwrap();
        assert!(mesh.cell_centres()[c].distance(DVec3::new(0.75, 0.75, 0.5)) < 1e-12);
    }
}
