// crates/hx_core/src/mesh/builder.rs

//! 结构化六面体网格生成
//!
//! 按 `nx × ny × nz` 划分长方体，生成 [`PolyMesh`]。
//! 六个侧面默认名为 `xmin`/`xmax`/`ymin`/`ymax`/`zmin`/`zmax`，
//! 类型为固壁；同名侧面合并为一个边界块。
//! 可选的坐标变换用于构造非正交网格。
//!
//! # 使用示例
//!
//! ```
//! use hx_core::mesh::{BoxMeshBuilder, BoxSide, PatchKind};
//!
//! let mesh = BoxMeshBuilder::new([8, 8, 1], [1.0, 1.0, 0.1])
//!     .with_side(BoxSide::ZMin, "frontAndBack", PatchKind::Symmetry)
//!     .with_side(BoxSide::ZMax, "frontAndBack", PatchKind::Symmetry)
//!     .build()
//!     .unwrap();
//! assert_eq!(mesh.n_cells(), 64);
//! assert!(mesh.find_patch("frontAndBack").is_some());
//! ```

use super::poly_mesh::{Patch, PatchKind, PolyMesh};
use glam::DVec3;
use hx_foundation::{HxError, HxResult};

/// 长方体侧面
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxSide {
    /// x 最小面
    XMin,
    /// x 最大面
    XMax,
    /// y 最小面
    YMin,
    /// y 最大面
    YMax,
    /// z 最小面
    ZMin,
    /// z 最大面
    ZMax,
}

impl BoxSide {
    const ALL: [BoxSide; 6] = [
        BoxSide::XMin,
        BoxSide::XMax,
        BoxSide::YMin,
        BoxSide::YMax,
        BoxSide::ZMin,
        BoxSide::ZMax,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn default_name(self) -> &'static str {
        match self {
            BoxSide::XMin => "xmin",
            BoxSide::XMax => "xmax",
            BoxSide::YMin => "ymin",
            BoxSide::YMax => "ymax",
            BoxSide::ZMin => "zmin",
            BoxSide::ZMax => "zmax",
        }
    }
}

type Distortion = Box<dyn Fn(DVec3) -> DVec3>;

/// 长方体网格构建器
pub struct BoxMeshBuilder {
    n: [usize; 3],
    length: [f64; 3],
    origin: DVec3,
    sides: [(String, PatchKind); 6],
    distortion: Option<Distortion>,
}

impl BoxMeshBuilder {
    /// 创建构建器
    pub fn new(n: [usize; 3], length: [f64; 3]) -> Self {
        Self {
            n,
            length,
            origin: DVec3::ZERO,
            sides: BoxSide::ALL.map(|s| (s.default_name().to_string(), PatchKind::Wall)),
            distortion: None,
        }
    }

    /// 设置原点
    pub fn with_origin(mut self, origin: DVec3) -> Self {
        self.origin = origin;
        self
    }

    /// 设置侧面的边界块名称与类型
    pub fn with_side(mut self, side: BoxSide, name: &str, kind: PatchKind) -> Self {
        self.sides[side.index()] = (name.to_string(), kind);
        self
    }

    /// 设置点坐标变换（作用于全部网格点）
    pub fn with_distortion<F>(mut self, f: F) -> Self
    where
        F: Fn(DVec3) -> DVec3 + 'static,
    {
        self.distortion = Some(Box::new(f));
        self
    }

    /// 单元编号
    pub fn cell_index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.n[0] * (j + self.n[1] * k)
    }

    /// 生成网格
    pub fn build(self) -> HxResult<PolyMesh> {
        let [nx, ny, nz] = self.n;
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(HxError::invalid_mesh("各方向单元数必须为正"));
        }
        if self.length.iter().any(|l| !(*l > 0.0)) {
            return Err(HxError::invalid_mesh("长方体边长必须为正"));
        }

        let dx = DVec3::new(
            self.length[0] / nx as f64,
            self.length[1] / ny as f64,
            self.length[2] / nz as f64,
        );
        let pid = |i: usize, j: usize, k: usize| i + (nx + 1) * (j + (ny + 1) * k);
        let cid = |i: usize, j: usize, k: usize| i + nx * (j + ny * k);

        let mut points = Vec::with_capacity((nx + 1) * (ny + 1) * (nz + 1));
        for k in 0..=nz {
            for j in 0..=ny {
                for i in 0..=nx {
                    let p = self.origin + DVec3::new(i as f64, j as f64, k as f64) * dx;
                    points.push(match &self.distortion {
                        Some(f) => f(p),
                        None => p,
                    });
                }
            }
        }

        // 法向为 +x/+y/+z 的面顶点
        let x_face = |i: usize, j: usize, k: usize| {
            vec![pid(i, j, k), pid(i, j + 1, k), pid(i, j + 1, k + 1), pid(i, j, k + 1)]
        };
        let y_face = |i: usize, j: usize, k: usize| {
            vec![pid(i, j, k), pid(i, j, k + 1), pid(i + 1, j, k + 1), pid(i + 1, j, k)]
        };
        let z_face = |i: usize, j: usize, k: usize| {
            vec![pid(i, j, k), pid(i + 1, j, k), pid(i + 1, j + 1, k), pid(i, j + 1, k)]
        };

        // 内部面：按 (owner, neighbour) 排序
        let mut internal: Vec<(usize, usize, Vec<usize>)> = Vec::new();
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let c = cid(i, j, k);
                    if i + 1 < nx {
                        internal.push((c, cid(i + 1, j, k), x_face(i + 1, j, k)));
                    }
                    if j + 1 < ny {
                        internal.push((c, cid(i, j + 1, k), y_face(i, j + 1, k)));
                    }
                    if k + 1 < nz {
                        internal.push((c, cid(i, j, k + 1), z_face(i, j, k + 1)));
                    }
                }
            }
        }
        internal.sort_by_key(|(o, n, _)| (*o, *n));

        let mut faces = Vec::new();
        let mut owner = Vec::new();
        let mut neighbour = Vec::new();
        for (o, n, f) in internal {
            faces.push(f);
            owner.push(o);
            neighbour.push(n);
        }

        // 各侧面的边界面；最小侧面反转顶点使法向朝外
        let mut side_faces: [Vec<(usize, Vec<usize>)>; 6] = Default::default();
        for k in 0..nz {
            for j in 0..ny {
                let mut f = x_face(0, j, k);
                f.reverse();
                side_faces[BoxSide::XMin.index()].push((cid(0, j, k), f));
                side_faces[BoxSide::XMax.index()].push((cid(nx - 1, j, k), x_face(nx, j, k)));
            }
        }
        for k in 0..nz {
            for i in 0..nx {
                let mut f = y_face(i, 0, k);
                f.reverse();
                side_faces[BoxSide::YMin.index()].push((cid(i, 0, k), f));
                side_faces[BoxSide::YMax.index()].push((cid(i, ny - 1, k), y_face(i, ny, k)));
            }
        }
        for j in 0..ny {
            for i in 0..nx {
                let mut f = z_face(i, j, 0);
                f.reverse();
                side_faces[BoxSide::ZMin.index()].push((cid(i, j, 0), f));
                side_faces[BoxSide::ZMax.index()].push((cid(i, j, nz - 1), z_face(i, j, nz)));
            }
        }

        // 同名侧面合并，按首次出现顺序
        let mut patch_names: Vec<(String, PatchKind)> = Vec::new();
        for (name, kind) in &self.sides {
            match patch_names.iter().find(|(n, _)| n == name) {
                Some((_, k)) if k != kind => {
                    return Err(HxError::invalid_mesh(format!(
                        "边界块 {name} 的侧面类型不一致"
                    )));
                }
                Some(_) => {}
                None => patch_names.push((name.clone(), *kind)),
            }
        }

        let mut patches = Vec::with_capacity(patch_names.len());
        for (name, kind) in patch_names {
            let start = faces.len();
            for side in BoxSide::ALL {
                if self.sides[side.index()].0 != name {
                    continue;
                }
                for (c, f) in side_faces[side.index()].drain(..) {
                    faces.push(f);
                    owner.push(c);
                }
            }
            patches.push(Patch {
                name,
                kind,
                start,
                size: faces.len() - start,
            });
        }

        let mesh = PolyMesh::from_polyhedra(points, faces, owner, neighbour, patches, nx * ny * nz)?;
        log::debug!(
            "生成长方体网格: {}x{}x{} = {} 单元, {} 面",
            nx,
            ny,
            nz,
            mesh.n_cells(),
            mesh.n_faces()
        );
        Ok(mesh)
    }
}
