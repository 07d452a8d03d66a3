// crates/hx_core/src/mesh/mod.rs

//! 网格
//!
//! 求解核心只通过 [`PolyMesh`] 的只读接口访问网格：
//! 单元体积与中心、面积矢量、owner/neighbour、边界块与耦合类型、
//! 插值权重和非正交修正几何，以及拓扑版本号。

mod builder;
mod poly_mesh;

pub use builder::{BoxMeshBuilder, BoxSide};
pub use poly_mesh::{Patch, PatchKind, PolyMesh, NON_ORTH_WARN_DEG};
