// crates/hx_core/src/field/mod.rs

//! 网格驻留场
//!
//! - [`VolField`]: 单元中心体场（内部值 + 边界值 + 旧时间层）
//! - [`SurfaceField`]: 面标量场（通量）
//! - [`io`]: 按时间目录读写当前时间层

pub mod io;
mod old_time;
mod surface_field;
mod value;
mod vol_field;

pub use old_time::{OldTimeRing, OLD_TIME_DEPTH};
pub use surface_field::SurfaceField;
pub use value::FieldValue;
pub use vol_field::{BoundaryKind, PatchField, VolField, VolScalarField, VolVectorField};
