// crates/hx_core/src/field/io.rs

//! 场文件读写
//!
//! 每个场按时间目录存为 `<case>/<time>/<field>.json`，
//! 只保存当前时间层，旧时间层不落盘。

use super::value::FieldValue;
use super::vol_field::{BoundaryKind, VolField};
use crate::mesh::PolyMesh;
use hx_foundation::{Dimensions, HxError, HxResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 边界块记录
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: FieldValue")]
pub struct PatchRecord<T: FieldValue> {
    /// 边界块名
    pub name: String,
    /// 类型
    pub kind: BoundaryKind,
    /// 边界值
    pub values: Vec<T>,
    /// 给定梯度（仅 FixedGradient 非空）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gradient: Vec<T>,
}

/// 场文件内容
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: FieldValue")]
pub struct FieldRecord<T: FieldValue> {
    /// 场名
    pub name: String,
    /// 量纲
    pub dimensions: Dimensions,
    /// 内部值
    pub internal: Vec<T>,
    /// 边界
    pub boundary: Vec<PatchRecord<T>>,
}

/// 时间目录名：整数时间不带小数点
pub fn time_name(time: f64) -> String {
    if time.fract() == 0.0 && time.abs() < 1e15 {
        format!("{}", time as i64)
    } else {
        format!("{time}")
    }
}

/// 场文件路径
pub fn field_path(case_dir: &Path, time: f64, field: &str) -> PathBuf {
    case_dir.join(time_name(time)).join(format!("{field}.json"))
}

/// 写出当前时间层
pub fn write_field<T: FieldValue>(
    case_dir: &Path,
    time: f64,
    mesh: &PolyMesh,
    field: &VolField<T>,
) -> HxResult<PathBuf> {
    let record = FieldRecord {
        name: field.name().to_string(),
        dimensions: field.dimensions(),
        internal: field.internal().to_vec(),
        boundary: mesh
            .patches()
            .iter()
            .zip(field.patches())
            .map(|(p, pf)| PatchRecord {
                name: p.name.clone(),
                kind: pf.kind(),
                values: pf.values().to_vec(),
                gradient: if pf.kind() == BoundaryKind::FixedGradient {
                    pf.gradient().to_vec()
                } else {
                    Vec::new()
                },
            })
            .collect(),
    };

    let path = field_path(case_dir, time, field.name());
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| HxError::io_with_source(format!("创建目录 {}", dir.display()), e))?;
    }
    let content =
        serde_json::to_string_pretty(&record).map_err(|e| HxError::serialization(e.to_string()))?;
    std::fs::write(&path, content)
        .map_err(|e| HxError::io_with_source(format!("写入 {}", path.display()), e))?;
    log::debug!("写出场 {} -> {}", field.name(), path.display());
    Ok(path)
}

/// 读取场文件到已有场（边界类型与值一并覆盖）
///
/// 文件缺失时返回 `Ok(false)`，场保持默认值。
pub fn read_field<T: FieldValue>(
    case_dir: &Path,
    time: f64,
    mesh: &PolyMesh,
    field: &mut VolField<T>,
) -> HxResult<bool> {
    let path = field_path(case_dir, time, field.name());
    if !path.exists() {
        return Ok(false);
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| HxError::io_with_source(format!("读取 {}", path.display()), e))?;
    let record: FieldRecord<T> =
        serde_json::from_str(&content).map_err(|e| HxError::serialization(e.to_string()))?;

    if record.dimensions != field.dimensions() {
        return Err(HxError::dimension_mismatch(
            format!("读取 {}", path.display()),
            record.dimensions.to_string(),
            field.dimensions().to_string(),
        ));
    }
    HxError::check_size("internal", mesh.n_cells(), record.internal.len())?;
    field.internal_mut().copy_from_slice(&record.internal);

    for rec in &record.boundary {
        let pi = mesh
            .find_patch(&rec.name)
            .ok_or_else(|| HxError::not_found(format!("{} 中的边界块 {}", path.display(), rec.name)))?;
        let size = mesh.patches()[pi].size;
        HxError::check_size("patch values", size, rec.values.len())?;
        let pf = field.boundary_mut(pi);
        *pf = VolField::<T>::rebuild_patch(rec.kind, size, T::ZERO);
        pf.values_mut().copy_from_slice(&rec.values);
        if !rec.gradient.is_empty() {
            HxError::check_size("patch gradient", size, rec.gradient.len())?;
            pf.gradient_mut().copy_from_slice(&rec.gradient);
        }
    }
    field.correct_boundary_conditions(mesh);
    log::debug!("读取场 {} <- {}", field.name(), path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::BoxMeshBuilder;
    use glam::DVec3;

    #[test]
    fn test_time_name() {
        assert_eq!(time_name(0.0), "0");
        assert_eq!(time_name(12.0), "12");
        assert_eq!(time_name(0.25), "0.25");
    }

    #[test]
    fn test_write_then_read() {
        let mesh = BoxMeshBuilder::new([2, 2, 1], [1.0, 1.0, 1.0]).build().unwrap();
        let dir = std::env::temp_dir().join("hx_core_field_io_test");
        let _ = std::fs::remove_dir_all(&dir);

        let mut u = VolField::new("U", Dimensions::VELOCITY, &mesh, DVec3::ZERO);
        u.set_fixed_value(&mesh, "ymax", DVec3::X).unwrap();
        u.internal_mut()[3] = DVec3::new(0.5, 0.0, 0.0);
        u.store_old_time();
        write_field(&dir, 0.5, &mesh, &u).unwrap();

        let mut v = VolField::new("U", Dimensions::VELOCITY, &mesh, DVec3::ZERO);
        assert!(read_field(&dir, 0.5, &mesh, &mut v).unwrap());
        assert_eq!(v.internal()[3], DVec3::new(0.5, 0.0, 0.0));
        let ymax = mesh.find_patch("ymax").unwrap();
        assert_eq!(v.boundary(ymax).kind(), BoundaryKind::FixedValue);
        assert!(v.old_time(1).is_none());

        let mut missing = VolField::new("p", Dimensions::PRESSURE, &mesh, 0.0);
        assert!(!read_field(&dir, 0.5, &mesh, &mut missing).unwrap());

        let mut wrong = VolField::new("U", Dimensions::PRESSURE, &mesh, DVec3::ZERO);
        assert!(read_field(&dir, 0.5, &mesh, &mut wrong).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_values_survive_bit_exact() {
        let mesh = BoxMeshBuilder::new([2, 2, 1], [1.0, 1.0, 1.0]).build().unwrap();
        let dir = std::env::temp_dir().join("hx_core_field_io_exact_test");
        let _ = std::fs::remove_dir_all(&dir);

        // 最短十进制表示在末位容易差一个 ulp 的值
        let values = [0.1 + 0.2, 1.0 / 3.0, 2.2250738585072014e-308, -9.876543210987654e17];
        let mut p = VolField::new("p", Dimensions::PRESSURE, &mesh, 0.0);
        p.internal_mut().copy_from_slice(&values);
        write_field(&dir, 1.0, &mesh, &p).unwrap();

        let mut q = VolField::new("p", Dimensions::PRESSURE, &mesh, 0.0);
        assert!(read_field(&dir, 1.0, &mesh, &mut q).unwrap());
        for (a, b) in q.internal().iter().zip(&values) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        let _ = std::fs::remove_dir_all(&dir);
    }
}
