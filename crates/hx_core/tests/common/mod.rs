// crates/hx_core/tests/common/mod.rs

//! 集成测试公用的网格与算例构造

#![allow(dead_code)]

use glam::DVec3;
use hx_config::{CaseConfig, PhaseConfig, SolutionControls, ThermalProperties, TimeConfig, TimeScheme};
use hx_core::control::InitialFields;
use hx_core::mesh::{BoxMeshBuilder, BoxSide, PatchKind, PolyMesh};

// ============================================================================
// 网格
// ============================================================================

/// 二维方腔：`n × n × 1` 单元，顶面名为 `lid`，其余侧面为壁面，前后为对称面
pub fn create_box_mesh(n: usize, length: f64) -> PolyMesh {
    BoxMeshBuilder::new([n, n, 1], [length, length, length / n as f64])
        .with_side(BoxSide::YMax, "lid", PatchKind::Wall)
        .with_side(BoxSide::ZMin, "frontAndBack", PatchKind::Symmetry)
        .with_side(BoxSide::ZMax, "frontAndBack", PatchKind::Symmetry)
        .build()
        .expect("方腔网格")
}

/// 一维槽道：`inlet` / `outlet` 为开边界，其余侧面为对称面 `sides`
pub fn create_channel_mesh(n: usize, length: f64) -> PolyMesh {
    let width = length / n as f64;
    let mut builder = BoxMeshBuilder::new([n, 1, 1], [length, width, width])
        .with_side(BoxSide::XMin, "inlet", PatchKind::Patch)
        .with_side(BoxSide::XMax, "outlet", PatchKind::Patch);
    for side in [BoxSide::YMin, BoxSide::YMax, BoxSide::ZMin, BoxSide::ZMax] {
        builder = builder.with_side(side, "sides", PatchKind::Symmetry);
    }
    builder.build().expect("槽道网格")
}

// ============================================================================
// 初始场与配置
// ============================================================================

/// 顶盖驱动：三面静止壁，顶盖以 `lid` 速度运动
pub fn lid_driven(mesh: &PolyMesh, p: f64, lid: DVec3) -> InitialFields {
    let mut initial = InitialFields::uniform(mesh, p, 300.0);
    for wall in ["xmin", "xmax", "ymin"] {
        initial.u.set_fixed_value(mesh, wall, DVec3::ZERO).expect("壁面");
    }
    initial.u.set_fixed_value(mesh, "lid", lid).expect("顶盖");
    initial
}

/// 瞬态 Euler 算例配置
pub fn transient_config(end_time: f64, delta_t: f64, controls: SolutionControls) -> CaseConfig {
    CaseConfig {
        time: TimeConfig {
            start_time: 0.0,
            end_time,
            delta_t,
            ddt_scheme: TimeScheme::Euler,
            ..Default::default()
        },
        controls,
        ..Default::default()
    }
}

/// 常物性相
pub fn phase(name: &str, rho: f64, nu: f64) -> PhaseConfig {
    PhaseConfig {
        name: name.to_string(),
        rho,
        nu,
        thermal: ThermalProperties::default(),
        phase_temperature: false,
    }
}

/// 绝对值最大
pub fn max_abs(values: &[f64]) -> f64 {
    values.iter().map(|v| v.abs()).fold(0.0, f64::max)
}
