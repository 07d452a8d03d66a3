// apps/hx_cli/src/cases.rs

//! 内置演示算例
//!
//! 三个算例覆盖求解核心的主要路径：
//!
//! - `cavity`: 顶盖驱动方腔，不可压单相 PISO，压力需要参考单元
//! - `dam-break`: 二维溃坝，两相 VOF（MULES + 界面压缩），顶部为大气开边界
//! - `closed-box`: 封闭理想气体方腔，质量通量形式与封闭域质量修正

use clap::ValueEnum;
use glam::DVec3;
use hx_config::{
    CaseConfig, MaterialModel, MulesConfig, PhaseConfig, SolutionControls, ThermalProperties, TimeScheme,
};
use hx_core::control::InitialFields;
use hx_core::field::VolScalarField;
use hx_core::mesh::{BoxMeshBuilder, BoxSide, PatchKind, PolyMesh};
use hx_foundation::{Dimensions, HxResult};

/// 演示算例
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DemoCase {
    /// 顶盖驱动方腔
    Cavity,
    /// 二维溃坝
    DamBreak,
    /// 封闭可压方腔
    ClosedBox,
}

/// 算例的网格、配置与初始场
pub struct CaseSetup {
    pub mesh: PolyMesh,
    pub config: CaseConfig,
    pub initial: InitialFields,
}

/// 构建演示算例；`cells` 为每个方向的单元数
pub fn build(case: DemoCase, cells: usize) -> HxResult<CaseSetup> {
    match case {
        DemoCase::Cavity => cavity(cells),
        DemoCase::DamBreak => dam_break(cells),
        DemoCase::ClosedBox => closed_box(cells),
    }
}

fn planar_box(cells: usize, length: f64, top: &str, top_kind: PatchKind) -> HxResult<PolyMesh> {
    BoxMeshBuilder::new([cells, cells, 1], [length, length, length / cells as f64])
        .with_side(BoxSide::YMax, top, top_kind)
        .with_side(BoxSide::ZMin, "frontAndBack", PatchKind::Symmetry)
        .with_side(BoxSide::ZMax, "frontAndBack", PatchKind::Symmetry)
        .build()
}

fn cavity(cells: usize) -> HxResult<CaseSetup> {
    let mesh = planar_box(cells, 0.1, "movingWall", PatchKind::Wall)?;
    let mut initial = InitialFields::uniform(&mesh, 0.0, 300.0);
    for wall in ["xmin", "xmax", "ymin"] {
        initial.u.set_fixed_value(&mesh, wall, DVec3::ZERO)?;
    }
    initial.u.set_fixed_value(&mesh, "movingWall", DVec3::X)?;

    let mut config = CaseConfig::default();
    config.time.end_time = 0.5;
    config.time.delta_t = 0.005;
    config.time.write_interval = 20;
    config.controls = SolutionControls::piso(2);
    config.fluid.material = MaterialModel::Incompressible { rho: 1.0, nu: 0.01 };
    config.pressure_control.p_ref_cell = Some(0);
    Ok(CaseSetup { mesh, config, initial })
}

fn dam_break(cells: usize) -> HxResult<CaseSetup> {
    let length = 0.584;
    let mesh = planar_box(cells, length, "atmosphere", PatchKind::Patch)?;
    let mut initial = InitialFields::uniform(&mesh, 0.0, 300.0);
    for wall in ["xmin", "xmax", "ymin"] {
        initial.u.set_fixed_value(&mesh, wall, DVec3::ZERO)?;
    }
    initial.p.set_fixed_value(&mesh, "atmosphere", 0.0)?;

    let mut water = VolScalarField::new("alpha.water", Dimensions::DIMLESS, &mesh, 0.0);
    for (c, x) in mesh.cell_centres().iter().enumerate() {
        if x.x < 0.25 * length && x.y < 0.5 * length {
            water.internal_mut()[c] = 1.0;
        }
    }
    let mut air = water.like("alpha.air", Dimensions::DIMLESS, 0.0);
    for (a, w) in air.internal_mut().iter_mut().zip(water.internal()) {
        *a = 1.0 - w;
    }
    air.set_fixed_value(&mesh, "atmosphere", 1.0)?;
    water.set_fixed_value(&mesh, "atmosphere", 0.0)?;
    initial.alphas = vec![water, air];

    let mut config = CaseConfig::default();
    config.time.end_time = 0.2;
    config.time.delta_t = 1e-3;
    config.time.ddt_scheme = TimeScheme::Euler;
    config.time.write_interval = 50;
    config.controls = SolutionControls::pimple(1, 3);
    config.adaptive_time.adjust_time_step = true;
    config.adaptive_time.max_co = 0.5;
    config.adaptive_time.max_alpha_co = 0.5;
    config.gravity = [0.0, -9.81, 0.0];
    config.mules = MulesConfig::with_compression(1.0);
    config.phases = vec![
        PhaseConfig {
            name: "water".into(),
            rho: 1000.0,
            nu: 1e-6,
            thermal: ThermalProperties::default(),
            phase_temperature: false,
        },
        PhaseConfig {
            name: "air".into(),
            rho: 1.0,
            nu: 1.48e-5,
            thermal: ThermalProperties::default(),
            phase_temperature: false,
        },
    ];
    Ok(CaseSetup { mesh, config, initial })
}

fn closed_box(cells: usize) -> HxResult<CaseSetup> {
    let mesh = planar_box(cells, 1.0, "lid", PatchKind::Wall)?;
    let mut initial = InitialFields::uniform(&mesh, 1e5, 300.0);
    for wall in ["xmin", "xmax", "ymin"] {
        initial.u.set_fixed_value(&mesh, wall, DVec3::ZERO)?;
    }
    initial.u.set_fixed_value(&mesh, "lid", DVec3::new(10.0, 0.0, 0.0))?;

    let mut config = CaseConfig::default();
    config.time.end_time = 0.05;
    config.time.delta_t = 5e-4;
    config.time.write_interval = 20;
    config.controls = SolutionControls::pimple(2, 2);
    config.fluid.material = MaterialModel::PerfectGas { r_gas: 287.0, mu: 1.8e-5 };
    Ok(CaseSetup { mesh, config, initial })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_configs_validate() {
        for case in [DemoCase::Cavity, DemoCase::DamBreak, DemoCase::ClosedBox] {
            let setup = build(case, 4).unwrap();
            assert!(setup.config.validate().is_ok(), "{case:?}");
            assert_eq!(setup.mesh.n_cells(), 16);
        }
    }

    #[test]
    fn test_dam_break_column() {
        let setup = build(DemoCase::DamBreak, 8).unwrap();
        let water: f64 = setup.initial.alphas[0].internal().iter().sum();
        // x < 0.25 L 且 y < 0.5 L：2 × 4 个单元
        assert_eq!(water, 8.0);
    }
}
