// crates/hx_core/tests/multiphase.rs

//! 多相 MULES 输运验证
//!
//! # 测试覆盖
//!
//! - 三相（无被动相）与两相（被动相）耦合求解后相分数和为 1、且有界
//! - 一维阶跃在不同 Courant 数下保持有界，入流量守恒

mod common;

use common::{create_box_mesh, create_channel_mesh, lid_driven, phase, transient_config};
use glam::DVec3;
use hx_config::{ConvectionScheme, LinearSolverSettings, MulesConfig, SolutionControls, TimeScheme};
use hx_core::control::FlowSolver;
use hx_core::field::VolScalarField;
use hx_core::fvm::TimeState;
use hx_core::mesh::PolyMesh;
use hx_core::mules::MulesSolver;
use hx_core::parallel::SerialCommunicator;
use hx_core::state::SolveContext;
use hx_foundation::Dimensions;

// ============================================================================
// 测试辅助函数
// ============================================================================

/// 检查相分数和为 1 且每个相分数有界
fn assert_phase_fractions(alphas: &[VolScalarField], n_cells: usize) {
    for c in 0..n_cells {
        let mut sum = 0.0;
        for alpha in alphas {
            let a = alpha.internal()[c];
            assert!(
                (-1e-6..=1.0 + 1e-6).contains(&a),
                "{}[{c}] = {a}",
                alpha.name()
            );
            sum += a;
        }
        assert!((sum - 1.0).abs() < 1e-10, "单元 {c}: Σα = {sum}");
    }
}

/// 按高度分层：`bounds[k]` 以下属于第 k 相，最后一相占据其余部分
fn layered(mesh: &PolyMesh, names: &[&str], bounds: &[f64]) -> Vec<VolScalarField> {
    let mut alphas: Vec<VolScalarField> = names
        .iter()
        .map(|n| VolScalarField::new(&format!("alpha.{n}"), Dimensions::DIMLESS, mesh, 0.0))
        .collect();
    for (c, x) in mesh.cell_centres().iter().enumerate() {
        let k = bounds.iter().position(|b| x.y < *b).unwrap_or(names.len() - 1);
        alphas[k].internal_mut()[c] = 1.0;
    }
    alphas
}

fn water_content(mesh: &PolyMesh, alpha: &VolScalarField) -> f64 {
    alpha
        .internal()
        .iter()
        .zip(mesh.cell_volumes())
        .map(|(a, v)| a * v)
        .sum()
}

// ============================================================================
// 耦合求解
// ============================================================================

#[test]
fn test_three_phase_sum_stays_one() {
    let mesh = create_box_mesh(8, 1.0);
    let mut initial = lid_driven(&mesh, 0.0, DVec3::X);
    initial.alphas = layered(&mesh, &["water", "oil", "kerosene"], &[0.3, 0.8]);

    let mut config = transient_config(0.1, 0.01, SolutionControls::pimple(1, 2));
    config.pressure_control.p_ref_cell = Some(0);
    config.phases = vec![
        phase("water", 1000.0, 1e-2),
        phase("oil", 900.0, 1e-2),
        phase("kerosene", 800.0, 1e-2),
    ];

    let n_cells = mesh.n_cells();
    let mut solver = FlowSolver::new(mesh, config, initial, Box::new(SerialCommunicator)).expect("三相求解器");
    assert_eq!(solver.mules().expect("多相").passive(), None);

    let initial_oil = solver.mules().expect("多相").alphas()[1].internal().to_vec();
    for _ in 0..10 {
        solver.step().expect("时间步");
        let alphas = solver.mules().expect("多相").alphas();
        assert_phase_fractions(alphas, n_cells);
    }
    // 顶盖剪切使界面移动
    let oil = solver.mules().expect("多相").alphas()[1].internal();
    let moved = oil.iter().zip(&initial_oil).any(|(a, b)| (a - b).abs() > 1e-6);
    assert!(moved);
}

#[test]
fn test_two_phase_gravity_with_adaptive_step() {
    let mesh = create_box_mesh(8, 1.0);
    let mut initial = lid_driven(&mesh, 0.0, DVec3::ZERO);
    initial.alphas = layered(&mesh, &["water", "air"], &[0.5]);
    // 倾斜界面：左半边水位更高
    for (c, x) in mesh.cell_centres().iter().enumerate() {
        if x.x < 0.5 && x.y < 0.75 {
            initial.alphas[0].internal_mut()[c] = 1.0;
            initial.alphas[1].internal_mut()[c] = 0.0;
        }
    }

    let mut config = transient_config(1.0, 1e-3, SolutionControls::pimple(1, 3));
    config.pressure_control.p_ref_cell = Some(0);
    config.gravity = [0.0, -9.81, 0.0];
    config.adaptive_time.adjust_time_step = true;
    config.adaptive_time.max_co = 0.5;
    config.adaptive_time.max_alpha_co = 0.5;
    config.mules = MulesConfig::with_compression(1.0);
    config.phases = vec![phase("water", 1000.0, 1e-6), phase("air", 1.0, 1.48e-5)];

    let n_cells = mesh.n_cells();
    let mut solver = FlowSolver::new(mesh, config, initial, Box::new(SerialCommunicator)).expect("两相求解器");
    assert_eq!(solver.mules().expect("多相").passive(), Some(1));

    for _ in 0..5 {
        let report = solver.step().expect("时间步");
        assert!(report.delta_t > 0.0);
        assert_phase_fractions(solver.mules().expect("多相").alphas(), n_cells);
    }
}

// ============================================================================
// 一维阶跃
// ============================================================================

fn advect_step(config: &MulesConfig, courant: f64) {
    let n = 40;
    let mesh = create_channel_mesh(n, 1.0);
    let mut water = VolScalarField::new("alpha.water", Dimensions::DIMLESS, &mesh, 0.0);
    for c in 0..n / 4 {
        water.internal_mut()[c] = 1.0;
    }
    water.set_fixed_value(&mesh, "inlet", 1.0).expect("入口");
    let mut air = water.like("alpha.air", Dimensions::DIMLESS, 0.0);
    for (a, w) in air.internal_mut().iter_mut().zip(water.internal()) {
        *a = 1.0 - w;
    }
    air.set_fixed_value(&mesh, "inlet", 0.0).expect("入口");

    let mut solver = MulesSolver::new(
        &mesh,
        config,
        ConvectionScheme::VanLeer,
        TimeScheme::Euler,
        &[phase("water", 1000.0, 1e-6), phase("air", 1.0, 1.48e-5)],
        vec![water, air],
        true,
    )
    .expect("MULES");

    let velocity = 1.0;
    let dx = 1.0 / n as f64;
    let delta_t = courant * dx / velocity;
    let phi: Vec<f64> = mesh.face_areas().iter().map(|sf| sf.x * velocity).collect();
    let time = TimeState::with_scheme(TimeScheme::Euler, delta_t);
    let ctx = SolveContext {
        mesh: &mesh,
        time: &time,
        comm: &SerialCommunicator,
    };
    let inlet_area = dx * dx;
    let tolerance = config.bound_tolerance;

    let initial = water_content(&mesh, &solver.alphas()[0]);
    // 前沿推进约四分之一槽道，出口始终无水
    let n_steps = (0.25 / (velocity * delta_t)) as usize;
    for step in 1..=n_steps {
        solver.store_old_time();
        solver
            .solve(&ctx, &phi, &phi, &LinearSolverSettings::default(), true)
            .expect("MULES 求解");
        for (c, a) in solver.alphas()[0].internal().iter().enumerate() {
            assert!(
                *a >= -tolerance && *a <= 1.0 + tolerance,
                "Co = {courant}, 第 {step} 步, 单元 {c}: α = {a}"
            );
        }
        let gained = water_content(&mesh, &solver.alphas()[0]) - initial;
        let inflow = step as f64 * delta_t * velocity * inlet_area;
        assert!(
            (gained - inflow).abs() < 1e-8 * inflow + 1e-14,
            "Co = {courant}: 增量 {gained} ≠ 入流 {inflow}"
        );
    }
}

#[test]
fn test_explicit_step_profile_stays_bounded() {
    let config = MulesConfig::default();
    for courant in [0.1, 0.25, 0.5] {
        advect_step(&config, courant);
    }
}

#[test]
fn test_semi_implicit_step_profile_stays_bounded() {
    let config = MulesConfig {
        mules_corr: true,
        n_alpha_corr: 2,
        ..MulesConfig::default()
    };
    for courant in [0.1, 0.25, 0.5] {
        advect_step(&config, courant);
    }
}
