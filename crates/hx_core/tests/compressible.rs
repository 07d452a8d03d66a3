// crates/hx_core/tests/compressible.rs

//! 可压缩封闭域质量守恒验证

mod common;

use common::{create_box_mesh, lid_driven, transient_config};
use glam::DVec3;
use hx_config::{CaseConfig, MaterialModel, SolutionControls};
use hx_core::control::FlowSolver;
use hx_core::parallel::SerialCommunicator;
use hx_core::state::FluxBasis;

fn closed_box(controls: SolutionControls) -> FlowSolver {
    closed_box_with(controls, |_| {})
}

fn closed_box_with(controls: SolutionControls, adjust: impl FnOnce(&mut CaseConfig)) -> FlowSolver {
    let mesh = create_box_mesh(6, 1.0);
    let initial = lid_driven(&mesh, 1e5, DVec3::new(10.0, 0.0, 0.0));
    let mut config = transient_config(0.01, 5e-4, controls);
    config.fluid.material = MaterialModel::PerfectGas { r_gas: 287.0, mu: 1.8e-5 };
    adjust(&mut config);
    FlowSolver::new(mesh, config, initial, Box::new(SerialCommunicator)).expect("封闭方腔求解器")
}

fn total_mass(solver: &FlowSolver) -> f64 {
    solver.fields().total_mass(solver.mesh(), &SerialCommunicator)
}

#[test]
fn test_closed_box_conserves_mass() {
    let mut solver = closed_box(SolutionControls::pimple(2, 2));
    assert_eq!(solver.fields().basis, FluxBasis::Mass);
    assert!(solver.energy().is_none());
    assert!(solver.pressure().is_closed());

    let m0 = total_mass(&solver);
    // ρ = p / (R T)
    let rho0 = m0 / solver.mesh().total_volume();
    assert!((rho0 - 1e5 / (287.0 * 300.0)).abs() < 1e-10, "ρ0 = {rho0}");

    for _ in 0..10 {
        let report = solver.step().expect("时间步");
        let m = total_mass(&solver);
        assert!(((m - m0) / m0).abs() < 1e-10, "t = {}: m = {m}, m0 = {m0}", report.time);
    }
    for p in solver.fields().p.internal() {
        assert!(*p > 0.0);
    }
}

#[test]
fn test_piso_closed_box_conserves_mass() {
    let mut solver = closed_box(SolutionControls::piso(3));
    let m0 = total_mass(&solver);
    for _ in 0..6 {
        solver.step().expect("时间步");
    }
    let m = total_mass(&solver);
    assert!(((m - m0) / m0).abs() < 1e-10, "m = {m}, m0 = {m0}");
    assert!(solver.pressure().initial_mass().is_some());
}

#[test]
fn test_pressure_bounds_do_not_break_closed_mass() {
    // 顶盖驱动在角点产生高于初值的压力，上限必然起作用
    let mut solver = closed_box_with(SolutionControls::pimple(2, 2), |config| {
        config.pressure_control.p_max = Some(1e5);
    });
    let m0 = total_mass(&solver);
    for _ in 0..5 {
        let report = solver.step().expect("时间步");
        let m = total_mass(&solver);
        assert!(((m - m0) / m0).abs() < 1e-10, "t = {}: m = {m}, m0 = {m0}", report.time);
    }
}
