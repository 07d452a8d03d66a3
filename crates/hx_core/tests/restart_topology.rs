// crates/hx_core/tests/restart_topology.rs

//! 场文件重启与拓扑变化后的场搬运

mod common;

use common::{create_box_mesh, lid_driven, max_abs, transient_config};
use glam::DVec3;
use hx_config::{CaseConfig, SolutionControls};
use hx_core::control::FlowSolver;
use hx_core::field::io::field_path;
use hx_core::parallel::SerialCommunicator;
use hx_core::pressure::continuity_residual;
use hx_core::state::SolveContext;
use hx_core::topology::{BestEffortInitialization, TopologyMap};
use std::path::PathBuf;

fn cavity_config() -> CaseConfig {
    let mut config = transient_config(0.02, 0.005, SolutionControls::piso(2));
    config.pressure_control.p_ref_cell = Some(0);
    config
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("hx_core_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("临时目录");
    dir
}

#[test]
fn test_restart_reads_written_fields() {
    let dir = scratch_dir("restart");
    let mesh = create_box_mesh(5, 1.0);
    let mut first = FlowSolver::new(
        mesh.clone(),
        cavity_config(),
        lid_driven(&mesh, 0.0, DVec3::X),
        Box::new(SerialCommunicator),
    )
    .expect("求解器");
    let summary = first.run(Some(&dir)).expect("运行");
    // writeInterval = 0：只写首末时间层
    assert_eq!(summary.written.len(), 2);
    let last = *summary.written.last().expect("末时间层");
    assert!(field_path(&dir, last, "U").exists());
    assert!(field_path(&dir, last, "p").exists());

    let mut config = cavity_config();
    config.time.start_time = last;
    let mut restarted = FlowSolver::new(
        mesh.clone(),
        config,
        lid_driven(&mesh, 0.0, DVec3::X),
        Box::new(SerialCommunicator),
    )
    .expect("重启求解器");
    let n = restarted.read_fields(&dir, last).expect("读入");
    assert_eq!(n, 3);
    assert_eq!(restarted.fields().u.internal(), first.fields().u.internal());
    assert_eq!(restarted.fields().p.internal(), first.fields().p.internal());
    assert!(restarted.needs_correct_phi());

    // 重启后首步先修正通量，之后清除请求
    restarted.step().expect("重启后首步");
    assert!(!restarted.needs_correct_phi());

    // 缺失的时间层不读入任何场
    assert_eq!(restarted.read_fields(&dir, 123.0).expect("缺失时间层"), 0);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_new_cells_are_filled_from_neighbours() {
    let mesh = create_box_mesh(4, 1.0);
    let mut solver = FlowSolver::new(
        mesh.clone(),
        cavity_config(),
        lid_driven(&mesh, 0.0, DVec3::X),
        Box::new(SerialCommunicator),
    )
    .expect("求解器");
    solver.step().expect("时间步");
    let old_u = solver.fields().u.internal().to_vec();

    // 单元 5 视作新生：供体为其四个邻居（1, 4, 6, 9）
    let mut map = TopologyMap::identity(&mesh);
    map.cell_map[5] = None;
    solver
        .on_topology_changed(mesh.clone(), &map, &BestEffortInitialization::new())
        .expect("拓扑变化");

    let expected = (old_u[1] + old_u[4] + old_u[6] + old_u[9]) / 4.0;
    let filled = solver.fields().u.internal()[5];
    assert!((filled - expected).length() < 1e-12, "U[5] = {filled}, 期望 {expected}");
    assert_eq!(solver.fields().u.internal()[0], old_u[0]);
    assert!(solver.needs_correct_phi());

    // correctPhi 与下一步的压力修正恢复无散通量
    solver.step().expect("拓扑变化后时间步");
    assert!(!solver.needs_correct_phi());
    let ctx = SolveContext {
        mesh: solver.mesh(),
        time: solver.time(),
        comm: &SerialCommunicator,
    };
    let max_div = max_abs(&continuity_residual(&ctx, solver.fields()));
    assert!(max_div < 1e-4, "max |div φ| = {max_div}");
}

#[test]
fn test_mismatched_map_is_rejected() {
    let mesh = create_box_mesh(4, 1.0);
    let mut solver = FlowSolver::new(
        mesh.clone(),
        cavity_config(),
        lid_driven(&mesh, 0.0, DVec3::X),
        Box::new(SerialCommunicator),
    )
    .expect("求解器");
    let mut map = TopologyMap::identity(&mesh);
    map.cell_map.pop();
    let err = solver
        .on_topology_changed(mesh.clone(), &map, &BestEffortInitialization::new())
        .unwrap_err();
    assert!(!err.is_config_error());
    assert_eq!(solver.mesh().topology_version(), 0);
}
