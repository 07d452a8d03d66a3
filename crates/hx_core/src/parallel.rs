// crates/hx_core/src/parallel.rs

//! 进程间通信抽象
//!
//! 求解核心需要的全部集合操作：全局求和/极值、逻辑与/或
//! （用于集体终止：任一进程出错时全部进程一致退出），
//! 以及进程边界上相邻单元值的交换。
//!
//! 单进程运行使用 [`SerialCommunicator`]，所有归约为恒等；
//! 出现进程边界即视为配置错误。

use crate::mesh::{PatchKind, PolyMesh};
use hx_foundation::{HxError, HxResult};
use std::fmt::Debug;

/// 通信器 trait
pub trait Parallel: Send + Sync + Debug {
    /// 本进程号
    fn rank(&self) -> usize;

    /// 进程总数
    fn n_procs(&self) -> usize;

    /// 全局求和
    fn sum(&self, local: f64) -> f64;

    /// 全局最大值
    fn max(&self, local: f64) -> f64;

    /// 全局最小值
    fn min(&self, local: f64) -> f64;

    /// 全局整数求和
    fn sum_usize(&self, local: usize) -> usize;

    /// 全局逻辑与
    fn all_true(&self, local: bool) -> bool;

    /// 全局逻辑或
    fn any_true(&self, local: bool) -> bool;

    /// 交换进程边界上的相邻单元值
    ///
    /// 输入为本侧边界面相邻单元的值，返回对侧单元的值（面顺序一致）。
    fn swap_patch_cell_values(
        &self,
        mesh: &PolyMesh,
        patch: usize,
        local: &[f64],
    ) -> HxResult<Vec<f64>>;

    /// 是否为主进程
    fn is_master(&self) -> bool {
        self.rank() == 0
    }
}

/// 单进程通信器
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialCommunicator;

impl Parallel for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn n_procs(&self) -> usize {
        1
    }

    fn sum(&self, local: f64) -> f64 {
        local
    }

    fn max(&self, local: f64) -> f64 {
        local
    }

    fn min(&self, local: f64) -> f64 {
        local
    }

    fn sum_usize(&self, local: usize) -> usize {
        local
    }

    fn all_true(&self, local: bool) -> bool {
        local
    }

    fn any_true(&self, local: bool) -> bool {
        local
    }

    fn swap_patch_cell_values(
        &self,
        mesh: &PolyMesh,
        patch: usize,
        _local: &[f64],
    ) -> HxResult<Vec<f64>> {
        let p = &mesh.patches()[patch];
        match p.kind {
            PatchKind::Processor { neighbour_rank } => Err(HxError::parallel(format!(
                "单进程运行中出现进程边界 {}（相邻进程 {}）",
                p.name, neighbour_rank
            ))),
            _ => Err(HxError::internal(format!("边界块 {} 不是进程边界", p.name))),
        }
    }
}

// ============================================================================
// 便捷函数
// ============================================================================

/// 全局求和 Σ values
pub fn g_sum(comm: &dyn Parallel, values: impl IntoIterator<Item = f64>) -> f64 {
    comm.sum(values.into_iter().sum())
}

/// 全局最大值，空集时为 `f64::MIN`
pub fn g_max(comm: &dyn Parallel, values: impl IntoIterator<Item = f64>) -> f64 {
    comm.max(values.into_iter().fold(f64::MIN, f64::max))
}

/// 全局最小值，空集时为 `f64::MAX`
pub fn g_min(comm: &dyn Parallel, values: impl IntoIterator<Item = f64>) -> f64 {
    comm.min(values.into_iter().fold(f64::MAX, f64::min))
}

/// 集体检查：任一进程失败则全部进程返回同一错误
///
/// 本进程的错误原样返回；其它进程返回 [`HxError::Parallel`]。
pub fn collective_check<T>(comm: &dyn Parallel, result: HxResult<T>) -> HxResult<T> {
    let failed = comm.any_true(result.is_err());
    match result {
        Err(e) => Err(e),
        Ok(_) if failed => Err(HxError::parallel("其它进程发生致命错误")),
        Ok(v) => Ok(v),
    }
}
