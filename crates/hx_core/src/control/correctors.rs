// crates/hx_core/src/control/correctors.rs

//! 修正循环计数器
//!
//! 三层嵌套：外迭代 → PISO 修正 → 非正交修正，另有独立的能量修正计数。
//! 每层有"是否最后一次"判断，各组件据此决定是否提交通量与边界更新。
//! 计数器只由编排器推进，每个时间步开始时复位。

use hx_config::SolutionControls;

/// 各层次数上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrectorLimits {
    /// 外迭代次数
    pub n_outer: usize,
    /// PISO 修正次数
    pub n_piso: usize,
    /// 额外非正交修正次数
    pub n_non_orth: usize,
    /// 能量修正次数
    pub n_energy: usize,
    /// 是否稳态
    pub steady: bool,
}

impl CorrectorLimits {
    /// 由求解控制创建；稳态时 PISO 只做一次
    pub fn from_controls(controls: &SolutionControls, steady: bool) -> Self {
        Self {
            n_outer: controls.n_outer_correctors.max(1),
            n_piso: if steady { 1 } else { controls.n_corr_piso.max(1) },
            n_non_orth: controls.n_non_orth_correctors,
            n_energy: controls.n_energy_correctors.max(1),
            steady,
        }
    }
}

/// 修正循环状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrectorState {
    limits: CorrectorLimits,
    outer: usize,
    piso: usize,
    non_orth: usize,
    energy: usize,
}

impl CorrectorState {
    /// 创建
    pub fn new(limits: CorrectorLimits) -> Self {
        Self {
            limits,
            outer: 0,
            piso: 0,
            non_orth: 0,
            energy: 0,
        }
    }

    /// 次数上限
    pub fn limits(&self) -> &CorrectorLimits {
        &self.limits
    }

    /// 新时间步：全部计数归零
    pub fn reset(&mut self) {
        self.outer = 0;
        self.piso = 0;
        self.non_orth = 0;
        self.energy = 0;
    }

    /// 当前外迭代序号
    pub fn outer(&self) -> usize {
        self.outer
    }

    /// 当前 PISO 序号
    pub fn piso(&self) -> usize {
        self.piso
    }

    /// 当前非正交序号
    pub fn non_orth(&self) -> usize {
        self.non_orth
    }

    /// 当前能量修正序号
    pub fn energy(&self) -> usize {
        self.energy
    }

    /// 进入第 k 次外迭代（内层计数归零）
    pub fn set_outer(&mut self, k: usize) {
        self.outer = k;
        self.piso = 0;
        self.non_orth = 0;
        self.energy = 0;
    }

    /// 进入第 k 次 PISO 修正
    pub fn set_piso(&mut self, k: usize) {
        self.piso = k;
        self.non_orth = 0;
    }

    /// 进入第 k 次非正交修正
    pub fn set_non_orth(&mut self, k: usize) {
        self.non_orth = k;
    }

    /// 进入第 k 次能量修正
    pub fn set_energy(&mut self, k: usize) {
        self.energy = k;
    }

    /// 最后一次外迭代
    pub fn final_outer(&self) -> bool {
        self.outer + 1 >= self.limits.n_outer
    }

    /// 最后一次 PISO 修正（稳态恒为真）
    pub fn final_piso(&self) -> bool {
        self.limits.steady || self.piso + 1 >= self.limits.n_piso
    }

    /// 最后一次非正交修正
    pub fn final_non_orth(&self) -> bool {
        self.non_orth >= self.limits.n_non_orth
    }

    /// 最后一次能量修正
    pub fn final_energy(&self) -> bool {
        self.energy + 1 >= self.limits.n_energy
    }

    /// 使用 `<name>Final` 松弛与求解设置的迭代
    ///
    /// 稳态 SIMPLE 始终使用常规松弛。
    pub fn final_iter(&self) -> bool {
        !self.limits.steady && self.final_outer()
    }

    /// 最内层的最后一次求解：外迭代、PISO 与非正交都处于最后一次
    pub fn final_inner(&self) -> bool {
        self.final_iter() && self.final_piso() && self.final_non_orth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_predicates() {
        let limits = CorrectorLimits::from_controls(
            &SolutionControls::pimple(2, 3).with_non_orth_correctors(1),
            false,
        );
        let mut s = CorrectorState::new(limits);
        assert!(!s.final_outer());
        s.set_outer(1);
        assert!(s.final_outer() && s.final_iter());
        s.set_piso(1);
        assert!(!s.final_piso());
        s.set_piso(2);
        assert!(s.final_piso());
        assert!(!s.final_non_orth());
        s.set_non_orth(1);
        assert!(s.final_non_orth());
        assert!(s.final_inner());
        s.reset();
        assert_eq!((s.outer(), s.piso(), s.non_orth()), (0, 0, 0));
    }

    #[test]
    fn test_steady_piso_always_final() {
        let limits = CorrectorLimits::from_controls(&SolutionControls::simple(), true);
        let s = CorrectorState::new(limits);
        assert!(s.final_piso());
        assert!(s.final_outer());
        assert!(!s.final_iter());
        assert!(s.final_energy());
    }
}
