// crates/hx_core/src/control/solve_graph.rs

//! 求解图
//!
//! 各求解器声明自己提供的求解步、所在修正层级以及必需/可选依赖，
//! 编排器在构造阶段解析一次得到执行顺序，计算中不再改动。
//!
//! 层级与嵌套关系：
//!
//! ```text
//! outer
//! └── PISOCorrector
//!     └── nonOrthogonalCorrector:p
//! ```
//!
//! 外层步在每次外迭代开始时按顺序执行；PISO 层与非正交层的步在每次
//! PISO 修正内按解析顺序执行，非正交层的步自己展开非正交循环。

use hx_foundation::{HxError, HxResult};
use std::fmt;

// ============================================================================
// 求解步与层级
// ============================================================================

/// 求解步
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SolveStep {
    /// 通量修正
    CorrectPhi,
    /// 相分数输运
    Alpha,
    /// 动量预测
    UPredictor,
    /// 能量
    Energy,
    /// 压力方程
    Pressure,
    /// 速度修正
    Velocity,
}

impl SolveStep {
    /// 名称
    pub fn name(self) -> &'static str {
        match self {
            Self::CorrectPhi => "correctPhi",
            Self::Alpha => "alpha",
            Self::UPredictor => "UPredictor",
            Self::Energy => "energy",
            Self::Pressure => "p",
            Self::Velocity => "U",
        }
    }
}

impl fmt::Display for SolveStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 修正层级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CorrectorLevel {
    /// 外迭代
    Outer,
    /// PISO 修正
    PisoCorrector,
    /// 压力的非正交修正
    NonOrthogonalCorrector,
}

impl CorrectorLevel {
    /// 名称
    pub fn name(self) -> &'static str {
        match self {
            Self::Outer => "outer",
            Self::PisoCorrector => "PISOCorrector",
            Self::NonOrthogonalCorrector => "nonOrthogonalCorrector:p",
        }
    }

    /// 是否在 PISO 循环内执行
    pub fn is_inner(self) -> bool {
        !matches!(self, Self::Outer)
    }
}

impl fmt::Display for CorrectorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 一个求解步的声明
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDeclaration {
    /// 求解步
    pub step: SolveStep,
    /// 所在层级
    pub level: CorrectorLevel,
    /// 必需依赖：未声明即为配置错误
    pub required: Vec<SolveStep>,
    /// 可选依赖：声明了才参与排序
    pub optional: Vec<SolveStep>,
}

impl StepDeclaration {
    /// 无依赖的声明
    pub fn new(step: SolveStep, level: CorrectorLevel) -> Self {
        Self {
            step,
            level,
            required: Vec::new(),
            optional: Vec::new(),
        }
    }

    /// 添加必需依赖
    pub fn requires(mut self, step: SolveStep) -> Self {
        self.required.push(step);
        self
    }

    /// 添加可选依赖
    pub fn after(mut self, step: SolveStep) -> Self {
        self.optional.push(step);
        self
    }
}

// ============================================================================
// 图与解析
// ============================================================================

/// 未解析的求解图
#[derive(Debug, Clone, Default)]
pub struct SolveGraph {
    declarations: Vec<StepDeclaration>,
}

impl SolveGraph {
    /// 空图
    pub fn new() -> Self {
        Self::default()
    }

    /// 声明一个求解步；同一步重复声明是配置错误
    pub fn declare(&mut self, declaration: StepDeclaration) -> HxResult<()> {
        if self.contains(declaration.step) {
            return Err(HxError::invalid_config(
                "solveGraph",
                declaration.step.name(),
                "求解步重复声明",
            ));
        }
        self.declarations.push(declaration);
        Ok(())
    }

    /// 是否已声明
    pub fn contains(&self, step: SolveStep) -> bool {
        self.declarations.iter().any(|d| d.step == step)
    }

    /// 声明列表
    pub fn declarations(&self) -> &[StepDeclaration] {
        &self.declarations
    }

    /// 拓扑排序
    ///
    /// 同一时刻可执行的步按声明顺序取出。必需依赖缺失、依赖成环，
    /// 或外层步依赖 PISO 循环内的步，都返回配置错误。
    pub fn resolve(&self) -> HxResult<ResolvedGraph> {
        let n = self.declarations.len();
        let index_of = |step: SolveStep| self.declarations.iter().position(|d| d.step == step);

        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut in_degree = vec![0usize; n];

        for (i, decl) in self.declarations.iter().enumerate() {
            for &dep in &decl.required {
                if index_of(dep).is_none() {
                    return Err(HxError::invalid_config(
                        format!("solveGraph.{}", decl.step),
                        dep.name(),
                        "必需的依赖求解步未声明",
                    ));
                }
            }
            let deps = decl.required.iter().chain(&decl.optional);
            for &dep in deps {
                let Some(j) = index_of(dep) else { continue };
                if j == i {
                    return Err(HxError::invalid_config(
                        format!("solveGraph.{}", decl.step),
                        dep.name(),
                        "求解步不能依赖自身",
                    ));
                }
                let dep_level = self.declarations[j].level;
                if !decl.level.is_inner() && dep_level.is_inner() {
                    return Err(HxError::invalid_config(
                        format!("solveGraph.{}", decl.step),
                        format!("{} ({})", dep, dep_level),
                        "外迭代层的求解步不能依赖 PISO 循环内的求解步",
                    ));
                }
                if !edges[j].contains(&i) {
                    edges[j].push(i);
                    in_degree[i] += 1;
                }
            }
        }

        let mut done = vec![false; n];
        let mut order = Vec::with_capacity(n);
        while order.len() < n {
            let next = (0..n).find(|&i| !done[i] && in_degree[i] == 0);
            let Some(i) = next else {
                let remaining: Vec<&str> = (0..n)
                    .filter(|&i| !done[i])
                    .map(|i| self.declarations[i].step.name())
                    .collect();
                return Err(HxError::invalid_config(
                    "solveGraph",
                    remaining.join(", "),
                    "求解步依赖存在循环",
                ));
            };
            done[i] = true;
            for &k in &edges[i] {
                in_degree[k] -= 1;
            }
            order.push((self.declarations[i].step, self.declarations[i].level));
        }

        let resolved = ResolvedGraph { order };
        log::debug!("求解图: {}", resolved);
        Ok(resolved)
    }
}

/// 解析后的执行顺序
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGraph {
    order: Vec<(SolveStep, CorrectorLevel)>,
}

impl ResolvedGraph {
    /// 全部步与层级
    pub fn order(&self) -> &[(SolveStep, CorrectorLevel)] {
        &self.order
    }

    /// 某层级的步（保持解析顺序）
    pub fn steps_at(&self, level: CorrectorLevel) -> Vec<SolveStep> {
        self.order
            .iter()
            .filter(|(_, l)| *l == level)
            .map(|(s, _)| *s)
            .collect()
    }

    /// 外迭代开始时执行的步
    pub fn outer_steps(&self) -> Vec<SolveStep> {
        self.steps_at(CorrectorLevel::Outer)
    }

    /// 每次 PISO 修正内执行的步
    pub fn inner_steps(&self) -> Vec<(SolveStep, CorrectorLevel)> {
        self.order.iter().copied().filter(|(_, l)| l.is_inner()).collect()
    }

    /// 是否包含某步
    pub fn contains(&self, step: SolveStep) -> bool {
        self.order.iter().any(|(s, _)| *s == step)
    }

    /// 某步的位置
    pub fn position(&self, step: SolveStep) -> Option<usize> {
        self.order.iter().position(|(s, _)| *s == step)
    }
}

impl fmt::Display for ResolvedGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (step, level)) in self.order.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}@{}", step, level)?;
        }
        Ok(())
    }
}

// ============================================================================
// 各求解器的声明
// ============================================================================

/// 流动求解器提供的步：correctPhi、UPredictor、p、U
pub fn flow_declarations() -> Vec<StepDeclaration> {
    vec![
        StepDeclaration::new(SolveStep::CorrectPhi, CorrectorLevel::Outer),
        StepDeclaration::new(SolveStep::UPredictor, CorrectorLevel::Outer)
            .after(SolveStep::CorrectPhi)
            .after(SolveStep::Alpha),
        StepDeclaration::new(SolveStep::Pressure, CorrectorLevel::NonOrthogonalCorrector)
            .requires(SolveStep::UPredictor)
            .after(SolveStep::Energy),
        StepDeclaration::new(SolveStep::Velocity, CorrectorLevel::PisoCorrector).requires(SolveStep::Pressure),
    ]
}

/// 相分数求解器提供的步
pub fn alpha_declaration() -> StepDeclaration {
    StepDeclaration::new(SolveStep::Alpha, CorrectorLevel::Outer).after(SolveStep::CorrectPhi)
}

/// 能量求解器提供的步
pub fn energy_declaration() -> StepDeclaration {
    StepDeclaration::new(SolveStep::Energy, CorrectorLevel::Outer)
        .after(SolveStep::UPredictor)
        .after(SolveStep::Alpha)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_graph() -> SolveGraph {
        let mut g = SolveGraph::new();
        // 声明顺序故意打乱，结果只由依赖决定
        g.declare(energy_declaration()).unwrap();
        for d in flow_declarations() {
            g.declare(d).unwrap();
        }
        g.declare(alpha_declaration()).unwrap();
        g
    }

    #[test]
    fn test_flow_order() {
        let resolved = full_graph().resolve().unwrap();
        let steps: Vec<SolveStep> = resolved.order().iter().map(|(s, _)| *s).collect();
        assert_eq!(
            steps,
            vec![
                SolveStep::CorrectPhi,
                SolveStep::Alpha,
                SolveStep::UPredictor,
                SolveStep::Energy,
                SolveStep::Pressure,
                SolveStep::Velocity,
            ]
        );
        assert_eq!(
            resolved.outer_steps(),
            vec![SolveStep::CorrectPhi, SolveStep::Alpha, SolveStep::UPredictor, SolveStep::Energy]
        );
        assert_eq!(
            resolved.inner_steps(),
            vec![
                (SolveStep::Pressure, CorrectorLevel::NonOrthogonalCorrector),
                (SolveStep::Velocity, CorrectorLevel::PisoCorrector),
            ]
        );
    }

    #[test]
    fn test_optional_dependencies_may_be_absent() {
        let mut g = SolveGraph::new();
        for d in flow_declarations() {
            g.declare(d).unwrap();
        }
        let resolved = g.resolve().unwrap();
        assert!(!resolved.contains(SolveStep::Alpha));
        assert!(resolved.position(SolveStep::UPredictor) < resolved.position(SolveStep::Pressure));
    }

    #[test]
    fn test_missing_required_is_config_error() {
        let mut g = SolveGraph::new();
        g.declare(
            StepDeclaration::new(SolveStep::Velocity, CorrectorLevel::PisoCorrector).requires(SolveStep::Pressure),
        )
        .unwrap();
        let err = g.resolve().unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("p"));
    }

    #[test]
    fn test_cycle_is_config_error() {
        let mut g = SolveGraph::new();
        g.declare(StepDeclaration::new(SolveStep::Energy, CorrectorLevel::Outer).requires(SolveStep::UPredictor))
            .unwrap();
        g.declare(StepDeclaration::new(SolveStep::UPredictor, CorrectorLevel::Outer).after(SolveStep::Energy))
            .unwrap();
        let err = g.resolve().unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_duplicate_declaration() {
        let mut g = SolveGraph::new();
        g.declare(alpha_declaration()).unwrap();
        assert!(g.declare(alpha_declaration()).is_err());
    }

    #[test]
    fn test_outer_step_cannot_follow_inner_step() {
        let mut g = SolveGraph::new();
        g.declare(StepDeclaration::new(SolveStep::Pressure, CorrectorLevel::NonOrthogonalCorrector))
            .unwrap();
        g.declare(StepDeclaration::new(SolveStep::Energy, CorrectorLevel::Outer).after(SolveStep::Pressure))
            .unwrap();
        assert!(g.resolve().is_err());
    }
}
