// crates/hx_core/src/momentum.rs

//! 动量预测
//!
//! 组装速度的矢量输运方程：
//!
//! ```text
//! ddt(ρ, U) + div(ρφ, U) + div(τ) + MRF(ρ Ω×U) == ρ g
//! ```
//!
//! 方程先做松弛并保存（供 HbyA 使用），开启 `momentumPredictor` 时
//! 再带上 `-∇p` 求解一次。重力按单元体积力处理；Boussinesq 流体的
//! ρ 已由物性按温度给出。

use crate::fvm::{explicit, implicit, FvMatrix, SolverPerformance};
use crate::mrf::MrfCollection;
use crate::rhie_chow::MomentumCoefficients;
use crate::state::{FlowFields, SolveContext};
use crate::turbulence::TurbulenceModel;
use glam::DVec3;
use hx_config::{ConvectionScheme, LinearSolverSettings, RelaxationFactors};
use hx_foundation::HxResult;

/// 动量预测器设置
#[derive(Debug, Clone)]
pub struct MomentumSettings {
    /// 是否求解动量方程
    pub predictor: bool,
    /// SIMPLEC
    pub consistent: bool,
    /// 对流格式
    pub scheme: ConvectionScheme,
    /// 重力加速度
    pub gravity: DVec3,
}

/// 动量预测器
#[derive(Debug)]
pub struct MomentumPredictor {
    settings: MomentumSettings,
    equation: Option<FvMatrix<DVec3>>,
}

impl MomentumPredictor {
    /// 创建
    pub fn new(settings: MomentumSettings) -> Self {
        Self {
            settings,
            equation: None,
        }
    }

    /// 设置
    pub fn settings(&self) -> &MomentumSettings {
        &self.settings
    }

    /// 最近一次组装的方程
    pub fn equation(&self) -> Option<&FvMatrix<DVec3>> {
        self.equation.as_ref()
    }

    /// 组装、松弛并（按需）求解动量方程
    ///
    /// 返回求解性能；跳过求解时返回 `None`。
    #[allow(clippy::too_many_arguments)]
    pub fn predict(
        &mut self,
        ctx: &SolveContext<'_>,
        fields: &mut FlowFields,
        turbulence: &dyn TurbulenceModel,
        mrf: &MrfCollection,
        relaxation: &RelaxationFactors,
        solvers: &LinearSolverSettings,
        final_iter: bool,
    ) -> HxResult<Option<SolverPerformance>> {
        let mesh = ctx.mesh;
        fields.u.store_prev_iter();

        let rho = fields.rho.internal().to_vec();
        let rho_old = fields.rho.old_time_or_current().to_vec();
        let mut eqn = implicit::ddt_rho(mesh, ctx.time, &rho, &rho_old, &fields.u);
        eqn += implicit::div(mesh, fields.rho_phi.values(), &fields.u, self.settings.scheme);
        eqn += turbulence.div_dev_stress(mesh, &fields.mu, &fields.u);
        mrf.add_coriolis(mesh, &rho, &fields.u, &mut eqn);

        if self.settings.gravity != DVec3::ZERO {
            let body: Vec<DVec3> = rho.iter().map(|r| self.settings.gravity * *r).collect();
            eqn.add_su(mesh, &body);
        }

        if let Some(alpha) = relaxation.equation("U", final_iter) {
            eqn.relax(mesh, &fields.u, alpha);
        }

        let perf = if self.settings.predictor {
            let grad_p = explicit::grad(mesh, &fields.p);
            let integrated: Vec<DVec3> = grad_p
                .iter()
                .zip(mesh.cell_volumes())
                .map(|(g, v)| *g * *v)
                .collect();
            let mut full = eqn.clone();
            full.add_explicit(&integrated);
            let config = solvers.get("U", final_iter)?;
            Some(full.solve(mesh, &mut fields.u, config)?)
        } else {
            None
        };

        self.equation = Some(eqn);
        Ok(perf)
    }

    /// 由最近一次组装的方程计算 Rhie-Chow 所需系数
    ///
    /// H 使用当前速度重新计算，PISO 内循环中每次修正都会调用。
    pub fn coefficients(&self, ctx: &SolveContext<'_>, fields: &FlowFields) -> HxResult<MomentumCoefficients> {
        let eqn = self.equation.as_ref().ok_or_else(|| {
            hx_foundation::HxError::internal("压力修正之前没有组装动量方程")
        })?;
        MomentumCoefficients::from_equation(ctx.mesh, eqn, &fields.u, self.settings.consistent)
    }

    /// 丢弃保存的方程（拓扑变化后尺寸失效）
    pub fn clear(&mut self) {
        self.equation = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::VolField;
    use crate::fvm::TimeState;
    use crate::mesh::BoxMeshBuilder;
    use crate::parallel::SerialCommunicator;
    use crate::state::FluxBasis;
    use crate::turbulence::Laminar;
    use hx_config::TimeScheme;
    use hx_foundation::Dimensions;

    #[test]
    fn test_hydrostatic_column_balances_gravity() {
        // 封闭盒内静止流体：压力梯度平衡重力时速度保持为零
        let mesh = BoxMeshBuilder::new([1, 4, 1], [1.0, 4.0, 1.0]).build().unwrap();
        let g = DVec3::new(0.0, -9.81, 0.0);
        let u = VolField::new("U", Dimensions::VELOCITY, &mesh, DVec3::ZERO);
        let mut p = VolField::new("p", Dimensions::PRESSURE, &mesh, 0.0);
        for (c, centre) in mesh.cell_centres().iter().enumerate() {
            p.internal_mut()[c] = 9.81 * (4.0 - centre.y);
        }
        for name in ["ymin", "ymax"] {
            p.set_boundary_kind(&mesh, name, crate::field::BoundaryKind::Calculated)
                .unwrap();
        }
        let ymin = mesh.find_patch("ymin").unwrap();
        let ymax = mesh.find_patch("ymax").unwrap();
        p.boundary_mut(ymin).values_mut()[0] = 9.81 * 4.0;
        p.boundary_mut(ymax).values_mut()[0] = 0.0;
        let t = VolField::new("T", Dimensions::TEMPERATURE, &mesh, 300.0);
        let rho = VolField::new("rho", Dimensions::DENSITY, &mesh, 1.0);
        let mut fields = FlowFields::new(&mesh, FluxBasis::Volumetric, u, p, t, rho);
        fields.mu.fill(1e-3);
        fields.store_old_time();

        let time = TimeState::with_scheme(TimeScheme::Euler, 0.1);
        let comm = SerialCommunicator;
        let ctx = SolveContext {
            mesh: &mesh,
            time: &time,
            comm: &comm,
        };
        let mut predictor = MomentumPredictor::new(MomentumSettings {
            predictor: true,
            consistent: false,
            scheme: ConvectionScheme::Upwind,
            gravity: g,
        });
        let perf = predictor
            .predict(
                &ctx,
                &mut fields,
                &Laminar::new(&mesh),
                &MrfCollection::default(),
                &RelaxationFactors::default(),
                &LinearSolverSettings::default(),
                true,
            )
            .unwrap();
        assert!(perf.is_some());
        for u in fields.u.internal() {
            assert!(u.length() < 1e-8, "u = {u}");
        }
        let coeffs = predictor.coefficients(&ctx, &fields).unwrap();
        assert_eq!(coeffs.r_au.len(), mesh.n_cells());
    }

    #[test]
    fn test_coefficients_need_equation() {
        let mesh = BoxMeshBuilder::new([2, 1, 1], [2.0, 1.0, 1.0]).build().unwrap();
        let u = VolField::new("U", Dimensions::VELOCITY, &mesh, DVec3::ZERO);
        let p = VolField::new("p", Dimensions::PRESSURE, &mesh, 0.0);
        let t = VolField::new("T", Dimensions::TEMPERATURE, &mesh, 300.0);
        let rho = VolField::new("rho", Dimensions::DENSITY, &mesh, 1.0);
        let fields = FlowFields::new(&mesh, FluxBasis::Volumetric, u, p, t, rho);
        let time = TimeState::with_scheme(TimeScheme::Euler, 0.1);
        let ctx = SolveContext {
            mesh: &mesh,
            time: &time,
            comm: &SerialCommunicator,
        };
        let predictor = MomentumPredictor::new(MomentumSettings {
            predictor: false,
            consistent: false,
            scheme: ConvectionScheme::Upwind,
            gravity: DVec3::ZERO,
        });
        assert!(predictor.coefficients(&ctx, &fields).is_err());
    }
}
