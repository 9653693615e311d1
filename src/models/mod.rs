//! Model Library
//!
//! Constant-rate wellbore responses of the analytical reservoir models, with
//! wellbore storage and skin, evaluated in Laplace space and inverted with
//! Stehfest:
//!
//! ```text
//! p̄wD(u) = (g(u) + S) / (u · (1 + CD·u·(g(u) + S)))
//! ```
//!
//! where `g = u·p̄` of the reservoir kernel selected by `ModelType`. Negative
//! skin is applied through the effective wellbore radius rw·e^(−s), which
//! keeps the Laplace form free of the (g + S) ≤ 0 singularity.

pub mod bessel;
pub mod stehfest;

use tracing::trace;

use crate::error::{EngineError, EngineResult};
use crate::types::{keys, ModelParameters, ModelType, SuperpositionKind, TestConfig};

/// Beyond this (reD − 1)·√u the outer boundary is not felt at the well
const BOUNDARY_CUTOFF: f64 = 20.0;

/// Smallest effective reD the bounded kernel accepts after the skin shift
const MIN_EFFECTIVE_RED: f64 = 1.5;

/// Reservoir kernel g(u) = u·p̄D(u) without storage or skin
#[derive(Debug, Clone, Copy, PartialEq)]
enum Kernel {
    Homogeneous,
    DualPorosity { omega: f64, lambda: f64 },
    Bounded { red: f64 },
}

impl Kernel {
    fn eval(self, u: f64) -> f64 {
        match self {
            Kernel::Homogeneous => radial(u),
            Kernel::DualPorosity { omega, lambda } => {
                let f = (omega * (1.0 - omega) * u + lambda) / ((1.0 - omega) * u + lambda);
                radial(u * f)
            }
            Kernel::Bounded { red } => {
                let r = u.sqrt();
                if (red - 1.0) * r > BOUNDARY_CUTOFF {
                    return radial(u);
                }
                let outer = red * r;
                let (i0_w, i1_w) = bessel::i0_i1(r);
                let (k0_w, k1_w) = bessel::k0_k1(r);
                let (_, i1_e) = bessel::i0_i1(outer);
                let (_, k1_e) = bessel::k0_k1(outer);

                let numerator = k1_e * i0_w + i1_e * k0_w;
                let denominator = r * (i1_e * k1_w - k1_e * i1_w);
                numerator / denominator
            }
        }
    }
}

/// Infinite-acting radial kernel K0(√v) / (√v·K1(√v))
fn radial(v: f64) -> f64 {
    let r = v.sqrt();
    let (k0, k1) = bessel::k0_k1_scaled(r);
    k0 / (r * k1)
}

/// An analytical model bound to one test's rock, fluid and rate data.
///
/// Built once per parameter set; cheap to evaluate at many times.
#[derive(Debug, Clone)]
pub struct ReservoirModel {
    model_type: ModelType,
    kernel: Kernel,
    /// tD per hour on the true wellbore radius
    td_per_hour: f64,
    /// e^(2s) for negative skin, 1 otherwise
    time_shift: f64,
    cd: f64,
    /// Skin seen by the Laplace form (0 when moved into the radius)
    skin: f64,
    /// Δp per unit pD
    pressure_scale: f64,
}

impl ReservoirModel {
    pub fn new(params: &ModelParameters, test: &TestConfig) -> EngineResult<Self> {
        params.validate(test.wellbore_radius)?;

        let require = |key: &str| {
            params.get(key).ok_or_else(|| {
                EngineError::configuration(format!("{} requires '{key}'", params.model_type))
            })
        };

        let (time_shift, radius_shift, skin) = if params.skin < 0.0 {
            ((2.0 * params.skin).exp(), params.skin.exp(), 0.0)
        } else {
            (1.0, 1.0, params.skin)
        };

        let kernel = match params.model_type {
            ModelType::HomogeneousRadial => Kernel::Homogeneous,
            ModelType::DualPorosity => Kernel::DualPorosity {
                omega: require(keys::OMEGA)?,
                lambda: require(keys::LAMBDA)? / time_shift,
            },
            ModelType::BoundedCircular => {
                let red = require(keys::BOUNDARY_RADIUS)? / test.wellbore_radius * radius_shift;
                if red < MIN_EFFECTIVE_RED {
                    return Err(EngineError::configuration(format!(
                        "effective wellbore radius at skin {} reaches the boundary (reD = {red:.3})",
                        params.skin
                    )));
                }
                Kernel::Bounded { red }
            }
        };

        let model = Self {
            model_type: params.model_type,
            kernel,
            td_per_hour: test.td_per_hour(params.permeability),
            time_shift,
            cd: test.dimensionless_storage(params.storage) * time_shift,
            skin,
            pressure_scale: test.pressure_scale(params.permeability),
        };
        trace!(
            model = %model.model_type,
            td_per_hour = model.td_per_hour,
            cd = model.cd,
            "Model prepared"
        );
        Ok(model)
    }

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    fn laplace(&self, u: f64) -> f64 {
        let gs = self.kernel.eval(u) + self.skin;
        gs / (u * (1.0 + self.cd * u * gs))
    }

    /// Dimensionless wellbore pressure at dimensionless time `td`
    /// (true wellbore radius). pD(0) = 0.
    pub fn pd(&self, td: f64) -> f64 {
        if !(td > 0.0) {
            return 0.0;
        }
        stehfest::invert(|u| self.laplace(u), td * self.time_shift)
    }

    /// Constant-rate drawdown Δp after `hours` of flow at the test rate.
    pub fn drawdown(&self, hours: f64) -> f64 {
        self.pressure_scale * self.pd(self.td_per_hour * hours)
    }

    /// Δp per unit rate magnitude, for rate-schedule superposition.
    pub fn unit_rate_drawdown(&self, hours: f64, rate_magnitude: f64) -> f64 {
        self.drawdown(hours) / rate_magnitude
    }

    /// ΔP the diagnostic curve would show at elapsed time `dt`.
    ///
    /// Shut-in periods with a producing time use superposition
    /// Δp(tp) − Δp(tp+Δt) + Δp(Δt); MDH treats the test as a plain drawdown.
    pub fn delta_p(&self, dt: f64, superposition: SuperpositionKind) -> f64 {
        self.delta_p_curve(&[dt], superposition)[0]
    }

    pub fn delta_p_curve(&self, elapsed: &[f64], superposition: SuperpositionKind) -> Vec<f64> {
        match superposition {
            SuperpositionKind::Mdh => elapsed
                .iter()
                .map(|&dt| if dt > 0.0 { self.drawdown(dt) } else { 0.0 })
                .collect(),
            SuperpositionKind::Horner { producing_time } => {
                let at_shut_in = self.drawdown(producing_time);
                elapsed
                    .iter()
                    .map(|&dt| {
                        if dt > 0.0 {
                            at_shut_in - self.drawdown(producing_time + dt) + self.drawdown(dt)
                        } else {
                            0.0
                        }
                    })
                    .collect()
            }
        }
    }
}
