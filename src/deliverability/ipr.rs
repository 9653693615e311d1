//! Inflow performance relation
//!
//! - Darcy: q = J·(p̄ − pwf)
//! - Vogel: q = q_max·(1 − 0.2·x − 0.8·x²), x = pwf/p̄, q_max = J·p̄/1.8
//!
//! The curve is a lazy, restartable sequence: `points()` hands out a fresh
//! iterator every time.

use crate::error::{EngineError, EngineResult};
use crate::types::{FluidType, IprMethod};

/// Vogel's q_max = J·p̄ / 1.8
const VOGEL_DIVISOR: f64 = 1.8;

/// IPR description; points are generated on demand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IprCurve {
    method: IprMethod,
    productivity_index: f64,
    average_pressure: f64,
    points: usize,
}

impl IprCurve {
    /// The method is always chosen by the caller. Darcy on a gas well is
    /// rejected rather than silently switched to Vogel.
    pub fn new(
        method: IprMethod,
        fluid: FluidType,
        productivity_index: f64,
        average_pressure: f64,
        points: usize,
    ) -> EngineResult<Self> {
        if method == IprMethod::Darcy && fluid == FluidType::Gas {
            return Err(EngineError::configuration(
                "Darcy IPR applies to single-phase liquid; choose Vogel for a gas well",
            ));
        }
        if !(productivity_index > 0.0) || !productivity_index.is_finite() {
            return Err(EngineError::configuration(format!(
                "productivity index must be > 0 (got {productivity_index})"
            )));
        }
        if !(average_pressure > 0.0) || !average_pressure.is_finite() {
            return Err(EngineError::configuration(format!(
                "average reservoir pressure must be > 0 (got {average_pressure})"
            )));
        }
        if points < 2 {
            return Err(EngineError::configuration("an IPR curve needs at least 2 points"));
        }
        Ok(Self {
            method,
            productivity_index,
            average_pressure,
            points,
        })
    }

    pub fn method(&self) -> IprMethod {
        self.method
    }

    /// Rate at flowing pressure `pwf`.
    pub fn rate_at(&self, pwf: f64) -> f64 {
        let pwf = pwf.clamp(0.0, self.average_pressure);
        match self.method {
            IprMethod::Darcy => self.productivity_index * (self.average_pressure - pwf),
            IprMethod::Vogel => {
                let x = pwf / self.average_pressure;
                self.absolute_open_flow() * (1.0 - 0.2 * x - 0.8 * x * x)
            }
        }
    }

    /// Rate at pwf = 0
    pub fn absolute_open_flow(&self) -> f64 {
        match self.method {
            IprMethod::Darcy => self.productivity_index * self.average_pressure,
            IprMethod::Vogel => self.productivity_index * self.average_pressure / VOGEL_DIVISOR,
        }
    }

    /// (rate, pwf) pairs from pwf = p̄ down to pwf = 0.
    pub fn points(&self) -> IprPoints {
        IprPoints {
            curve: *self,
            next: 0,
        }
    }
}

/// Iterator over an `IprCurve`
#[derive(Debug, Clone)]
pub struct IprPoints {
    curve: IprCurve,
    next: usize,
}

impl Iterator for IprPoints {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.curve.points {
            return None;
        }
        let fraction = self.next as f64 / (self.curve.points - 1) as f64;
        self.next += 1;
        let pwf = self.curve.average_pressure * (1.0 - fraction);
        Some((self.curve.rate_at(pwf), pwf))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.curve.points - self.next.min(self.curve.points);
        (left, Some(left))
    }
}

impl ExactSizeIterator for IprPoints {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_darcy_is_linear() {
        let ipr = IprCurve::new(IprMethod::Darcy, FluidType::Oil, 2.0, 3000.0, 11).unwrap();
        let points: Vec<(f64, f64)> = ipr.points().collect();
        assert_eq!(points.len(), 11);
        assert_eq!(points[0], (0.0, 3000.0));
        assert_eq!(points[10], (6000.0, 0.0));
        assert!((points[5].0 - 3000.0).abs() < 1e-9);
    }

    #[test]
    fn test_vogel_endpoints_and_curvature() {
        let ipr = IprCurve::new(IprMethod::Vogel, FluidType::Gas, 1.8, 2000.0, 21).unwrap();
        assert!((ipr.absolute_open_flow() - 2000.0).abs() < 1e-9);
        let points: Vec<(f64, f64)> = ipr.points().collect();
        assert_eq!(points[0].0, 0.0);
        assert!((points[20].0 - 2000.0).abs() < 1e-9);
        // Concave: midpoint rate above the chord
        assert!(points[10].0 > 0.5 * 2000.0);
    }

    #[test]
    fn test_darcy_gas_rejected() {
        let err = IprCurve::new(IprMethod::Darcy, FluidType::Gas, 2.0, 3000.0, 11).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn test_points_are_restartable() {
        let ipr = IprCurve::new(IprMethod::Vogel, FluidType::Oil, 1.0, 2500.0, 7).unwrap();
        let first: Vec<(f64, f64)> = ipr.points().collect();
        let second: Vec<(f64, f64)> = ipr.points().collect();
        assert_eq!(first, second);
        assert_eq!(ipr.points().len(), 7);
    }
}
