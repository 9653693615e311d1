//! Gaver-Stehfest numerical Laplace inversion
//!
//! f(t) ≈ (ln 2 / t) · Σᵢ Vᵢ · F(i·ln 2 / t),  i = 1..N

use std::sync::OnceLock;

/// Number of Stehfest terms (even). 12 is the usual double-precision sweet spot.
pub const STEHFEST_N: usize = 12;

static WEIGHTS: OnceLock<[f64; STEHFEST_N]> = OnceLock::new();

fn factorial(n: usize) -> f64 {
    (1..=n).fold(1.0, |acc, k| acc * k as f64)
}

fn compute_weights() -> [f64; STEHFEST_N] {
    let half = STEHFEST_N / 2;
    let mut v = [0.0; STEHFEST_N];
    for (idx, slot) in v.iter_mut().enumerate() {
        let i = idx + 1;
        let mut sum = 0.0;
        for k in (i + 1) / 2..=i.min(half) {
            sum += (k as f64).powi(half as i32) * factorial(2 * k)
                / (factorial(half - k)
                    * factorial(k)
                    * factorial(k - 1)
                    * factorial(i - k)
                    * factorial(2 * k - i));
        }
        let sign = if (i + half) % 2 == 0 { 1.0 } else { -1.0 };
        *slot = sign * sum;
    }
    v
}

/// Stehfest weights V₁..V_N.
pub fn weights() -> &'static [f64; STEHFEST_N] {
    WEIGHTS.get_or_init(compute_weights)
}

/// Invert `f_bar` at time `t > 0`.
pub fn invert<F>(f_bar: F, t: f64) -> f64
where
    F: Fn(f64) -> f64,
{
    let a = std::f64::consts::LN_2 / t;
    weights()
        .iter()
        .enumerate()
        .map(|(idx, v)| v * f_bar((idx + 1) as f64 * a))
        .sum::<f64>()
        * a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_zero() {
        let sum: f64 = weights().iter().sum();
        assert!(sum.abs() < 1e-6, "sum = {sum}");
        assert!((weights()[0] - (-0.016_666_666_666_666_7)).abs() < 1e-12);
    }

    #[test]
    fn test_inverts_ramp() {
        // L⁻¹{1/s²} = t
        for &t in &[0.01, 1.0, 250.0] {
            let f = invert(|s| 1.0 / (s * s), t);
            assert!(((f - t) / t).abs() < 1e-6);
        }
    }

    #[test]
    fn test_inverts_logarithm() {
        // L⁻¹{−(γ + ln s)/s} = ln t
        let gamma = 0.577_215_664_901_532_9;
        for &t in &[10.0, 1e4] {
            let f = invert(|s: f64| -(gamma + s.ln()) / s, t);
            assert!((f - t.ln()).abs() < 1e-3, "t={t}: {f}");
        }
    }

    #[test]
    fn test_inverts_decaying_exponential() {
        let f = invert(|s| 1.0 / (s + 1.0), 1.0);
        assert!((f - (-1.0f64).exp()).abs() < 2e-3);
    }
}
