//! Bourdet logarithmic derivative
//!
//! Three-point weighted central difference on a log-time axis, with the
//! neighbors pushed out to at least `L` (natural-log units) on each side:
//!
//! ```text
//! d_i = [ (Δy_l/Δx_l)·Δx_r + (Δy_r/Δx_r)·Δx_l ] / (Δx_l + Δx_r)
//! ```
//!
//! Used for both the measured curve and the model curve, so smoothing
//! affects the two identically during matching.

/// Bourdet derivative of `y` against `x`.
///
/// `x` must be non-decreasing. Points with `usable[i] == false` get `None`
/// and are never picked as neighbors. When no neighbor lies at least
/// `smoothing` away on one side, the furthest usable point on that side is
/// taken instead; the first and last usable points fall back to a one-sided
/// difference.
pub fn bourdet(x: &[f64], y: &[f64], usable: &[bool], smoothing: f64) -> Vec<Option<f64>> {
    debug_assert_eq!(x.len(), y.len());
    debug_assert_eq!(x.len(), usable.len());

    let valid: Vec<usize> = (0..x.len()).filter(|&i| usable[i]).collect();
    let mut out = vec![None; x.len()];
    if valid.len() < 2 {
        return out;
    }

    let last = valid.len() - 1;
    for (pos, &i) in valid.iter().enumerate() {
        let left = if pos == 0 {
            None
        } else {
            let found = valid[..pos]
                .iter()
                .rev()
                .copied()
                .find(|&j| x[i] - x[j] >= smoothing);
            Some(found.unwrap_or(valid[0]))
        };
        let right = if pos == last {
            None
        } else {
            let found = valid[pos + 1..]
                .iter()
                .copied()
                .find(|&k| x[k] - x[i] >= smoothing);
            Some(found.unwrap_or(valid[last]))
        };

        out[i] = match (left, right) {
            (Some(j), Some(k)) => {
                let dx_l = x[i] - x[j];
                let dx_r = x[k] - x[i];
                if dx_l <= 0.0 || dx_r <= 0.0 {
                    None
                } else {
                    let slope_l = (y[i] - y[j]) / dx_l;
                    let slope_r = (y[k] - y[i]) / dx_r;
                    Some((slope_l * dx_r + slope_r * dx_l) / (dx_l + dx_r))
                }
            }
            (None, Some(k)) => one_sided(x[i], y[i], x[k], y[k]),
            (Some(j), None) => one_sided(x[j], y[j], x[i], y[i]),
            (None, None) => None,
        };
    }

    out
}

fn one_sided(x0: f64, y0: f64, x1: f64, y1: f64) -> Option<f64> {
    let dx = x1 - x0;
    (dx > 0.0).then(|| (y1 - y0) / dx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_grid(n: usize) -> Vec<f64> {
        (0..n).map(|i| -3.0 + 6.0 * i as f64 / (n - 1) as f64).collect()
    }

    #[test]
    fn test_linear_in_log_gives_constant_derivative() {
        let x = log_grid(60);
        let y: Vec<f64> = x.iter().map(|v| 3.5 * v + 10.0).collect();
        let usable = vec![true; x.len()];
        for d in bourdet(&x, &y, &usable, 0.2) {
            assert!((d.unwrap() - 3.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_exponential_gives_unit_log_slope() {
        // y = e^x  →  dy/dx = y
        let x = log_grid(200);
        let y: Vec<f64> = x.iter().map(|v| v.exp()).collect();
        let usable = vec![true; x.len()];
        let d = bourdet(&x, &y, &usable, 0.1);
        for i in 20..180 {
            let rel = (d[i].unwrap() - y[i]).abs() / y[i];
            assert!(rel < 0.01, "point {i}: rel error {rel}");
        }
    }

    #[test]
    fn test_unusable_points_skipped() {
        let x = log_grid(10);
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v).collect();
        let mut usable = vec![true; 10];
        usable[4] = false;
        let d = bourdet(&x, &y, &usable, 0.5);
        assert!(d[4].is_none());
        assert!((d[3].unwrap() - 2.0).abs() < 1e-9);
        assert!((d[5].unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_usable_point_has_no_derivative() {
        let x = log_grid(5);
        let y = vec![1.0; 5];
        let usable = vec![false, false, true, false, false];
        assert!(bourdet(&x, &y, &usable, 0.2).iter().all(Option::is_none));
    }
}
