//! Regime Classifier
//!
//! Labels intervals of the derivative curve by their local log-log slope:
//!
//! | Regime            | Slope of ln(d) vs ln(Δt)          |
//! |-------------------|-----------------------------------|
//! | Wellbore storage  | ≈ 1                               |
//! | IARF              | ≈ 0                               |
//! | Boundary          | departs from 0 after IARF         |
//! | Transition        | whatever lies between the above   |
//!
//! Never fails: a curve without recognisable behaviour yields an empty list.

use tracing::debug;

use crate::config::RegimeSettings;
use crate::types::{BoundaryKind, DiagnosticPoint, FlowRegime, FlowRegimeSegment};

/// Fewest points a local slope fit accepts
const MIN_SLOPE_POINTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    UnitSlope,
    Flat,
    Other,
}

/// Log-plottable part of the diagnostic curve with its local slopes
struct LogCurve {
    times: Vec<f64>,
    slopes: Vec<Option<f64>>,
}

impl LogCurve {
    fn build(points: &[DiagnosticPoint], window_log_cycles: f64) -> Self {
        let plottable: Vec<&DiagnosticPoint> =
            points.iter().filter(|p| p.is_log_plottable()).collect();
        let times: Vec<f64> = plottable.iter().map(|p| p.elapsed_time).collect();
        let x: Vec<f64> = times.iter().map(|t| t.ln()).collect();
        let y: Vec<f64> = plottable
            .iter()
            .map(|p| p.derivative.map_or(f64::NAN, f64::ln))
            .collect();

        let half_window = 0.5 * window_log_cycles * std::f64::consts::LN_10;
        let slopes = (0..x.len())
            .map(|j| {
                let lo = x.iter().position(|&v| x[j] - v <= half_window).unwrap_or(j);
                let hi = x.iter().rposition(|&v| v - x[j] <= half_window).unwrap_or(j);
                least_squares_slope(&x[lo..=hi], &y[lo..=hi])
            })
            .collect();

        Self { times, slopes }
    }

    fn len(&self) -> usize {
        self.times.len()
    }

    fn segment(
        &self,
        regime: FlowRegime,
        start: usize,
        end: usize,
        boundary: Option<BoundaryKind>,
    ) -> FlowRegimeSegment {
        let defined: Vec<f64> = self.slopes[start..=end].iter().flatten().copied().collect();
        let mean_slope = if defined.is_empty() {
            0.0
        } else {
            defined.iter().sum::<f64>() / defined.len() as f64
        };
        FlowRegimeSegment {
            regime,
            start_time: self.times[start],
            end_time: self.times[end],
            mean_slope,
            point_count: end - start + 1,
            boundary,
        }
    }
}

fn least_squares_slope(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() < MIN_SLOPE_POINTS {
        return None;
    }
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (xi, yi) in x.iter().zip(y) {
        sxy += (xi - mx) * (yi - my);
        sxx += (xi - mx) * (xi - mx);
    }
    let slope = sxy / sxx;
    (sxx > 0.0 && slope.is_finite()).then_some(slope)
}

/// Maximal runs of `target`, absorbing up to `max_gap` consecutive other labels.
/// Runs start and end on a `target` point.
fn runs(labels: &[Label], target: Label, max_gap: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < labels.len() {
        if labels[i] != target {
            i += 1;
            continue;
        }
        let start = i;
        let mut end = i;
        let mut gap = 0;
        for (k, &label) in labels.iter().enumerate().skip(i + 1) {
            if label == target {
                end = k;
                gap = 0;
            } else {
                gap += 1;
                if gap > max_gap {
                    break;
                }
            }
        }
        out.push((start, end));
        i = end + 1;
    }
    out
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    })
}

/// Flow regime classifier
pub struct RegimeClassifier;

impl RegimeClassifier {
    /// Classify the diagnostic curve into ordered, non-overlapping segments.
    pub fn classify(points: &[DiagnosticPoint], settings: &RegimeSettings) -> Vec<FlowRegimeSegment> {
        let curve = LogCurve::build(points, settings.window_log_cycles);
        let eps = settings.slope_tolerance;

        let labels: Vec<Label> = curve
            .slopes
            .iter()
            .map(|m| match m {
                Some(m) if (m - 1.0).abs() <= eps => Label::UnitSlope,
                Some(m) if m.abs() <= eps => Label::Flat,
                _ => Label::Other,
            })
            .collect();

        let iarf = runs(&labels, Label::Flat, settings.max_gap_points)
            .into_iter()
            .filter(|&(s, e)| {
                e - s + 1 >= settings.min_run_points
                    && (curve.times[e] / curve.times[s]).log10() >= settings.min_iarf_log_cycles
            })
            // Longest elapsed span wins; on ties the earlier run is kept
            .fold(None, |best: Option<(usize, usize)>, (s, e)| match best {
                Some((bs, be)) if curve.times[be] - curve.times[bs] >= curve.times[e] - curve.times[s] => {
                    Some((bs, be))
                }
                _ => Some((s, e)),
            });

        let storage = runs(&labels, Label::UnitSlope, settings.max_gap_points)
            .into_iter()
            .filter(|&(s, e)| e - s + 1 >= settings.min_run_points)
            .find(|&(_, e)| iarf.map_or(true, |(is, _)| e < is));

        let mut classified: Vec<(usize, usize, FlowRegime, Option<BoundaryKind>)> = Vec::new();
        if let Some((s, e)) = storage {
            classified.push((s, e, FlowRegime::WellboreStorage, None));
        }
        if let Some((s, e)) = iarf {
            classified.push((s, e, FlowRegime::Iarf, None));
            if let Some(boundary) = Self::boundary_after(&curve, e, settings) {
                classified.push(boundary);
            }
        }

        if classified.is_empty() {
            debug!(points = curve.len(), "No flow regime recognised");
            return Vec::new();
        }

        let mut segments = Vec::with_capacity(classified.len() * 2);
        for (idx, &(start, end, regime, boundary)) in classified.iter().enumerate() {
            if idx > 0 {
                let previous_end = classified[idx - 1].1;
                if start > previous_end + 1 {
                    segments.push(curve.segment(FlowRegime::Transition, previous_end + 1, start - 1, None));
                }
            }
            segments.push(curve.segment(regime, start, end, boundary));
        }

        debug!(
            points = curve.len(),
            segments = segments.len(),
            storage = storage.is_some(),
            iarf = iarf.is_some(),
            "Flow regimes classified"
        );
        segments
    }

    /// Late-time departure from the IARF plateau.
    fn boundary_after(
        curve: &LogCurve,
        iarf_end: usize,
        settings: &RegimeSettings,
    ) -> Option<(usize, usize, FlowRegime, Option<BoundaryKind>)> {
        let eps = settings.slope_tolerance;
        let last = curve.len().checked_sub(1)?;
        let start = (iarf_end + 1..curve.len()).find(|&i| curve.slopes[i].is_some_and(|m| m.abs() > eps))?;
        if last + 1 - start < settings.min_run_points {
            return None;
        }

        let mut tail: Vec<f64> = curve.slopes[start..].iter().flatten().copied().collect();
        let kind = match median(&mut tail)? {
            m if m > eps => BoundaryKind::NoFlow,
            m if m < -eps => BoundaryKind::ConstantPressure,
            _ => return None,
        };
        Some((start, last, FlowRegime::Boundary, Some(kind)))
    }
}
