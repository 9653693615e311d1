//! TimeSeries Normalizer
//!
//! Last line of defence between the ingestion layer and the numerics:
//! rejects non-finite or impossible values, orders samples by time and
//! coalesces duplicate timestamps so that time is strictly increasing.

use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::types::Sample;

/// Validate and clean a sample sequence.
///
/// - NaN/∞ time or pressure, negative time, non-positive pressure → `DataError`
/// - samples are sorted by time (stable)
/// - samples sharing a timestamp are averaged (pressure, and rate when any is recorded)
/// - fewer than `min_samples` samples remaining → `DataError`
pub fn normalize(samples: &[Sample], min_samples: usize) -> EngineResult<Vec<Sample>> {
    for (i, s) in samples.iter().enumerate() {
        if !s.time.is_finite() || !s.pressure.is_finite() {
            return Err(EngineError::data(format!(
                "sample {i} has a non-finite value (time={}, pressure={})",
                s.time, s.pressure
            )));
        }
        if s.time < 0.0 {
            return Err(EngineError::data(format!("sample {i} has negative time {}", s.time)));
        }
        if s.pressure <= 0.0 {
            return Err(EngineError::data(format!(
                "sample {i} has non-positive pressure {}",
                s.pressure
            )));
        }
        if let Some(rate) = s.rate {
            if !rate.is_finite() {
                return Err(EngineError::data(format!("sample {i} has a non-finite rate")));
            }
        }
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut cleaned: Vec<Sample> = Vec::with_capacity(sorted.len());
    let mut group: Vec<Sample> = Vec::new();
    let mut coalesced = 0usize;

    for sample in sorted {
        if let Some(first) = group.first() {
            if first.time != sample.time {
                cleaned.push(coalesce(&group));
                group.clear();
            } else {
                coalesced += 1;
            }
        }
        group.push(sample);
    }
    if !group.is_empty() {
        cleaned.push(coalesce(&group));
    }

    if coalesced > 0 {
        debug!(coalesced, remaining = cleaned.len(), "Coalesced duplicate timestamps");
    }

    if cleaned.len() < min_samples {
        return Err(EngineError::data(format!(
            "need at least {min_samples} distinct samples, got {}",
            cleaned.len()
        )));
    }

    Ok(cleaned)
}

fn coalesce(group: &[Sample]) -> Sample {
    let n = group.len() as f64;
    let pressure = group.iter().map(|s| s.pressure).sum::<f64>() / n;
    let rates: Vec<f64> = group.iter().filter_map(|s| s.rate).collect();
    let rate = if rates.is_empty() {
        None
    } else {
        Some(rates.iter().sum::<f64>() / rates.len() as f64)
    };
    Sample {
        time: group[0].time,
        pressure,
        rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(times: &[f64]) -> Vec<Sample> {
        times.iter().map(|&t| Sample::new(t, 3000.0 + t)).collect()
    }

    #[test]
    fn test_sorts_out_of_order_samples() {
        let cleaned = normalize(&series(&[3.0, 1.0, 2.0, 0.5, 4.0]), 5).unwrap();
        let times: Vec<f64> = cleaned.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![0.5, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_duplicates_are_averaged() {
        let mut samples = series(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        samples.push(Sample::new(2.0, 3010.0).with_rate(100.0));
        let cleaned = normalize(&samples, 5).unwrap();
        assert_eq!(cleaned.len(), 5);
        let dup = cleaned.iter().find(|s| s.time == 2.0).unwrap();
        assert!((dup.pressure - 3006.0).abs() < 1e-9);
        assert_eq!(dup.rate, Some(100.0));
    }

    #[test]
    fn test_nan_pressure_rejected() {
        let mut samples = series(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        samples[2].pressure = f64::NAN;
        assert!(matches!(normalize(&samples, 5), Err(EngineError::Data(_))));
    }

    #[test]
    fn test_negative_time_rejected() {
        let samples = series(&[-1.0, 1.0, 2.0, 3.0, 4.0]);
        assert!(normalize(&samples, 5).is_err());
    }

    #[test]
    fn test_too_few_distinct_samples() {
        let samples = series(&[1.0, 1.0, 1.0, 2.0, 3.0]);
        let err = normalize(&samples, 5).unwrap_err();
        assert!(err.to_string().contains("at least 5"));
    }
}
