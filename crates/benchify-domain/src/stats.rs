use crate::DomainError;
use benchify_types::Stats;
use statrs::distribution::{ContinuousCDF, StudentsT};

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1). Zero for a single value.
fn sample_stddev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Summarize successful sample durations (seconds).
pub fn summarize(values: &[f64]) -> Result<Stats, DomainError> {
    if values.is_empty() {
        return Err(DomainError::NoSamples);
    }
    let m = mean(values);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok(Stats {
        count: values.len() as u32,
        mean: m,
        stddev: sample_stddev(values, m),
        min,
        max,
    })
}

/// Half-width of the two-sided Student-t confidence interval of the mean,
/// relative to the mean.
///
/// `None` when fewer than two samples exist. Identical zero samples give
/// `Some(0.0)`; a zero mean with spread gives `Some(f64::INFINITY)`.
pub fn relative_half_width(values: &[f64], confidence: f64) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let m = mean(values);
    let s = sample_stddev(values, m);
    if s == 0.0 {
        return Some(0.0);
    }
    let t = StudentsT::new(0.0, 1.0, (n - 1) as f64).ok()?;
    let crit = t.inverse_cdf((1.0 + confidence) / 2.0);
    let half_width = crit * s / (n as f64).sqrt();
    if m == 0.0 {
        return Some(f64::INFINITY);
    }
    Some((half_width / m).abs())
}
