//! Risk and return statistics over an asset's real terminal-value
//! distribution and its nominal path matrix.

use super::types::{EcdfPoint, HistogramBin, RiskReport, SimulationMatrix};

pub const HISTOGRAM_BINS: usize = 25;

/// Builds the full report row for one asset.
///
/// `real_terminal` holds one deflated terminal value per simulation;
/// `matrix` is the nominal matrix the values were taken from.
pub fn risk_report(asset: &str, real_terminal: &[f64], matrix: &SimulationMatrix) -> RiskReport {
    let mut sorted = real_terminal.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mean = mean(&sorted);
    let variance = central_moment(&sorted, mean, 2);
    let std_dev = variance.sqrt();

    let var_5 = percentile_sorted(&sorted, 5.0);
    let var_1 = percentile_sorted(&sorted, 1.0);

    RiskReport {
        asset: asset.to_string(),
        mean,
        median: percentile_sorted(&sorted, 50.0),
        min: sorted.first().copied().unwrap_or(0.0),
        max: sorted.last().copied().unwrap_or(0.0),
        std_dev,
        variance,
        skewness: skewness(&sorted, mean, variance),
        kurtosis: kurtosis(&sorted, mean, variance),
        var_5,
        cvar_5: conditional_value_at_risk(&sorted, var_5),
        var_1,
        cvar_1: conditional_value_at_risk(&sorted, var_1),
        max_drawdown: max_drawdown(&matrix.values),
        deepest_drawdown: deepest_drawdown(&matrix.values),
        sharpe_ratio: sharpe_ratio(mean, std_dev),
        total_contribution: mean_of(&matrix.final_contributions()),
    }
}

pub fn percentile(values: &mut [f64], p: f64) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    percentile_sorted(values, p)
}

/// Linear interpolation between order statistics of an ascending slice.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }

    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        sorted[lower]
    } else {
        let w = rank - lower as f64;
        let (lo, hi) = (sorted[lower], sorted[upper]);
        (lo + (hi - lo) * w).min(hi)
    }
}

/// Arithmetic mean, accumulated relative to the minimum so a sample of equal
/// values returns that value exactly.
pub fn mean(sorted: &[f64]) -> f64 {
    let Some(&base) = sorted.first() else {
        return 0.0;
    };
    base + sorted.iter().map(|v| v - base).sum::<f64>() / sorted.len() as f64
}

fn mean_of(values: &[f64]) -> f64 {
    let Some(base) = values.iter().copied().reduce(f64::min) else {
        return 0.0;
    };
    base + values.iter().map(|v| v - base).sum::<f64>() / values.len() as f64
}

/// Population central moment (denominator N).
fn central_moment(values: &[f64], mean: f64, order: i32) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|v| (v - mean).powi(order)).sum::<f64>() / values.len() as f64
}

pub fn skewness(values: &[f64], mean: f64, variance: f64) -> f64 {
    if variance <= 0.0 {
        return 0.0;
    }
    central_moment(values, mean, 3) / variance.powf(1.5)
}

/// Excess (Fisher) kurtosis.
pub fn kurtosis(values: &[f64], mean: f64, variance: f64) -> f64 {
    if variance <= 0.0 {
        return 0.0;
    }
    central_moment(values, mean, 4) / (variance * variance) - 3.0
}

/// Mean of every value at or below `threshold`, never above it.
pub fn conditional_value_at_risk(sorted: &[f64], threshold: f64) -> f64 {
    let tail_len = sorted.partition_point(|v| *v <= threshold);
    if tail_len == 0 {
        return threshold;
    }
    mean(&sorted[..tail_len]).min(threshold)
}

/// Per path, the largest value of `path - running_max(path)`; then the
/// largest across paths.
pub fn max_drawdown(paths: &[Vec<f64>]) -> f64 {
    paths
        .iter()
        .filter_map(|path| drawdowns(path).reduce(f64::max))
        .reduce(f64::max)
        .unwrap_or(0.0)
}

/// Per path, the smallest value of `path - running_max(path)`; then the
/// smallest across paths.
pub fn deepest_drawdown(paths: &[Vec<f64>]) -> f64 {
    paths
        .iter()
        .filter_map(|path| drawdowns(path).reduce(f64::min))
        .reduce(f64::min)
        .unwrap_or(0.0)
}

fn drawdowns(path: &[f64]) -> impl Iterator<Item = f64> + '_ {
    path.iter().scan(f64::NEG_INFINITY, |peak, &v| {
        *peak = peak.max(v);
        Some(v - *peak)
    })
}

pub fn sharpe_ratio(mean: f64, std_dev: f64) -> f64 {
    if std_dev > 0.0 { mean / std_dev } else { 0.0 }
}

pub fn ecdf(values: &[f64]) -> Vec<EcdfPoint> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len() as f64;
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, value)| EcdfPoint {
            value,
            probability: (i + 1) as f64 / n,
        })
        .collect()
}

/// Equal-width histogram; collapses to one bin when every value is equal.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    let (Some(min), Some(max)) = (
        values.iter().copied().reduce(f64::min),
        values.iter().copied().reduce(f64::max),
    ) else {
        return Vec::new();
    };
    let n = values.len() as f64;

    if max <= min || bins <= 1 {
        return vec![HistogramBin {
            lower: min,
            upper: max,
            count: values.len() as u32,
            frequency: 1.0,
        }];
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0_u32; bins];
    for v in values {
        let idx = (((v - min) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: min + width * i as f64,
            upper: if i + 1 == bins {
                max
            } else {
                min + width * (i + 1) as f64
            },
            count,
            frequency: count as f64 / n,
        })
        .collect()
}
