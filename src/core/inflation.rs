use super::stats::{mean, percentile_sorted};
use super::types::{SimulationMatrix, YearBand};

/// Cumulative price level after `year` years at a constant annual rate.
pub fn price_index(inflation_rate: f64, year: u32) -> f64 {
    (1.0 + inflation_rate).powf(f64::from(year))
}

/// Deflates a nominal value observed at `year` (1-indexed from the start of
/// the simulation) into today's money.
pub fn deflate(value: f64, inflation_rate: f64, year: u32) -> f64 {
    value / price_index(inflation_rate, year)
}

/// Deflates a per-year series whose first element is year 1.
pub fn deflate_series(values: &[f64], inflation_rate: f64) -> Vec<f64> {
    values
        .iter()
        .zip(1_u32..)
        .map(|(v, year)| deflate(*v, inflation_rate, year))
        .collect()
}

/// Real terminal value of every simulation, in simulation order.
pub fn real_terminal_values(
    matrix: &SimulationMatrix,
    horizon_years: u32,
    inflation_rate: f64,
) -> Vec<f64> {
    let divisor = price_index(inflation_rate, horizon_years);
    matrix
        .terminal_values()
        .into_iter()
        .map(|v| v / divisor)
        .collect()
}

/// Mean and 5%/95% percentiles of each year's nominal column, deflated to
/// real terms.
pub fn real_year_bands(matrix: &SimulationMatrix, inflation_rate: f64) -> Vec<YearBand> {
    (1..=matrix.horizon())
        .zip(1_u32..)
        .map(|(column, year)| {
            let mut values = matrix.column(column);
            values.sort_by(|a, b| a.total_cmp(b));
            YearBand {
                year,
                mean: deflate(mean(&values), inflation_rate, year),
                p5: deflate(percentile_sorted(&values, 5.0), inflation_rate, year),
                p95: deflate(percentile_sorted(&values, 95.0), inflation_rate, year),
            }
        })
        .collect()
}
