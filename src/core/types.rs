use serde::Serialize;

use super::error::{SimError, SimResult};

/// Fixed ratio between an asset's expected return and the standard deviation
/// its annual returns are drawn with.
pub const VOLATILITY_RATIO: f64 = 0.2;

/// What to do with a negative derived standard deviation before sampling.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolatilityPolicy {
    #[default]
    Absolute,
    ClampZero,
    Reject,
}

impl VolatilityPolicy {
    pub fn resolve(self, asset: &str, std_dev: f64) -> SimResult<f64> {
        if !std_dev.is_finite() {
            return Err(SimError::invalid(
                format!("{asset}.return_std_dev"),
                "must be finite",
            ));
        }
        if std_dev >= 0.0 {
            return Ok(std_dev);
        }

        match self {
            VolatilityPolicy::Absolute => Ok(std_dev.abs()),
            VolatilityPolicy::ClampZero => Ok(0.0),
            VolatilityPolicy::Reject => Err(SimError::invalid(
                format!("{asset}.return_std_dev"),
                format!("negative standard deviation {std_dev}"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSpec {
    pub name: String,
    pub initial_capital: f64,
    pub expected_return: f64,
    pub return_std_dev: f64,
    pub horizon_years: u32,
    pub annual_contribution: f64,
}

impl AssetSpec {
    /// Builds an asset with the standard deviation derived from the expected
    /// return. `index` is zero-based and only used to label unnamed assets.
    pub fn new(
        name: Option<&str>,
        index: usize,
        initial_capital: f64,
        expected_return: f64,
        horizon_years: u32,
        annual_contribution: f64,
    ) -> Self {
        let name = match name.map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => default_asset_name(index),
        };

        Self {
            name,
            initial_capital,
            expected_return,
            return_std_dev: expected_return * VOLATILITY_RATIO,
            horizon_years,
            annual_contribution,
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.name.trim().is_empty() {
            return Err(SimError::invalid("name", "must not be empty"));
        }
        if !self.initial_capital.is_finite() || self.initial_capital < 0.0 {
            return Err(SimError::invalid(
                format!("{}.initial_capital", self.name),
                "must be a finite value >= 0",
            ));
        }
        if !self.expected_return.is_finite() {
            return Err(SimError::invalid(
                format!("{}.expected_return", self.name),
                "must be finite",
            ));
        }
        if self.horizon_years < 1 {
            return Err(SimError::invalid(
                format!("{}.horizon_years", self.name),
                "must be >= 1",
            ));
        }
        if !self.annual_contribution.is_finite() || self.annual_contribution < 0.0 {
            return Err(SimError::invalid(
                format!("{}.annual_contribution", self.name),
                "must be a finite value >= 0",
            ));
        }
        Ok(())
    }
}

pub fn default_asset_name(index: usize) -> String {
    format!("Asset {}", index + 1)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalParameters {
    pub num_assets: u32,
    pub num_simulations: u32,
    pub inflation_rate: f64,
    pub tax_rate: f64,
    pub seed: u64,
    pub volatility_policy: VolatilityPolicy,
}

impl GlobalParameters {
    /// Checks the global parameters and every asset. Runs before any
    /// simulation work starts.
    pub fn validate(&self, assets: &[AssetSpec]) -> SimResult<()> {
        if self.num_assets < 1 {
            return Err(SimError::invalid("num_assets", "must be >= 1"));
        }
        if self.num_assets as usize != assets.len() {
            return Err(SimError::invalid(
                "num_assets",
                format!(
                    "declares {} assets but {} were supplied",
                    self.num_assets,
                    assets.len()
                ),
            ));
        }
        if self.num_simulations < 1 {
            return Err(SimError::invalid("num_simulations", "must be >= 1"));
        }
        if !self.inflation_rate.is_finite() || self.inflation_rate <= -1.0 {
            return Err(SimError::invalid(
                "inflation_rate",
                "must be finite and > -1",
            ));
        }
        if !self.tax_rate.is_finite() {
            return Err(SimError::invalid("tax_rate", "must be finite"));
        }

        for asset in assets {
            asset.validate()?;
            self.volatility_policy
                .resolve(&asset.name, asset.return_std_dev)?;
        }
        Ok(())
    }
}

/// Nominal values per simulation (rows) and year (columns), with the parallel
/// cumulative contribution table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationMatrix {
    pub values: Vec<Vec<f64>>,
    pub contributions: Vec<Vec<f64>>,
}

impl SimulationMatrix {
    pub fn simulations(&self) -> usize {
        self.values.len()
    }

    pub fn horizon(&self) -> usize {
        self.values.first().map_or(0, Vec::len)
    }

    /// Nominal values of every simulation at `year` (1-indexed).
    pub fn column(&self, year: usize) -> Vec<f64> {
        self.values
            .iter()
            .filter_map(|row| row.get(year.wrapping_sub(1)).copied())
            .collect()
    }

    pub fn terminal_values(&self) -> Vec<f64> {
        self.values
            .iter()
            .filter_map(|row| row.last().copied())
            .collect()
    }

    pub fn final_contributions(&self) -> Vec<f64> {
        self.contributions
            .iter()
            .filter_map(|row| row.last().copied())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskReport {
    pub asset: String,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    pub variance: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    pub var_5: f64,
    pub cvar_5: f64,
    pub var_1: f64,
    pub cvar_1: f64,
    pub max_drawdown: f64,
    pub deepest_drawdown: f64,
    pub sharpe_ratio: f64,
    pub total_contribution: f64,
}

/// Real (deflated) cross-section of one simulated year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearBand {
    pub year: u32,
    pub mean: f64,
    pub p5: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u32,
    pub frequency: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EcdfPoint {
    pub value: f64,
    pub probability: f64,
}

#[derive(Debug, Clone)]
pub struct AssetOutcome {
    pub asset: AssetSpec,
    pub matrix: SimulationMatrix,
    pub real_terminal_values: Vec<f64>,
    pub report: RiskReport,
    pub bands: Vec<YearBand>,
    pub histogram: Vec<HistogramBin>,
    pub ecdf: Vec<EcdfPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub expected_real_value: f64,
    pub asset_count: usize,
}

#[derive(Debug, Clone)]
pub struct PortfolioRun {
    pub outcomes: Vec<AssetOutcome>,
    pub summary: PortfolioSummary,
}
