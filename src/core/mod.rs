mod engine;
mod error;
mod inflation;
mod portfolio;
mod sampler;
mod stats;
mod types;

pub use engine::{PathSample, evaluate_asset, run_ensemble, run_portfolio, simulate_path};
pub use error::{SimError, SimResult};
pub use inflation::{deflate, deflate_series, price_index, real_terminal_values, real_year_bands};
pub use portfolio::aggregate;
pub use sampler::{ReturnSampler, derive_seed, simulation_rng};
pub use stats::{percentile, risk_report};
pub use types::{
    AssetOutcome, AssetSpec, EcdfPoint, GlobalParameters, HistogramBin, PortfolioRun,
    PortfolioSummary, RiskReport, SimulationMatrix, VOLATILITY_RATIO, VolatilityPolicy, YearBand,
    default_asset_name,
};
