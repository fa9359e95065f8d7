use rand::Rng;
use rayon::prelude::*;
use tracing::{debug, info};

use super::error::SimResult;
use super::inflation::{real_terminal_values, real_year_bands};
use super::portfolio::aggregate;
use super::sampler::{ReturnSampler, derive_seed, simulation_rng};
use super::stats::{HISTOGRAM_BINS, ecdf, histogram, risk_report};
use super::types::{AssetOutcome, AssetSpec, GlobalParameters, PortfolioRun, SimulationMatrix};

/// One simulated path. Both series have one entry per year, excluding the
/// initial capital.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSample {
    pub values: Vec<f64>,
    pub contributions: Vec<f64>,
}

/// Evolves one asset over its horizon. Tax is charged on the raw annual gain,
/// so losing years receive a rebate. Values are not floored at zero.
pub fn simulate_path<R: Rng + ?Sized>(
    asset: &AssetSpec,
    tax_rate: f64,
    sampler: &ReturnSampler,
    rng: &mut R,
) -> PathSample {
    let years = asset.horizon_years as usize;
    let mut values = Vec::with_capacity(years);
    let mut contributions = Vec::with_capacity(years);

    let mut value = asset.initial_capital;
    let mut contributed = 0.0;

    for _ in 0..years {
        let r = sampler.sample(rng);
        let gain = value * r;
        let tax = gain * tax_rate;
        value = value + gain - tax + asset.annual_contribution;
        contributed += asset.annual_contribution;

        values.push(value);
        contributions.push(contributed);
    }

    PathSample {
        values,
        contributions,
    }
}

/// Runs `num_simulations` independent paths for one asset. Simulation `i`
/// draws from its own stream seeded by `derive_seed(seed, asset_index, i)`,
/// so the matrix does not depend on scheduling.
pub fn run_ensemble(
    asset: &AssetSpec,
    asset_index: u32,
    params: &GlobalParameters,
) -> SimResult<SimulationMatrix> {
    let sampler = ReturnSampler::for_asset(asset, params.volatility_policy)?;

    let paths: Vec<PathSample> = (0..params.num_simulations)
        .into_par_iter()
        .map(|simulation_id| {
            let mut rng = simulation_rng(derive_seed(params.seed, asset_index, simulation_id));
            simulate_path(asset, params.tax_rate, &sampler, &mut rng)
        })
        .collect();

    let (values, contributions) = paths
        .into_iter()
        .map(|p| (p.values, p.contributions))
        .unzip();

    Ok(SimulationMatrix {
        values,
        contributions,
    })
}

/// Deflates a finished ensemble and derives every statistic for it.
pub fn evaluate_asset(
    asset: &AssetSpec,
    matrix: SimulationMatrix,
    inflation_rate: f64,
) -> AssetOutcome {
    let real_terminal = real_terminal_values(&matrix, asset.horizon_years, inflation_rate);
    let report = risk_report(&asset.name, &real_terminal, &matrix);
    let bands = real_year_bands(&matrix, inflation_rate);

    AssetOutcome {
        asset: asset.clone(),
        histogram: histogram(&real_terminal, HISTOGRAM_BINS),
        ecdf: ecdf(&real_terminal),
        real_terminal_values: real_terminal,
        report,
        bands,
        matrix,
    }
}

/// Validates the inputs, simulates every asset and aggregates the results.
pub fn run_portfolio(params: &GlobalParameters, assets: &[AssetSpec]) -> SimResult<PortfolioRun> {
    params.validate(assets)?;

    let mut outcomes = Vec::with_capacity(assets.len());
    for (asset_index, asset) in (0_u32..).zip(assets) {
        let matrix = run_ensemble(asset, asset_index, params)?;
        let outcome = evaluate_asset(asset, matrix, params.inflation_rate);
        debug!(
            asset = %asset.name,
            simulations = params.num_simulations,
            horizon = asset.horizon_years,
            mean = outcome.report.mean,
            var_5 = outcome.report.var_5,
            "asset ensemble complete"
        );
        outcomes.push(outcome);
    }

    let reports = outcomes.iter().map(|o| o.report.clone()).collect::<Vec<_>>();
    let summary = aggregate(&reports);
    info!(
        assets = summary.asset_count,
        simulations = params.num_simulations,
        expected_real_value = summary.expected_real_value,
        "portfolio run complete"
    );

    Ok(PortfolioRun { outcomes, summary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::SimError;
    use crate::core::types::VolatilityPolicy;
    use proptest::prelude::{any, prop_assert, prop_assert_eq, proptest};

    fn assert_rel(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol * expected.abs().max(1.0),
            "expected {expected}, got {actual}, relative tolerance {tol}"
        );
    }

    fn sample_params() -> GlobalParameters {
        GlobalParameters {
            num_assets: 1,
            num_simulations: 200,
            inflation_rate: 0.03,
            tax_rate: 0.10,
            seed: 42,
            volatility_policy: VolatilityPolicy::Absolute,
        }
    }

    fn sample_asset() -> AssetSpec {
        AssetSpec::new(Some("Equities"), 0, 10_000.0, 0.08, 10, 500.0)
    }

    fn deterministic_asset() -> AssetSpec {
        let mut asset = AssetSpec::new(None, 0, 10_000.0, 0.08, 10, 0.0);
        asset.return_std_dev = 0.0;
        asset
    }

    fn deterministic_params() -> GlobalParameters {
        GlobalParameters {
            num_assets: 1,
            num_simulations: 100,
            inflation_rate: 0.0,
            tax_rate: 0.0,
            seed: 7,
            volatility_policy: VolatilityPolicy::Absolute,
        }
    }

    #[test]
    fn deterministic_path_compounds_expected_return() {
        let asset = deterministic_asset();
        let sampler = ReturnSampler::for_asset(&asset, VolatilityPolicy::Absolute)
            .expect("valid sampler");
        let mut rng = simulation_rng(1);
        let path = simulate_path(&asset, 0.0, &sampler, &mut rng);

        assert_eq!(path.values.len(), 10);
        for (t, v) in (1..).zip(&path.values) {
            assert_rel(*v, 10_000.0 * 1.08_f64.powi(t), 1e-12);
        }
        assert!(path.contributions.iter().all(|c| *c == 0.0));
    }

    #[test]
    fn tax_and_contribution_apply_each_year() {
        let mut asset = AssetSpec::new(None, 0, 1_000.0, 0.10, 2, 100.0);
        asset.return_std_dev = 0.0;
        let sampler = ReturnSampler::for_asset(&asset, VolatilityPolicy::Absolute)
            .expect("valid sampler");
        let mut rng = simulation_rng(1);
        let path = simulate_path(&asset, 0.25, &sampler, &mut rng);

        // 1000 + 100 - 25 + 100 = 1175; 1175 + 117.5 - 29.375 + 100 = 1363.125
        assert_rel(path.values[0], 1_175.0, 1e-12);
        assert_rel(path.values[1], 1_363.125, 1e-12);
        assert_eq!(path.contributions, vec![100.0, 200.0]);
    }

    #[test]
    fn losses_receive_a_tax_rebate_and_may_go_negative() {
        let mut asset = AssetSpec::new(None, 0, 1_000.0, -1.5, 2, 0.0);
        asset.return_std_dev = 0.0;
        let sampler = ReturnSampler::for_asset(&asset, VolatilityPolicy::Absolute)
            .expect("valid sampler");
        let mut rng = simulation_rng(1);
        let path = simulate_path(&asset, 0.20, &sampler, &mut rng);

        // gain = -1500, tax = -300 (rebate): 1000 - 1500 + 300 = -200
        assert_rel(path.values[0], -200.0, 1e-12);
        // gain = 300, tax = 60: -200 + 300 - 60 = 40
        assert_rel(path.values[1], 40.0, 1e-12);
    }

    #[test]
    fn deterministic_scenario_has_zero_dispersion() {
        let params = deterministic_params();
        let run = run_portfolio(&params, &[deterministic_asset()]).expect("valid run");
        let report = &run.outcomes[0].report;

        assert_rel(report.mean, 21_589.249_972_727_88, 1e-9);
        assert_eq!(report.mean, report.median);
        assert_eq!(report.mean, report.min);
        assert_eq!(report.mean, report.max);
        assert_eq!(report.std_dev, 0.0);
        assert_eq!(report.variance, 0.0);
        assert_eq!(report.sharpe_ratio, 0.0);
        assert_eq!(report.var_5, report.mean);
        assert_eq!(report.cvar_1, report.mean);
    }

    #[test]
    fn zero_inflation_keeps_terminal_values_nominal() {
        let mut params = sample_params();
        params.inflation_rate = 0.0;
        let run = run_portfolio(&params, &[sample_asset()]).expect("valid run");
        let outcome = &run.outcomes[0];
        assert_eq!(
            outcome.real_terminal_values,
            outcome.matrix.terminal_values()
        );
    }

    #[test]
    fn single_simulation_var_equals_terminal_value() {
        let mut params = sample_params();
        params.num_simulations = 1;
        let run = run_portfolio(&params, &[sample_asset()]).expect("valid run");
        let outcome = &run.outcomes[0];
        let terminal = outcome.real_terminal_values[0];
        let report = &outcome.report;
        assert_eq!(report.var_5, terminal);
        assert_eq!(report.var_1, terminal);
        assert_eq!(report.cvar_5, terminal);
        assert_eq!(report.cvar_1, terminal);
    }

    #[test]
    fn portfolio_sums_deterministic_means() {
        let a = deterministic_asset();
        let mut b = AssetSpec::new(Some("Bonds"), 1, 5_000.0, 0.03, 5, 250.0);
        b.return_std_dev = 0.0;

        let mut params = deterministic_params();
        params.num_assets = 2;
        let run = run_portfolio(&params, &[a, b]).expect("valid run");
        let mean_a = run.outcomes[0].report.mean;
        let mean_b = run.outcomes[1].report.mean;
        assert_eq!(run.summary.expected_real_value, mean_a + mean_b);
        assert_eq!(run.summary.asset_count, 2);
        assert_eq!(run.outcomes[1].report.total_contribution, 1_250.0);
    }

    #[test]
    fn run_portfolio_rejects_invalid_input_before_simulating() {
        let mut params = sample_params();
        params.num_simulations = 0;
        let err = run_portfolio(&params, &[sample_asset()]).expect_err("invalid");
        assert!(matches!(err, SimError::InvalidParameter { .. }));
    }

    #[test]
    fn ensembles_differ_between_assets_with_equal_specs() {
        let params = sample_params();
        let asset = sample_asset();
        let first = run_ensemble(&asset, 0, &params).expect("valid ensemble");
        let second = run_ensemble(&asset, 1, &params).expect("valid ensemble");
        assert_ne!(first.values, second.values);
    }

    #[test]
    fn outcome_carries_bands_and_distribution_data() {
        let params = sample_params();
        let run = run_portfolio(&params, &[sample_asset()]).expect("valid run");
        let outcome = &run.outcomes[0];
        assert_eq!(outcome.bands.len(), 10);
        assert_eq!(outcome.ecdf.len(), 200);
        assert_eq!(
            outcome.histogram.iter().map(|b| b.count).sum::<u32>(),
            200
        );
        for band in &outcome.bands {
            assert!(band.p5 <= band.p95);
        }
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(32))]

        #[test]
        fn prop_ensemble_shape_and_risk_invariants(
            seed in any::<u64>(),
            simulations in 1u32..120,
            horizon in 1u32..30,
            capital in 0u32..1_000_000,
            contribution in 0u32..20_000,
            return_bp in -1_500i32..2_500,
            tax_bp in 0u32..5_000,
            inflation_bp in 0u32..1_000,
        ) {
            let asset = AssetSpec::new(
                None,
                0,
                capital as f64,
                return_bp as f64 / 10_000.0,
                horizon,
                contribution as f64,
            );
            let params = GlobalParameters {
                num_assets: 1,
                num_simulations: simulations,
                inflation_rate: inflation_bp as f64 / 10_000.0,
                tax_rate: tax_bp as f64 / 10_000.0,
                seed,
                volatility_policy: VolatilityPolicy::Absolute,
            };

            let run = run_portfolio(&params, std::slice::from_ref(&asset)).expect("valid run");
            let outcome = &run.outcomes[0];
            let report = &outcome.report;

            prop_assert_eq!(outcome.matrix.simulations(), simulations as usize);
            for (row, contrib) in outcome.matrix.values.iter().zip(&outcome.matrix.contributions) {
                prop_assert_eq!(row.len(), horizon as usize);
                prop_assert_eq!(contrib.len(), horizon as usize);
                prop_assert!(row.iter().all(|v| v.is_finite()));
            }

            prop_assert!(report.min <= report.median);
            prop_assert!(report.median <= report.max);
            prop_assert!(report.var_1 <= report.var_5);
            prop_assert!(report.cvar_5 <= report.var_5);
            prop_assert!(report.cvar_1 <= report.var_1);
            prop_assert!(report.max_drawdown <= 0.0);
            prop_assert!(report.deepest_drawdown <= report.max_drawdown);
            prop_assert!(report.std_dev >= 0.0);
            for v in [
                report.mean, report.std_dev, report.variance, report.skewness,
                report.kurtosis, report.sharpe_ratio, report.total_contribution,
            ] {
                prop_assert!(v.is_finite());
            }
        }
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(16))]

        #[test]
        fn prop_same_seed_reproduces_matrices(
            seed in any::<u64>(),
            simulations in 1u32..60,
            horizon in 1u32..20,
            return_bp in -1_000i32..2_000,
        ) {
            let asset = AssetSpec::new(None, 0, 25_000.0, return_bp as f64 / 10_000.0, horizon, 1_000.0);
            let mut params = sample_params();
            params.seed = seed;
            params.num_simulations = simulations;

            let first = run_ensemble(&asset, 0, &params).expect("valid ensemble");
            let second = run_ensemble(&asset, 0, &params).expect("valid ensemble");
            prop_assert_eq!(&first, &second);

            // Each row can be regenerated on its own from its derived seed.
            let sampler = ReturnSampler::for_asset(&asset, params.volatility_policy)
                .expect("valid sampler");
            let last = simulations - 1;
            let mut rng = simulation_rng(derive_seed(seed, 0, last));
            let path = simulate_path(&asset, params.tax_rate, &sampler, &mut rng);
            prop_assert_eq!(&path.values, &first.values[last as usize]);
        }
    }
}
