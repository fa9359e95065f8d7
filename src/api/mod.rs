use axum::{
    Router,
    extract::{
        Json, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum, error::ErrorKind};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    AssetSpec, EcdfPoint, GlobalParameters, HistogramBin, PortfolioRun, PortfolioSummary,
    RiskReport, VolatilityPolicy, YearBand, run_portfolio,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliVolatilityPolicy {
    Absolute,
    ClampZero,
    Reject,
}

impl From<CliVolatilityPolicy> for VolatilityPolicy {
    fn from(value: CliVolatilityPolicy) -> Self {
        match value {
            CliVolatilityPolicy::Absolute => VolatilityPolicy::Absolute,
            CliVolatilityPolicy::ClampZero => VolatilityPolicy::ClampZero,
            CliVolatilityPolicy::Reject => VolatilityPolicy::Reject,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiVolatilityPolicy {
    Absolute,
    ClampZero,
    Reject,
}

impl From<ApiVolatilityPolicy> for CliVolatilityPolicy {
    fn from(value: ApiVolatilityPolicy) -> Self {
        match value {
            ApiVolatilityPolicy::Absolute => CliVolatilityPolicy::Absolute,
            ApiVolatilityPolicy::ClampZero => CliVolatilityPolicy::ClampZero,
            ApiVolatilityPolicy::Reject => CliVolatilityPolicy::Reject,
        }
    }
}

/// Web form payload. Rates are in percent; absent fields fall back to the
/// CLI defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    simulations: Option<u32>,
    inflation_rate: Option<f64>,
    tax_rate: Option<f64>,
    seed: Option<u64>,
    volatility_policy: Option<ApiVolatilityPolicy>,
    assets: Option<Vec<AssetPayload>>,
    include_paths: Option<bool>,
}

/// Query-string form of [`SimulatePayload`]. Assets are a comma-separated
/// list of `--asset` style descriptors.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulateQuery {
    simulations: Option<u32>,
    inflation_rate: Option<f64>,
    tax_rate: Option<f64>,
    seed: Option<u64>,
    volatility_policy: Option<ApiVolatilityPolicy>,
    assets: Option<String>,
    include_paths: Option<bool>,
}

impl SimulateQuery {
    fn into_payload(self) -> Result<SimulatePayload, String> {
        let assets = match self.assets {
            Some(raw) => Some(
                raw.split(',')
                    .map(|descriptor| parse_asset_arg(descriptor).map(AssetPayload::from))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };

        Ok(SimulatePayload {
            simulations: self.simulations,
            inflation_rate: self.inflation_rate,
            tax_rate: self.tax_rate,
            seed: self.seed,
            volatility_policy: self.volatility_policy,
            assets,
            include_paths: self.include_paths,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AssetPayload {
    name: Option<String>,
    initial_capital: Option<f64>,
    expected_return: Option<f64>,
    horizon_years: Option<u32>,
    annual_contribution: Option<f64>,
}

impl From<AssetArg> for AssetPayload {
    fn from(arg: AssetArg) -> Self {
        Self {
            name: arg.name,
            initial_capital: Some(arg.initial_capital),
            expected_return: Some(arg.expected_return_pct),
            horizon_years: Some(arg.horizon_years),
            annual_contribution: Some(arg.annual_contribution),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct AssetArg {
    name: Option<String>,
    initial_capital: f64,
    expected_return_pct: f64,
    horizon_years: u32,
    annual_contribution: f64,
}

impl Default for AssetArg {
    fn default() -> Self {
        Self {
            name: None,
            initial_capital: 10_000.0,
            expected_return_pct: 8.0,
            horizon_years: 10,
            annual_contribution: 0.0,
        }
    }
}

fn parse_asset_arg(raw: &str) -> Result<AssetArg, String> {
    let parts = raw.split(':').collect::<Vec<_>>();
    let [name, capital, ret, years, contribution] = parts.as_slice() else {
        return Err(format!(
            "expected NAME:CAPITAL:RETURN_PCT:YEARS:CONTRIBUTION, got '{raw}'"
        ));
    };

    let number = |label: &str, v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid {label} '{v}': {e}"))
    };

    Ok(AssetArg {
        name: Some(name.trim().to_string()).filter(|n| !n.is_empty()),
        initial_capital: number("capital", *capital)?,
        expected_return_pct: number("return", *ret)?,
        horizon_years: years
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid years '{years}': {e}"))?,
        annual_contribution: number("contribution", *contribution)?,
    })
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "portfolio-sim",
    about = "Monte Carlo projection of inflation-adjusted asset outcomes with risk statistics"
)]
struct Cli {
    #[arg(long, default_value_t = 1000, help = "Simulations per asset")]
    simulations: u32,
    #[arg(
        long,
        default_value_t = 3.0,
        help = "Expected annual inflation in percent"
    )]
    inflation_rate: f64,
    #[arg(
        long,
        default_value_t = 10.0,
        help = "Tax rate on annual nominal gains in percent"
    )]
    tax_rate: f64,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(
        long,
        value_enum,
        default_value_t = CliVolatilityPolicy::Absolute,
        help = "Handling of the negative volatility derived from a negative expected return"
    )]
    volatility_policy: CliVolatilityPolicy,
    #[arg(
        long = "asset",
        value_parser = parse_asset_arg,
        help = "Asset as NAME:CAPITAL:RETURN_PCT:YEARS:CONTRIBUTION, repeatable; NAME may be empty"
    )]
    assets: Vec<AssetArg>,
    #[arg(long, help = "Include raw simulation matrices in the output")]
    include_paths: bool,
}

#[derive(Debug)]
struct ApiRequest {
    params: GlobalParameters,
    assets: Vec<AssetSpec>,
    include_paths: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssetBands {
    asset: String,
    years: Vec<YearBand>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssetDistribution {
    asset: String,
    histogram: Vec<HistogramBin>,
    ecdf: Vec<EcdfPoint>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssetPaths {
    asset: String,
    values: Vec<Vec<f64>>,
    contributions: Vec<Vec<f64>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    parameters: GlobalParameters,
    assets: Vec<AssetSpec>,
    reports: Vec<RiskReport>,
    portfolio: PortfolioSummary,
    bands: Vec<AssetBands>,
    distributions: Vec<AssetDistribution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    paths: Option<Vec<AssetPaths>>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_request(cli: Cli) -> Result<ApiRequest, String> {
    if cli.simulations == 0 {
        return Err("--simulations must be > 0".to_string());
    }

    if !(0.0..=100.0).contains(&cli.tax_rate) {
        return Err("--tax-rate must be between 0 and 100".to_string());
    }

    if !cli.inflation_rate.is_finite() || cli.inflation_rate <= -100.0 {
        return Err("--inflation-rate must be > -100".to_string());
    }

    let asset_args = if cli.assets.is_empty() {
        vec![AssetArg::default()]
    } else {
        cli.assets
    };

    let assets = asset_args
        .iter()
        .enumerate()
        .map(|(index, a)| {
            AssetSpec::new(
                a.name.as_deref(),
                index,
                a.initial_capital,
                a.expected_return_pct / 100.0,
                a.horizon_years,
                a.annual_contribution,
            )
        })
        .collect::<Vec<_>>();

    let num_assets =
        u32::try_from(assets.len()).map_err(|_| "too many assets".to_string())?;
    let params = GlobalParameters {
        num_assets,
        num_simulations: cli.simulations,
        inflation_rate: cli.inflation_rate / 100.0,
        tax_rate: cli.tax_rate / 100.0,
        seed: cli.seed,
        volatility_policy: cli.volatility_policy.into(),
    };
    params.validate(&assets).map_err(|e| e.to_string())?;

    Ok(ApiRequest {
        params,
        assets,
        include_paths: cli.include_paths,
    })
}

/// Runs one projection from command-line style arguments (the first item is
/// the program name) and returns the report as pretty JSON. `--help` returns
/// the usage text instead.
pub fn run_cli<I, T>(args: I) -> Result<String, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            return Ok(e.to_string());
        }
        Err(e) => return Err(e.to_string()),
    };
    let request = build_request(cli)?;
    let run = run_portfolio(&request.params, &request.assets).map_err(|e| e.to_string())?;
    let response = build_simulate_response(&request, run);
    serde_json::to_string_pretty(&response).map_err(|e| format!("failed to serialize report: {e}"))
}

fn router() -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "portfolio simulation API listening");

    axum::serve(listener, router()).await
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, serde_json::json!({ "status": "ok" }))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(query: Result<Query<SimulateQuery>, QueryRejection>) -> Response {
    let payload = match query {
        Ok(Query(query)) => query.into_payload(),
        Err(rejection) => Err(rejection.body_text()),
    };
    match payload {
        Ok(payload) => simulate_handler_impl(payload).await,
        Err(msg) => bad_request(msg),
    }
}

async fn simulate_post_handler(payload: Result<Json<SimulatePayload>, JsonRejection>) -> Response {
    match payload {
        Ok(Json(payload)) => simulate_handler_impl(payload).await,
        Err(rejection) => bad_request(rejection.body_text()),
    }
}

fn bad_request(msg: String) -> Response {
    warn!(error = %msg, "rejected simulate request");
    error_response(StatusCode::BAD_REQUEST, &msg)
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return bad_request(msg),
    };

    let outcome = tokio::task::spawn_blocking(move || {
        run_portfolio(&request.params, &request.assets)
            .map(|run| build_simulate_response(&request, run))
    })
    .await;

    match outcome {
        Ok(Ok(response)) => json_response(StatusCode::OK, response),
        Ok(Err(e)) => {
            warn!(error = %e, "simulation rejected");
            error_response(StatusCode::BAD_REQUEST, &e.to_string())
        }
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("simulation task failed: {e}"),
        ),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: SimulatePayload) -> Result<ApiRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.simulations {
        cli.simulations = v;
    }
    if let Some(v) = payload.inflation_rate {
        cli.inflation_rate = v;
    }
    if let Some(v) = payload.tax_rate {
        cli.tax_rate = v;
    }
    if let Some(v) = payload.seed {
        cli.seed = v;
    }
    if let Some(v) = payload.volatility_policy {
        cli.volatility_policy = v.into();
    }
    if let Some(v) = payload.include_paths {
        cli.include_paths = v;
    }

    if let Some(assets) = payload.assets {
        let defaults = AssetArg::default();
        cli.assets = assets
            .into_iter()
            .map(|a| AssetArg {
                name: a.name,
                initial_capital: a.initial_capital.unwrap_or(defaults.initial_capital),
                expected_return_pct: a.expected_return.unwrap_or(defaults.expected_return_pct),
                horizon_years: a.horizon_years.unwrap_or(defaults.horizon_years),
                annual_contribution: a
                    .annual_contribution
                    .unwrap_or(defaults.annual_contribution),
            })
            .collect();
    }

    build_request(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        simulations: 1_000,
        inflation_rate: 3.0,
        tax_rate: 10.0,
        seed: 42,
        volatility_policy: CliVolatilityPolicy::Absolute,
        assets: Vec::new(),
        include_paths: false,
    }
}

fn build_simulate_response(request: &ApiRequest, run: PortfolioRun) -> SimulateResponse {
    let mut reports = Vec::with_capacity(run.outcomes.len());
    let mut bands = Vec::with_capacity(run.outcomes.len());
    let mut distributions = Vec::with_capacity(run.outcomes.len());
    let mut paths = Vec::new();

    for outcome in run.outcomes {
        let asset = outcome.asset.name;
        bands.push(AssetBands {
            asset: asset.clone(),
            years: outcome.bands,
        });
        distributions.push(AssetDistribution {
            asset: asset.clone(),
            histogram: outcome.histogram,
            ecdf: outcome.ecdf,
        });
        if request.include_paths {
            paths.push(AssetPaths {
                asset,
                values: outcome.matrix.values,
                contributions: outcome.matrix.contributions,
            });
        }
        reports.push(outcome.report);
    }

    SimulateResponse {
        parameters: request.params.clone(),
        assets: request.assets.clone(),
        reports,
        portfolio: run.summary,
        bands,
        distributions,
        paths: request.include_paths.then_some(paths),
    }
}
