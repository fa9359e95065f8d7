use super::types::{PortfolioSummary, RiskReport};

/// Sums the mean real terminal value of every asset. Assets are treated as
/// independent and weighted by their absolute dollar exposure.
pub fn aggregate(reports: &[RiskReport]) -> PortfolioSummary {
    PortfolioSummary {
        expected_real_value: reports.iter().map(|r| r.mean).sum(),
        asset_count: reports.len(),
    }
}
