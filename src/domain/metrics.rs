//! Derived metrics computed from a raw status report.

use thiserror::Error;

use super::Report;

/// Derivation errors. Any of them means the report is discarded for this cycle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DerivationError {
    #[error("report field {0} is missing")]
    MissingField(&'static str),

    #[error("bid is zero")]
    ZeroBid,

    #[error("balance for {0} is missing")]
    MissingBalance(String),

    #[error("{0} is not a finite number")]
    NonFinite(String),
}

/// Attaches `spreadPercent` and the asset/currency `profit` to a report.
///
/// Either every derived field is attached or the report is rejected; the
/// input is never returned half-enriched.
pub fn derive(mut report: Report) -> Result<Report, DerivationError> {
    let spread = report.spread.ok_or(DerivationError::MissingField("spread"))?;
    let bid = report.bid.ok_or(DerivationError::MissingField("bid"))?;

    if bid == 0.0 {
        return Err(DerivationError::ZeroBid);
    }
    let spread_percent = finite("spreadPercent", spread / bid)?;

    let asset_profit = profit(&report, &report.asset)?;
    let currency_profit = profit(&report, &report.currency)?;

    // Nothing has been written yet; attach everything at once.
    report.spread_percent = Some(spread_percent);
    if let Some(balance) = report.balance.get_mut(&report.asset) {
        balance.profit = Some(asset_profit);
    }
    if let Some(balance) = report.balance.get_mut(&report.currency) {
        balance.profit = Some(currency_profit);
    }

    Ok(report)
}

fn profit(report: &Report, symbol: &str) -> Result<f64, DerivationError> {
    let balance = report
        .balance
        .get(symbol)
        .ok_or_else(|| DerivationError::MissingBalance(symbol.to_string()))?;

    finite(symbol, balance.consolidated - balance.total)
}

fn finite(name: &str, value: f64) -> Result<f64, DerivationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DerivationError::NonFinite(name.to_string()))
    }
}
