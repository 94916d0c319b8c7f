//! Status report payload published by a bot at `/report.json`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// AssetBalance is the balance entry for a single asset symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub consolidated: f64,
    pub total: f64,
    /// `consolidated - total`, attached by derivation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit: Option<f64>,
    /// Fields the bot reported that we do not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AssetBalance {
    #[cfg(test)]
    pub fn new(consolidated: f64, total: f64) -> Self {
        Self {
            consolidated,
            total,
            profit: None,
            extra: Map::new(),
        }
    }
}

/// Report is the status payload of a bot.
///
/// `spread` and `bid` may be absent on the wire; derivation rejects such
/// reports instead of the parser so the failure is classified correctly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(default)]
    pub spread: Option<f64>,
    #[serde(default)]
    pub bid: Option<f64>,
    /// Traded asset symbol (e.g. "BTC").
    pub asset: String,
    /// Quote currency symbol (e.g. "USD").
    pub currency: String,
    /// Balances keyed by symbol.
    #[serde(default)]
    pub balance: BTreeMap<String, AssetBalance>,
    /// `spread / bid`, attached by derivation.
    #[serde(
        rename = "spreadPercent",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub spread_percent: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Report {
    /// Returns the balance entry for the traded asset.
    pub fn asset_balance(&self) -> Option<&AssetBalance> {
        self.balance.get(&self.asset)
    }

    /// Returns the balance entry for the quote currency.
    pub fn currency_balance(&self) -> Option<&AssetBalance> {
        self.balance.get(&self.currency)
    }

    /// Returns true once derived metrics are attached.
    pub fn is_derived(&self) -> bool {
        self.spread_percent.is_some()
            && self.asset_balance().is_some_and(|b| b.profit.is_some())
            && self.currency_balance().is_some_and(|b| b.profit.is_some())
    }
}
