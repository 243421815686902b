use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Price assumed when a market reports none or an unreadable one.
pub const DEFAULT_OUTCOME_PRICE: f64 = 0.5;

/// The prediction-market question a debate is about.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketDetail {
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub outcomes: Vec<MarketOutcome>,
    /// Human-readable volume ("1.2M"). Numeric volumes are formatted on decode.
    #[serde(default, deserialize_with = "volume_label")]
    pub volume: String,
    #[serde(default)]
    pub end_date: Option<String>,
}

impl MarketDetail {
    pub fn is_binary(&self) -> bool {
        self.outcomes.len() == 2
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketOutcome {
    pub name: String,
    #[serde(default = "default_price", deserialize_with = "lenient_price")]
    pub price: f64,
}

fn default_price() -> f64 {
    DEFAULT_OUTCOME_PRICE
}

/// Format a raw volume as `1.2M`, `3.4K` or a plain integer.
pub fn format_volume(volume: f64) -> String {
    if volume >= 1_000_000.0 {
        format!("{:.1}M", volume / 1_000_000.0)
    } else if volume >= 1_000.0 {
        format!("{:.1}K", volume / 1_000.0)
    } else {
        format!("{}", volume.max(0.0) as u64)
    }
}

/// Accepts `0.42`, `"0.42"`, `[0.42, 0.58]` or `"[0.42, 0.58]"` and takes
/// the first price. Anything else falls back to [`DEFAULT_OUTCOME_PRICE`].
fn lenient_price<'de, D: Deserializer<'de>>(de: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(de)?;
    Ok(price_from_value(&value).unwrap_or(DEFAULT_OUTCOME_PRICE))
}

fn price_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .or_else(|| serde_json::from_str::<Value>(s).ok().and_then(|v| price_from_value(&v))),
        Value::Array(items) => items.first().and_then(price_from_value),
        _ => None,
    }
}

fn volume_label<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::Number(n) => format_volume(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => s,
        _ => String::new(),
    })
}
