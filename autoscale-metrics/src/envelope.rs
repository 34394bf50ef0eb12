use serde::Deserialize;
use std::collections::HashMap;

/// The standard `{"status":"success","data":{...}}` envelope (spec §6).
#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    pub status: String,
    #[serde(default)]
    pub data: Option<QueryData>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueryData {
    #[serde(rename = "resultType")]
    pub result_type: String,
    #[serde(default)]
    pub result: Vec<ResultEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ResultEntry {
    #[serde(default)]
    pub metric: HashMap<String, String>,
    /// Present for an instant query: `[timestamp, "value"]`.
    #[serde(default)]
    pub value: Option<(f64, String)>,
    /// Present for a range query: a time-ordered list of `[timestamp, "value"]`.
    #[serde(default)]
    pub values: Vec<(f64, String)>,
}

impl ResultEntry {
    pub fn parsed_value(&self) -> Option<f64> {
        self.value.as_ref().and_then(|(_, s)| parse_sample(s))
    }

    pub fn parsed_values(&self) -> Vec<(f64, f64)> {
        self.values
            .iter()
            .filter_map(|(ts, s)| parse_sample(s).map(|v| (*ts, v)))
            .collect()
    }
}

/// Samples are wire-encoded as strings (and may be `NaN`/`+Inf`); a `NaN`
/// sample is treated identically to a missing one (spec §4.5 edge cases).
fn parse_sample(s: &str) -> Option<f64> {
    match s.parse::<f64>() {
        Ok(v) if v.is_nan() => None,
        Ok(v) => Some(v),
        Err(_) => None,
    }
}
