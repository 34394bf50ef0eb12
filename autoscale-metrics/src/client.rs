use crate::envelope::QueryResponse;
use autoscale_core::{AutoscaleError, Result};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// One resolved sample of an instant query.
#[derive(Debug, Clone)]
pub struct InstantSample {
    pub labels: HashMap<String, String>,
    pub value: f64,
}

/// One labeled series of an range query.
#[derive(Debug, Clone)]
pub struct RangeSeries {
    pub labels: HashMap<String, String>,
    pub points: Vec<(DateTime<Utc>, f64)>,
}

impl RangeSeries {
    /// A lazy, restartable, time-ordered iterator over this series' points
    /// (spec §4.1).
    pub fn iter_points(&self) -> RangeIterator<'_> {
        RangeIterator {
            points: &self.points,
            index: 0,
        }
    }
}

pub struct RangeIterator<'a> {
    points: &'a [(DateTime<Utc>, f64)],
    index: usize,
}

impl<'a> Iterator for RangeIterator<'a> {
    type Item = (DateTime<Utc>, f64);

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.points.get(self.index).copied();
        if item.is_some() {
            self.index += 1;
        }
        item
    }
}

impl<'a> RangeIterator<'a> {
    pub fn restart(&mut self) {
        self.index = 0;
    }
}

/// Talks to the metrics backend's HTTP query surface (spec §4.1, §6).
pub struct MetricsGateway {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl MetricsGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }

    /// `GET /-/healthy` (spec §4.1).
    pub async fn is_healthy(&self) -> bool {
        let url = format!("{}/-/healthy", self.base_url);
        match self.client.get(&url).timeout(self.timeout).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "metrics backend health probe failed");
                false
            }
        }
    }

    /// `query_instant(query) -> list of (labels, value)` at "now".
    pub async fn query_instant(&self, query: &str) -> Result<Vec<InstantSample>> {
        let url = format!("{}/api/v1/query", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("query", query)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AutoscaleError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AutoscaleError::Transport(format!(
                "metrics backend returned HTTP {}",
                resp.status()
            )));
        }

        let body: QueryResponse = resp
            .json()
            .await
            .map_err(|e| AutoscaleError::Decode(e.to_string()))?;

        if body.status != "success" {
            return Err(AutoscaleError::Decode(
                body.error.unwrap_or_else(|| "query failed".to_string()),
            ));
        }

        let data = match body.data {
            Some(d) => d,
            None => return Ok(Vec::new()),
        };

        Ok(data
            .result
            .into_iter()
            .filter_map(|entry| {
                let value = entry.parsed_value()?;
                Some(InstantSample {
                    labels: entry.metric,
                    value,
                })
            })
            .collect())
    }

    /// `query_range(query, start, end, step) -> list of (labels, series)`.
    pub async fn query_range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<RangeSeries>> {
        let url = format!("{}/api/v1/query_range", self.base_url);
        let step_str = format!("{}s", step.as_secs().max(1));
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("query", query.to_string()),
                ("start", start.timestamp().to_string()),
                ("end", end.timestamp().to_string()),
                ("step", step_str),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AutoscaleError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AutoscaleError::Transport(format!(
                "metrics backend returned HTTP {}",
                resp.status()
            )));
        }

        let body: QueryResponse = resp
            .json()
            .await
            .map_err(|e| AutoscaleError::Decode(e.to_string()))?;

        if body.status != "success" {
            return Err(AutoscaleError::Decode(
                body.error.unwrap_or_else(|| "query_range failed".to_string()),
            ));
        }

        let data = match body.data {
            Some(d) => d,
            None => return Ok(Vec::new()),
        };

        Ok(data
            .result
            .into_iter()
            .map(|entry| {
                let points = entry
                    .parsed_values()
                    .into_iter()
                    .filter_map(|(ts, v)| Utc.timestamp_opt(ts as i64, 0).single().map(|t| (t, v)))
                    .collect();
                RangeSeries {
                    labels: entry.metric,
                    points,
                }
            })
            .collect())
    }

    /// First result's value as a float; 0 if the result set is empty (spec §8).
    pub async fn get_scalar_value(&self, query: &str) -> Result<f64> {
        let samples = self.query_instant(query).await?;
        Ok(samples.first().map(|s| s.value).unwrap_or(0.0))
    }

    /// Integer coercion of [`Self::get_scalar_value`], truncating (spec §4.1).
    pub async fn get_scalar_int(&self, query: &str) -> Result<i64> {
        let value = self.get_scalar_value(query).await?;
        debug!(query = %query, value, "resolved scalar metric");
        Ok(value.trunc() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_iterator_is_restartable() {
        let series = RangeSeries {
            labels: HashMap::new(),
            points: vec![
                (Utc.timestamp_opt(1, 0).unwrap(), 1.0),
                (Utc.timestamp_opt(2, 0).unwrap(), 2.0),
            ],
        };

        let mut it = series.iter_points();
        assert_eq!(it.next().map(|(_, v)| v), Some(1.0));
        assert_eq!(it.next().map(|(_, v)| v), Some(2.0));
        assert_eq!(it.next(), None);

        it.restart();
        assert_eq!(it.next().map(|(_, v)| v), Some(1.0));
    }
}
