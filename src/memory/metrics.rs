// src/memory/metrics.rs
// Time-series metric storage and percentile aggregation.

use super::MemoryEngine;
use crate::error::Result;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct NewMetric {
    pub metric_type: String,
    pub metric_name: String,
    pub value: f64,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRow {
    pub id: String,
    pub timestamp: i64,
    pub metric_type: String,
    pub metric_name: String,
    pub value: f64,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MetricFilter {
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub metric_type: Option<String>,
    pub metric_name: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricAggregations {
    pub avg: f64,
    pub sum: f64,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Linear-interpolation percentile over a sorted slice. `p` in [0, 1].
/// Single value returns that value; identical values return that value.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let frac = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

impl MemoryEngine {
    pub async fn store_metrics(&self, metrics: Vec<NewMetric>) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(metrics.len());
        let mut rows = Vec::with_capacity(metrics.len());
        let ts = now_ms();
        for m in metrics {
            let id = uuid::Uuid::new_v4().to_string();
            ids.push(id.clone());
            rows.push((id, ts, m.metric_type, m.metric_name, m.value, m.context));
        }

        self.store
            .transaction(move |conn| {
                for (id, ts, metric_type, metric_name, value, context) in &rows {
                    conn.execute(
                        "INSERT INTO metrics (id, timestamp, metric_type, metric_name, value, context)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![id, ts, metric_type, metric_name, value, context],
                    )?;
                }
                Ok(())
            })
            .await?;

        Ok(ids)
    }

    /// Returns matched rows ordered by timestamp ascending, plus aggregations
    /// when the matched set is non-empty.
    pub async fn query_metrics(
        &self,
        filter: MetricFilter,
    ) -> Result<(Vec<MetricRow>, Option<MetricAggregations>)> {
        let limit = filter.limit.unwrap_or(1000) as i64;
        let rows: Vec<(String, i64, String, String, f64, Option<String>)> = self
            .store
            .pool()
            .run(move |conn| {
                let mut sql = String::from(
                    "SELECT id, timestamp, metric_type, metric_name, value, context FROM metrics WHERE 1 = 1",
                );
                if filter.start_time.is_some() {
                    sql.push_str(" AND timestamp >= ?1");
                }
                if filter.end_time.is_some() {
                    sql.push_str(" AND timestamp <= ?2");
                }
                if filter.metric_type.is_some() {
                    sql.push_str(" AND metric_type = ?3");
                }
                if filter.metric_name.is_some() {
                    sql.push_str(" AND metric_name = ?4");
                }
                sql.push_str(" ORDER BY timestamp ASC LIMIT ?5");

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(
                    params![
                        filter.start_time.unwrap_or(i64::MIN),
                        filter.end_time.unwrap_or(i64::MAX),
                        filter.metric_type.clone().unwrap_or_default(),
                        filter.metric_name.clone().unwrap_or_default(),
                        limit,
                    ],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, f64>(4)?,
                            row.get::<_, Option<String>>(5)?,
                        ))
                    },
                )?;
                rows.collect()
            })
            .await?;

        let items: Vec<MetricRow> = rows
            .into_iter()
            .map(|(id, timestamp, metric_type, metric_name, value, context)| MetricRow {
                id,
                timestamp,
                metric_type,
                metric_name,
                value,
                context,
            })
            .collect();

        if items.is_empty() {
            return Ok((items, None));
        }

        let mut values: Vec<f64> = items.iter().map(|m| m.value).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let sum: f64 = values.iter().sum();
        let count = values.len();
        let aggregations = MetricAggregations {
            avg: sum / count as f64,
            sum,
            count,
            min: values[0],
            max: values[count - 1],
            p50: percentile(&values, 0.50),
            p95: percentile(&values, 0.95),
            p99: percentile(&values, 0.99),
        };

        Ok((items, Some(aggregations)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_single_value() {
        assert_eq!(percentile(&[42.0], 0.95), 42.0);
    }

    #[test]
    fn percentile_identical_values() {
        let v = vec![5.0, 5.0, 5.0, 5.0];
        assert_eq!(percentile(&v, 0.5), 5.0);
        assert_eq!(percentile(&v, 0.99), 5.0);
    }

    #[test]
    fn percentile_interpolates() {
        let v = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&v, 1.0), 4.0);
        assert!((percentile(&v, 0.5) - 2.5).abs() < 1e-9);
    }
}
