// src/memory/decisions.rs
// Decision log: what was decided, why, and (later) how it turned out.

use super::code_index::sanitize_fts_query;
use super::MemoryEngine;
use crate::error::{PrometheusError, Result};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alternative {
    pub option: String,
    #[serde(default)]
    pub pros: Vec<String>,
    #[serde(default)]
    pub cons: Vec<String>,
    pub effort: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub timestamp: i64,
    pub context: String,
    pub reasoning: String,
    pub alternatives: Vec<Alternative>,
    pub chosen_option: String,
    pub outcome: Option<String>,
    pub lessons_learned: Option<String>,
    pub affected_components: Option<Vec<String>>,
}

/// Caller-supplied fields for `store_decision`; `id`/`timestamp` are assigned.
#[derive(Debug, Clone)]
pub struct NewDecision {
    pub context: String,
    pub reasoning: String,
    pub alternatives: Vec<Alternative>,
    pub chosen_option: String,
    pub affected_components: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct DecisionFilter {
    pub query: Option<String>,
    pub outcome: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub limit: Option<usize>,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn validate_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(PrometheusError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

impl MemoryEngine {
    pub async fn store_decision(&self, decision: NewDecision) -> Result<String> {
        validate_non_empty("context", &decision.context)?;
        validate_non_empty("reasoning", &decision.reasoning)?;
        validate_non_empty("chosen_option", &decision.chosen_option)?;

        let id = uuid::Uuid::new_v4().to_string();
        let ts = now_ms();
        let alternatives_json = serde_json::to_string(&decision.alternatives)?;
        let affected_json = match &decision.affected_components {
            Some(v) => Some(serde_json::to_string(v)?),
            None => None,
        };

        let id_tx = id.clone();
        self.store
            .transaction(move |conn| {
                conn.execute(
                    "INSERT INTO decisions (id, timestamp, context, reasoning, alternatives, chosen_option, outcome, lessons_learned, affected_components)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL, ?7)",
                    params![
                        id_tx,
                        ts,
                        decision.context,
                        decision.reasoning,
                        alternatives_json,
                        decision.chosen_option,
                        affected_json,
                    ],
                )?;
                conn.execute(
                    "INSERT INTO decisions_fts (id, context, reasoning, alternatives, chosen_option)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        id_tx,
                        decision.context,
                        decision.reasoning,
                        alternatives_json,
                        decision.chosen_option,
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(id)
    }

    /// Sets `outcome`/`lessons_learned` on an existing decision. Repeated
    /// calls overwrite the previous values (last write wins).
    pub async fn update_decision_outcome(
        &self,
        id: &str,
        outcome: &str,
        lessons_learned: Option<&str>,
    ) -> Result<()> {
        let id_owned = id.to_string();
        let outcome_owned = outcome.to_string();
        let lessons_owned = lessons_learned.map(|s| s.to_string());

        let updated = self
            .store
            .transaction(move |conn| {
                let changed = conn.execute(
                    "UPDATE decisions SET outcome = ?2, lessons_learned = ?3 WHERE id = ?1",
                    params![id_owned, outcome_owned, lessons_owned],
                )?;
                Ok(changed)
            })
            .await?;

        if updated == 0 {
            return Err(PrometheusError::NotFound(format!("decision {id}")));
        }
        Ok(())
    }

    /// FTS-backed search over context/reasoning/alternatives/chosen_option,
    /// filtered by outcome (`success`/`failure`/`null`, derived from the
    /// outcome JSON's `success` field) and time range, ordered by timestamp
    /// descending.
    pub async fn search_decisions(&self, filter: DecisionFilter) -> Result<Vec<Decision>> {
        let limit = filter.limit.unwrap_or(50) as i64;
        let fts_query = sanitize_fts_query(&filter.query.clone().unwrap_or_default());
        let rows: Vec<(String, i64, String, String, String, String, Option<String>, Option<String>, Option<String>)> = self
            .store
            .pool()
            .run(move |conn| {
                let mut sql = String::from(
                    "SELECT d.id, d.timestamp, d.context, d.reasoning, d.alternatives, d.chosen_option, d.outcome, d.lessons_learned, d.affected_components
                     FROM decisions_fts f
                     JOIN decisions d ON d.id = f.id
                     WHERE decisions_fts MATCH ?1",
                );
                if filter.outcome.is_some() {
                    sql.push_str(
                        " AND (CASE
                                WHEN d.outcome IS NULL THEN 'null'
                                WHEN json_extract(d.outcome, '$.success') = 1 THEN 'success'
                                WHEN json_extract(d.outcome, '$.success') = 0 THEN 'failure'
                                ELSE 'null'
                              END) = ?2",
                    );
                }
                if filter.start_time.is_some() {
                    sql.push_str(" AND d.timestamp >= ?3");
                }
                if filter.end_time.is_some() {
                    sql.push_str(" AND d.timestamp <= ?4");
                }
                sql.push_str(" ORDER BY d.timestamp DESC LIMIT ?5");

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(
                    params![
                        fts_query,
                        filter.outcome.clone().unwrap_or_default(),
                        filter.start_time.unwrap_or(i64::MIN),
                        filter.end_time.unwrap_or(i64::MAX),
                        limit,
                    ],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, String>(5)?,
                            row.get::<_, Option<String>>(6)?,
                            row.get::<_, Option<String>>(7)?,
                            row.get::<_, Option<String>>(8)?,
                        ))
                    },
                )?;
                rows.collect()
            })
            .await?;

        rows.into_iter()
            .map(
                |(id, timestamp, context, reasoning, alternatives_json, chosen_option, outcome, lessons_learned, affected_json)| {
                    let alternatives: Vec<Alternative> = serde_json::from_str(&alternatives_json)?;
                    let affected_components = match affected_json {
                        Some(s) => Some(serde_json::from_str(&s)?),
                        None => None,
                    };
                    Ok(Decision {
                        id,
                        timestamp,
                        context,
                        reasoning,
                        alternatives,
                        chosen_option,
                        outcome,
                        lessons_learned,
                        affected_components,
                    })
                },
            )
            .collect()
    }
}
