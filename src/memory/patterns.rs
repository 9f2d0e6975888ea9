// src/memory/patterns.rs
// Reusable patterns distilled from experience: problem, solution, applicability.

use super::MemoryEngine;
use crate::error::{PrometheusError, Result};
use rusqlite::params;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub name: String,
    pub category: String,
    pub problem: String,
    pub solution: String,
    pub example_code: Option<String>,
    pub applicability: String,
    pub success_count: i64,
    pub failure_count: i64,
}

#[derive(Debug, Clone)]
pub struct NewPattern {
    pub name: String,
    pub category: String,
    pub problem: String,
    pub solution: String,
    pub example_code: Option<String>,
    pub applicability: String,
}

fn validate_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(PrometheusError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

impl MemoryEngine {
    pub async fn store_pattern(&self, pattern: NewPattern) -> Result<String> {
        validate_non_empty("name", &pattern.name)?;
        validate_non_empty("problem", &pattern.problem)?;
        validate_non_empty("solution", &pattern.solution)?;
        validate_non_empty("applicability", &pattern.applicability)?;

        let id = uuid::Uuid::new_v4().to_string();
        let id_tx = id.clone();
        self.store
            .transaction(move |conn| {
                conn.execute(
                    "INSERT INTO patterns (id, name, category, problem, solution, example_code, applicability, success_count, failure_count)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0)",
                    params![
                        id_tx,
                        pattern.name,
                        pattern.category,
                        pattern.problem,
                        pattern.solution,
                        pattern.example_code,
                        pattern.applicability,
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(id)
    }

    /// Increments `success_count` or `failure_count` on an observed outcome.
    /// Fails with `NotFound` if no pattern has that id.
    pub async fn record_pattern_outcome(&self, id: &str, success: bool) -> Result<()> {
        let id_owned = id.to_string();
        let updated = self
            .store
            .transaction(move |conn| {
                let column = if success { "success_count" } else { "failure_count" };
                conn.execute(
                    &format!("UPDATE patterns SET {column} = {column} + 1 WHERE id = ?1"),
                    params![id_owned],
                )
            })
            .await?;

        if updated == 0 {
            return Err(PrometheusError::NotFound(format!("pattern {id}")));
        }
        Ok(())
    }

    pub async fn list_patterns(&self, category: Option<String>, limit: usize) -> Result<Vec<Pattern>> {
        self.store
            .pool()
            .run(move |conn| {
                let sql = match &category {
                    Some(_) => {
                        "SELECT id, name, category, problem, solution, example_code, applicability, success_count, failure_count
                         FROM patterns WHERE category = ?1 ORDER BY success_count DESC LIMIT ?2"
                    }
                    None => {
                        "SELECT id, name, category, problem, solution, example_code, applicability, success_count, failure_count
                         FROM patterns ORDER BY success_count DESC LIMIT ?2"
                    }
                };
                let mut stmt = conn.prepare(sql)?;
                let map_row = |row: &rusqlite::Row| -> rusqlite::Result<Pattern> {
                    Ok(Pattern {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        category: row.get(2)?,
                        problem: row.get(3)?,
                        solution: row.get(4)?,
                        example_code: row.get(5)?,
                        applicability: row.get(6)?,
                        success_count: row.get(7)?,
                        failure_count: row.get(8)?,
                    })
                };
                let rows = match &category {
                    Some(c) => stmt.query_map(params![c, limit as i64], map_row)?,
                    None => stmt.query_map(params!["", limit as i64], map_row)?,
                };
                rows.collect()
            })
            .await
    }
}
