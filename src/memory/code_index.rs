// src/memory/code_index.rs
// Codebase indexing and hybrid (keyword + vector) code search.

use super::MemoryEngine;
use crate::embeddings::{cosine_similarity, decode_embedding, encode_embedding};
use crate::error::{PrometheusError, Result};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use walkdir::WalkDir;

/// Directories never descended into while indexing a codebase.
const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "dist",
    "build",
    "vendor",
    "__pycache__",
    ".venv",
    "venv",
];

/// Source extensions eligible for chunking.
const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "py", "ts", "tsx", "js", "jsx", "go", "java", "rb", "c", "cpp", "h", "hpp",
];

/// Target size of a chunk, in source lines.
const CHUNK_LINES: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    Keyword,
    Vector,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub score: f64,
    pub content: String,
    pub file_path: String,
    pub start_line: i64,
    pub end_line: i64,
    pub symbols: Option<String>,
    pub imports: Option<String>,
    pub keyword_score: Option<f64>,
    pub vector_score: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub min_score: f64,
    pub keyword_weight: f64,
    pub vector_weight: f64,
    pub sources: Option<Vec<SearchSource>>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            min_score: 0.0,
            keyword_weight: 0.3,
            vector_weight: 0.7,
            sources: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexCounters {
    pub files_scanned: usize,
    pub chunks_written: usize,
}

fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    format!("{digest:x}")
}

fn should_skip_dir(name: &str) -> bool {
    name.starts_with('.') || SKIP_DIRS.contains(&name)
}

fn chunk_lines(lines: &[&str]) -> Vec<(usize, usize, String)> {
    let mut chunks = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let end = (i + CHUNK_LINES).min(lines.len());
        let text = lines[i..end].join("\n");
        if !text.trim().is_empty() {
            chunks.push((i + 1, end, text));
        }
        i = end;
    }
    chunks
}

/// Sanitizes a raw FTS query per the keyword-pass contract: trim; empty
/// means match-all; otherwise quote each whitespace-separated token and
/// join as a disjunction, doubling embedded quotes.
pub(super) fn sanitize_fts_query(query: &str) -> String {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return "*".to_string();
    }
    let tokens: Vec<String> = trimmed
        .split_whitespace()
        .map(|tok| format!("\"{}\"", tok.replace('"', "\"\"")))
        .collect();
    if tokens.len() == 1 {
        tokens.into_iter().next().unwrap()
    } else {
        tokens.join(" OR ")
    }
}

impl MemoryEngine {
    /// Walks `root_path`, chunking every recognized source file and
    /// replacing its rows in `code_chunks`/`code_chunks_fts`/`code_chunks_vec`.
    /// Unchanged chunks (same `content_hash`) are left untouched by deleting
    /// and reinserting per file within one transaction.
    pub async fn index_codebase(&self, root_path: &Path) -> Result<IndexCounters> {
        let mut counters = IndexCounters::default();
        let mut entries = Vec::new();

        for entry in WalkDir::new(root_path)
            .into_iter()
            .filter_entry(|e| {
                if e.file_type().is_dir() && e.depth() > 0 {
                    let name = e.file_name().to_string_lossy();
                    return !should_skip_dir(&name);
                }
                true
            })
        {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let ext = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("");
            if !SOURCE_EXTENSIONS.contains(&ext) {
                continue;
            }
            entries.push(entry.path().to_path_buf());
        }

        for path in &entries {
            let content = match tokio::fs::read_to_string(path).await {
                Ok(c) => c,
                Err(_) => continue, // not valid UTF-8 or unreadable; skip
            };
            let lines: Vec<&str> = content.lines().collect();
            let file_chunks = chunk_lines(&lines);
            if file_chunks.is_empty() {
                continue;
            }

            let file_path_str = path.display().to_string();
            let mut rows = Vec::with_capacity(file_chunks.len());
            for (start_line, end_line, text) in file_chunks {
                let embedding = self.embeddings.embed(&text).await?;
                rows.push((
                    uuid::Uuid::new_v4().to_string(),
                    start_line as i64,
                    end_line as i64,
                    text.clone(),
                    content_hash(&text),
                    embedding,
                ));
            }
            counters.chunks_written += rows.len();

            let dim = self.store.embedding_dim();
            let file_path_tx = file_path_str.clone();
            self.store
                .transaction(move |conn| {
                    conn.execute(
                        "DELETE FROM code_chunks WHERE file_path = ?1",
                        params![file_path_tx],
                    )?;
                    for (id, start_line, end_line, text, hash, embedding) in &rows {
                        if embedding.len() != dim {
                            return Err(rusqlite::Error::InvalidParameterName(format!(
                                "embedding dim {} does not match pinned dim {}",
                                embedding.len(),
                                dim
                            )));
                        }
                        conn.execute(
                            "INSERT INTO code_chunks (id, file_path, start_line, end_line, text, symbols, imports, content_hash)
                             VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, ?6)",
                            params![id, file_path_tx, start_line, end_line, text, hash],
                        )?;
                        conn.execute(
                            "INSERT INTO code_chunks_fts (id, content, symbols) VALUES (?1, ?2, NULL)",
                            params![id, text],
                        )?;
                        conn.execute(
                            "INSERT INTO code_chunks_vec (id, embedding, dim) VALUES (?1, ?2, ?3)",
                            params![id, encode_embedding(embedding), dim as i64],
                        )?;
                    }
                    Ok(())
                })
                .await?;

            counters.files_scanned += 1;
        }

        Ok(counters)
    }

    /// Hybrid keyword + vector search over indexed code chunks.
    pub async fn search_code(&self, query: &str, opts: SearchOptions) -> Result<Vec<SearchResult>> {
        if opts.keyword_weight < 0.0 || opts.vector_weight < 0.0 {
            return Err(PrometheusError::Validation(
                "keyword_weight and vector_weight must be non-negative".into(),
            ));
        }
        if opts.keyword_weight == 0.0 && opts.vector_weight == 0.0 {
            return Err(PrometheusError::Validation(
                "at least one of keyword_weight/vector_weight must be positive".into(),
            ));
        }

        let want_keyword = opts
            .sources
            .as_ref()
            .map(|s| s.contains(&SearchSource::Keyword))
            .unwrap_or(true);
        let want_vector = opts
            .sources
            .as_ref()
            .map(|s| s.contains(&SearchSource::Vector))
            .unwrap_or(true);

        let fetch_n = opts.limit.saturating_mul(2).max(1);

        let mut keyword_scores: HashMap<String, f64> = HashMap::new();
        if want_keyword {
            let fts_query = sanitize_fts_query(query);
            let rows: Vec<(String, f64)> = self
                .store
                .pool()
                .run(move |conn| {
                    let mut stmt = conn.prepare(
                        "SELECT c.id, bm25(code_chunks_fts) as rank
                         FROM code_chunks_fts f
                         JOIN code_chunks c ON c.id = f.id
                         WHERE code_chunks_fts MATCH ?1
                         ORDER BY rank
                         LIMIT ?2",
                    )?;
                    let rows = stmt.query_map(params![fts_query, fetch_n as i64], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
                    })?;
                    rows.collect()
                })
                .await
                .unwrap_or_default();

            for (id, rank) in rows {
                let score = (1.0 - (-rank.abs() / 5.0).exp()).clamp(0.0, 1.0);
                keyword_scores.insert(id, score);
            }
        }

        let mut vector_scores: HashMap<String, f64> = HashMap::new();
        if want_vector {
            let query_vec = self.embeddings.embed(query).await?;
            let candidates: Vec<(String, Vec<u8>)> = self
                .store
                .pool()
                .run(|conn| {
                    let mut stmt = conn.prepare("SELECT id, embedding FROM code_chunks_vec")?;
                    let rows = stmt.query_map([], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
                    })?;
                    rows.collect()
                })
                .await
                .unwrap_or_default();

            let mut scored: Vec<(String, f64)> = candidates
                .into_iter()
                .map(|(id, bytes)| {
                    let vec = decode_embedding(&bytes);
                    let cos = cosine_similarity(&query_vec, &vec) as f64;
                    (id, cos.clamp(0.0, 1.0))
                })
                .collect();
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
            scored.truncate(fetch_n);
            vector_scores.extend(scored);
        }

        let mut ids: HashSet<String> = HashSet::new();
        ids.extend(keyword_scores.keys().cloned());
        ids.extend(vector_scores.keys().cloned());
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut id_list: Vec<String> = ids.into_iter().collect();
        id_list.sort();
        let rows: Vec<(String, String, i64, i64, String, Option<String>, Option<String>)> = self
            .store
            .pool()
            .run(move |conn| {
                let mut out = Vec::with_capacity(id_list.len());
                for id in &id_list {
                    if let Ok(row) = conn.query_row(
                        "SELECT id, file_path, start_line, end_line, text, symbols, imports
                         FROM code_chunks WHERE id = ?1",
                        params![id],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, i64>(2)?,
                                row.get::<_, i64>(3)?,
                                row.get::<_, String>(4)?,
                                row.get::<_, Option<String>>(5)?,
                                row.get::<_, Option<String>>(6)?,
                            ))
                        },
                    ) {
                        out.push(row);
                    }
                }
                Ok(out)
            })
            .await?;

        let mut results: Vec<SearchResult> = rows
            .into_iter()
            .map(|(id, file_path, start_line, end_line, text, symbols, imports)| {
                let k = keyword_scores.get(&id).copied();
                let v = vector_scores.get(&id).copied();
                let score = k.unwrap_or(0.0) * opts.keyword_weight + v.unwrap_or(0.0) * opts.vector_weight;
                SearchResult {
                    id,
                    score,
                    content: text,
                    file_path,
                    start_line,
                    end_line,
                    symbols,
                    imports,
                    keyword_score: k,
                    vector_score: v,
                }
            })
            .filter(|r| r.score >= opts.min_score)
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(opts.limit);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_empty_query_is_match_all() {
        assert_eq!(sanitize_fts_query("   "), "*");
    }

    #[test]
    fn sanitize_single_token_is_quoted() {
        assert_eq!(sanitize_fts_query("hello"), "\"hello\"");
    }

    #[test]
    fn sanitize_multi_token_joins_as_disjunction() {
        assert_eq!(sanitize_fts_query("hello world"), "\"hello\" OR \"world\"");
    }

    #[test]
    fn sanitize_escapes_embedded_quotes() {
        assert_eq!(sanitize_fts_query("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn chunking_splits_by_line_budget() {
        let lines: Vec<&str> = (0..150).map(|_| "x").collect();
        let chunks = chunk_lines(&lines);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].0, 1);
        assert_eq!(chunks[0].1, 60);
        assert_eq!(chunks[2].0, 121);
        assert_eq!(chunks[2].1, 150);
    }
}
