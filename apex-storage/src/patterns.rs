//! Pattern CRUD and query operations.

use libsql::{Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use apex_core::error::{Error, Result};
use apex_core::types::pattern::{Pattern, PatternType};
use apex_core::validation::sanitize_tags;

use crate::{ApexStorage, storage_err, timestamp_from_epoch};

/// Column list shared by every pattern SELECT.
pub(crate) const PATTERN_COLUMNS: &str = "p.id, p.alias, p.pattern_type, p.title, p.summary, \
     p.json_canonical, p.tags, p.trust_score, p.alpha, p.beta, p.usage_count, \
     p.success_count, p.invalid, p.key_insight, p.when_to_use, p.created_at, p.updated_at";

/// Filter for pattern listing; clauses are AND-combined.
#[derive(Debug, Clone, Default)]
pub struct PatternFilter {
    /// Restrict to these types
    pub types: Vec<PatternType>,
    /// Minimum trust score
    pub min_trust: Option<f64>,
    /// Require all of these tags (matched case-insensitively)
    pub tags: Vec<String>,
    /// Filter on the quarantine flag; `Some(true)` means valid only
    pub valid: Option<bool>,
}

/// Sort key for pattern listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternOrder {
    TrustScore,
    CreatedAt,
    UpdatedAt,
    UsageCount,
    Title,
}

impl PatternOrder {
    /// The column this order maps onto. Values come from this closed enum,
    /// never from user input.
    fn column(self) -> &'static str {
        match self {
            PatternOrder::TrustScore => "trust_score",
            PatternOrder::CreatedAt => "created_at",
            PatternOrder::UpdatedAt => "updated_at",
            PatternOrder::UsageCount => "usage_count",
            PatternOrder::Title => "title",
        }
    }

    /// Parse a wire representation, defaulting to trust score.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "created_at" | "created" => PatternOrder::CreatedAt,
            "updated_at" | "updated" => PatternOrder::UpdatedAt,
            "usage_count" | "usage" => PatternOrder::UsageCount,
            "title" => PatternOrder::Title,
            _ => PatternOrder::TrustScore,
        }
    }
}

/// A search result: pattern plus its raw FTS rank when text-matched.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// The matched pattern
    pub pattern: Pattern,
    /// bm25 rank (more negative is more relevant); `None` when the hit
    /// came from facet fallback
    pub fts_rank: Option<f64>,
}

/// Aggregate statistics over a filtered pattern set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateStats {
    /// Total matching patterns
    pub total: u64,
    /// Count per pattern type
    pub by_type: std::collections::HashMap<String, u64>,
    /// Mean trust score
    pub avg_trust: f64,
    /// Quarantined patterns among the total
    pub invalid_count: u64,
}

/// Convert a database row (in [`PATTERN_COLUMNS`] order) to a Pattern.
pub(crate) fn row_to_pattern(row: &Row) -> Result<Pattern> {
    let id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
    let alias: Option<String> = row.get(1).ok();
    let pattern_type: String = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;
    let title: String = row.get(3).map_err(|e| Error::Storage(e.to_string()))?;
    let summary: String = row.get(4).map_err(|e| Error::Storage(e.to_string()))?;
    let json_canonical: String = row.get(5).map_err(|e| Error::Storage(e.to_string()))?;
    let tags_json: String = row.get(6).map_err(|e| Error::Storage(e.to_string()))?;
    let trust_score: f64 = row.get(7).map_err(|e| Error::Storage(e.to_string()))?;
    let alpha: f64 = row.get(8).map_err(|e| Error::Storage(e.to_string()))?;
    let beta: f64 = row.get(9).map_err(|e| Error::Storage(e.to_string()))?;
    let usage_count: i64 = row.get(10).map_err(|e| Error::Storage(e.to_string()))?;
    let success_count: i64 = row.get(11).map_err(|e| Error::Storage(e.to_string()))?;
    let invalid: i64 = row.get(12).map_err(|e| Error::Storage(e.to_string()))?;
    let key_insight: Option<String> = row.get(13).ok();
    let when_to_use: Option<String> = row.get(14).ok();
    let created_at: i64 = row.get(15).map_err(|e| Error::Storage(e.to_string()))?;
    let updated_at: i64 = row.get(16).map_err(|e| Error::Storage(e.to_string()))?;

    Ok(Pattern {
        id,
        alias,
        pattern_type: PatternType::parse(&pattern_type)
            .map_err(|_| Error::Internal(format!("corrupted pattern type: {pattern_type}")))?,
        title,
        summary,
        json_canonical: serde_json::from_str(&json_canonical)
            .map_err(|e| Error::Internal(format!("corrupted json_canonical: {e}")))?,
        tags: serde_json::from_str(&tags_json)
            .map_err(|e| Error::Internal(format!("corrupted tags: {e}")))?,
        trust_score,
        alpha,
        beta,
        usage_count: usage_count.max(0) as u64,
        success_count: success_count.max(0) as u64,
        invalid: invalid != 0,
        key_insight,
        when_to_use,
        created_at: timestamp_from_epoch(created_at),
        updated_at: timestamp_from_epoch(updated_at),
    })
}

/// Build a sanitized FTS5 MATCH expression from free text.
///
/// Tokens are quoted and OR-combined; `None` means the text holds nothing
/// searchable and the caller should fall back to facet-only listing.
#[must_use]
pub(crate) fn fts_query_from_text(text: &str) -> Option<String> {
    let tokens: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

/// Build WHERE fragments and params for a [`PatternFilter`].
fn filter_clauses(filter: &PatternFilter) -> (Vec<String>, Vec<libsql::Value>) {
    let mut clauses = Vec::new();
    let mut params: Vec<libsql::Value> = Vec::new();

    if !filter.types.is_empty() {
        let placeholders = vec!["?"; filter.types.len()].join(", ");
        clauses.push(format!("p.pattern_type IN ({placeholders})"));
        for ty in &filter.types {
            params.push(ty.as_str().into());
        }
    }
    if let Some(min_trust) = filter.min_trust {
        clauses.push("p.trust_score >= ?".to_string());
        params.push(min_trust.into());
    }
    for tag in sanitize_tags(&filter.tags) {
        clauses.push(
            "EXISTS (SELECT 1 FROM pattern_tags t WHERE t.pattern_id = p.id AND t.tag = ?)"
                .to_string(),
        );
        params.push(tag.into());
    }
    if let Some(valid) = filter.valid {
        clauses.push(if valid {
            "p.invalid = 0".to_string()
        } else {
            "p.invalid = 1".to_string()
        });
    }
    (clauses, params)
}

fn where_sql(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

impl ApexStorage {
    /// Resolve an id or alias to a pattern id.
    ///
    /// An alias colliding with an existing id resolves to the id.
    pub async fn resolve_pattern_id(&self, id_or_alias: &str) -> Result<Option<String>> {
        let conn = self.connect()?;
        resolve_pattern_id_on(&conn, id_or_alias).await
    }

    /// Fetch one pattern by id or alias.
    pub async fn get_pattern(&self, id_or_alias: &str) -> Result<Option<Pattern>> {
        let conn = self.connect()?;
        let Some(id) = resolve_pattern_id_on(&conn, id_or_alias).await? else {
            return Ok(None);
        };
        let sql = format!("SELECT {PATTERN_COLUMNS} FROM patterns p WHERE p.id = ?");
        let mut rows = conn
            .query(&sql, libsql::params![id])
            .await
            .map_err(|e| storage_err("get_pattern", e))?;
        match rows.next().await.map_err(|e| storage_err("get_pattern", e))? {
            Some(row) => Ok(Some(row_to_pattern(&row)?)),
            None => Ok(None),
        }
    }

    /// List patterns by filter with pagination.
    pub async fn list_patterns(
        &self,
        filter: &PatternFilter,
        order: PatternOrder,
        descending: bool,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Pattern>> {
        let conn = self.connect()?;
        let (clauses, mut params) = filter_clauses(filter);
        let direction = if descending { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT {PATTERN_COLUMNS} FROM patterns p{} ORDER BY p.{} {direction}, p.id ASC LIMIT ? OFFSET ?",
            where_sql(&clauses),
            order.column(),
        );
        params.push((limit as i64).into());
        params.push((offset as i64).into());

        let mut rows = conn
            .query(&sql, params)
            .await
            .map_err(|e| storage_err("list_patterns", e))?;
        let mut patterns = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| storage_err("list_patterns", e))?
        {
            patterns.push(row_to_pattern(&row)?);
        }
        Ok(patterns)
    }

    /// Count patterns matching a filter.
    pub async fn count_patterns(&self, filter: &PatternFilter) -> Result<u64> {
        let conn = self.connect()?;
        let (clauses, params) = filter_clauses(filter);
        let sql = format!("SELECT COUNT(*) FROM patterns p{}", where_sql(&clauses));
        let mut rows = conn
            .query(&sql, params)
            .await
            .map_err(|e| storage_err("count_patterns", e))?;
        let Some(row) = rows
            .next()
            .await
            .map_err(|e| storage_err("count_patterns", e))?
        else {
            return Ok(0);
        };
        let count: i64 = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
        Ok(count.max(0) as u64)
    }

    /// Aggregate statistics over a filtered pattern set.
    pub async fn aggregate_stats(&self, filter: &PatternFilter) -> Result<AggregateStats> {
        let conn = self.connect()?;
        let (clauses, params) = filter_clauses(filter);
        let sql = format!(
            "SELECT p.pattern_type, COUNT(*), AVG(p.trust_score), SUM(p.invalid) \
             FROM patterns p{} GROUP BY p.pattern_type",
            where_sql(&clauses)
        );
        let mut rows = conn
            .query(&sql, params)
            .await
            .map_err(|e| storage_err("aggregate_stats", e))?;

        let mut stats = AggregateStats::default();
        let mut trust_mass = 0.0f64;
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| storage_err("aggregate_stats", e))?
        {
            let pattern_type: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            let count: i64 = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
            let avg_trust: f64 = row.get(2).unwrap_or(0.0);
            let invalid: i64 = row.get(3).unwrap_or(0);
            let count = count.max(0) as u64;
            stats.total += count;
            stats.invalid_count += invalid.max(0) as u64;
            trust_mass += avg_trust * count as f64;
            stats.by_type.insert(pattern_type, count);
        }
        if stats.total > 0 {
            stats.avg_trust = trust_mass / stats.total as f64;
        }
        Ok(stats)
    }

    /// Full-text search over title/summary/tags, ranked by FTS relevance.
    ///
    /// An empty or unsearchable query falls back to facet-only listing.
    pub async fn search_patterns(
        &self,
        query: &str,
        types: &[PatternType],
        tags: &[String],
        k: u64,
    ) -> Result<Vec<SearchHit>> {
        let filter = PatternFilter {
            types: types.to_vec(),
            tags: tags.to_vec(),
            valid: Some(true),
            ..Default::default()
        };
        let Some(match_expr) = fts_query_from_text(query) else {
            debug!("empty FTS query, falling back to facet listing");
            let patterns = self
                .list_patterns(&filter, PatternOrder::TrustScore, true, k, 0)
                .await?;
            return Ok(patterns
                .into_iter()
                .map(|pattern| SearchHit {
                    pattern,
                    fts_rank: None,
                })
                .collect());
        };

        let conn = self.connect()?;
        let (clauses, mut params) = filter_clauses(&filter);
        let mut sql = format!(
            "SELECT {PATTERN_COLUMNS}, bm25(patterns_fts) AS rank \
             FROM patterns_fts JOIN patterns p ON p.id = patterns_fts.pattern_id \
             WHERE patterns_fts MATCH ?"
        );
        let mut all_params: Vec<libsql::Value> = vec![match_expr.into()];
        for clause in &clauses {
            sql.push_str(" AND ");
            sql.push_str(clause);
        }
        all_params.append(&mut params);
        sql.push_str(" ORDER BY rank ASC, p.id ASC LIMIT ?");
        all_params.push((k as i64).into());

        let mut rows = conn
            .query(&sql, all_params)
            .await
            .map_err(|e| storage_err("search_patterns", e))?;
        let mut hits = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| storage_err("search_patterns", e))?
        {
            let pattern = row_to_pattern(&row)?;
            let rank: f64 = row.get(17).unwrap_or(0.0);
            hits.push(SearchHit {
                pattern,
                fts_rank: Some(rank),
            });
        }
        Ok(hits)
    }

    /// Retrieve the ranker candidate set for a lookup request.
    ///
    /// Text hits come first; when they leave room, facet matches on the
    /// supplied languages/frameworks/tags top the set up, then recent
    /// high-trust patterns.
    pub async fn lookup_patterns(
        &self,
        task: &str,
        facet_tags: &[String],
        types: &[PatternType],
        k: u64,
    ) -> Result<Vec<SearchHit>> {
        let mut hits = self.search_patterns(task, types, &[], k).await?;

        if (hits.len() as u64) < k && !facet_tags.is_empty() {
            let facet_filter = PatternFilter {
                types: types.to_vec(),
                valid: Some(true),
                ..Default::default()
            };
            // Any-tag match: one filter query per tag keeps the normalized
            // tag index in play.
            for tag in sanitize_tags(facet_tags) {
                if hits.len() as u64 >= k {
                    break;
                }
                let filter = PatternFilter {
                    tags: vec![tag],
                    ..facet_filter.clone()
                };
                let remaining = k - hits.len() as u64;
                for pattern in self
                    .list_patterns(&filter, PatternOrder::TrustScore, true, remaining, 0)
                    .await?
                {
                    if !hits.iter().any(|h| h.pattern.id == pattern.id) {
                        hits.push(SearchHit {
                            pattern,
                            fts_rank: None,
                        });
                    }
                }
            }
        }

        if (hits.len() as u64) < k {
            let filter = PatternFilter {
                types: types.to_vec(),
                valid: Some(true),
                ..Default::default()
            };
            let remaining = k - hits.len() as u64;
            for pattern in self
                .list_patterns(&filter, PatternOrder::UpdatedAt, true, remaining + k, 0)
                .await?
            {
                if hits.len() as u64 >= k {
                    break;
                }
                if !hits.iter().any(|h| h.pattern.id == pattern.id) {
                    hits.push(SearchHit {
                        pattern,
                        fts_rank: None,
                    });
                }
            }
        }

        hits.truncate(k as usize);
        Ok(hits)
    }

    /// Insert or replace a pattern and its tag/alias rows.
    pub async fn upsert_pattern(&self, pattern: &Pattern) -> Result<()> {
        let conn = self.connect()?;
        upsert_pattern_on(&conn, pattern).await
    }

    /// Write new trust parameters and the derived score.
    pub async fn update_trust(
        &self,
        id: &str,
        alpha: f64,
        beta: f64,
        trust_score: f64,
    ) -> Result<()> {
        let conn = self.connect()?;
        update_trust_on(&conn, id, alpha, beta, trust_score).await
    }

    /// Set or clear the quarantine flag. Clearing is the only write allowed
    /// on a quarantined pattern.
    pub async fn set_quarantined(&self, id: &str, quarantined: bool) -> Result<()> {
        let conn = self.connect()?;
        let affected = conn
            .execute(
                "UPDATE patterns SET invalid = ?, updated_at = strftime('%s', 'now') WHERE id = ?",
                libsql::params![i64::from(quarantined), id],
            )
            .await
            .map_err(|e| storage_err("set_quarantined", e))?;
        if affected == 0 {
            return Err(Error::NotFound(format!("pattern {id}")));
        }
        Ok(())
    }
}

/// Resolve an id or alias on a live connection. The patterns table is
/// checked first so aliases can never shadow an id.
pub(crate) async fn resolve_pattern_id_on(
    conn: &Connection,
    id_or_alias: &str,
) -> Result<Option<String>> {
    let mut rows = conn
        .query(
            "SELECT id FROM patterns WHERE id = ?",
            libsql::params![id_or_alias],
        )
        .await
        .map_err(|e| storage_err("resolve_pattern_id", e))?;
    if let Some(row) = rows
        .next()
        .await
        .map_err(|e| storage_err("resolve_pattern_id", e))?
    {
        let id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
        return Ok(Some(id));
    }

    let mut rows = conn
        .query(
            "SELECT pattern_id FROM pattern_aliases WHERE alias = ?",
            libsql::params![id_or_alias],
        )
        .await
        .map_err(|e| storage_err("resolve_pattern_id", e))?;
    match rows
        .next()
        .await
        .map_err(|e| storage_err("resolve_pattern_id", e))?
    {
        Some(row) => {
            let id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            Ok(Some(id))
        }
        None => Ok(None),
    }
}

/// Reject writes against a quarantined pattern.
pub(crate) async fn ensure_writable(conn: &Connection, id: &str) -> Result<()> {
    let mut rows = conn
        .query(
            "SELECT invalid FROM patterns WHERE id = ?",
            libsql::params![id],
        )
        .await
        .map_err(|e| storage_err("ensure_writable", e))?;
    if let Some(row) = rows
        .next()
        .await
        .map_err(|e| storage_err("ensure_writable", e))?
    {
        let invalid: i64 = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
        if invalid != 0 {
            return Err(Error::InvalidState(format!(
                "pattern {id} is quarantined and rejects writes"
            )));
        }
    }
    Ok(())
}

/// Transaction-scoped pattern upsert.
pub(crate) async fn upsert_pattern_on(conn: &Connection, pattern: &Pattern) -> Result<()> {
    pattern.check_invariants()?;
    ensure_writable(conn, &pattern.id).await?;
    debug!("Upserting pattern {}", pattern.id);

    if let Some(alias) = pattern.alias.as_deref() {
        // A duplicate alias is a constraint breach, not an internal error.
        let mut rows = conn
            .query(
                "SELECT id FROM patterns WHERE alias = ? AND id != ?",
                libsql::params![alias, pattern.id.clone()],
            )
            .await
            .map_err(|e| storage_err("upsert_pattern alias check", e))?;
        if rows
            .next()
            .await
            .map_err(|e| storage_err("upsert_pattern alias check", e))?
            .is_some()
        {
            return Err(Error::InvalidState(format!(
                "alias {alias:?} already resolves to another pattern"
            )));
        }
    }

    let tags = sanitize_tags(&pattern.tags);
    let tags_json = serde_json::to_string(&tags).map_err(Error::Serialization)?;
    let canonical_json =
        serde_json::to_string(&pattern.json_canonical).map_err(Error::Serialization)?;

    // The conflict arm goes through UPDATE so the FTS sync trigger fires;
    // INSERT OR REPLACE would leave a stale FTS row behind.
    conn.execute(
        r#"
        INSERT INTO patterns (
            id, alias, pattern_type, title, summary, json_canonical, tags,
            trust_score, alpha, beta, usage_count, success_count, invalid,
            key_insight, when_to_use, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            alias = excluded.alias,
            pattern_type = excluded.pattern_type,
            title = excluded.title,
            summary = excluded.summary,
            json_canonical = excluded.json_canonical,
            tags = excluded.tags,
            trust_score = excluded.trust_score,
            alpha = excluded.alpha,
            beta = excluded.beta,
            usage_count = excluded.usage_count,
            success_count = excluded.success_count,
            invalid = excluded.invalid,
            key_insight = excluded.key_insight,
            when_to_use = excluded.when_to_use,
            updated_at = excluded.updated_at
        "#,
        libsql::params![
            pattern.id.clone(),
            pattern.alias.clone(),
            pattern.pattern_type.as_str(),
            pattern.title.clone(),
            pattern.summary.clone(),
            canonical_json,
            tags_json,
            pattern.trust_score,
            pattern.alpha,
            pattern.beta,
            pattern.usage_count as i64,
            pattern.success_count as i64,
            i64::from(pattern.invalid),
            pattern.key_insight.clone(),
            pattern.when_to_use.clone(),
            pattern.created_at.timestamp(),
            pattern.updated_at.timestamp(),
        ],
    )
    .await
    .map_err(|e| storage_err("upsert_pattern", e))?;

    // Rebuild the normalized tag rows.
    conn.execute(
        "DELETE FROM pattern_tags WHERE pattern_id = ?",
        libsql::params![pattern.id.clone()],
    )
    .await
    .map_err(|e| storage_err("upsert_pattern tags", e))?;
    for tag in &tags {
        conn.execute(
            "INSERT OR IGNORE INTO pattern_tags (pattern_id, tag) VALUES (?, ?)",
            libsql::params![pattern.id.clone(), tag.clone()],
        )
        .await
        .map_err(|e| storage_err("upsert_pattern tags", e))?;
    }

    // Rebuild the alias row so a renamed alias stops resolving.
    conn.execute(
        "DELETE FROM pattern_aliases WHERE pattern_id = ?",
        libsql::params![pattern.id.clone()],
    )
    .await
    .map_err(|e| storage_err("upsert_pattern alias", e))?;
    if let Some(alias) = pattern.alias.as_deref() {
        conn.execute(
            "INSERT OR REPLACE INTO pattern_aliases (alias, pattern_id) VALUES (?, ?)",
            libsql::params![alias, pattern.id.clone()],
        )
        .await
        .map_err(|e| storage_err("upsert_pattern alias", e))?;
    }
    Ok(())
}

/// Transaction-scoped trust write.
pub(crate) async fn update_trust_on(
    conn: &Connection,
    id: &str,
    alpha: f64,
    beta: f64,
    trust_score: f64,
) -> Result<()> {
    if !alpha.is_finite() || !beta.is_finite() || alpha < 0.0 || beta < 0.0 {
        return Err(Error::InvalidState(format!(
            "invalid trust parameters for {id}: alpha={alpha}, beta={beta}"
        )));
    }
    ensure_writable(conn, id).await?;
    let affected = conn
        .execute(
            "UPDATE patterns SET alpha = ?, beta = ?, trust_score = ?, \
             updated_at = strftime('%s', 'now') WHERE id = ?",
            libsql::params![alpha, beta, trust_score, id],
        )
        .await
        .map_err(|e| storage_err("update_trust", e))?;
    if affected == 0 {
        return Err(Error::NotFound(format!("pattern {id}")));
    }
    Ok(())
}

/// Transaction-scoped usage bump.
pub(crate) async fn record_usage_on(conn: &Connection, id: &str, success: bool) -> Result<()> {
    ensure_writable(conn, id).await?;
    let affected = conn
        .execute(
            "UPDATE patterns SET usage_count = usage_count + 1, \
             success_count = success_count + ?, updated_at = strftime('%s', 'now') \
             WHERE id = ?",
            libsql::params![i64::from(success), id],
        )
        .await
        .map_err(|e| storage_err("record_usage", e))?;
    if affected == 0 {
        return Err(Error::NotFound(format!("pattern {id}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fts_query_sanitization() {
        assert_eq!(
            fts_query_from_text("fix sqlite sync error"),
            Some("\"fix\" OR \"sqlite\" OR \"sync\" OR \"error\"".to_string())
        );
        // Punctuation and MATCH operators never reach the index verbatim.
        assert_eq!(
            fts_query_from_text("a NEAR(b) \"c\""),
            Some("\"a\" OR \"near\" OR \"b\" OR \"c\"".to_string())
        );
        assert_eq!(fts_query_from_text("   ***   "), None);
        assert_eq!(fts_query_from_text(""), None);
    }

    #[test]
    fn test_filter_clauses_composed() {
        let filter = PatternFilter {
            types: vec![PatternType::Lang, PatternType::Test],
            min_trust: Some(0.4),
            tags: vec!["Sqlite".to_string()],
            valid: Some(true),
        };
        let (clauses, params) = filter_clauses(&filter);
        assert_eq!(clauses.len(), 4);
        // Two type placeholders + min_trust + one sanitized tag.
        assert_eq!(params.len(), 4);
        assert!(clauses[0].contains("IN (?, ?)"));
        assert!(clauses[3].contains("invalid = 0"));
    }

    #[test]
    fn test_pattern_order_parse() {
        assert_eq!(PatternOrder::parse("updated_at"), PatternOrder::UpdatedAt);
        assert_eq!(PatternOrder::parse("bogus"), PatternOrder::TrustScore);
    }
}
