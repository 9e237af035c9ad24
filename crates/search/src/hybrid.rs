//! Hybrid BM25 + LSA search, and the filter-only fallback for empty
//! queries.

use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

use crate::bm25::{reduce_per_session, search_turns, Bm25Hit};
use crate::error::SearchResult;
use crate::lsa::{cosine_similarity, LsaModel};
use crate::store::IndexStore;

const SNIPPET_WINDOW: usize = 300;
const DEFAULT_LIMIT: usize = 20;
const BM25_WEIGHT: f64 = 0.4;
const LSA_WEIGHT: f64 = 0.6;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchFilters {
    pub author_email: Option<String>,
    pub actor: Option<String>,
    pub commit_prefix: Option<String>,
    pub file_path_regex: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionFacet {
    pub session_id: String,
    pub author_email: String,
    pub actor: String,
    pub branch: String,
    pub captured_at: i64,
    pub commit_sha: Option<String>,
    pub turn_count: i64,
    pub tool_call_count: i64,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResultDoc {
    pub session_id: String,
    pub score: f64,
    pub snippet: String,
    pub snippet_turn_index: u32,
    pub snippet_role: String,
    pub facet: SessionFacet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Hybrid,
    Filter,
}

impl SearchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchMode::Hybrid => "hybrid",
            SearchMode::Filter => "filter",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutput {
    pub query: String,
    pub filters: SearchFilters,
    pub mode: SearchMode,
    pub results: Vec<SearchResultDoc>,
    pub total: usize,
}

fn load_facet(conn: &Connection, session_id: &str) -> SearchResult<Option<SessionFacet>> {
    let row = conn
        .query_row(
            "SELECT author_email, actor, branch, captured_at, commit_sha, turn_count, tool_call_count \
             FROM session_facets WHERE session_id = ?1",
            [session_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            },
        )
        .optional_row()?;

    let Some((author_email, actor, branch, captured_at, commit_sha, turn_count, tool_call_count)) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare("SELECT DISTINCT path FROM files_index WHERE session_id = ?1 ORDER BY path")?;
    let files = stmt
        .query_map([session_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(SessionFacet {
        session_id: session_id.to_string(),
        author_email,
        actor,
        branch,
        captured_at,
        commit_sha,
        turn_count,
        tool_call_count,
        files,
    }))
}

trait OptionalRow<T> {
    fn optional_row(self) -> rusqlite::Result<Option<T>>;
}

impl<T> OptionalRow<T> for rusqlite::Result<T> {
    fn optional_row(self) -> rusqlite::Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn first_turn(conn: &Connection, session_id: &str) -> SearchResult<Option<(u32, String, String)>> {
    let row = conn
        .query_row(
            "SELECT turn_index, role, raw_content FROM turns_ft WHERE session_id = ?1 ORDER BY turn_index ASC LIMIT 1",
            [session_id],
            |row| Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
        )
        .optional_row()?;
    Ok(row)
}

fn matches_filters(conn: &Connection, facet: &SessionFacet, filters: &SearchFilters) -> SearchResult<bool> {
    if let Some(email) = &filters.author_email {
        if &facet.author_email != email {
            return Ok(false);
        }
    }
    if let Some(actor) = &filters.actor {
        if &facet.actor != actor {
            return Ok(false);
        }
    }
    if let Some(prefix) = &filters.commit_prefix {
        match &facet.commit_sha {
            Some(sha) if sha.starts_with(prefix.as_str()) => {}
            _ => return Ok(false),
        }
    }
    if let Some(pattern) = &filters.file_path_regex {
        let re = regex_lite::Regex::new(pattern)
            .map_err(|e| crate::error::SearchError::BadRegex(e.to_string()))?;
        let mut stmt = conn.prepare("SELECT path FROM files_index WHERE session_id = ?1")?;
        let matched = stmt
            .query_map([&facet.session_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?
            .iter()
            .any(|p| re.is_match(p));
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Snippet windowing: center a window on the earliest occurrence of any
/// query term, aligned to word boundaries, with `...` markers when the
/// window doesn't start/end at the string's edges. Falls back to the
/// first `SNIPPET_WINDOW` bytes when the text fits or no term is found.
fn make_snippet(text: &str, query: &str) -> String {
    if text.len() <= SNIPPET_WINDOW {
        return text.to_string();
    }

    let terms: Vec<String> = crate::tokenize::tokenize(query);
    let lower = text.to_lowercase();
    let earliest = terms
        .iter()
        .filter_map(|t| lower.find(t.as_str()))
        .min();

    let Some(center) = earliest else {
        return truncate_to_boundary(text, 0, SNIPPET_WINDOW, false);
    };

    let half = SNIPPET_WINDOW / 2;
    let start = center.saturating_sub(half);
    truncate_to_boundary(text, start, SNIPPET_WINDOW, true)
}

fn truncate_to_boundary(text: &str, start: usize, window: usize, allow_leading_ellipsis: bool) -> String {
    let mut start = start.min(text.len());
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    // Snap forward to the next word boundary so we don't start mid-word.
    if start > 0 {
        while start < text.len() && !text.as_bytes()[start].is_ascii_whitespace() {
            start += 1;
        }
        while start < text.len() && text.as_bytes()[start].is_ascii_whitespace() {
            start += 1;
        }
    }

    let mut end = (start + window).min(text.len());
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }
    if end < text.len() {
        while end > start && !text.as_bytes()[end - 1].is_ascii_whitespace() {
            end -= 1;
        }
    }
    if end <= start {
        end = (start + window).min(text.len());
        while end < text.len() && !text.is_char_boundary(end) {
            end -= 1;
        }
    }

    let body = &text[start..end];
    let leading = allow_leading_ellipsis && start > 0;
    let trailing = end < text.len();
    match (leading, trailing) {
        (true, true) => format!("...{body}..."),
        (true, false) => format!("...{body}"),
        (false, true) => format!("{body}..."),
        (false, false) => body.to_string(),
    }
}

/// Run a search. `lsa` is `None` when fewer than 2 sessions exist —
/// search then degrades to BM25-only (LSA's normalized contribution is 0).
pub fn search(
    index: &IndexStore,
    lsa: Option<&LsaModel>,
    query: &str,
    filters: &SearchFilters,
    limit: Option<usize>,
) -> SearchResult<SearchOutput> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    let conn = index.conn();

    if query.trim().is_empty() {
        return search_filter_mode(index, filters, limit);
    }

    let bm25_hits = search_turns(conn, query)?;
    let bm25_best = reduce_per_session(bm25_hits);
    let bm25_max = bm25_best.values().map(|h| h.score).fold(0.0, f64::max);

    let mut lsa_scores: HashMap<String, f64> = HashMap::new();
    if let Some(model) = lsa {
        let q_vec = model.project_query(query);
        for (session_id, embedding) in &model.session_embeddings {
            let sim = cosine_similarity(&q_vec, embedding);
            if sim > 0.0 {
                lsa_scores.insert(session_id.clone(), sim);
            }
        }
    }
    let lsa_max = lsa_scores.values().copied().fold(0.0, f64::max);

    let mut session_ids: std::collections::HashSet<String> = bm25_best.keys().cloned().collect();
    session_ids.extend(lsa_scores.keys().cloned());

    let mut scored: Vec<(String, f64, Option<Bm25Hit>)> = Vec::new();
    for session_id in session_ids {
        let bm25_norm = bm25_best
            .get(&session_id)
            .map(|h| if bm25_max > 0.0 { h.score / bm25_max } else { 0.0 })
            .unwrap_or(0.0);
        let lsa_norm = lsa_scores
            .get(&session_id)
            .map(|s| if lsa_max > 0.0 { s / lsa_max } else { 0.0 })
            .unwrap_or(0.0);
        let hybrid = BM25_WEIGHT * bm25_norm + LSA_WEIGHT * lsa_norm;
        scored.push((session_id.clone(), hybrid, bm25_best.get(&session_id).cloned()));
    }
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut results = Vec::new();
    let mut total = 0usize;
    for (session_id, score, best_turn) in scored {
        let Some(facet) = load_facet(conn, &session_id)? else {
            continue;
        };
        if !matches_filters(conn, &facet, filters)? {
            continue;
        }
        total += 1;
        if results.len() >= limit {
            continue;
        }

        let (snippet_turn_index, snippet_role, snippet) = match best_turn {
            Some(hit) => (hit.turn_index, hit.role, make_snippet(&hit.content, query)),
            None => match first_turn(conn, &session_id)? {
                Some((idx, role, content)) => (idx, role, truncate_bytes(&content, SNIPPET_WINDOW)),
                None => (0, "human".to_string(), String::new()),
            },
        };

        results.push(SearchResultDoc {
            session_id,
            score: round2(score),
            snippet,
            snippet_turn_index,
            snippet_role,
            facet,
        });
    }

    Ok(SearchOutput {
        query: query.to_string(),
        filters: filters.clone(),
        mode: SearchMode::Hybrid,
        results,
        total,
    })
}

fn search_filter_mode(index: &IndexStore, filters: &SearchFilters, limit: usize) -> SearchResult<SearchOutput> {
    let conn = index.conn();
    let mut stmt = conn.prepare("SELECT session_id FROM session_facets ORDER BY captured_at DESC")?;
    let session_ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut results = Vec::new();
    let mut total = 0usize;
    for session_id in session_ids {
        let Some(facet) = load_facet(conn, &session_id)? else {
            continue;
        };
        if !matches_filters(conn, &facet, filters)? {
            continue;
        }
        total += 1;
        if results.len() >= limit {
            continue;
        }
        let (snippet_turn_index, snippet_role, snippet) = match first_turn(conn, &session_id)? {
            Some((idx, role, content)) => (idx, role, truncate_bytes(&content, SNIPPET_WINDOW)),
            None => (0, "human".to_string(), String::new()),
        };
        results.push(SearchResultDoc {
            session_id,
            score: 0.0,
            snippet,
            snippet_turn_index,
            snippet_role,
            facet,
        });
    }

    Ok(SearchOutput {
        query: String::new(),
        filters: filters.clone(),
        mode: SearchMode::Filter,
        results,
        total,
    })
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn truncate_bytes(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_short_text_is_returned_unchanged() {
        assert_eq!(make_snippet("short text", "query"), "short text");
    }

    #[test]
    fn snippet_centers_on_earliest_query_term() {
        let text = format!("{}JWT{}", "x".repeat(400), "y".repeat(400));
        let snippet = make_snippet(&text, "jwt");
        assert!(snippet.contains("JWT"));
        assert!(snippet.starts_with("..."));
        assert!(snippet.ends_with("..."));
    }

    #[test]
    fn round2_rounds_to_two_decimals() {
        assert_eq!(round2(0.123456), 0.12);
        assert_eq!(round2(0.125), 0.13);
    }
}
