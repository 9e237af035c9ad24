//! BM25 lexical ranking over `turns_ft`, using SQLite FTS5's built-in
//! `bm25()` ranking function.

use rusqlite::Connection;
use std::collections::HashMap;

use crate::error::SearchResult;
use crate::tokenize::strip_stopwords;

const MAX_HITS: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct Bm25Hit {
    pub session_id: String,
    pub turn_index: u32,
    pub role: String,
    pub content: String,
    /// FTS5's bm25() returns lower-is-better; this is negated so higher
    /// is better, matching every other score in the hybrid blend.
    pub score: f64,
}

/// Run a BM25 query over `turns_ft`, returning up to [`MAX_HITS`] turn
/// hits ordered by descending score.
///
/// The query is stopword-stripped the same way indexed content is, since
/// `turns_ft`'s `content` column never contains a stopword token; a query
/// left un-stripped would AND in a term the index can never match.
pub fn search_turns(conn: &Connection, query: &str) -> SearchResult<Vec<Bm25Hit>> {
    let filtered_query = strip_stopwords(query);
    if filtered_query.is_empty() {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT session_id, turn_index, role, raw_content, bm25(turns_ft) AS rank \
         FROM turns_ft WHERE turns_ft MATCH ?1 ORDER BY rank LIMIT ?2",
    )?;
    let hits = stmt
        .query_map(rusqlite::params![filtered_query, MAX_HITS as i64], |row| {
            let raw_rank: f64 = row.get(4)?;
            Ok(Bm25Hit {
                session_id: row.get(0)?,
                turn_index: row.get(1)?,
                role: row.get(2)?,
                content: row.get(3)?,
                score: -raw_rank,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(hits)
}

/// Reduce turn-level hits to one entry per session: the maximum score,
/// remembering which turn produced it.
pub fn reduce_per_session(hits: Vec<Bm25Hit>) -> HashMap<String, Bm25Hit> {
    let mut best: HashMap<String, Bm25Hit> = HashMap::new();
    for hit in hits {
        best.entry(hit.session_id.clone())
            .and_modify(|existing| {
                if hit.score > existing.score {
                    *existing = hit.clone();
                }
            })
            .or_insert(hit);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::IndexStore;

    #[test]
    fn reduce_per_session_keeps_the_best_turn() {
        let hits = vec![
            Bm25Hit {
                session_id: "s1".into(),
                turn_index: 0,
                role: "human".into(),
                content: "fix the jwt bug".into(),
                score: 1.0,
            },
            Bm25Hit {
                session_id: "s1".into(),
                turn_index: 2,
                role: "assistant".into(),
                content: "fixed the jwt expiry check".into(),
                score: 3.0,
            },
        ];
        let reduced = reduce_per_session(hits);
        assert_eq!(reduced.len(), 1);
        assert_eq!(reduced["s1"].turn_index, 2);
    }

    #[test]
    fn search_turns_finds_matching_content() {
        let store = IndexStore::open_in_memory().unwrap();
        store.insert_turn_ft("s1", 0, "human", "fix the jwt expiry bug").unwrap();
        store.insert_turn_ft("s2", 0, "human", "optimize database pooling").unwrap();

        let hits = search_turns(store.conn(), "jwt").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].session_id, "s1");
    }

    #[test]
    fn search_turns_returns_the_raw_content_not_the_stopword_stripped_index() {
        let store = IndexStore::open_in_memory().unwrap();
        store.insert_turn_ft("s1", 0, "human", "fix the jwt expiry bug").unwrap();

        let hits = search_turns(store.conn(), "jwt").unwrap();
        assert_eq!(hits[0].content, "fix the jwt expiry bug");
    }

    #[test]
    fn search_turns_on_a_query_of_only_stopwords_matches_nothing() {
        let store = IndexStore::open_in_memory().unwrap();
        store.insert_turn_ft("s1", 0, "human", "fix the jwt expiry bug").unwrap();

        let hits = search_turns(store.conn(), "the a of").unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn stopwords_in_stored_content_are_not_indexed() {
        let store = IndexStore::open_in_memory().unwrap();
        store.insert_turn_ft("s1", 0, "human", "the quick fox").unwrap();

        // "the" never made it into the indexed column, so searching for
        // it alongside a real term should still find the row by that term.
        let hits = search_turns(store.conn(), "quick").unwrap();
        assert_eq!(hits.len(), 1);
    }
}
