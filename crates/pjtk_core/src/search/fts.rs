//! Keyword search over projects, backed by the `projects_fts` index.
//!
//! The index covers code, name, abstract and comment and is kept in sync by
//! triggers on `projects`. Input words are quoted so that punctuation in a
//! partial query never reaches FTS5 as syntax; a trailing `*` keeps its
//! prefix meaning (`lha_ia*` finds every Lake Huron index project).

use crate::model::project::ProjectId;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type SearchResult<T> = Result<T, SearchError>;

#[derive(Debug)]
pub enum SearchError {
    /// Raw FTS5 input that SQLite refused to parse.
    InvalidQuery { query: String, message: String },
    Sqlite(rusqlite::Error),
    /// A stored row could not be decoded into a hit.
    CorruptRow(String),
}

impl Display for SearchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidQuery { query, message } => {
                write!(f, "cannot search for `{query}`: {message}")
            }
            Self::Sqlite(err) => write!(f, "search failed: {err}"),
            Self::CorruptRow(message) => write!(f, "search index row is corrupt: {message}"),
        }
    }
}

impl Error for SearchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::InvalidQuery { .. } | Self::CorruptRow(_) => None,
        }
    }
}

impl From<rusqlite::Error> for SearchError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub year: Option<i32>,
    /// Lake abbreviation, e.g. `HU`.
    pub lake: Option<String>,
    pub limit: u32,
    /// Hand `text` to FTS5 untouched (`walleye OR perch`, `NEAR(...)`).
    pub raw_fts_syntax: bool,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            year: None,
            lake: None,
            limit: 20,
            raw_fts_syntax: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub project_id: ProjectId,
    pub prj_cd: String,
    pub prj_nm: String,
    pub slug: String,
    pub year: i32,
    /// Best matching fragment with hits wrapped in `[` `]`.
    pub snippet: String,
}

const SEARCH_SQL: &str = "
    SELECT p.uuid, p.prj_cd, p.prj_nm, p.slug, p.year,
           snippet(projects_fts, -1, '[', ']', ' ... ', 10)
    FROM projects_fts
    JOIN projects p ON p.rowid = projects_fts.rowid
    JOIN lakes l ON l.id = p.lake_id
    WHERE projects_fts MATCH ?1
      AND (?2 IS NULL OR p.year = ?2)
      AND (?3 IS NULL OR l.abbrev = ?3)
    ORDER BY bm25(projects_fts), p.year DESC, p.prj_cd
    LIMIT ?4;";

/// Ranked projects matching every word of `query.text`.
///
/// Blank text or a zero limit yields no hits without touching the index.
pub fn search_projects(conn: &Connection, query: &SearchQuery) -> SearchResult<Vec<SearchHit>> {
    let Some(expression) = match_expression(query) else {
        return Ok(Vec::new());
    };
    if query.limit == 0 {
        return Ok(Vec::new());
    }

    let lake = query.lake.as_deref().map(str::to_uppercase);
    let mut stmt = conn.prepare_cached(SEARCH_SQL)?;
    let rows = stmt
        .query_map(params![expression, query.year, lake, query.limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })
        .map_err(|err| classify(err, &expression))?;

    let mut hits = Vec::new();
    for row in rows {
        let (uuid, prj_cd, prj_nm, slug, year, snippet) =
            row.map_err(|err| classify(err, &expression))?;
        let project_id = Uuid::parse_str(&uuid)
            .map_err(|err| SearchError::CorruptRow(format!("uuid `{uuid}`: {err}")))?;
        hits.push(SearchHit {
            project_id,
            prj_cd,
            prj_nm,
            slug,
            year,
            snippet,
        });
    }
    Ok(hits)
}

fn match_expression(query: &SearchQuery) -> Option<String> {
    let text = query.text.trim();
    if text.is_empty() {
        return None;
    }
    if query.raw_fts_syntax {
        return Some(text.to_string());
    }
    let terms: Vec<String> = text.split_whitespace().filter_map(quote_term).collect();
    (!terms.is_empty()).then(|| terms.join(" AND "))
}

/// `walleye` -> `"walleye"`, `lha_ia*` -> `"lha_ia"*`. A bare `*` is dropped.
fn quote_term(word: &str) -> Option<String> {
    let (stem, prefix) = match word.strip_suffix('*') {
        Some(stem) => (stem, true),
        None => (word, false),
    };
    if stem.is_empty() {
        return None;
    }
    let quoted = format!("\"{}\"", stem.replace('"', "\"\""));
    Some(if prefix { quoted + "*" } else { quoted })
}

fn classify(err: rusqlite::Error, expression: &str) -> SearchError {
    let syntax = match &err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => {
            let message = message.to_lowercase();
            message.contains("fts5: syntax error")
                || message.contains("malformed match expression")
                || message.contains("unterminated string")
        }
        _ => false,
    };
    if syntax {
        SearchError::InvalidQuery {
            query: expression.to_string(),
            message: err.to_string(),
        }
    } else {
        SearchError::Sqlite(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_are_quoted_and_all_required() {
        let query = SearchQuery::new("  walleye \"index\" ");
        assert_eq!(
            match_expression(&query).as_deref(),
            Some("\"walleye\" AND \"\"\"index\"\"\"")
        );
    }

    #[test]
    fn trailing_star_keeps_prefix_meaning() {
        assert_eq!(quote_term("lha_ia*").as_deref(), Some("\"lha_ia\"*"));
        assert_eq!(quote_term("*"), None);
        assert_eq!(match_expression(&SearchQuery::new("* *")), None);
    }

    #[test]
    fn raw_syntax_is_untouched() {
        let mut query = SearchQuery::new("walleye OR perch");
        query.raw_fts_syntax = true;
        assert_eq!(match_expression(&query).as_deref(), Some("walleye OR perch"));
    }
}
