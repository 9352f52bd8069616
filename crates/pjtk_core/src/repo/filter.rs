//! Composable project filters rendered to SQL.
//!
//! Every list query in the tracker (projects, sample points, reports,
//! associated files) selects from `projects p` joined to `lakes l`,
//! `project_types pt` and `protocols pr`, so one filter serves them all.
//! Geometry filters cannot be expressed in SQL and are carried alongside for
//! the caller to apply against sample points.

use super::date_to_db;
use crate::geo::Region;
use crate::model::milestone::{APPROVED_LABEL, SIGNOFF_LABEL};
use chrono::NaiveDate;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

/// FROM clause shared by all project-scoped list queries.
pub(crate) const PROJECT_JOINS_SQL: &str = "projects p
    JOIN lakes l ON l.id = p.lake_id
    JOIN project_types pt ON pt.id = p.project_type_id
    LEFT JOIN protocols pr ON pr.id = p.protocol_id";

/// Workflow position derived from milestone completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Not yet approved.
    Submitted,
    /// Approved but not signed off.
    Approved,
    /// Signed off.
    Complete,
}

/// How a project's sample points must relate to a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialPredicate {
    /// Every point strictly inside.
    Within,
    /// At least one point inside or on the boundary.
    Intersects,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialFilter {
    pub region: Region,
    pub predicate: SpatialPredicate,
}

impl SpatialFilter {
    pub fn matches(&self, points: &[crate::geo::Point]) -> bool {
        match self.predicate {
            SpatialPredicate::Within => self.region.contains_all(points),
            SpatialPredicate::Intersects => self.region.intersects_any(points),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectFilter {
    pub year: Option<i32>,
    pub year_gte: Option<i32>,
    pub year_lte: Option<i32>,
    pub year_gt: Option<i32>,
    pub year_lt: Option<i32>,
    pub prj_date0_gte: Option<NaiveDate>,
    pub prj_date0_lte: Option<NaiveDate>,
    pub prj_date1_gte: Option<NaiveDate>,
    pub prj_date1_lte: Option<NaiveDate>,
    pub prj_cd: Vec<String>,
    pub prj_cd_not: Vec<String>,
    pub prj_cd_like: Option<String>,
    pub prj_cd_not_like: Option<String>,
    pub prj_cd_endswith: Vec<String>,
    pub prj_cd_not_endswith: Vec<String>,
    pub prj_nm_like: Option<String>,
    pub prj_nm_not_like: Option<String>,
    pub prj_ldr: Vec<String>,
    /// Lake abbreviations.
    pub lake: Vec<String>,
    pub lake_not: Vec<String>,
    /// Protocol abbreviations.
    pub protocol: Vec<String>,
    pub protocol_not: Vec<String>,
    pub project_type_ids: Vec<i64>,
    pub scope: Vec<String>,
    pub owners: Vec<String>,
    pub status: Option<ProjectStatus>,
    pub tag: Option<String>,
    /// Applied by callers after the SQL query, against sample points.
    pub spatial: Vec<SpatialFilter>,
}

impl ProjectFilter {
    pub fn for_year(year: i32) -> Self {
        Self {
            year: Some(year),
            ..Self::default()
        }
    }

    pub fn has_spatial(&self) -> bool {
        !self.spatial.is_empty()
    }

    /// Appends ` AND ...` clauses for every SQL-expressible field.
    pub(crate) fn push_sql(&self, sql: &mut String, binds: &mut Vec<Value>) {
        let mut int_cmp = |sql: &mut String, op: &str, value: Option<i32>| {
            if let Some(value) = value {
                sql.push_str(&format!(" AND p.year {op} ?"));
                binds.push(Value::Integer(i64::from(value)));
            }
        };
        int_cmp(sql, "=", self.year);
        int_cmp(sql, ">=", self.year_gte);
        int_cmp(sql, "<=", self.year_lte);
        int_cmp(sql, ">", self.year_gt);
        int_cmp(sql, "<", self.year_lt);

        for (column, op, value) in [
            ("p.prj_date0", ">=", self.prj_date0_gte),
            ("p.prj_date0", "<=", self.prj_date0_lte),
            ("p.prj_date1", ">=", self.prj_date1_gte),
            ("p.prj_date1", "<=", self.prj_date1_lte),
        ] {
            if let Some(date) = value {
                sql.push_str(&format!(" AND {column} {op} ?"));
                binds.push(Value::Text(date_to_db(date)));
            }
        }

        push_in(sql, binds, "p.prj_cd", &self.prj_cd, false);
        push_in(sql, binds, "p.prj_cd", &self.prj_cd_not, true);
        push_like(sql, binds, "p.prj_cd", self.prj_cd_like.as_deref(), false);
        push_like(sql, binds, "p.prj_cd", self.prj_cd_not_like.as_deref(), true);
        push_suffixes(sql, binds, &self.prj_cd_endswith, false);
        push_suffixes(sql, binds, &self.prj_cd_not_endswith, true);
        push_like(sql, binds, "p.prj_nm", self.prj_nm_like.as_deref(), false);
        push_like(sql, binds, "p.prj_nm", self.prj_nm_not_like.as_deref(), true);
        push_in(sql, binds, "p.prj_ldr", &self.prj_ldr, false);
        push_in(sql, binds, "l.abbrev", &self.lake, false);
        push_in(sql, binds, "l.abbrev", &self.lake_not, true);
        push_in(sql, binds, "pr.abbrev", &self.protocol, false);
        if !self.protocol_not.is_empty() {
            sql.push_str(" AND (pr.abbrev IS NULL OR pr.abbrev NOT IN (");
            push_placeholders(sql, binds, &self.protocol_not);
            sql.push_str("))");
        }
        if !self.project_type_ids.is_empty() {
            let marks = vec!["?"; self.project_type_ids.len()].join(", ");
            sql.push_str(&format!(" AND p.project_type_id IN ({marks})"));
            binds.extend(self.project_type_ids.iter().copied().map(Value::Integer));
        }
        push_in(sql, binds, "pt.scope", &self.scope, false);
        push_in(sql, binds, "p.owner", &self.owners, false);

        if let Some(status) = self.status {
            let (approved, signed_off) = match status {
                ProjectStatus::Submitted => (false, false),
                ProjectStatus::Approved => (true, false),
                ProjectStatus::Complete => (true, true),
            };
            push_completion(sql, binds, APPROVED_LABEL, approved);
            push_completion(sql, binds, SIGNOFF_LABEL, signed_off);
        }

        if let Some(tag) = &self.tag {
            sql.push_str(
                " AND EXISTS (
                    SELECT 1 FROM project_tags ptg
                    JOIN tags t ON t.id = ptg.tag_id
                    WHERE ptg.project_uuid = p.uuid AND t.name = ?
                )",
            );
            binds.push(Value::Text(tag.trim().to_lowercase()));
        }
    }
}

fn push_placeholders(sql: &mut String, binds: &mut Vec<Value>, values: &[String]) {
    let marks = vec!["?"; values.len()].join(", ");
    sql.push_str(&marks);
    binds.extend(values.iter().cloned().map(Value::Text));
}

fn push_in(sql: &mut String, binds: &mut Vec<Value>, column: &str, values: &[String], negate: bool) {
    if values.is_empty() {
        return;
    }
    let op = if negate { "NOT IN" } else { "IN" };
    sql.push_str(&format!(" AND {column} {op} ("));
    push_placeholders(sql, binds, values);
    sql.push(')');
}

fn push_like(
    sql: &mut String,
    binds: &mut Vec<Value>,
    column: &str,
    pattern: Option<&str>,
    negate: bool,
) {
    let Some(pattern) = pattern else {
        return;
    };
    let op = if negate { "NOT LIKE" } else { "LIKE" };
    sql.push_str(&format!(" AND {column} {op} ? ESCAPE '\\'"));
    binds.push(Value::Text(format!("%{}%", escape_like(pattern))));
}

fn push_suffixes(sql: &mut String, binds: &mut Vec<Value>, suffixes: &[String], negate: bool) {
    if suffixes.is_empty() {
        return;
    }
    let clauses = vec!["p.prj_cd LIKE ? ESCAPE '\\'"; suffixes.len()].join(" OR ");
    if negate {
        sql.push_str(&format!(" AND NOT ({clauses})"));
    } else {
        sql.push_str(&format!(" AND ({clauses})"));
    }
    binds.extend(
        suffixes
            .iter()
            .map(|suffix| Value::Text(format!("%{}", escape_like(suffix)))),
    );
}

fn push_completion(sql: &mut String, binds: &mut Vec<Value>, label: &str, completed: bool) {
    let prefix = if completed { "EXISTS" } else { "NOT EXISTS" };
    sql.push_str(&format!(
        " AND {prefix} (
            SELECT 1 FROM project_milestones pms
            JOIN milestones ms ON ms.id = pms.milestone_id
            WHERE pms.project_uuid = p.uuid
              AND ms.label = ?
              AND pms.completed IS NOT NULL
        )"
    ));
    binds.push(Value::Text(label.to_string()));
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_adds_nothing() {
        let mut sql = String::new();
        let mut binds = Vec::new();
        ProjectFilter::default().push_sql(&mut sql, &mut binds);
        assert!(sql.is_empty());
        assert!(binds.is_empty());
    }

    #[test]
    fn list_filters_bind_every_value() {
        let filter = ProjectFilter {
            lake: vec!["HU".to_string(), "ER".to_string()],
            project_type_ids: vec![3, 4],
            prj_cd_endswith: vec!["_001".to_string()],
            ..ProjectFilter::default()
        };
        let mut sql = String::new();
        let mut binds = Vec::new();
        filter.push_sql(&mut sql, &mut binds);

        assert!(sql.contains("l.abbrev IN (?, ?)"));
        assert!(sql.contains("p.project_type_id IN (?, ?)"));
        assert_eq!(binds.len(), 5);
        assert_eq!(binds[0], Value::Text("%\\_001".to_string()));
        assert_eq!(binds[3], Value::Integer(3));
    }
}
