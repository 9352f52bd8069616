//! Request routing for the read-only API.
//!
//! # Responsibility
//! - Map a method and URL under `/api/v1` to one `ReadApi` call.
//! - Decode query strings and form bodies into `QueryParams`.
//! - Render results and failures as JSON with an HTTP status.
//!
//! # Invariants
//! - Only `GET` is accepted, plus `POST` on the region-of-interest routes.
//! - A trailing slash is optional on every route.
//! - Bodies larger than `MAX_BODY_BYTES` are refused with 413 before routing.

use pjtk_core::api::{ApiError, QueryParams, ReadApi, API_PREFIX};
use pjtk_core::service::spatial_service::RoiMode;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::borrow::Cow;
use std::io::{self, Read};
use tiny_http::Method;

/// Upper bound on a request body; a form-encoded ROI fits well inside.
pub const MAX_BODY_BYTES: u64 = 512 * 1024;

#[derive(Debug)]
pub enum BodyError {
    TooLarge,
    Unreadable(io::Error),
}

/// Reads at most `MAX_BODY_BYTES` of a request body as UTF-8.
pub fn read_body(reader: impl Read) -> Result<String, BodyError> {
    let mut bytes = Vec::new();
    reader
        .take(MAX_BODY_BYTES + 1)
        .read_to_end(&mut bytes)
        .map_err(BodyError::Unreadable)?;
    if bytes.len() as u64 > MAX_BODY_BYTES {
        return Err(BodyError::TooLarge);
    }
    String::from_utf8(bytes)
        .map_err(|err| BodyError::Unreadable(io::Error::new(io::ErrorKind::InvalidData, err)))
}

/// Status and JSON body for a request whose body could not be read.
pub fn body_failure(err: &BodyError) -> (u16, Value) {
    match err {
        BodyError::TooLarge => (
            413,
            json!({ "detail": format!("Request body exceeds {MAX_BODY_BYTES} bytes.") }),
        ),
        BodyError::Unreadable(err) => (400, json!({ "detail": format!("Unreadable body: {err}") })),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Projects,
    Project(String),
    ProjectAbstracts,
    ProjectLeads,
    ProjectTypes,
    ProjectPoints(String),
    ProjectPolygon(String),
    SamplePoints,
    PointsRoi(RoiMode),
    Reports,
    AssociatedFiles,
}

impl Route {
    /// Resolves the path part of a request URL, without its query string.
    pub fn parse(path: &str) -> Option<Self> {
        let rest = path.strip_prefix(API_PREFIX)?;
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        let route = match segments.as_slice() {
            ["projects"] => Self::Projects,
            ["projects", slug] => Self::Project(slug.to_lowercase()),
            ["project_abstracts"] => Self::ProjectAbstracts,
            ["project_leads"] => Self::ProjectLeads,
            ["project_types"] => Self::ProjectTypes,
            ["project_points", slug] => Self::ProjectPoints(slug.to_lowercase()),
            ["project_polygon", slug] => Self::ProjectPolygon(slug.to_lowercase()),
            ["sample_points"] => Self::SamplePoints,
            ["points_in_roi"] => Self::PointsRoi(RoiMode::PointsIn),
            ["project_points_contained_in_roi"] => Self::PointsRoi(RoiMode::Contained),
            ["project_points_overlapping_roi"] => Self::PointsRoi(RoiMode::Overlapping),
            ["reports"] => Self::Reports,
            ["associated_files"] => Self::AssociatedFiles,
            _ => return None,
        };
        Some(route)
    }

    fn accepts(&self, method: &Method) -> bool {
        match self {
            Self::PointsRoi(_) => matches!(method, Method::Get | Method::Post),
            _ => matches!(method, Method::Get),
        }
    }
}

/// Decodes `a=1&b=two+words` pairs. Undecodable pairs are dropped.
pub fn parse_query(query: &str) -> QueryParams {
    QueryParams::from_pairs(query.split('&').filter_map(|pair| {
        if pair.is_empty() {
            return None;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        Some((decode(key)?, decode(value)?))
    }))
}

fn decode(text: &str) -> Option<String> {
    let spaced: Cow<'_, str> = if text.contains('+') {
        Cow::Owned(text.replace('+', " "))
    } else {
        Cow::Borrowed(text)
    };
    urlencoding::decode(&spaced).ok().map(Cow::into_owned)
}

/// Handles one request; returns the status code and JSON body.
pub fn handle(conn: &Connection, method: &Method, url: &str, body: &str) -> (u16, Value) {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let Some(route) = Route::parse(path) else {
        return (404, json!({ "detail": "Not found." }));
    };
    if !route.accepts(method) {
        return (405, json!({ "detail": format!("Method \"{method}\" not allowed.") }));
    }

    let params = parse_query(query);
    match dispatch(&ReadApi::new(conn), &route, &params, body) {
        Ok(value) => (200, value),
        Err(err) => {
            let status = err.status_code();
            if status >= 500 {
                log::error!("event=api_request module=api status=error path={path} error={err}");
            }
            (status, json!({ "detail": err.to_string() }))
        }
    }
}

fn dispatch(
    api: &ReadApi<'_>,
    route: &Route,
    params: &QueryParams,
    body: &str,
) -> Result<Value, ApiError> {
    let value = match route {
        Route::Projects => to_json(api.projects(params)?)?,
        Route::Project(slug) => to_json(api.project(slug)?)?,
        Route::ProjectAbstracts => to_json(api.project_abstracts(params)?)?,
        Route::ProjectLeads => to_json(api.project_leads(params)?)?,
        Route::ProjectTypes => to_json(api.project_types(params)?)?,
        Route::ProjectPoints(slug) => to_json(api.project_points(slug)?)?,
        Route::ProjectPolygon(slug) => to_json(api.project_polygon(slug)?)?,
        Route::SamplePoints => to_json(api.sample_points(params)?)?,
        Route::PointsRoi(how) => {
            let form = parse_query(body.trim());
            let roi = params.get("roi").or_else(|| form.get("roi"));
            to_json(api.points_roi(*how, roi, params)?)?
        }
        Route::Reports => to_json(api.reports(params)?)?,
        Route::AssociatedFiles => to_json(api.associated_files(params)?)?,
    };
    Ok(value)
}

fn to_json<T: serde::Serialize>(value: T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|err| ApiError::BadRequest(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pjtk_core::model::employee::{Actor, Role, User};
    use pjtk_core::repo::lookup_repo::{LookupRepository, SqliteLookupRepository};
    use pjtk_core::repo::user_repo::{SqliteUserRepository, UserRepository};
    use pjtk_core::{open_db_in_memory, ProjectDraft, ProjectService};
    use pretty_assertions::assert_eq;

    fn seeded() -> Connection {
        let conn = open_db_in_memory().unwrap();
        SqliteUserRepository::new(&conn)
            .create_user(&User::new("alice", "Alice", "Angler"))
            .unwrap();
        let lookups = SqliteLookupRepository::new(&conn);
        let lake = lookups.create_lake("HU", "Lake Huron", None).unwrap();
        let project_type = lookups
            .create_project_type("Offshore Index", "multi-lake", true)
            .unwrap();
        let draft = ProjectDraft {
            prj_cd: "LHA_IA12_001".to_string(),
            prj_nm: "Offshore Index".to_string(),
            prj_date0: NaiveDate::from_ymd_opt(2012, 5, 1).unwrap(),
            prj_date1: NaiveDate::from_ymd_opt(2012, 9, 30).unwrap(),
            prj_ldr: "alice".to_string(),
            field_ldr: None,
            owner: None,
            dba: None,
            project_type_id: project_type,
            protocol_id: None,
            lake_id: lake,
            abstract_text: String::new(),
            comment: String::new(),
            risk: String::new(),
            tags: Vec::new(),
            project_team: Vec::new(),
        };
        ProjectService::with_connection(&conn)
            .create_project(&Actor::new("alice", Role::Employee), &draft)
            .unwrap();
        conn
    }

    #[test]
    fn routes_resolve_with_or_without_trailing_slash() {
        assert_eq!(Route::parse("/api/v1/projects/"), Some(Route::Projects));
        assert_eq!(Route::parse("/api/v1/projects"), Some(Route::Projects));
        assert_eq!(
            Route::parse("/api/v1/project_points/LHA_IA12_001/"),
            Some(Route::ProjectPoints("lha_ia12_001".to_string()))
        );
        assert_eq!(
            Route::parse("/api/v1/project_points_overlapping_roi/"),
            Some(Route::PointsRoi(RoiMode::Overlapping))
        );
        assert_eq!(Route::parse("/api/v2/projects/"), None);
        assert_eq!(Route::parse("/api/v1/projects/a/b/"), None);
    }

    #[test]
    fn query_strings_are_percent_decoded() {
        let params = parse_query("lake=HU%2CER&prj_nm__like=offshore+index&flag");
        assert_eq!(params.get("lake"), Some("HU,ER"));
        assert_eq!(params.get("prj_nm__like"), Some("offshore index"));
        assert_eq!(params.get("flag"), None);
    }

    #[test]
    fn handler_maps_results_and_errors_to_status_codes() {
        let conn = seeded();

        let (status, body) = handle(&conn, &Method::Get, "/api/v1/projects/?year=2012", "");
        assert_eq!(status, 200);
        assert_eq!(body["count"], 1);

        let (status, _) = handle(&conn, &Method::Get, "/api/v1/projects/?year=soon", "");
        assert_eq!(status, 400);

        let (status, _) = handle(&conn, &Method::Get, "/api/v1/projects/lha_zz99_999/", "");
        assert_eq!(status, 404);

        let (status, _) = handle(&conn, &Method::Post, "/api/v1/projects/", "");
        assert_eq!(status, 405);

        let (status, _) = handle(&conn, &Method::Get, "/nowhere", "");
        assert_eq!(status, 404);
    }

    #[test]
    fn roi_can_arrive_in_a_form_body() {
        let conn = seeded();
        let (status, _) = handle(&conn, &Method::Post, "/api/v1/points_in_roi/", "");
        assert_eq!(status, 404);

        let body = "roi=POLYGON((-83.5+43.5,-81.5+43.5,-81.5+45.5,-83.5+45.5,-83.5+43.5))";
        let (status, points) = handle(&conn, &Method::Post, "/api/v1/points_in_roi/", body);
        assert_eq!(status, 200);
        assert_eq!(points, json!([]));
    }

    #[test]
    fn deeply_nested_roi_is_ignored_or_rejected() {
        let conn = seeded();
        let nested = format!("POLYGON{}0+0{}", "(".repeat(10_000), ")".repeat(10_000));

        let url = format!("/api/v1/sample_points/?within__roi={nested}");
        let (status, _) = handle(&conn, &Method::Get, &url, "");
        assert_eq!(status, 200);

        let body = format!("roi={nested}");
        let (status, _) = handle(&conn, &Method::Post, "/api/v1/points_in_roi/", &body);
        assert_eq!(status, 400);
    }

    #[test]
    fn oversized_bodies_are_refused() {
        let roi = "roi=POINT(1 2)";
        assert_eq!(read_body(roi.as_bytes()).unwrap(), roi);

        let huge = vec![b'a'; MAX_BODY_BYTES as usize + 1];
        let err = read_body(huge.as_slice()).unwrap_err();
        assert!(matches!(err, BodyError::TooLarge));
        assert_eq!(body_failure(&err).0, 413);

        let exact = vec![b'a'; MAX_BODY_BYTES as usize];
        assert_eq!(read_body(exact.as_slice()).unwrap().len(), exact.len());
    }
}
