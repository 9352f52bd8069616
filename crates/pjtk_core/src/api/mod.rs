//! Read-only projections served over HTTP.
//!
//! # Responsibility
//! - Decode list filters from URL query parameters.
//! - Shape projects, points, polygons, reports and files into API records.
//! - Paginate list results.
//!
//! # Invariants
//! - Nothing here writes to the database.
//! - Geometry filters apply after the SQL filters, against sample points.

use crate::model::lookup::ProjectType;
use crate::model::project::Project;
use crate::repo::lookup_repo::{LookupRepository, SqliteLookupRepository};
use crate::repo::project_repo::{ProjectRepository, SqliteProjectRepository};
use crate::repo::report_repo::{FileListing, ReportListing, ReportRepository, SqliteReportRepository};
use crate::repo::user_repo::{SqliteUserRepository, UserRepository};
use crate::repo::RepoError;
use crate::service::spatial_service::{RoiMode, SqliteSpatialService};
use crate::service::ServiceError;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod projection;
pub mod query;

pub use projection::{
    PointView, PolygonView, ProjectAbstract, ProjectLead, ProjectSummary, ProjectTypeView,
    API_PREFIX,
};
pub use query::QueryParams;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// Malformed query parameter or request body.
    BadRequest(String),
    NotFound(String),
    Service(ServiceError),
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::NotFound(_) => 404,
            Self::Service(_) => 500,
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(message) => write!(f, "bad request: {message}"),
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::Service(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Service(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(value: ServiceError) -> Self {
        match value {
            ServiceError::ProjectNotFound(slug) => Self::NotFound(format!("project {slug}")),
            ServiceError::Geometry(err) => Self::BadRequest(err.to_string()),
            ServiceError::Validation(err) => Self::BadRequest(err.to_string()),
            other => Self::Service(other),
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(value: RepoError) -> Self {
        Self::from(ServiceError::from(value))
    }
}

/// Page size class of a list endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    Standard,
    Large,
}

impl PageSize {
    pub fn default_size(self) -> usize {
        match self {
            Self::Standard => 50,
            Self::Large => 1000,
        }
    }

    pub fn max_size(self) -> usize {
        match self {
            Self::Standard => 500,
            Self::Large => 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Total number of matching records.
    pub count: usize,
    pub page: usize,
    pub page_size: usize,
    pub next: Option<usize>,
    pub previous: Option<usize>,
    pub results: Vec<T>,
}

/// Slices `items` according to the `page` (1-based) and `page_size` params.
///
/// `page_size` is capped at the class maximum. A page past the end is
/// `NotFound`, except page 1 of an empty list.
pub fn paginate<T>(items: Vec<T>, params: &QueryParams, size: PageSize) -> ApiResult<Page<T>> {
    let page = params.number::<usize>("page")?.unwrap_or(1);
    if page == 0 {
        return Err(ApiError::NotFound("invalid page 0".to_string()));
    }
    let page_size = params
        .number::<usize>("page_size")?
        .unwrap_or_else(|| size.default_size())
        .clamp(1, size.max_size());

    let count = items.len();
    let pages = count.div_ceil(page_size).max(1);
    if page > pages {
        return Err(ApiError::NotFound(format!("invalid page {page}")));
    }

    let results: Vec<T> = items
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .collect();
    Ok(Page {
        count,
        page,
        page_size,
        next: (page < pages).then_some(page + 1),
        previous: (page > 1).then_some(page - 1),
        results,
    })
}

/// Query surface backing every `/api/v1` endpoint.
pub struct ReadApi<'conn> {
    conn: &'conn Connection,
}

impl<'conn> ReadApi<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn spatial(&self) -> SqliteSpatialService<'conn> {
        SqliteSpatialService::with_connection(self.conn)
    }

    pub fn projects(&self, params: &QueryParams) -> ApiResult<Page<ProjectSummary>> {
        let filter = params.project_filter()?;
        let projects = self.spatial().filter_projects(&filter)?;
        let summaries = self.summaries(&projects)?;
        paginate(summaries, params, PageSize::Standard)
    }

    pub fn project(&self, slug: &str) -> ApiResult<ProjectSummary> {
        let project = self.find_project(slug)?;
        let mut summaries = self.summaries(std::slice::from_ref(&project))?;
        summaries
            .pop()
            .ok_or_else(|| ApiError::NotFound(format!("project {slug}")))
    }

    /// Active projects, newest year first, then by type and name.
    pub fn project_abstracts(&self, params: &QueryParams) -> ApiResult<Page<ProjectAbstract>> {
        let filter = params.project_filter()?;
        let types = self.project_type_names()?;
        let mut leads = LeadCache::new(self.conn);
        let mut abstracts = Vec::new();
        for project in self.spatial().filter_projects(&filter)? {
            if !project.active {
                continue;
            }
            let leader = leads.lead(&project.prj_ldr)?;
            let leader_name = format!("{} {}", leader.first_name, leader.last_name);
            abstracts.push(ProjectAbstract::new(
                &project,
                type_name(&types, &project),
                leader_name.trim(),
            ));
        }
        abstracts.sort_by(|a, b| {
            b.year
                .cmp(&a.year)
                .then_with(|| a.project_type.cmp(&b.project_type))
                .then_with(|| a.prj_nm.cmp(&b.prj_nm))
        });
        paginate(abstracts, params, PageSize::Standard)
    }

    pub fn project_leads(&self, params: &QueryParams) -> ApiResult<Page<ProjectLead>> {
        let leads = SqliteUserRepository::new(self.conn)
            .project_leads()?
            .iter()
            .map(ProjectLead::from)
            .collect();
        paginate(leads, params, PageSize::Standard)
    }

    pub fn project_types(&self, params: &QueryParams) -> ApiResult<Page<ProjectTypeView>> {
        let types = SqliteLookupRepository::new(self.conn)
            .list_project_types()?
            .iter()
            .map(ProjectTypeView::from)
            .collect();
        paginate(types, params, PageSize::Standard)
    }

    /// Every sample point of one project, unpaginated.
    pub fn project_points(&self, slug: &str) -> ApiResult<Vec<PointView>> {
        let project = self.find_project(slug)?;
        let types = self.project_type_names()?;
        let project_type = type_name(&types, &project);
        Ok(self
            .spatial()
            .project_points(&project.slug)?
            .iter()
            .map(|point| PointView::from_sample(&project, project_type, point))
            .collect())
    }

    /// Zero or one polygon rows.
    pub fn project_polygon(&self, slug: &str) -> ApiResult<Vec<PolygonView>> {
        let project = self.find_project(slug)?;
        Ok(self
            .spatial()
            .project_polygon(&project.slug)?
            .map(|geom| PolygonView {
                prj_cd: project.prj_cd.clone(),
                geom,
            })
            .into_iter()
            .collect())
    }

    pub fn points_roi(
        &self,
        how: RoiMode,
        roi: Option<&str>,
        params: &QueryParams,
    ) -> ApiResult<Vec<PointView>> {
        let roi = roi
            .map(str::trim)
            .filter(|roi| !roi.is_empty())
            .ok_or_else(|| ApiError::NotFound("region of interest".to_string()))?;
        let query = params.roi_query(how)?;
        Ok(self
            .spatial()
            .points_roi(roi, &query)?
            .into_iter()
            .map(PointView::from)
            .collect())
    }

    pub fn sample_points(&self, params: &QueryParams) -> ApiResult<Page<PointView>> {
        let filter = params.project_filter()?;
        let points = self
            .spatial()
            .sample_points(&filter)?
            .into_iter()
            .map(PointView::from)
            .collect();
        paginate(points, params, PageSize::Large)
    }

    /// Current reports only.
    pub fn reports(&self, params: &QueryParams) -> ApiResult<Page<ReportListing>> {
        let filter = params.report_filter()?;
        let reports = SqliteReportRepository::new(self.conn).list_reports(&filter)?;
        let reports = self.spatial().retain_spatial(
            reports,
            &filter.project.spatial,
            |report| report.project_uuid,
        )?;
        paginate(reports, params, PageSize::Large)
    }

    /// Current associated files only.
    pub fn associated_files(&self, params: &QueryParams) -> ApiResult<Page<FileListing>> {
        let filter = params.project_filter()?;
        let files = SqliteReportRepository::new(self.conn).list_associated_files(&filter)?;
        let files = self
            .spatial()
            .retain_spatial(files, &filter.spatial, |file| file.project_uuid)?;
        paginate(files, params, PageSize::Large)
    }

    fn find_project(&self, slug: &str) -> ApiResult<Project> {
        let slug = slug.trim().to_lowercase();
        SqliteProjectRepository::new(self.conn)
            .get_project(&slug)?
            .ok_or_else(|| ApiError::NotFound(format!("project {slug}")))
    }

    fn summaries(&self, projects: &[Project]) -> ApiResult<Vec<ProjectSummary>> {
        let types = self.project_type_names()?;
        let mut leads = LeadCache::new(self.conn);
        projects
            .iter()
            .map(|project| {
                let leader = leads.lead(&project.prj_ldr)?;
                Ok(ProjectSummary::new(
                    project,
                    type_name(&types, project),
                    leader,
                ))
            })
            .collect()
    }

    fn project_type_names(&self) -> ApiResult<HashMap<i64, ProjectType>> {
        Ok(SqliteLookupRepository::new(self.conn)
            .list_project_types()?
            .into_iter()
            .map(|project_type| (project_type.id, project_type))
            .collect())
    }
}

fn type_name<'a>(types: &'a HashMap<i64, ProjectType>, project: &Project) -> &'a str {
    types
        .get(&project.project_type_id)
        .map_or("", |project_type| project_type.project_type.as_str())
}

struct LeadCache<'conn> {
    users: SqliteUserRepository<'conn>,
    seen: HashMap<String, ProjectLead>,
}

impl<'conn> LeadCache<'conn> {
    fn new(conn: &'conn Connection) -> Self {
        Self {
            users: SqliteUserRepository::new(conn),
            seen: HashMap::new(),
        }
    }

    fn lead(&mut self, username: &str) -> ApiResult<ProjectLead> {
        if let Some(lead) = self.seen.get(username) {
            return Ok(lead.clone());
        }
        let lead = match self.users.get_user(username)? {
            Some(user) => ProjectLead::from(&user),
            None => ProjectLead::unknown(username),
        };
        self.seen.insert(username.to_string(), lead.clone());
        Ok(lead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_links() {
        let items: Vec<u32> = (0..120).collect();
        let page = paginate(items, &QueryParams::new().with("page", "2"), PageSize::Standard)
            .unwrap();
        assert_eq!(page.count, 120);
        assert_eq!(page.page_size, 50);
        assert_eq!(page.results.first(), Some(&50));
        assert_eq!(page.next, Some(3));
        assert_eq!(page.previous, Some(1));
    }

    #[test]
    fn page_size_is_capped() {
        let items: Vec<u32> = (0..10).collect();
        let params = QueryParams::new().with("page_size", "100000");
        let page = paginate(items, &params, PageSize::Large).unwrap();
        assert_eq!(page.page_size, 5000);
        assert_eq!(page.results.len(), 10);
        assert_eq!(page.next, None);
    }

    #[test]
    fn empty_list_has_a_first_page_only() {
        let page = paginate(Vec::<u32>::new(), &QueryParams::new(), PageSize::Standard).unwrap();
        assert_eq!(page.count, 0);
        assert!(page.results.is_empty());

        let err = paginate(
            Vec::<u32>::new(),
            &QueryParams::new().with("page", "2"),
            PageSize::Standard,
        )
        .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
