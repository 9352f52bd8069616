//! Command handlers.
//!
//! # Responsibility
//! - Resolve names given on the command line (users, lakes, milestone
//!   labels) into the ids the core services expect.
//! - Run one core use-case per command and return its result as JSON.
//!
//! # Invariants
//! - Handlers never print; `main` owns stdout.
//! - Commands that change data act as the `--as` user and fail without one.

use crate::cli::{
    Commands, LookupCommands, MilestoneCommands, PointCommands, ProjectArgs, ProjectCommands,
    ReportCommands, SearchArgs, SisterCommands, UserCommands,
};
use pjtk_core::geo::Envelope;
use pjtk_core::model::milestone::MilestoneId;
use pjtk_core::model::spatial::UploadMode;
use pjtk_core::repo::lookup_repo::{LookupRepository, SqliteLookupRepository};
use pjtk_core::repo::milestone_repo::{MilestoneRepository, SqliteMilestoneRepository};
use pjtk_core::repo::user_repo::{SqliteUserRepository, UserRepository};
use pjtk_core::service::employee_service::EmployeeService;
use pjtk_core::service::notice_service::NoticeService;
use pjtk_core::service::spatial_service::{RoiQuery, SqliteSpatialService};
use pjtk_core::{
    search_projects, Actor, ConfigError, DbError, Employee, LoggingError, MilestoneService,
    ProjectDraft, ProjectFilter, ProjectService, ReportService, SearchError, SearchQuery,
    ServiceError, SisterService, User,
};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub enum CliError {
    /// Bad or missing command-line input.
    Usage(String),
    Config(ConfigError),
    Logging(LoggingError),
    Db(DbError),
    Service(ServiceError),
    Search(SearchError),
    Read { path: PathBuf, source: std::io::Error },
    Json(serde_json::Error),
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Usage(message) => write!(f, "{message}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::Logging(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Service(err) => write!(f, "{err}"),
            Self::Search(err) => write!(f, "{err}"),
            Self::Read { path, source } => write!(f, "cannot read {}: {source}", path.display()),
            Self::Json(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Usage(_) => None,
            Self::Config(err) => Some(err),
            Self::Logging(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Service(err) => Some(err),
            Self::Search(err) => Some(err),
            Self::Read { source, .. } => Some(source),
            Self::Json(err) => Some(err),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<LoggingError> for CliError {
    fn from(value: LoggingError) -> Self {
        Self::Logging(value)
    }
}

impl From<DbError> for CliError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<ServiceError> for CliError {
    fn from(value: ServiceError) -> Self {
        Self::Service(value)
    }
}

impl From<pjtk_core::RepoError> for CliError {
    fn from(value: pjtk_core::RepoError) -> Self {
        Self::Service(value.into())
    }
}

impl From<SearchError> for CliError {
    fn from(value: SearchError) -> Self {
        Self::Search(value)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Runs one command against an open database.
pub fn dispatch(command: Commands, conn: &Connection, actor: Option<&str>) -> CliResult<Value> {
    match command {
        Commands::Init => {
            let created = MilestoneService::with_connection(conn).install_default_milestones()?;
            Ok(json!({ "milestones_created": created }))
        }
        Commands::User { action } => user(action, conn),
        Commands::Lookup { action } => lookup(action, conn),
        Commands::Project { action } => project(action, conn, actor),
        Commands::Milestone { action } => milestone(action, conn, actor),
        Commands::Sister { action } => sister(action, conn),
        Commands::Report { action } => report(action, conn, actor),
        Commands::Points { action } => points(action, conn, actor),
        Commands::Search(args) => search(&args, conn),
        Commands::Notices { all, read } => {
            let actor = resolve_actor(conn, actor)?;
            let notices = NoticeService::with_connection(conn);
            if let Some(message_id) = read {
                notices.mark_message_as_read(&actor.username, message_id)?;
            }
            Ok(serde_json::to_value(
                notices.my_messages(&actor.username, all)?,
            )?)
        }
    }
}

/// The acting user with the role of their employee profile.
pub fn resolve_actor(conn: &Connection, username: Option<&str>) -> CliResult<Actor> {
    let username = username
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| CliError::Usage("this command needs --as <username>".to_string()))?;
    let users = SqliteUserRepository::new(conn);
    let user = users
        .get_user(username)?
        .ok_or_else(|| CliError::Usage(format!("unknown user `{username}`")))?;
    let employee = users.get_employee(username)?;
    Ok(Actor::from_parts(&user, employee.as_ref()))
}

fn user(action: UserCommands, conn: &Connection) -> CliResult<Value> {
    match action {
        UserCommands::Add {
            username,
            first_name,
            last_name,
            email,
            role,
            supervisor,
        } => {
            let users = SqliteUserRepository::new(conn);
            let mut user = User::new(username.as_str(), &first_name, &last_name);
            user.email = email;
            users.create_user(&user)?;
            let employee = Employee {
                username,
                role: role.into(),
                supervisor,
            };
            users.upsert_employee(&employee)?;
            Ok(serde_json::to_value(employee)?)
        }
        UserCommands::Supervisors { username } => Ok(serde_json::to_value(
            EmployeeService::with_connection(conn).get_supervisors(&username)?,
        )?),
        UserCommands::Minions { username } => Ok(serde_json::to_value(
            EmployeeService::with_connection(conn).get_minions(&username)?,
        )?),
    }
}

fn lookup(action: LookupCommands, conn: &Connection) -> CliResult<Value> {
    let lookups = SqliteLookupRepository::new(conn);
    match action {
        LookupCommands::AddLake {
            abbrev,
            name,
            bounds,
        } => {
            let envelope = bounds.as_deref().map(parse_bounds).transpose()?;
            let id = lookups.create_lake(&abbrev, &name, envelope)?;
            Ok(json!({ "id": id, "abbrev": abbrev, "lake_name": name }))
        }
        LookupCommands::AddProjectType {
            name,
            scope,
            field_component,
        } => {
            let id = lookups.create_project_type(&name, &scope, field_component)?;
            Ok(json!({ "id": id, "project_type": name }))
        }
        LookupCommands::AddProtocol { abbrev, name } => {
            let id = lookups.create_protocol(&name, &abbrev)?;
            Ok(json!({ "id": id, "abbrev": abbrev, "protocol": name }))
        }
        LookupCommands::List => Ok(json!({
            "lakes": lookups.list_lakes()?,
            "project_types": lookups.list_project_types()?,
            "protocols": lookups.list_protocols()?,
        })),
    }
}

fn project(action: ProjectCommands, conn: &Connection, actor: Option<&str>) -> CliResult<Value> {
    let projects = ProjectService::with_connection(conn);
    let milestones = MilestoneService::with_connection(conn);
    match action {
        ProjectCommands::Create(args) => {
            let actor = resolve_actor(conn, actor)?;
            let draft = project_draft(conn, &actor, args)?;
            Ok(serde_json::to_value(projects.create_project(&actor, &draft)?)?)
        }
        ProjectCommands::Copy { slug, prj_cd } => {
            let actor = resolve_actor(conn, actor)?;
            let mut draft = projects.get_project(&slug)?.to_draft();
            draft.prj_cd = prj_cd.trim().to_uppercase();
            Ok(serde_json::to_value(
                projects.copy_project(&actor, &slug, &draft)?,
            )?)
        }
        ProjectCommands::Show { slug } => {
            let project = projects.get_project(&slug)?;
            Ok(json!({
                "project": project,
                "tags": projects.project_tags(&slug)?,
                "team": projects.project_team(&slug)?,
                "approved": milestones.milestone_complete(&slug, pjtk_core::model::milestone::APPROVED_LABEL)?,
                "signed_off": milestones.milestone_complete(&slug, pjtk_core::model::milestone::SIGNOFF_LABEL)?,
            }))
        }
        ProjectCommands::List {
            year,
            lake,
            status,
            tag,
        } => {
            let filter = ProjectFilter {
                year,
                lake: lake.into_iter().map(|abbrev| abbrev.to_uppercase()).collect(),
                status: status.map(Into::into),
                tag,
                ..ProjectFilter::default()
            };
            Ok(serde_json::to_value(projects.list_projects(&filter)?)?)
        }
        ProjectCommands::Approve { slugs } | ProjectCommands::Unapprove { slugs }
            if slugs.is_empty() =>
        {
            Err(CliError::Usage("name at least one project".to_string()))
        }
        ProjectCommands::Approve { slugs } => {
            let actor = resolve_actor(conn, actor)?;
            let changes: Vec<(String, bool)> = slugs.into_iter().map(|slug| (slug, true)).collect();
            milestones.approve_projects(&actor, &changes)?;
            Ok(json!({ "approved": changes.len() }))
        }
        ProjectCommands::Unapprove { slugs } => {
            let actor = resolve_actor(conn, actor)?;
            let changes: Vec<(String, bool)> =
                slugs.into_iter().map(|slug| (slug, false)).collect();
            milestones.approve_projects(&actor, &changes)?;
            Ok(json!({ "unapproved": changes.len() }))
        }
        ProjectCommands::Signoff { slug } => {
            let actor = resolve_actor(conn, actor)?;
            milestones.signoff(&actor, &slug)?;
            Ok(json!({ "signed_off": slug }))
        }
        ProjectCommands::Tag { slug, tags } => {
            let actor = resolve_actor(conn, actor)?;
            projects.set_tags(&actor, &slug, &tags)?;
            Ok(serde_json::to_value(projects.project_tags(&slug)?)?)
        }
        ProjectCommands::Bookmark { slug, remove } => {
            let actor = resolve_actor(conn, actor)?;
            if remove {
                projects.unbookmark(&actor, &slug)?;
            } else {
                projects.bookmark(&actor, &slug)?;
            }
            Ok(serde_json::to_value(projects.bookmarks(&actor.username)?)?)
        }
        ProjectCommands::Mine { employee } => {
            let actor = resolve_actor(conn, actor)?;
            let overview = match employee {
                Some(username) => projects.employee_projects(&actor, &username)?,
                None => projects.my_projects(&actor)?,
            };
            Ok(serde_json::to_value(overview)?)
        }
    }
}

fn project_draft(conn: &Connection, actor: &Actor, args: ProjectArgs) -> CliResult<ProjectDraft> {
    let lookups = SqliteLookupRepository::new(conn);
    let lake = lookups
        .list_lakes()?
        .into_iter()
        .find(|lake| lake.abbrev.eq_ignore_ascii_case(&args.lake))
        .ok_or_else(|| CliError::Usage(format!("unknown lake `{}`", args.lake)))?;
    let project_type = lookups
        .list_project_types()?
        .into_iter()
        .find(|t| t.project_type.eq_ignore_ascii_case(&args.project_type))
        .ok_or_else(|| CliError::Usage(format!("unknown project type `{}`", args.project_type)))?;
    let protocol_id = match &args.protocol {
        Some(abbrev) => Some(
            lookups
                .list_protocols()?
                .into_iter()
                .find(|protocol| protocol.abbrev.eq_ignore_ascii_case(abbrev))
                .map(|protocol| protocol.id)
                .ok_or_else(|| CliError::Usage(format!("unknown protocol `{abbrev}`")))?,
        ),
        None => None,
    };

    Ok(ProjectDraft {
        prj_cd: args.prj_cd.trim().to_uppercase(),
        prj_nm: args.prj_nm,
        prj_date0: args.start,
        prj_date1: args.end,
        prj_ldr: args.lead.unwrap_or_else(|| actor.username.clone()),
        field_ldr: None,
        owner: args.owner,
        dba: None,
        project_type_id: project_type.id,
        protocol_id,
        lake_id: lake.id,
        abstract_text: args.abstract_text,
        comment: args.comment,
        risk: String::new(),
        tags: args.tags,
        project_team: Vec::new(),
    })
}

fn milestone(
    action: MilestoneCommands,
    conn: &Connection,
    actor: Option<&str>,
) -> CliResult<Value> {
    let milestones = MilestoneService::with_connection(conn);
    match action {
        MilestoneCommands::Status { slug } => Ok(json!({
            "milestones": milestones.get_milestones(&slug)?,
            "outstanding": milestones.get_outstanding(&slug)?,
            "complete": milestones.get_complete(&slug)?,
        })),
        MilestoneCommands::Complete { slug, labels } => {
            let actor = resolve_actor(conn, actor)?;
            let ids = milestone_ids(conn, &labels)?;
            let changed = milestones.update_milestones(&actor, &slug, &ids)?;
            Ok(json!({ "changed": changed }))
        }
        MilestoneCommands::Add { label, report } => {
            let actor = resolve_actor(conn, actor)?;
            Ok(serde_json::to_value(
                milestones.add_milestone(&actor, &label, report)?,
            )?)
        }
        MilestoneCommands::Require {
            slug,
            group,
            labels,
        } => {
            let actor = resolve_actor(conn, actor)?;
            let ids = milestone_ids(conn, &labels)?;
            milestones.update_requirements(&actor, &slug, group.into(), &ids)?;
            Ok(serde_json::to_value(milestones.reporting_options(&slug)?)?)
        }
    }
}

fn milestone_ids(conn: &Connection, labels: &[String]) -> CliResult<Vec<MilestoneId>> {
    let catalogue = SqliteMilestoneRepository::new(conn);
    labels
        .iter()
        .map(|label| -> CliResult<MilestoneId> {
            catalogue
                .get_milestone_by_label(label)?
                .map(|milestone| milestone.id)
                .ok_or_else(|| ServiceError::MilestoneNotFound(label.clone()).into())
        })
        .collect()
}

fn sister(action: SisterCommands, conn: &Connection) -> CliResult<Value> {
    let sisters = SisterService::with_connection(conn);
    match action {
        SisterCommands::List { slug } => Ok(serde_json::to_value(sisters.sister_listing(&slug)?)?),
        SisterCommands::Add { slug, sister } => {
            let family = sisters.add_sister(&slug, &sister)?;
            Ok(json!({ "family": family }))
        }
        SisterCommands::Remove { slug, sister } => {
            sisters.delete_sister(&slug, &sister)?;
            Ok(serde_json::to_value(sisters.sister_listing(&slug)?)?)
        }
        SisterCommands::Set { slug, sisters: selected } => {
            sisters.update_sisters(&slug, &selected)?;
            Ok(serde_json::to_value(sisters.sister_listing(&slug)?)?)
        }
        SisterCommands::Disown { slug } => {
            sisters.disown(&slug)?;
            Ok(json!({ "disowned": slug }))
        }
    }
}

fn report(action: ReportCommands, conn: &Connection, actor: Option<&str>) -> CliResult<Value> {
    let reports = ReportService::with_connection(conn);
    match action {
        ReportCommands::Upload {
            slug,
            milestone,
            path,
        } => {
            let actor = resolve_actor(conn, actor)?;
            Ok(serde_json::to_value(
                reports.upload_report(&actor, &slug, &milestone, &path)?,
            )?)
        }
        ReportCommands::Attach { slug, path } => {
            let actor = resolve_actor(conn, actor)?;
            Ok(serde_json::to_value(
                reports.upload_associated_file(&actor, &slug, &path)?,
            )?)
        }
        ReportCommands::List { slug } => Ok(json!({
            "core": reports.assignments_with_paths(&slug, true)?,
            "custom": reports.assignments_with_paths(&slug, false)?,
            "files": reports.associated_files(&slug)?,
        })),
    }
}

fn points(action: PointCommands, conn: &Connection, actor: Option<&str>) -> CliResult<Value> {
    let spatial = SqliteSpatialService::with_connection(conn);
    match action {
        PointCommands::Upload { slug, file, append } => {
            let actor = resolve_actor(conn, actor)?;
            let csv_text = std::fs::read_to_string(&file)
                .map_err(|source| CliError::Read { path: file, source })?;
            let mode = if append {
                UploadMode::Append
            } else {
                UploadMode::Replace
            };
            let stored = spatial.upload_points(&actor, &slug, &csv_text, mode)?;
            Ok(json!({ "points": stored, "polygon": spatial.project_polygon(&slug)? }))
        }
        PointCommands::Show { slug } => Ok(json!({
            "points": spatial.project_points(&slug)?,
            "polygon": spatial.project_polygon(&slug)?,
        })),
        PointCommands::Roi {
            roi,
            how,
            project_types,
            first_year,
            last_year,
        } => {
            let query = RoiQuery {
                how,
                project_types,
                first_year,
                last_year,
            };
            Ok(serde_json::to_value(spatial.points_roi(&roi, &query)?)?)
        }
    }
}

fn search(args: &SearchArgs, conn: &Connection) -> CliResult<Value> {
    let mut query = SearchQuery::new(args.text.as_str());
    query.year = args.year;
    query.lake = args.lake.clone();
    query.limit = args.limit;
    query.raw_fts_syntax = args.raw;
    Ok(serde_json::to_value(search_projects(conn, &query)?)?)
}

fn parse_bounds(text: &str) -> CliResult<Envelope> {
    let values = text
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<f64>, _>>()
        .map_err(|err| CliError::Usage(format!("invalid bounds `{text}`: {err}")))?;
    let [min_lon, min_lat, max_lon, max_lat] = values[..] else {
        return Err(CliError::Usage(format!(
            "bounds need four values min_lon,min_lat,max_lon,max_lat; got `{text}`"
        )));
    };
    if min_lon > max_lon || min_lat > max_lat {
        return Err(CliError::Usage(format!("bounds `{text}` are inverted")));
    }
    Ok(Envelope {
        min_lon,
        min_lat,
        max_lon,
        max_lat,
    })
}
