//! Command tree of the `pjtk` binary.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pjtk_core::model::milestone::RequirementGroup;
use pjtk_core::repo::filter::ProjectStatus;
use pjtk_core::service::spatial_service::RoiMode;
use pjtk_core::Role;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pjtk", version, about = "Fisheries project tracker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// TOML config file (defaults to ./pjtk.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file, overriding the configured one
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Username the command acts as
    #[arg(short = 'u', long = "as", global = true, env = "PJTK_USER")]
    pub actor: Option<String>,

    /// Debug logging, echoed to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Install the default milestone catalogue
    Init,
    /// Manage users and their employee profiles
    User {
        #[command(subcommand)]
        action: UserCommands,
    },
    /// Manage lakes, project types and protocols
    Lookup {
        #[command(subcommand)]
        action: LookupCommands,
    },
    /// Create, inspect and approve projects
    Project {
        #[command(subcommand)]
        action: ProjectCommands,
    },
    /// Manage milestones and reporting requirements
    Milestone {
        #[command(subcommand)]
        action: MilestoneCommands,
    },
    /// Manage sister-project families
    Sister {
        #[command(subcommand)]
        action: SisterCommands,
    },
    /// Upload and list reports and associated files
    Report {
        #[command(subcommand)]
        action: ReportCommands,
    },
    /// Upload and query sample points
    Points {
        #[command(subcommand)]
        action: PointCommands,
    },
    /// Full-text project search
    Search(SearchArgs),
    /// Read the acting user's notices
    Notices {
        /// Include notices already read
        #[arg(long)]
        all: bool,
        /// Mark this notice read instead of listing
        #[arg(long)]
        read: Option<i64>,
    },
}

#[derive(Debug, Subcommand)]
pub enum UserCommands {
    Add {
        username: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, value_enum, default_value_t = RoleArg::Employee)]
        role: RoleArg,
        #[arg(long)]
        supervisor: Option<String>,
    },
    /// Supervisor chain of a user, the user first
    Supervisors { username: String },
    /// Everyone a user supervises, the user first
    Minions { username: String },
}

#[derive(Debug, Subcommand)]
pub enum LookupCommands {
    AddLake {
        abbrev: String,
        name: String,
        /// Bounding box `min_lon,min_lat,max_lon,max_lat`
        #[arg(long, allow_hyphen_values = true)]
        bounds: Option<String>,
    },
    AddProjectType {
        name: String,
        #[arg(long, default_value = "")]
        scope: String,
        #[arg(long)]
        field_component: bool,
    },
    AddProtocol { abbrev: String, name: String },
    /// Print every lake, project type and protocol
    List,
}

#[derive(Debug, Args)]
pub struct ProjectArgs {
    pub prj_cd: String,
    pub prj_nm: String,
    /// Lake abbreviation
    #[arg(long)]
    pub lake: String,
    /// Project type name
    #[arg(long = "type")]
    pub project_type: String,
    /// Protocol abbreviation
    #[arg(long)]
    pub protocol: Option<String>,
    #[arg(long)]
    pub start: NaiveDate,
    #[arg(long)]
    pub end: NaiveDate,
    /// Project lead username; defaults to the acting user
    #[arg(long)]
    pub lead: Option<String>,
    /// Owner username; only honoured for managers and DBAs
    #[arg(long)]
    pub owner: Option<String>,
    #[arg(long = "abstract", default_value = "")]
    pub abstract_text: String,
    #[arg(long, default_value = "")]
    pub comment: String,
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum ProjectCommands {
    Create(ProjectArgs),
    /// Copy an existing project under a new code
    Copy { slug: String, prj_cd: String },
    Show { slug: String },
    List {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        lake: Vec<String>,
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        #[arg(long)]
        tag: Option<String>,
    },
    Approve { slugs: Vec<String> },
    Unapprove { slugs: Vec<String> },
    Signoff { slug: String },
    Tag { slug: String, tags: Vec<String> },
    Bookmark {
        slug: String,
        #[arg(long)]
        remove: bool,
    },
    /// Project overview of the acting user, or of `--employee` for managers
    Mine {
        #[arg(long)]
        employee: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum MilestoneCommands {
    /// Milestones and reporting requirements of a project
    Status { slug: String },
    /// Set the completed milestones of a project, by label
    Complete { slug: String, labels: Vec<String> },
    /// Add a custom catalogue entry
    Add {
        label: String,
        #[arg(long)]
        report: bool,
    },
    /// Replace the required milestones of one group, by label
    Require {
        slug: String,
        #[arg(long, value_enum)]
        group: GroupArg,
        labels: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum SisterCommands {
    /// Current sisters and candidates
    List { slug: String },
    Add { slug: String, sister: String },
    Remove { slug: String, sister: String },
    /// Replace the sisters with exactly these projects
    Set { slug: String, sisters: Vec<String> },
    /// Take the project out of its family
    Disown { slug: String },
}

#[derive(Debug, Subcommand)]
pub enum ReportCommands {
    Upload {
        slug: String,
        milestone: String,
        path: String,
    },
    /// Attach a free-form file
    Attach { slug: String, path: String },
    List { slug: String },
}

#[derive(Debug, Subcommand)]
pub enum PointCommands {
    /// Upload a `POINT_LABEL,DD_LAT,DD_LON` CSV file
    Upload {
        slug: String,
        file: PathBuf,
        /// Keep the points already stored
        #[arg(long)]
        append: bool,
    },
    Show { slug: String },
    /// Points selected by a region of interest (WKT or GeoJSON)
    Roi {
        roi: String,
        #[arg(long, value_parser = parse_roi_mode, default_value = "contained")]
        how: RoiMode,
        #[arg(long = "type")]
        project_types: Vec<i64>,
        #[arg(long)]
        first_year: Option<i32>,
        #[arg(long)]
        last_year: Option<i32>,
    },
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Words to match; a trailing `*` matches a prefix
    pub text: String,
    #[arg(long)]
    pub year: Option<i32>,
    /// Lake abbreviation
    #[arg(long)]
    pub lake: Option<String>,
    #[arg(short, long, default_value_t = 20)]
    pub limit: u32,
    /// Pass the text to FTS5 unescaped
    #[arg(long)]
    pub raw: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    Employee,
    Manager,
    Dba,
}

impl From<RoleArg> for Role {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::Employee => Role::Employee,
            RoleArg::Manager => Role::Manager,
            RoleArg::Dba => Role::Dba,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Submitted,
    Approved,
    Complete,
}

impl From<StatusArg> for ProjectStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Submitted => ProjectStatus::Submitted,
            StatusArg::Approved => ProjectStatus::Approved,
            StatusArg::Complete => ProjectStatus::Complete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GroupArg {
    Core,
    Custom,
    Milestones,
}

impl From<GroupArg> for RequirementGroup {
    fn from(value: GroupArg) -> Self {
        match value {
            GroupArg::Core => RequirementGroup::Core,
            GroupArg::Custom => RequirementGroup::Custom,
            GroupArg::Milestones => RequirementGroup::Milestones,
        }
    }
}

fn parse_roi_mode(value: &str) -> Result<RoiMode, String> {
    RoiMode::parse(value)
        .ok_or_else(|| format!("expected one of points_in, contained, overlapping; got `{value}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn clap_command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["pjtk", "init", "--as", "alice", "--db", "x.sqlite3"])
            .expect("cli should parse");
        assert_eq!(cli.actor.as_deref(), Some("alice"));
        assert_eq!(cli.db, Some(PathBuf::from("x.sqlite3")));
        assert!(matches!(cli.command, Commands::Init));
    }

    #[test]
    fn project_create_parses_dates_and_tags() {
        let cli = Cli::try_parse_from([
            "pjtk",
            "project",
            "create",
            "LHA_IA12_001",
            "Offshore Index",
            "--lake",
            "HU",
            "--type",
            "Offshore Index",
            "--start",
            "2012-05-01",
            "--end",
            "2012-09-30",
            "--tag",
            "walleye",
            "--tag",
            "trout",
        ])
        .expect("cli should parse");
        let Commands::Project {
            action: ProjectCommands::Create(args),
        } = cli.command
        else {
            panic!("expected project create");
        };
        assert_eq!(args.start, NaiveDate::from_ymd_opt(2012, 5, 1).unwrap());
        assert_eq!(args.tags, vec!["walleye".to_string(), "trout".to_string()]);
        assert_eq!(args.protocol, None);
    }

    #[test]
    fn roi_mode_is_validated() {
        let cli = Cli::try_parse_from([
            "pjtk", "points", "roi", "POLYGON((0 0,1 0,1 1,0 0))", "--how", "points_in",
        ])
        .expect("cli should parse");
        assert!(matches!(
            cli.command,
            Commands::Points {
                action: PointCommands::Roi {
                    how: RoiMode::PointsIn,
                    ..
                }
            }
        ));

        let parsed = Cli::try_parse_from(["pjtk", "points", "roi", "POLYGON EMPTY", "--how", "near"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn bad_dates_are_rejected() {
        let parsed = Cli::try_parse_from([
            "pjtk", "project", "create", "LHA_IA12_001", "x", "--lake", "HU", "--type", "t",
            "--start", "May 1", "--end", "2012-09-30",
        ]);
        assert!(parsed.is_err());
    }
}
