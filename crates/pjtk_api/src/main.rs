//! `pjtk-api` HTTP server entry point.
//!
//! Serves the read-only `/api/v1` projections over `tiny_http`, one request
//! at a time on a single database connection.

mod routes;

use log::{info, warn};
use pjtk_core::{init_logging, open_db, AppConfig, ConfigError, DbError, LoggingError};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::process::ExitCode;
use tiny_http::{Header, Request, Response, Server};

#[derive(Debug)]
enum ServerError {
    Config(ConfigError),
    Logging(LoggingError),
    Db(DbError),
    Bind { addr: String, reason: String },
}

impl Display for ServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Logging(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Bind { addr, reason } => write!(f, "cannot listen on {addr}: {reason}"),
        }
    }
}

impl Error for ServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Logging(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Bind { .. } => None,
        }
    }
}

impl From<ConfigError> for ServerError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<LoggingError> for ServerError {
    fn from(value: LoggingError) -> Self {
        Self::Logging(value)
    }
}

impl From<DbError> for ServerError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

fn main() -> ExitCode {
    // Optional single argument: a TOML config file.
    let config_file = std::env::args_os().nth(1).map(PathBuf::from);
    match serve(config_file) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("pjtk-api error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn serve(config_file: Option<PathBuf>) -> Result<(), ServerError> {
    let config = AppConfig::load_from(config_file.as_deref())?;
    init_logging(&config.log_level, &config.log_dir, true)?;
    let conn = open_db(&config.database_path)?;

    let server = Server::http(config.bind_addr.as_str()).map_err(|err| ServerError::Bind {
        addr: config.bind_addr.clone(),
        reason: err.to_string(),
    })?;
    info!(
        "event=api_start module=api status=ok addr={} db={}",
        config.bind_addr,
        config.database_path.display()
    );

    for request in server.incoming_requests() {
        respond(&conn, request);
    }
    Ok(())
}

fn respond(conn: &Connection, mut request: Request) {
    let method = request.method().clone();
    let url = request.url().to_string();
    let (status, payload) = match routes::read_body(request.as_reader()) {
        Ok(body) => routes::handle(conn, &method, &url, &body),
        Err(err) => {
            warn!("event=api_request module=api status=error reason=body_read url={url} error={err:?}");
            routes::body_failure(&err)
        }
    };
    info!("event=api_request module=api status=ok method={method} url={url} code={status}");

    let mut response = Response::from_string(payload.to_string()).with_status_code(status);
    if let Ok(header) = Header::from_bytes("Content-Type", "application/json") {
        response = response.with_header(header);
    }
    if let Err(err) = request.respond(response) {
        warn!("event=api_respond module=api status=error error={err}");
    }
}
