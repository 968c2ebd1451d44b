//! Remote storage backend for worklog.
//!
//! Talks to a PostgREST-style HTTP API (`/rest/v1/tasks`,
//! `/rest/v1/work_sessions`) shared by many owners. Every request is filtered
//! by `userId`, so another owner's rows never come back.
//!
//! The [`Store`] trait is synchronous; [`RemoteStore`] owns a tokio runtime and
//! blocks on each request. It must not be used from inside an async context.
//!
//! # One Open Session Per Owner
//!
//! The server is expected to carry a partial unique index on
//! `work_sessions("userId") WHERE "endAt" IS NULL`. Starting work is a
//! conditional close (PATCH of the owner's open row) followed by an insert; a
//! 409 from the insert means another writer opened a session in between, and
//! the pair is retried.

mod rows;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;
use wl_core::{
    OwnerId, Store, StoreError, Task, TaskFilter, TaskId, Window, WorkSession, task_list_order,
};

use crate::rows::{SessionEnd, SessionRow, TaskChanges, TaskRow};

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Close-then-insert attempts before giving up on a contended start.
const MAX_OPEN_ATTEMPTS: u32 = 3;
const TASKS_PATH: &str = "rest/v1/tasks";
const SESSIONS_PATH: &str = "rest/v1/work_sessions";

/// Remote backend errors.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The configured base URL could not be parsed.
    #[error("invalid remote URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The provided API key was invalid.
    #[error("invalid API key: {reason}")]
    InvalidApiKey { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// Failed to start the runtime that drives requests.
    #[error("failed to initialize tokio runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// A write collided with the one-open-session index.
    #[error("conflict: {message}")]
    Conflict { message: String },
    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// A returned row violates a domain rule (e.g., an empty ID).
    #[error("invalid {table} row: {message}")]
    InvalidRow {
        table: &'static str,
        message: String,
    },
}

impl From<RemoteError> for StoreError {
    fn from(err: RemoteError) -> Self {
        Self::new("remote", err)
    }
}

/// Connection settings for [`RemoteStore`].
#[derive(Clone)]
pub struct RemoteConfig {
    /// Service root, e.g. `https://project.example.co`.
    pub url: String,
    /// Project key sent as `apikey`.
    pub api_key: String,
    /// Caller's bearer token. Falls back to `api_key` when absent.
    pub access_token: Option<String>,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// HTTP-backed [`Store`].
pub struct RemoteStore {
    http: reqwest::Client,
    runtime: tokio::runtime::Runtime,
    base: Url,
    api_key: String,
    bearer: String,
}

impl fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStore")
            .field("base", &self.base.as_str())
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl RemoteStore {
    /// Creates a store for the given service.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the API key is blank, or the
    /// HTTP client or runtime fails to build.
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        if config.api_key.trim().is_empty() {
            return Err(RemoteError::InvalidApiKey {
                reason: "API key cannot be empty",
            });
        }

        let mut base = Url::parse(&config.url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(RemoteError::ClientBuild)?;
        let runtime = tokio::runtime::Runtime::new().map_err(RemoteError::Runtime)?;

        let bearer = config
            .access_token
            .filter(|token| !token.trim().is_empty())
            .unwrap_or_else(|| config.api_key.clone());
        Ok(Self {
            http,
            runtime,
            base,
            api_key: config.api_key,
            bearer,
        })
    }

    fn request(
        &self,
        method: Method,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<RequestBuilder, RemoteError> {
        let mut url = self.base.join(table)?;
        if !filters.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(filters.iter().map(|(key, value)| (*key, value.as_str())));
        }
        Ok(self
            .http
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.bearer))
    }

    /// Sends a request and decodes a JSON body.
    fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        self.runtime.block_on(async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            check_status(status, &body)?;
            serde_json::from_str(&body).map_err(|err| RemoteError::InvalidResponse(err.to_string()))
        })
    }

    /// Sends a request whose response body is ignored.
    fn execute(&self, request: RequestBuilder) -> Result<(), RemoteError> {
        self.runtime.block_on(async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            check_status(status, &body)
        })
    }

    fn select_tasks(&self, owner: &OwnerId, filter: &TaskFilter) -> Result<Vec<Task>, RemoteError> {
        let mut filters = vec![("select", "*".to_string()), ("userId", eq(owner.as_str()))];
        if let Some(status) = filter.status {
            filters.push(("status", eq(status.as_str())));
        }
        let rows: Vec<TaskRow> = self.fetch(self.request(Method::GET, TASKS_PATH, &filters)?)?;
        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let task = Task::try_from(row)?;
            if filter.matches(&task) {
                tasks.push(task);
            }
        }
        tasks.sort_by(task_list_order);
        Ok(tasks)
    }

    fn select_task(&self, owner: &OwnerId, id: &TaskId) -> Result<Option<Task>, RemoteError> {
        let request = self.request(
            Method::GET,
            TASKS_PATH,
            &[
                ("select", "*".to_string()),
                ("id", eq(id.as_str())),
                ("userId", eq(owner.as_str())),
                ("limit", "1".to_string()),
            ],
        )?;
        let rows: Vec<TaskRow> = self.fetch(request)?;
        rows.into_iter().next().map(Task::try_from).transpose()
    }

    fn insert_task_row(&self, task: &Task) -> Result<(), RemoteError> {
        let request = self
            .request(Method::POST, TASKS_PATH, &[])?
            .header("Prefer", "return=minimal")
            .json(&TaskRow::from(task));
        self.execute(request)
    }

    fn update_task_row(&self, task: &Task) -> Result<bool, RemoteError> {
        let request = self
            .request(
                Method::PATCH,
                TASKS_PATH,
                &[
                    ("id", eq(task.id.as_str())),
                    ("userId", eq(task.owner.as_str())),
                ],
            )?
            .header("Prefer", "return=representation")
            .json(&TaskChanges::from(task));
        let rows: Vec<TaskRow> = self.fetch(request)?;
        Ok(!rows.is_empty())
    }

    fn delete_task_row(&self, owner: &OwnerId, id: &TaskId) -> Result<bool, RemoteError> {
        let request = self
            .request(
                Method::DELETE,
                TASKS_PATH,
                &[
                    ("id", eq(id.as_str())),
                    ("userId", eq(owner.as_str())),
                    ("select", "id".to_string()),
                ],
            )?
            .header("Prefer", "return=representation");
        let rows: Vec<serde_json::Value> = self.fetch(request)?;
        Ok(!rows.is_empty())
    }

    fn select_open_session(&self, owner: &OwnerId) -> Result<Option<WorkSession>, RemoteError> {
        let request = self.request(
            Method::GET,
            SESSIONS_PATH,
            &[
                ("select", "*".to_string()),
                ("userId", eq(owner.as_str())),
                ("endAt", "is.null".to_string()),
                ("limit", "1".to_string()),
            ],
        )?;
        let rows: Vec<SessionRow> = self.fetch(request)?;
        first_session(rows)
    }

    /// Closes the owner's open row with a conditional PATCH. A row that
    /// started after `end_at` is closed at its own start instead.
    fn close_open_session(
        &self,
        owner: &OwnerId,
        end_at: DateTime<Utc>,
    ) -> Result<Option<WorkSession>, RemoteError> {
        let mut closed = self.patch_session_end(
            &[
                ("userId", eq(owner.as_str())),
                ("endAt", "is.null".to_string()),
                ("startAt", format!("lte.{}", format_timestamp(end_at))),
            ],
            end_at,
        )?;
        if closed.is_none() {
            if let Some(open) = self.select_open_session(owner)? {
                closed = self.patch_session_end(
                    &[
                        ("id", eq(open.id.as_str())),
                        ("userId", eq(owner.as_str())),
                        ("endAt", "is.null".to_string()),
                    ],
                    open.start_at,
                )?;
            }
        }
        if let Some(session) = &closed {
            tracing::debug!(owner = %owner, session = %session.id, "closed open session");
        }
        Ok(closed)
    }

    fn patch_session_end(
        &self,
        filters: &[(&str, String)],
        end_at: DateTime<Utc>,
    ) -> Result<Option<WorkSession>, RemoteError> {
        let request = self
            .request(Method::PATCH, SESSIONS_PATH, filters)?
            .header("Prefer", "return=representation")
            .json(&SessionEnd { end_at });
        let rows: Vec<SessionRow> = self.fetch(request)?;
        first_session(rows)
    }

    fn insert_session(&self, session: &WorkSession) -> Result<(), RemoteError> {
        let request = self
            .request(Method::POST, SESSIONS_PATH, &[])?
            .header("Prefer", "return=minimal")
            .json(&SessionRow::from(session));
        self.execute(request)
    }

    fn open_session_with_retry(
        &self,
        session: &WorkSession,
    ) -> Result<Option<WorkSession>, RemoteError> {
        let mut first_closed = None;
        let mut attempt = 1;
        loop {
            let closed = self.close_open_session(&session.owner, session.start_at)?;
            if first_closed.is_none() {
                first_closed = closed;
            }
            match self.insert_session(session) {
                Ok(()) => return Ok(first_closed),
                Err(RemoteError::Conflict { message }) if attempt < MAX_OPEN_ATTEMPTS => {
                    tracing::warn!(
                        owner = %session.owner,
                        attempt,
                        %message,
                        "open session collided, retrying"
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn select_task_sessions(
        &self,
        owner: &OwnerId,
        task_id: &TaskId,
    ) -> Result<Vec<WorkSession>, RemoteError> {
        let request = self.request(
            Method::GET,
            SESSIONS_PATH,
            &[
                ("select", "*".to_string()),
                ("userId", eq(owner.as_str())),
                ("taskId", eq(task_id.as_str())),
                ("order", "startAt.asc,id.asc".to_string()),
            ],
        )?;
        let rows: Vec<SessionRow> = self.fetch(request)?;
        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(session) = row.into_session()? {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    fn select_sessions_in_window(
        &self,
        owner: &OwnerId,
        window: &Window,
    ) -> Result<Vec<WorkSession>, RemoteError> {
        let from = format_timestamp(window.from);
        let request = self.request(
            Method::GET,
            SESSIONS_PATH,
            &[
                ("select", "*".to_string()),
                ("userId", eq(owner.as_str())),
                ("startAt", format!("lt.{}", format_timestamp(window.to))),
                ("or", format!("(endAt.is.null,endAt.gt.{from})")),
                ("order", "startAt.asc,id.asc".to_string()),
            ],
        )?;
        let rows: Vec<SessionRow> = self.fetch(request)?;
        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(session) = row.into_session()? else {
                continue;
            };
            // An open session only overlaps a non-empty window; the server
            // filter cannot express `COALESCE(endAt, to) > from`.
            if session.end_at.unwrap_or(window.to) > window.from {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    fn count_done(&self, owner: &OwnerId, window: &Window) -> Result<u64, RemoteError> {
        let request = self
            .request(
                Method::HEAD,
                TASKS_PATH,
                &[
                    ("select", "id".to_string()),
                    ("userId", eq(owner.as_str())),
                    ("status", eq("done")),
                    ("updatedAt", format!("gte.{}", format_timestamp(window.from))),
                    ("updatedAt", format!("lt.{}", format_timestamp(window.to))),
                ],
            )?
            .header("Prefer", "count=exact");
        self.runtime.block_on(async {
            let response = request.send().await?;
            let status = response.status();
            let range = response
                .headers()
                .get(reqwest::header::CONTENT_RANGE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            check_status(status, "")?;
            range
                .as_deref()
                .and_then(parse_content_range_total)
                .ok_or_else(|| {
                    RemoteError::InvalidResponse(format!(
                        "missing or malformed Content-Range: {range:?}"
                    ))
                })
        })
    }
}

impl Store for RemoteStore {
    fn list_tasks(&self, owner: &OwnerId, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        Ok(self.select_tasks(owner, filter)?)
    }

    fn get_task(&self, owner: &OwnerId, id: &TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.select_task(owner, id)?)
    }

    fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        Ok(self.insert_task_row(task)?)
    }

    fn update_task(&self, task: &Task) -> Result<bool, StoreError> {
        Ok(self.update_task_row(task)?)
    }

    fn delete_task(&self, owner: &OwnerId, id: &TaskId) -> Result<bool, StoreError> {
        Ok(self.delete_task_row(owner, id)?)
    }

    fn active_session(&self, owner: &OwnerId) -> Result<Option<WorkSession>, StoreError> {
        Ok(self.select_open_session(owner)?)
    }

    fn open_session(&self, session: &WorkSession) -> Result<Option<WorkSession>, StoreError> {
        Ok(self.open_session_with_retry(session)?)
    }

    fn close_session(
        &self,
        owner: &OwnerId,
        end_at: DateTime<Utc>,
    ) -> Result<Option<WorkSession>, StoreError> {
        Ok(self.close_open_session(owner, end_at)?)
    }

    fn task_sessions(
        &self,
        owner: &OwnerId,
        task_id: &TaskId,
    ) -> Result<Vec<WorkSession>, StoreError> {
        Ok(self.select_task_sessions(owner, task_id)?)
    }

    fn sessions_in_window(
        &self,
        owner: &OwnerId,
        window: &Window,
    ) -> Result<Vec<WorkSession>, StoreError> {
        Ok(self.select_sessions_in_window(owner, window)?)
    }

    fn count_completed(&self, owner: &OwnerId, window: &Window) -> Result<u64, StoreError> {
        Ok(self.count_done(owner, window)?)
    }
}

fn first_session(rows: Vec<SessionRow>) -> Result<Option<WorkSession>, RemoteError> {
    for row in rows {
        if let Some(session) = row.into_session()? {
            return Ok(Some(session));
        }
    }
    Ok(None)
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn check_status(status: StatusCode, body: &str) -> Result<(), RemoteError> {
    if status.is_success() {
        return Ok(());
    }
    let message = parse_api_message(body).unwrap_or_else(|| format!("status {status}: {body}"));
    if status == StatusCode::CONFLICT {
        return Err(RemoteError::Conflict { message });
    }
    Err(RemoteError::Api {
        status: status.as_u16(),
        message,
    })
}

fn parse_api_message(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        message: String,
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| payload.message)
}

/// Parses the total out of `0-24/312` or `*/0`.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}
