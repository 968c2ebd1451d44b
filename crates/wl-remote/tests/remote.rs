//! Remote backend tests against a mock HTTP server.
//!
//! `RemoteStore` blocks on its own runtime, so these are plain `#[test]`s; a
//! separate runtime only starts the mock server and mounts expectations.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use tokio::runtime::Runtime;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use wl_core::{
    DayZone, Error, FixedClock, OwnerId, SessionId, Store, Task, TaskFilter, TaskId, TaskPriority,
    TaskStatus, Tracker, Window, WorkSession,
};
use wl_db::Database;
use wl_remote::{RemoteConfig, RemoteStore};

fn utc(d: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, d, h, m, 0).unwrap()
}

fn alice() -> OwnerId {
    OwnerId::new("alice").unwrap()
}

struct Harness {
    server: MockServer,
    runtime: Runtime,
}

impl Harness {
    fn start() -> Self {
        let runtime = Runtime::new().unwrap();
        let server = runtime.block_on(MockServer::start());
        Self { server, runtime }
    }

    fn store(&self) -> RemoteStore {
        RemoteStore::new(RemoteConfig {
            url: self.server.uri(),
            api_key: "anon".to_string(),
            access_token: Some("jwt".to_string()),
        })
        .unwrap()
    }

    fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    fn requests(&self, verb: &str, route: &str) -> usize {
        self.runtime
            .block_on(self.server.received_requests())
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == verb && r.url.path() == route)
            .count()
    }
}

fn task_json(id: &str, title: &str, status: &str, updated: DateTime<Utc>) -> serde_json::Value {
    json!({
        "id": id,
        "userId": "alice",
        "title": title,
        "note": null,
        "status": status,
        "priority": "normal",
        "due": null,
        "createdAt": "2025-03-10T08:00:00.000Z",
        "updatedAt": updated.to_rfc3339(),
    })
}

fn session_json(
    id: &str,
    task_id: &str,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
) -> serde_json::Value {
    json!({
        "id": id,
        "taskId": task_id,
        "userId": "alice",
        "startAt": start.to_rfc3339(),
        "endAt": end.map(|e| e.to_rfc3339()),
    })
}

#[test]
fn test_requests_carry_auth_and_owner_filter() {
    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/rest/v1/tasks"))
            .and(header("apikey", "anon"))
            .and(header("authorization", "Bearer jwt"))
            .and(query_param("userId", "eq.alice"))
            .and(query_param("id", "eq.t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([task_json(
                "t1",
                "Write report",
                "todo",
                utc(10, 9, 0)
            )]))),
    );

    let task = harness
        .store()
        .get_task(&alice(), &TaskId::new("t1").unwrap())
        .unwrap()
        .expect("task returned");
    assert_eq!(task.title, "Write report");
    assert_eq!(task.owner, alice());
}

#[test]
fn test_missing_task_is_none() {
    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/rest/v1/tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([]))),
    );

    let found = harness
        .store()
        .get_task(&alice(), &TaskId::new("nope").unwrap())
        .unwrap();
    assert!(found.is_none());
}

#[test]
fn test_list_is_filtered_and_sorted_client_side() {
    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/rest/v1/tasks"))
            .and(query_param("userId", "eq.alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                task_json("done", "Ship release", "done", utc(10, 12, 0)),
                task_json("old", "Review notes", "todo", utc(10, 9, 0)),
                task_json("new", "Review budget", "todo", utc(10, 11, 0)),
                task_json("busy", "Pair on review", "in_progress", utc(10, 10, 0)),
            ]))),
    );
    let store = harness.store();

    let all: Vec<String> = store
        .list_tasks(&alice(), &TaskFilter::default())
        .unwrap()
        .into_iter()
        .map(|t| t.id.to_string())
        .collect();
    assert_eq!(all, vec!["new", "old", "busy", "done"]);

    let matching: Vec<String> = store
        .list_tasks(
            &alice(),
            &TaskFilter {
                status: None,
                query: Some("REVIEW".to_string()),
            },
        )
        .unwrap()
        .into_iter()
        .map(|t| t.id.to_string())
        .collect();
    assert_eq!(matching, vec!["new", "old", "busy"]);
}

#[test]
fn test_open_session_closes_then_inserts() {
    let harness = Harness::start();
    harness.mount(
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/work_sessions"))
            .and(query_param("userId", "eq.alice"))
            .and(query_param("endAt", "is.null"))
            .and(query_param("startAt", "lte.2025-03-10T09:05:00.000Z"))
            .and(body_partial_json(json!({"endAt": "2025-03-10T09:05:00Z"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([session_json(
                "s1",
                "t1",
                utc(10, 9, 0),
                Some(utc(10, 9, 5))
            )]))),
    );
    harness.mount(
        Mock::given(method("POST"))
            .and(path("/rest/v1/work_sessions"))
            .and(body_partial_json(json!({"id": "s2", "taskId": "t2", "endAt": null})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1),
    );

    let session = WorkSession {
        id: SessionId::new("s2").unwrap(),
        task_id: TaskId::new("t2").unwrap(),
        owner: alice(),
        start_at: utc(10, 9, 5),
        end_at: None,
    };
    let closed = harness.store().open_session(&session).unwrap().unwrap();
    assert_eq!(closed.id.as_str(), "s1");
    assert_eq!(closed.end_at, Some(utc(10, 9, 5)));
    harness.runtime.block_on(harness.server.verify());
}

#[test]
fn test_open_session_retries_after_conflict() {
    let harness = Harness::start();
    harness.mount(
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/work_sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([]))),
    );
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/rest/v1/work_sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([]))),
    );
    harness.mount(
        Mock::given(method("POST"))
            .and(path("/rest/v1/work_sessions"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "23505",
                "message": "duplicate key value violates unique constraint"
            })))
            .up_to_n_times(1),
    );
    harness.mount(
        Mock::given(method("POST"))
            .and(path("/rest/v1/work_sessions"))
            .respond_with(ResponseTemplate::new(201)),
    );

    let session = WorkSession {
        id: SessionId::new("s9").unwrap(),
        task_id: TaskId::new("t1").unwrap(),
        owner: alice(),
        start_at: utc(10, 9, 0),
        end_at: None,
    };
    assert!(harness.store().open_session(&session).unwrap().is_none());
    assert_eq!(harness.requests("PATCH", "/rest/v1/work_sessions"), 2);
    assert_eq!(harness.requests("POST", "/rest/v1/work_sessions"), 2);
}

#[test]
fn test_persistent_conflict_surfaces_as_storage_error() {
    let harness = Harness::start();
    harness.mount(
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/work_sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([]))),
    );
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/rest/v1/work_sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([]))),
    );
    harness.mount(
        Mock::given(method("POST"))
            .and(path("/rest/v1/work_sessions"))
            .respond_with(ResponseTemplate::new(409)),
    );

    let session = WorkSession {
        id: SessionId::new("s9").unwrap(),
        task_id: TaskId::new("t1").unwrap(),
        owner: alice(),
        start_at: utc(10, 9, 0),
        end_at: None,
    };
    let err = harness.store().open_session(&session).unwrap_err();
    assert_eq!(err.backend(), "remote");
    assert_eq!(harness.requests("POST", "/rest/v1/work_sessions"), 3);
}

#[test]
fn test_close_never_ends_before_session_start() {
    let harness = Harness::start();
    let later = utc(10, 9, 0) + chrono::Duration::seconds(30);
    harness.mount(
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/work_sessions"))
            .and(query_param("id", "eq.s7"))
            .and(body_partial_json(json!({"endAt": "2025-03-10T09:00:30Z"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([session_json(
                "s7",
                "t1",
                later,
                Some(later)
            )])))
            .expect(1),
    );
    harness.mount(
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/work_sessions"))
            .and(query_param("startAt", "lte.2025-03-10T09:00:00.000Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1),
    );
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/rest/v1/work_sessions"))
            .and(query_param("endAt", "is.null"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([session_json(
                "s7", "t1", later, None
            )]))),
    );

    let closed = harness
        .store()
        .close_session(&alice(), utc(10, 9, 0))
        .unwrap()
        .expect("open session closed");
    assert_eq!(closed.id.as_str(), "s7");
    assert_eq!(closed.end_at, Some(later));
    harness.runtime.block_on(harness.server.verify());
}

#[test]
fn test_unreadable_session_times_do_not_fail_reads() {
    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/rest/v1/work_sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                session_json("s1", "t1", utc(10, 9, 0), Some(utc(10, 9, 30))),
                {"id": "s2", "taskId": "t1", "userId": "alice",
                 "startAt": "last tuesday", "endAt": "2025-03-10T10:30:00Z"},
                {"id": "s3", "taskId": "t1", "userId": "alice",
                 "startAt": "2025-03-10T11:00:00Z", "endAt": "later"},
            ]))),
    );

    let store = harness.store();
    let window = Window::new(utc(10, 0, 0), utc(10, 12, 0)).unwrap();
    let in_window = store.sessions_in_window(&alice(), &window).unwrap();
    assert_eq!(
        in_window.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
        ["s1", "s3"]
    );
    assert_eq!(in_window[1].end_at, Some(utc(10, 11, 0)));

    let for_task = store
        .task_sessions(&alice(), &TaskId::new("t1").unwrap())
        .unwrap();
    assert_eq!(for_task.len(), 2);

    let total = Tracker::with_clock(store, FixedClock::new(utc(10, 12, 0)))
        .with_day_zone(DayZone::Utc)
        .task_total_seconds(&alice(), &TaskId::new("t1").unwrap())
        .unwrap();
    assert_eq!(total, 30 * 60);
}

#[test]
fn test_update_of_foreign_task_reports_missing() {
    let harness = Harness::start();
    harness.mount(
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/tasks"))
            .and(query_param("userId", "eq.alice"))
            .and(header("prefer", "return=representation"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([]))),
    );

    let task = Task {
        id: TaskId::new("bobs").unwrap(),
        owner: alice(),
        title: "Not mine".to_string(),
        note: None,
        status: TaskStatus::Todo,
        priority: TaskPriority::Normal,
        due: None,
        created_at: utc(10, 8, 0),
        updated_at: utc(10, 9, 0),
    };
    assert!(!harness.store().update_task(&task).unwrap());
}

#[test]
fn test_server_error_maps_to_storage_error() {
    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/rest/v1/tasks"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance")),
    );

    let tracker = Tracker::new(harness.store());
    let err = tracker
        .get_task(&alice(), &TaskId::new("t1").unwrap())
        .unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
    assert_eq!(err.status_code(), 500);
    assert!(err.to_string().contains("503"));
}

#[test]
fn test_window_query_includes_open_sessions() {
    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/rest/v1/work_sessions"))
            .and(query_param("startAt", "lt.2025-03-10T12:00:00.000Z"))
            .and(query_param(
                "or",
                "(endAt.is.null,endAt.gt.2025-03-10T08:00:00.000Z)",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                session_json("s1", "t1", utc(10, 7, 0), Some(utc(10, 9, 0))),
                session_json("s2", "t2", utc(10, 10, 0), None),
            ]))),
    );

    let window = Window::new(utc(10, 8, 0), utc(10, 12, 0)).unwrap();
    let sessions = harness.store().sessions_in_window(&alice(), &window).unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(sessions[1].is_open());
}

#[test]
fn test_count_completed_reads_content_range() {
    let harness = Harness::start();
    harness.mount(
        Mock::given(method("HEAD"))
            .and(path("/rest/v1/tasks"))
            .and(query_param("status", "eq.done"))
            .and(header("prefer", "count=exact"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-range", "0-1/2")),
    );

    let window = Window::new(utc(10, 0, 0), utc(11, 0, 0)).unwrap();
    assert_eq!(harness.store().count_completed(&alice(), &window).unwrap(), 2);
}

/// The same rows summarised through either backend give the same answer.
#[test]
fn test_summary_matches_local_backend() {
    let tasks = [
        task_json("t1", "Write report", "done", utc(10, 11, 0)),
        task_json("t2", "Plan sprint", "in_progress", utc(10, 9, 0)),
    ];
    let sessions = [
        session_json("s1", "t1", utc(9, 22, 30), Some(utc(10, 1, 15))),
        session_json("s2", "t2", utc(10, 9, 0), Some(utc(10, 10, 30))),
        session_json("s3", "gone", utc(10, 10, 30), Some(utc(10, 10, 50))),
        session_json("s4", "t1", utc(10, 10, 50), None),
    ];
    let now = utc(10, 12, 0);
    let window = Window::new(utc(10, 0, 0), now).unwrap();

    let local = Database::open_in_memory().unwrap();
    for task in &tasks {
        let row: Task = task_from_json(task);
        local.insert_task(&row).unwrap();
    }
    for session in &sessions {
        let row: WorkSession = serde_json::from_value(json!({
            "id": session["id"],
            "taskId": session["taskId"],
            "owner": session["userId"],
            "startAt": session["startAt"],
            "endAt": session["endAt"],
        }))
        .unwrap();
        local.open_session(&row).unwrap();
        if let Some(end) = row.end_at {
            local.close_session(&alice(), end).unwrap();
        }
    }

    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/rest/v1/work_sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(sessions))),
    );
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/rest/v1/tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(tasks))),
    );
    harness.mount(
        Mock::given(method("HEAD"))
            .and(path("/rest/v1/tasks"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-range", "0-0/1")),
    );

    let local_summary = Tracker::with_clock(local, FixedClock::new(now))
        .with_day_zone(DayZone::Utc)
        .summary(&alice(), window)
        .unwrap();
    let remote_summary = Tracker::with_clock(harness.store(), FixedClock::new(now))
        .with_day_zone(DayZone::Utc)
        .summary(&alice(), window)
        .unwrap();

    assert_eq!(remote_summary, local_summary);
    assert_eq!(local_summary.total_seconds, 75 * 60 + 90 * 60 + 20 * 60 + 70 * 60);
    assert_eq!(local_summary.completed_count, 1);
}

fn task_from_json(value: &serde_json::Value) -> Task {
    let at = |key: &str| {
        DateTime::parse_from_rfc3339(value[key].as_str().unwrap())
            .unwrap()
            .with_timezone(&Utc)
    };
    Task {
        id: TaskId::new(value["id"].as_str().unwrap()).unwrap(),
        owner: alice(),
        title: value["title"].as_str().unwrap().to_string(),
        note: None,
        status: value["status"].as_str().unwrap().parse().unwrap(),
        priority: TaskPriority::Normal,
        due: None,
        created_at: at("createdAt"),
        updated_at: at("updatedAt"),
    }
}
