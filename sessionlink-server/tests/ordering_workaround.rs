//! End-to-end ordering tests for the remote backend.
//!
//! The "remote" session service here is this crate's own router running the
//! in-memory backend on an ephemeral port; the agent side talks to it through
//! `RemoteSessionClient` exactly as it would talk to the real service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Map, Value};
use sessionlink_core::models::{new_event_id, now_seconds};
use sessionlink_core::session::BackendKind;
use sessionlink_core::{Content, Event, Part, RemoteSessionClient, SessionBackend, SessionService};
use sessionlink_server::http::{build_router, HttpState};
use sessionlink_server::run::{RunOrchestrator, Turn};
use sessionlink_server::runner::{AgentRunner, RunOutcome};
use tokio::net::TcpListener;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const APP: &str = "diagram_agent";

/// Replies with the number of events it finds in the session log.
struct CountingRunner {
    backend: SessionBackend,
}

#[async_trait]
impl AgentRunner for CountingRunner {
    async fn run(&self, user_id: &str, session_id: &str, _: Content) -> anyhow::Result<RunOutcome> {
        let service = self.backend.service();
        let session = service.get_session(APP, user_id, session_id).await?;
        let event = Event {
            id: new_event_id(),
            timestamp: now_seconds(),
            author: "counter".to_string(),
            content: Some(Content::new(
                "model",
                vec![Part::text(format!("events seen: {}", session.events.len()))],
            )),
            turn_complete: true,
            ..Event::default()
        };
        service.append_event(&session, &event).await?;
        Ok(RunOutcome::Ready(vec![event]))
    }

    fn name(&self) -> &str {
        "counter"
    }
}

/// Records whether it was ever invoked.
struct TrackingRunner {
    called: Arc<AtomicBool>,
}

#[async_trait]
impl AgentRunner for TrackingRunner {
    async fn run(&self, _: &str, _: &str, _: Content) -> anyhow::Result<RunOutcome> {
        self.called.store(true, Ordering::SeqCst);
        Ok(RunOutcome::Ready(Vec::new()))
    }

    fn name(&self) -> &str {
        "tracking"
    }
}

fn http_state(backend: SessionBackend, runner: Arc<dyn AgentRunner>) -> Arc<HttpState> {
    Arc::new(HttpState {
        orchestrator: RunOrchestrator::new(backend.clone(), runner, APP),
        backend,
        app_name: APP.to_string(),
        llm_info: json!({"provider": "gemini", "model": "gemini-2.0-flash"}),
    })
}

/// Serve an in-memory session store on 127.0.0.1 and return its base URL.
async fn spawn_session_store() -> String {
    let backend = SessionBackend::in_memory();
    let runner = Arc::new(CountingRunner {
        backend: backend.clone(),
    });
    let app = build_router(http_state(backend, runner));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub session store");
    let addr = listener.local_addr().expect("Failed to read local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn remote_backend(base_url: &str) -> SessionBackend {
    let client = RemoteSessionClient::new(base_url).expect("Failed to create client");
    SessionBackend::with_service(Arc::new(client), BackendKind::Remote)
}

// ===========================================================================
// TEST 1: empty remote session + "hello" - user event first, runner sees it
// ===========================================================================
#[tokio::test]
async fn test_user_message_is_appended_before_run() {
    let base_url = spawn_session_store().await;
    let backend = remote_backend(&base_url);
    backend
        .service()
        .create_session(APP, "u1", Map::new(), Some("s1"))
        .await
        .unwrap();

    let runner = Arc::new(CountingRunner {
        backend: backend.clone(),
    });
    let orchestrator = RunOrchestrator::new(backend.clone(), runner, APP);

    let events = orchestrator
        .run_turn(Turn {
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            content: Content::user_text("hello"),
        })
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].text(), "events seen: 1");

    let session = backend.service().get_session(APP, "u1", "s1").await.unwrap();
    assert_eq!(session.events.len(), 2);
    assert_eq!(session.events[0].author, "user");
    assert_eq!(session.events[0].text(), "hello");
    assert_eq!(session.events[0].id.len(), 12);
    assert_eq!(session.events[1].author, "counter");
    assert_eq!(session.events[1].text(), "events seen: 1");
}

// ===========================================================================
// TEST 2: same flow through POST /run on the agent router
// ===========================================================================
#[tokio::test]
async fn test_run_endpoint_with_remote_backend() {
    let base_url = spawn_session_store().await;
    let backend = remote_backend(&base_url);
    backend
        .service()
        .create_session(APP, "u1", Map::new(), Some("s2"))
        .await
        .unwrap();

    let runner = Arc::new(CountingRunner {
        backend: backend.clone(),
    });
    let app = build_router(http_state(backend.clone(), runner));

    let body = json!({"userId": "u1", "sessionId": "s2", "newMessage": {"parts": [{"text": "hello"}]}});
    let response = app
        .oneshot(
            Request::post("/run")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let events: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(events[0]["author"], "counter");
    assert_eq!(events[0]["content"]["parts"][0]["text"], "events seen: 1");

    // CRUD is not served by an agent running against the remote store.
    let crud = build_router(http_state(
        backend,
        Arc::new(TrackingRunner {
            called: Arc::new(AtomicBool::new(false)),
        }),
    ))
    .oneshot(
        Request::get("/api/apps/diagram_agent/users/u1/sessions/s2")
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(crud.status(), StatusCode::NOT_FOUND);
}

// ===========================================================================
// TEST 3: two turns keep strict user/agent alternation
// ===========================================================================
#[tokio::test]
async fn test_consecutive_turns_alternate() {
    let base_url = spawn_session_store().await;
    let backend = remote_backend(&base_url);
    backend
        .service()
        .create_session(APP, "u1", Map::new(), Some("s3"))
        .await
        .unwrap();

    let runner = Arc::new(CountingRunner {
        backend: backend.clone(),
    });
    let orchestrator = RunOrchestrator::new(backend.clone(), runner, APP);

    for text in ["first", "second"] {
        orchestrator
            .run_turn(Turn {
                user_id: "u1".to_string(),
                session_id: "s3".to_string(),
                content: Content::user_text(text),
            })
            .await
            .unwrap();
    }

    let session = backend.service().get_session(APP, "u1", "s3").await.unwrap();
    let log: Vec<(String, String)> = session
        .events
        .iter()
        .map(|e| (e.author.clone(), e.text()))
        .collect();
    assert_eq!(
        log,
        vec![
            ("user".to_string(), "first".to_string()),
            ("counter".to_string(), "events seen: 1".to_string()),
            ("user".to_string(), "second".to_string()),
            ("counter".to_string(), "events seen: 3".to_string()),
        ]
    );
}

// ===========================================================================
// TEST 4: rejected pre-append fails the turn before the runner starts
// ===========================================================================
#[tokio::test]
async fn test_rejected_pre_append_skips_runner() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/apps/diagram_agent/users/u1/sessions/s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "s1", "appName": APP, "userId": "u1",
            "lastUpdateTime": 0, "state": {}, "events": []
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/apps/diagram_agent/users/u1/sessions/s1/events"))
        .respond_with(ResponseTemplate::new(500).set_body_string("store down"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let called = Arc::new(AtomicBool::new(false));
    let orchestrator = RunOrchestrator::new(
        remote_backend(&mock_server.uri()),
        Arc::new(TrackingRunner {
            called: called.clone(),
        }),
        APP,
    );

    let err = orchestrator
        .run_turn(Turn {
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            content: Content::user_text("hello"),
        })
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("store down"));
    assert!(!called.load(Ordering::SeqCst), "runner must not start");
}
