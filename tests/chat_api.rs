//! End-to-end tests for the chat HTTP API.
//!
//! Each test builds its own router over an in-memory knowledge store and
//! stub collaborators, then drives it with `oneshot` requests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use rag_concierge::config::LeadConfig;
use rag_concierge::controller::ConversationController;
use rag_concierge::embedding::EmbeddingProvider;
use rag_concierge::error::NotifyError;
use rag_concierge::generator::AnswerGenerator;
use rag_concierge::greeting::FixedGreeting;
use rag_concierge::intent::LeadIntentDetector;
use rag_concierge::knowledge::InMemoryKnowledgeStore;
use rag_concierge::models::Passage;
use rag_concierge::notify::LeadNotifier;
use rag_concierge::server::{build_router, AppState};
use rag_concierge::session::{Message, UserData};

// =============================================================================
// Stubs
// =============================================================================

struct LetterEmbedder;

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }
    fn dims(&self) -> usize {
        26
    }
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0; 26];
                for c in t.to_ascii_lowercase().bytes().filter(u8::is_ascii_lowercase) {
                    v[(c - b'a') as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

struct CannedGenerator {
    fail: bool,
}

#[async_trait]
impl AnswerGenerator for CannedGenerator {
    async fn generate(&self, context: &[Passage], _question: &str) -> anyhow::Result<String> {
        if self.fail {
            anyhow::bail!("connection refused");
        }
        Ok(format!("Based on {} passages, we can help.", context.len()))
    }
}

/// Answers after a short delay so overlapping requests stay in flight together.
struct SlowEchoGenerator;

#[async_trait]
impl AnswerGenerator for SlowEchoGenerator {
    async fn generate(&self, _context: &[Passage], question: &str) -> anyhow::Result<String> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(format!("answer to {}", question))
    }
}

#[derive(Default)]
struct CountingNotifier {
    leads: Mutex<Vec<UserData>>,
}

#[async_trait]
impl LeadNotifier for CountingNotifier {
    async fn send(&self, user_data: &UserData, _history: &[Message]) -> Result<(), NotifyError> {
        self.leads.lock().unwrap().push(user_data.clone());
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

struct TestApp {
    router: axum::Router,
    notifier: Arc<CountingNotifier>,
}

async fn make_app(with_knowledge: bool, generator_fails: bool) -> TestApp {
    let generator = Arc::new(CannedGenerator {
        fail: generator_fails,
    });
    make_app_with(with_knowledge, generator).await
}

async fn make_app_with(with_knowledge: bool, generator: Arc<dyn AnswerGenerator>) -> TestApp {
    let knowledge = Arc::new(InMemoryKnowledgeStore::new(Arc::new(LetterEmbedder)));
    if with_knowledge {
        knowledge
            .add_texts(
                "services.txt",
                &[
                    "We build custom websites.".to_string(),
                    "We automate business workflows.".to_string(),
                    "We deploy AI assistants.".to_string(),
                    "Support is available on weekdays.".to_string(),
                ],
            )
            .await
            .unwrap();
    }
    let notifier = Arc::new(CountingNotifier::default());

    let controller = ConversationController::new(
        knowledge,
        generator,
        notifier.clone(),
        Arc::new(FixedGreeting("Hello!".into())),
        LeadIntentDetector::new(&LeadConfig::default().trigger_phrases),
        3,
    );

    TestApp {
        router: build_router(AppState::new(controller)),
        notifier,
    }
}

fn chat_request(message: &str, session_id: Option<&str>) -> Request<Body> {
    let mut body = serde_json::json!({ "message": message });
    if let Some(id) = session_id {
        body["session_id"] = Value::String(id.to_string());
    }
    Request::post("/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

// =============================================================================
// GET /health
// =============================================================================

#[tokio::test]
async fn test_health_reports_sessions_and_is_idempotent() {
    let app = make_app(true, false).await;

    let (status, json) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["sessions_active"], 0);
    assert!(json["timestamp"].is_string());

    send(&app.router, chat_request("hello", None)).await;
    for _ in 0..3 {
        let (_, json) = send(&app.router, get("/health")).await;
        assert_eq!(json["sessions_active"], 1);
    }
}

// =============================================================================
// POST /chat
// =============================================================================

#[tokio::test]
async fn test_fresh_session_gets_an_id() {
    let app = make_app(true, false).await;
    let (status, json) = send(&app.router, chat_request("what services do you offer?", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(!json["session_id"].as_str().unwrap().is_empty());
    assert_eq!(json["response"], "Hello! Based on 3 passages, we can help.");
    assert_eq!(json["confidence"], 0.95);
    assert!(json["requires_action"].is_null());
}

#[tokio::test]
async fn test_pricing_question_starts_lead_capture() {
    let app = make_app(true, false).await;
    let (_, json) = send(&app.router, chat_request("what is your pricing?", None)).await;

    assert_eq!(
        json["response"],
        "Awesome! Let's get you started. What's your name?"
    );
    assert_eq!(json["requires_action"], "get_name");
    assert_eq!(json["confidence"], 0.9);
}

#[tokio::test]
async fn test_full_lead_capture_flow() {
    let app = make_app(true, false).await;

    let (_, json) = send(&app.router, chat_request("Can I get a quote?", None)).await;
    let session_id = json["session_id"].as_str().unwrap().to_string();

    let (_, json) = send(&app.router, chat_request("Grace", Some(&session_id))).await;
    assert_eq!(json["response"], "Thanks Grace! What's your email address?");
    assert_eq!(json["requires_action"], "get_email");
    assert_eq!(json["session_id"], session_id.as_str());

    let (_, json) = send(&app.router, chat_request("grace at navy", Some(&session_id))).await;
    assert_eq!(
        json["response"],
        "That doesn't look like a valid email. Can you please try again?"
    );
    assert_eq!(json["confidence"], 0.5);
    assert_eq!(json["requires_action"], "get_email");

    let (_, json) = send(&app.router, chat_request("grace@navy.mil", Some(&session_id))).await;
    assert_eq!(
        json["response"],
        "Perfect! We'll contact you at grace@navy.mil within 24 hours! 🎉"
    );
    assert_eq!(json["confidence"], 1.0);
    assert!(json["requires_action"].is_null());

    let leads = app.notifier.leads.lock().unwrap().clone();
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0].name.as_deref(), Some("Grace"));
    assert_eq!(leads[0].email.as_deref(), Some("grace@navy.mil"));

    let (status, session) = send(&app.router, get(&format!("/session/{}", session_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["message_history"].as_array().unwrap().len(), 8);
    assert!(session["awaiting_action"].is_null());
    assert_eq!(session["user_data"]["email"], "grace@navy.mil");
}

#[tokio::test]
async fn test_unbuilt_knowledge_base_returns_fixed_error() {
    let app = make_app(false, true).await;
    let (status, json) = send(
        &app.router,
        chat_request("how does your automation work?", None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["response"],
        "Error: Knowledge base not found. Please ensure your knowledge base has been built."
    );
    assert_eq!(json["confidence"], 0.0);
}

#[tokio::test]
async fn test_generator_failure_is_bad_gateway() {
    let app = make_app(true, true).await;
    let (status, json) = send(&app.router, chat_request("tell me about support", Some("s-502"))).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"]["code"], "generation_failed");
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .contains("connection refused"));

    let (_, session) = send(&app.router, get("/session/s-502")).await;
    let history = session["message_history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["role"], "user");
}

#[tokio::test]
async fn test_missing_message_is_rejected() {
    let app = make_app(true, false).await;
    let request = Request::post("/chat")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"session_id":"abc"}"#))
        .unwrap();
    let (status, _) = send(&app.router, request).await;
    assert!(status.is_client_error());

    let (_, health) = send(&app.router, get("/health")).await;
    assert_eq!(health["sessions_active"], 0);
}

// =============================================================================
// GET /session/{id}
// =============================================================================

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let app = make_app(true, false).await;
    let (status, json) = send(&app.router, get("/session/does-not-exist")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_history_grows_two_per_call() {
    let app = make_app(true, false).await;
    let id = "history-check";
    for n in 1..=4 {
        send(&app.router, chat_request("what do you build?", Some(id))).await;
        let (_, session) = send(&app.router, get(&format!("/session/{}", id))).await;
        assert_eq!(session["message_history"].as_array().unwrap().len(), 2 * n);
    }
}

#[tokio::test]
async fn test_concurrent_messages_for_one_session_run_in_turn() {
    let app = make_app_with(true, Arc::new(SlowEchoGenerator)).await;
    let id = "same-session";

    let (first, second) = tokio::join!(
        send(&app.router, chat_request("first question about websites", Some(id))),
        send(&app.router, chat_request("second question about support", Some(id))),
    );
    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::OK);
    assert_eq!(first.1["session_id"], id);
    assert_eq!(second.1["session_id"], id);

    let (_, session) = send(&app.router, get(&format!("/session/{}", id))).await;
    let history = session["message_history"].as_array().unwrap();
    let roles: Vec<&str> = history.iter().map(|m| m["role"].as_str().unwrap()).collect();
    assert_eq!(roles, ["user", "assistant", "user", "assistant"]);

    for pair in history.chunks(2) {
        let question = pair[0]["content"].as_str().unwrap();
        let reply = pair[1]["content"].as_str().unwrap();
        assert!(reply.contains(&format!("answer to {}", question)), "{} / {}", question, reply);
    }
}
