use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use tokio::net::TcpListener;

use studyhub::api::gateway::{GatewayConfig, GatewayError};
use studyhub::api::server::AddTaskRequest;
use studyhub::api::{router, Client, ClientConfig, Gateway, HttpGateway};
use studyhub::controller::Controller;
use studyhub::models::{Filter, TaskStatus};
use studyhub::quiz::SelectOutcome;

/// Answers prompts from a fixed script
struct ScriptedGateway {
    replies: Mutex<VecDeque<Result<String, GatewayError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    fn new(replies: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.to_string())).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait::async_trait]
impl Gateway for ScriptedGateway {
    async fn submit(&self, prompt: &str) -> Result<String, GatewayError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::Network("script exhausted".to_string())))
    }
}

/// Serves the API on a loopback port and returns its base URL
async fn spawn_server(gateway: Arc<ScriptedGateway>) -> (Controller, String) {
    let controller = Controller::new(gateway.clone());
    let app = router(controller.clone(), gateway);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (controller, format!("http://{}", address))
}

fn client(base_url: &str) -> Client {
    Client::with_config(ClientConfig {
        base_url: base_url.to_string(),
    })
}

fn javascript_quiz() -> String {
    let items: Vec<String> = (1..=5)
        .map(|i| {
            format!(
                r#"{{"question": "JS question {i}", "options": ["var", "let", "const", "function"], "answer": "let"}}"#
            )
        })
        .collect();
    format!("```json\n[{}]\n```", items.join(",\n"))
}

#[tokio::test]
async fn test_analyze_scenario_over_http() {
    let gateway = ScriptedGateway::new(vec!["**Chapter 1** covers *basics*."]);
    let (controller, base_url) = spawn_server(gateway.clone()).await;
    let client = client(&base_url);

    let task = client
        .add_task(&AddTaskRequest {
            title: "Read Ch.1".to_string(),
            query: "Explain chapter 1".to_string(),
            image_ref: None,
            due_date: Some(Utc::now() + Duration::days(1)),
            priority: None,
        })
        .await
        .unwrap();

    let analyzed = client.analyze_task(task.id()).await.unwrap();
    assert_eq!(analyzed.ai_content(), "Chapter 1 covers basics.");
    assert_eq!(analyzed.status(), TaskStatus::Idle);
    assert!(gateway.prompts.lock().unwrap()[0].contains("Explain chapter 1"));

    // The controller and the API see the same record
    assert_eq!(
        controller.task(task.id()).unwrap().ai_content(),
        "Chapter 1 covers basics."
    );
    let listed = client.list_tasks(Filter::Pending, "ch.1").await.unwrap();
    assert_eq!(listed.len(), 1);

    let countdowns = client.countdowns().await.unwrap();
    assert_eq!(countdowns.len(), 1);
    assert!(countdowns[0].label.starts_with("0d 23h") || countdowns[0].label.starts_with("1d 0h"));
}

#[tokio::test]
async fn test_quiz_scenario_over_http() {
    let quiz = javascript_quiz();
    let gateway = ScriptedGateway::new(vec![quiz.as_str()]);
    let (_controller, base_url) = spawn_server(gateway).await;
    let client = client(&base_url);

    assert!(client.quiz().await.unwrap().is_none());

    let session = client.generate_quiz("JavaScript", 5).await.unwrap();
    assert_eq!(session.questions().len(), 5);
    assert!((0..5).all(|i| session.selection(i).is_none()));
    assert_eq!(
        session.questions()[0].options(),
        &["var", "let", "const", "function"].map(String::from)
    );

    let answer = client.answer_quiz(0, "var").await.unwrap();
    assert_eq!(answer.outcome, SelectOutcome::Incorrect);
    let answer = client.answer_quiz(0, "let").await.unwrap();
    assert_eq!(answer.outcome, SelectOutcome::Locked);

    // Only question 0 is locked
    let answer = client.answer_quiz(1, "let").await.unwrap();
    assert_eq!(answer.outcome, SelectOutcome::Correct);

    let quiz = answer.quiz.unwrap();
    assert!(quiz.is_locked(0) && quiz.is_locked(1) && !quiz.is_locked(2));
    assert_eq!(quiz.score(), 1);
}

#[tokio::test]
async fn test_malformed_quiz_is_reported() {
    let gateway = ScriptedGateway::new(vec![
        r#"[{"question": "q", "options": ["a", "b", "c"], "answer": "a"}]"#,
    ]);
    let (_controller, base_url) = spawn_server(gateway).await;
    let client = client(&base_url);

    let err = client.generate_quiz("JavaScript", 1).await.unwrap_err();
    assert!(err.to_string().contains("Failed to parse the AI response"));
    assert!(client.quiz().await.unwrap().is_none());
}

#[tokio::test]
async fn test_generate_proxy_round_trip() {
    let gateway = ScriptedGateway::new(vec!["raw *model* text"]);
    let (_controller, base_url) = spawn_server(gateway).await;

    let http = HttpGateway::with_config(GatewayConfig {
        base_url,
        ..Default::default()
    });
    assert_eq!(http.submit("hello").await.unwrap(), "raw *model* text");

    // The script is exhausted, so the server reports a gateway failure
    let err = http.submit("hello again").await.unwrap_err();
    match err {
        GatewayError::Upstream { status, message } => {
            assert_eq!(status, Some(502));
            assert!(message.starts_with("Gemini request failed"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_standalone_artifacts_over_http() {
    let gateway = ScriptedGateway::new(vec![
        "* Step 1: **Basics**\n* Step 2: Practice",
        "- A diagram of the **heart**",
        "Short *summary*",
    ]);
    let (_controller, base_url) = spawn_server(gateway).await;
    let client = client(&base_url);

    let path = client.learning_path("Anatomy").await.unwrap();
    assert_eq!(path.text, "Step 1: Basics\nStep 2: Practice");

    let explanation = client
        .explain_image("https://example.com/heart.png", Some("What is shown?"))
        .await
        .unwrap();
    assert_eq!(explanation.text, "A diagram of the heart");

    let summary = client.summarize_text("A long passage").await.unwrap();
    assert_eq!(summary.text, "Short summary");

    let artifacts = client.artifacts().await.unwrap();
    assert_eq!(artifacts.learning_path, Some(path));
    assert_eq!(artifacts.explanation, Some(explanation));
    assert_eq!(artifacts.summary, Some(summary));
}
