//! API client module
//!
//! This module provides HTTP client functionality to interact with the studyhub API server.

use std::sync::Arc;

use reqwest::{Client as ReqwestClient, Error as ReqwestError, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use crate::api::server::{AddTaskRequest, AnswerResponse, ApiResponse};
use crate::controller::{Artifacts, ImageExplanation, LearningPath, Summary, TaskCountdown};
use crate::models::{Filter, Progress, Task, TaskId, TaskPatch};
use crate::quiz::QuizSession;

/// API client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] ReqwestError),

    #[error("API error: {0}")]
    Api(String),

    #[error("Missing data in response")]
    MissingData,
}

/// API client for the studyhub service
#[derive(Debug, Clone)]
pub struct Client {
    http_client: Arc<ReqwestClient>,
    config: ClientConfig,
}

impl Client {
    /// Create a new client with default configuration
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            http_client: Arc::new(ReqwestClient::new()),
            config,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Sends a request and unwraps the response envelope. Error statuses still
    /// carry an envelope, so the body is decoded before the status is checked.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        let api_response: ApiResponse<T> = response.json().await?;

        let (success, data, error) = api_response.into_parts();
        if success && status.is_success() {
            data.ok_or(ClientError::MissingData)
        } else {
            Err(ClientError::Api(
                error.unwrap_or_else(|| format!("request failed with status {}", status)),
            ))
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send(self.http_client.get(self.url(path))).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.send(self.http_client.post(self.url(path)).json(body))
            .await
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send(self.http_client.delete(self.url(path))).await
    }

    // ---- tasks ----

    /// List tasks matching a filter and a case-insensitive title search
    pub async fn list_tasks(&self, filter: Filter, search: &str) -> Result<Vec<Task>, ClientError> {
        let mut url = Url::parse(&self.url("/api/tasks"))
            .map_err(|e| ClientError::Api(format!("invalid server URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("filter", &filter.to_string())
            .append_pair("search", search);
        self.send(self.http_client.get(url)).await
    }

    pub async fn add_task(&self, request: &AddTaskRequest) -> Result<Task, ClientError> {
        self.post("/api/tasks", request).await
    }

    pub async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, ClientError> {
        self.send(
            self.http_client
                .patch(self.url(&format!("/api/tasks/{}", id)))
                .json(patch),
        )
        .await
    }

    pub async fn remove_task(&self, id: TaskId) -> Result<TaskId, ClientError> {
        self.delete(&format!("/api/tasks/{}", id)).await
    }

    pub async fn toggle_task(&self, id: TaskId) -> Result<Task, ClientError> {
        self.post(&format!("/api/tasks/{}/toggle", id), &json!({}))
            .await
    }

    pub async fn add_subtask(&self, id: TaskId, name: &str) -> Result<Task, ClientError> {
        self.post(
            &format!("/api/tasks/{}/subtasks", id),
            &json!({ "name": name }),
        )
        .await
    }

    pub async fn toggle_subtask(&self, id: TaskId, index: usize) -> Result<Task, ClientError> {
        self.post(
            &format!("/api/tasks/{}/subtasks/{}/toggle", id, index),
            &json!({}),
        )
        .await
    }

    /// Run the AI analysis for a task; returns the task with its new content
    pub async fn analyze_task(&self, id: TaskId) -> Result<Task, ClientError> {
        self.post(&format!("/api/tasks/{}/analyze", id), &json!({}))
            .await
    }

    pub async fn summarize_task(&self, id: TaskId) -> Result<Task, ClientError> {
        self.post(&format!("/api/tasks/{}/summarize", id), &json!({}))
            .await
    }

    /// Remove all completed tasks, returning how many were removed
    pub async fn clear_completed(&self) -> Result<usize, ClientError> {
        self.delete("/api/tasks").await
    }

    pub async fn countdowns(&self) -> Result<Vec<TaskCountdown>, ClientError> {
        self.get("/api/countdowns").await
    }

    pub async fn progress(&self) -> Result<Progress, ClientError> {
        self.get("/api/progress").await
    }

    // ---- standalone generation ----

    /// The active quiz; `None` before the first quiz is generated
    pub async fn quiz(&self) -> Result<Option<QuizSession>, ClientError> {
        match self.get::<Option<QuizSession>>("/api/quiz").await {
            Err(ClientError::MissingData) => Ok(None),
            other => other,
        }
    }

    pub async fn generate_quiz(&self, topic: &str, count: usize) -> Result<QuizSession, ClientError> {
        self.post("/api/quiz", &json!({ "topic": topic, "count": count }))
            .await
    }

    pub async fn answer_quiz(
        &self,
        question: usize,
        option: &str,
    ) -> Result<AnswerResponse, ClientError> {
        self.post(
            "/api/quiz/answer",
            &json!({ "question": question, "option": option }),
        )
        .await
    }

    pub async fn learning_path(&self, course: &str) -> Result<LearningPath, ClientError> {
        self.post("/api/path", &json!({ "course": course })).await
    }

    pub async fn explain_image(
        &self,
        image_ref: &str,
        prompt: Option<&str>,
    ) -> Result<ImageExplanation, ClientError> {
        self.post(
            "/api/explain",
            &json!({ "image_ref": image_ref, "prompt": prompt }),
        )
        .await
    }

    pub async fn summarize_text(&self, text: &str) -> Result<Summary, ClientError> {
        self.post("/api/summarize", &json!({ "text": text })).await
    }

    pub async fn artifacts(&self) -> Result<Artifacts, ClientError> {
        self.get("/api/artifacts").await
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
