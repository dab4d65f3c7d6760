//! HTTP gateway implementation
//!
//! Posts prompts to the `/generate` endpoint of a studyhub server.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};

use super::{Gateway, GatewayError};

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Upper bound on a whole `/generate` exchange
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Body of `POST /generate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: String,
}

/// Response of `POST /generate`: `text` on success, `error` (and possibly
/// `details`) with a non-2xx status on failure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl GenerateResponse {
    pub fn text(text: String) -> Self {
        Self {
            text: Some(text),
            ..Default::default()
        }
    }

    pub fn error(error: impl Into<String>, details: Option<String>) -> Self {
        Self {
            text: None,
            error: Some(error.into()),
            details,
        }
    }
}

/// Gateway that talks to a studyhub server over HTTP
#[derive(Debug, Clone)]
pub struct HttpGateway {
    http_client: Arc<ReqwestClient>,
    config: GatewayConfig,
}

impl HttpGateway {
    /// Create a new gateway with default configuration
    pub fn new() -> Self {
        Self::with_config(GatewayConfig::default())
    }

    /// Create a new gateway with custom configuration
    pub fn with_config(config: GatewayConfig) -> Self {
        let http_client = ReqwestClient::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self {
            http_client: Arc::new(http_client),
            config,
        }
    }

    fn url(&self) -> String {
        format!("{}/generate", self.config.base_url.trim_end_matches('/'))
    }
}

impl Default for HttpGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Gateway for HttpGateway {
    async fn submit(&self, prompt: &str) -> Result<String, GatewayError> {
        let request = GenerateRequest {
            prompt: prompt.to_string(),
        };
        let response = self
            .http_client
            .post(self.url())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // Failure bodies are best effort; fall back to the status line
            let body: GenerateResponse = response.json().await.unwrap_or_default();
            let mut message = body
                .error
                .unwrap_or_else(|| format!("request failed with status {}", status));
            if let Some(details) = body.details {
                message = format!("{}: {}", message, details);
            }
            return Err(GatewayError::upstream(Some(status.as_u16()), message));
        }

        let body: GenerateResponse = response.json().await?;
        match body.text {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(GatewayError::upstream(
                Some(status.as_u16()),
                "response did not contain any text",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use tokio::net::TcpListener;

    async fn spawn_stub(status: StatusCode, body: serde_json::Value) -> String {
        let app = Router::new().route(
            "/generate",
            post(move |Json(_req): Json<GenerateRequest>| {
                let body = body.clone();
                async move { (status, Json(body)) }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", address)
    }

    fn gateway(base_url: String) -> HttpGateway {
        HttpGateway::with_config(GatewayConfig {
            base_url,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_success_returns_text() {
        let url = spawn_stub(
            StatusCode::OK,
            serde_json::json!({ "text": "**Chapter 1** covers *basics*." }),
        )
        .await;
        let text = gateway(url).submit("Explain chapter 1").await.unwrap();
        assert_eq!(text, "**Chapter 1** covers *basics*.");
    }

    #[tokio::test]
    async fn test_failure_status_is_upstream_error() {
        let url = spawn_stub(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Gemini request failed", "details": "quota" }),
        )
        .await;
        let err = gateway(url).submit("x").await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::upstream(Some(500), "Gemini request failed: quota")
        );
    }

    #[tokio::test]
    async fn test_missing_text_is_upstream_error() {
        let url = spawn_stub(StatusCode::OK, serde_json::json!({ "output": "hi" })).await;
        let err = gateway(url).submit("x").await.unwrap_err();
        assert!(matches!(err, GatewayError::Upstream { status: Some(200), .. }));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        // Reserve a port, then close it so nothing is listening there
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let err = gateway(format!("http://{}", address))
            .submit("x")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Network(_)));
    }

    #[tokio::test]
    async fn test_slow_server_hits_client_timeout() {
        let app = Router::new().route(
            "/generate",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Json(serde_json::json!({ "text": "late" }))
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let gateway = HttpGateway::with_config(GatewayConfig {
            base_url: format!("http://{}", address),
            timeout: Duration::from_millis(200),
        });
        let err = gateway.submit("x").await.unwrap_err();
        assert!(matches!(err, GatewayError::Upstream { status: None, .. }));
    }
}
