//! Gateway trait definition
//!
//! This module defines the `Gateway` trait that abstracts over the ways a
//! prompt can reach a generative model.

use std::sync::Arc;
use std::time::Duration;

/// Gateway errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The endpoint could not be reached
    #[error("network error: {0}")]
    Network(String),

    /// The endpoint answered, but with a failure status or without text
    #[error("upstream error{}: {message}", status_suffix(.status))]
    Upstream {
        status: Option<u16>,
        message: String,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl GatewayError {
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        GatewayError::Upstream {
            status,
            message: message.into(),
        }
    }

    /// A call that produced no answer in time is reported as an upstream failure
    pub fn timeout(after: Duration) -> Self {
        GatewayError::upstream(
            None,
            format!("no response within {} seconds", after.as_secs_f64()),
        )
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            GatewayError::upstream(Some(status.as_u16()), error.to_string())
        } else if error.is_timeout() {
            GatewayError::upstream(None, format!("request timed out: {}", error))
        } else if error.is_decode() {
            GatewayError::upstream(None, format!("unreadable response: {}", error))
        } else {
            GatewayError::Network(error.to_string())
        }
    }
}

/// Trait defining the outbound generation call
///
/// Implementations make exactly one request per call and never retry; the
/// caller decides what a failure means for the user.
#[async_trait::async_trait]
pub trait Gateway: Send + Sync {
    /// Sends a prompt and returns the model's raw text
    async fn submit(&self, prompt: &str) -> Result<String, GatewayError>;

    /// Like `submit`, but a call still unanswered after `limit` fails with
    /// [`GatewayError::timeout`]
    async fn submit_within(&self, prompt: &str, limit: Duration) -> Result<String, GatewayError> {
        match tokio::time::timeout(limit, self.submit(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::timeout(limit)),
        }
    }
}

#[async_trait::async_trait]
impl<G: Gateway + ?Sized> Gateway for Arc<G> {
    async fn submit(&self, prompt: &str) -> Result<String, GatewayError> {
        (**self).submit(prompt).await
    }
}
