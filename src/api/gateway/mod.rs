//! Gateway module
//!
//! This module provides the single outbound call that turns a prompt into raw
//! model text, either through a studyhub server or directly against Gemini.

mod gemini;
mod http;
mod trait_def;

// Re-export the trait and types
pub use gemini::{GeminiConfig, GeminiGateway, DEFAULT_GEMINI_ENDPOINT, DEFAULT_GEMINI_MODEL};
pub use http::{GatewayConfig, GenerateRequest, GenerateResponse, HttpGateway};
pub use trait_def::{Gateway, GatewayError};
