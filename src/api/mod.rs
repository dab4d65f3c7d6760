//! API module
//!
//! This module provides the network surface of studyhub: the outbound model
//! gateway, the HTTP server and the client for it.

pub mod client;
pub mod gateway;
pub mod server;

// Re-export commonly used types
pub use client::{Client, ClientConfig, ClientError};
pub use gateway::{Gateway, GatewayError, GeminiConfig, GeminiGateway, HttpGateway};
pub use server::{router, serve, ServerConfig};
