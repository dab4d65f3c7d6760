//! Studyhub library crate
//!
//! This library turns prompts to a generative-language service into study
//! artifacts: learning paths, quizzes, task annotations, summaries and image
//! explanations. The [`controller::Controller`] ties the task store, the model
//! gateway and the response normalizer together; the `api` module exposes it
//! over HTTP.

pub mod api;
pub mod cli;
pub mod controller;
pub mod countdown;
pub mod models;
pub mod normalizer;
pub mod prompts;
pub mod quiz;

// Re-export the types most callers need
pub use controller::{ActionError, Controller, ControllerConfig, Event};
pub use models::{NewTask, Task, TaskId, TaskPatch, TaskStore};
