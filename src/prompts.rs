//! Prompt builders for each generation purpose
//!
//! Every outbound request starts here: the controller picks a purpose and the
//! matching builder turns user input into the natural-language prompt sent to
//! the gateway.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::Task;

/// Number of quiz questions requested when the caller does not specify one
pub const DEFAULT_QUIZ_QUESTIONS: usize = 5;

/// Prompt used for image explanation when the user does not write their own
pub const DEFAULT_IMAGE_PROMPT: &str = "Analyze this image and provide a detailed explanation of what you see, including objects, people, activities, and context.";

/// Canned prompts offered next to the image explanation input
pub const QUICK_IMAGE_PROMPTS: &[&str] = &[
    "Analyze this image and provide a detailed explanation",
    "Describe the objects, people, and activities in this image",
    "What is the context and setting of this image?",
    "Identify and explain the main elements in this image",
    "Provide a creative interpretation of this image",
];

/// What a generation request is for; selects both the prompt and the
/// normalization applied to the response
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Path,
    Quiz,
    Analyze,
    Summarize,
    Explain,
}

impl Purpose {
    /// Quiz output is parsed as JSON; everything else is cleaned prose
    pub fn is_structured(&self) -> bool {
        matches!(self, Purpose::Quiz)
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Purpose::Path => "path",
            Purpose::Quiz => "quiz",
            Purpose::Analyze => "analyze",
            Purpose::Summarize => "summarize",
            Purpose::Explain => "explain",
        };
        f.write_str(label)
    }
}

/// Step-by-step learning path for a course
pub fn learning_path_prompt(course: &str) -> String {
    format!(
        "Create a clean, step-by-step learning path for learning {course}.\n\
         For each step include: Title, Duration, Objective, and Suggested Resources.\n\
         Do NOT use markdown (** or *), just plain text.",
        course = course.trim()
    )
}

/// Multiple-choice quiz returned as a bare JSON array
pub fn quiz_prompt(topic: &str, count: usize) -> String {
    format!(
        r#"Generate a {count}-question multiple-choice quiz on {topic}.
Each question should have exactly 4 options and 1 correct answer.
Return ONLY valid JSON in this format (no extra text, no markdown):
[
  {{
    "question": "What is React?",
    "options": ["A library", "A framework", "A language", "A database"],
    "answer": "A library"
  }}
]"#,
        count = count,
        topic = topic.trim()
    )
}

/// Study help for a single task. The task's query drives the prompt; the
/// title stands in when no query was written.
pub fn analyze_prompt(task: &Task) -> String {
    let question = if task.query().trim().is_empty() {
        task.title()
    } else {
        task.query()
    };

    let mut prompt = format!(
        "You are a study assistant helping with the learning task \"{}\".\n\n{}\n",
        task.title(),
        question.trim()
    );
    if let Some(image_ref) = task.image_ref() {
        prompt.push_str(&format!("\nThe task refers to this image: {}\n", image_ref));
    }
    prompt.push_str("\nAnswer in plain text, without markdown.");
    prompt
}

pub fn summarize_prompt(text: &str) -> String {
    format!("Summarize the following text:\n\n{}", text.trim())
}

/// Explanation of an image referenced by URL or path
pub fn explain_image_prompt(image_ref: &str, instruction: &str) -> String {
    let instruction = if instruction.trim().is_empty() {
        DEFAULT_IMAGE_PROMPT
    } else {
        instruction.trim()
    };
    format!("{}\n\nImage: {}", instruction, image_ref.trim())
}
