//! Response normalization
//!
//! Model output arrives either as markdown-laden prose or as JSON that may be
//! wrapped in a code fence. This module turns it into cleaned text or a
//! validated quiz, and reports malformed structured output as a typed
//! [`ParseFailure`] instead of guessing.

use serde::Deserialize;

use crate::prompts::Purpose;
use crate::quiz::QuizQuestion;

const FENCE: &str = "```";

/// Why structured extraction rejected the model output
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFailureReason {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("no questions in output")]
    Empty,

    #[error("question {index} has {count} options, expected 4")]
    OptionCount { index: usize, count: usize },

    #[error("the answer of question {index} is not one of its options")]
    AnswerNotInOptions { index: usize },
}

/// Model output that did not match the expected structure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("could not parse model output: {reason}")]
pub struct ParseFailure {
    /// The text exactly as received
    pub raw: String,
    pub reason: ParseFailureReason,
}

impl ParseFailure {
    fn new(raw: &str, reason: ParseFailureReason) -> Self {
        Self {
            raw: raw.to_string(),
            reason,
        }
    }
}

/// Output of [`normalize`]
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Prose(String),
    Quiz(Vec<QuizQuestion>),
}

/// Applies the transformation that belongs to `purpose`
pub fn normalize(purpose: Purpose, raw: &str) -> Result<Normalized, ParseFailure> {
    if purpose.is_structured() {
        extract_quiz(raw).map(Normalized::Quiz)
    } else {
        Ok(Normalized::Prose(cleanup_prose(raw)))
    }
}

/// Strips markdown emphasis and list markers from model prose.
///
/// Each line loses its leading `-`/`*` list markers (a marker followed by
/// whitespace or the end of the line), then every `*` character, then any
/// marker the removal exposed, then trailing whitespace. Surrounding whitespace
/// of the whole text is trimmed. Applying it twice gives the same result as
/// applying it once.
pub fn cleanup_prose(raw: &str) -> String {
    let lines: Vec<String> = raw
        .lines()
        .map(|line| {
            let without_emphasis = strip_list_markers(line).replace('*', "");
            strip_list_markers(&without_emphasis).trim_end().to_string()
        })
        .collect();

    lines.join("\n").trim().to_string()
}

fn strip_list_markers(line: &str) -> &str {
    let mut rest = line;
    let mut stripped = false;

    loop {
        let trimmed = rest.trim_start();
        let mut chars = trimmed.chars();
        match chars.next() {
            Some('-') | Some('*') => {
                let after = chars.as_str();
                if after.is_empty() {
                    return after;
                }
                if after.starts_with(char::is_whitespace) {
                    rest = after.trim_start();
                    stripped = true;
                    continue;
                }
                return if stripped { trimmed } else { rest };
            }
            _ => return if stripped { trimmed } else { rest },
        }
    }
}

/// Returns the contents of the first fenced code block, or the whole text
/// when there is none. A language tag after the opening fence is dropped and a
/// missing closing fence is tolerated.
pub fn strip_code_fences(raw: &str) -> &str {
    let text = raw.trim();
    let Some(start) = text.find(FENCE) else {
        return text;
    };

    let after = &text[start + FENCE.len()..];
    let tag_len = after
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(after.len());
    let body = &after[tag_len..];

    match body.find(FENCE) {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

#[derive(Deserialize)]
struct RawQuestion {
    question: String,
    options: Vec<String>,
    answer: String,
}

/// Parses quiz output into validated questions, preserving option order.
///
/// Fails as a whole if any question is malformed; a partially valid list is
/// never returned.
pub fn extract_quiz(raw: &str) -> Result<Vec<QuizQuestion>, ParseFailure> {
    let body = strip_code_fences(raw);

    let parsed: Vec<RawQuestion> = serde_json::from_str(body)
        .map_err(|e| ParseFailure::new(raw, ParseFailureReason::InvalidJson(e.to_string())))?;

    if parsed.is_empty() {
        return Err(ParseFailure::new(raw, ParseFailureReason::Empty));
    }

    parsed
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let count = item.options.len();
            let options: [String; 4] = item.options.try_into().map_err(|_| {
                ParseFailure::new(raw, ParseFailureReason::OptionCount { index, count })
            })?;

            QuizQuestion::new(item.question, options, item.answer).ok_or_else(|| {
                ParseFailure::new(raw, ParseFailureReason::AnswerNotInOptions { index })
            })
        })
        .collect()
}
