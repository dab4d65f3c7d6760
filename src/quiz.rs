//! Quiz questions and answer tracking

use serde::{Deserialize, Serialize};

/// A multiple-choice question with exactly four options
///
/// Constructed only through [`QuizQuestion::new`], which guarantees the answer
/// is one of the options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizQuestion {
    question: String,
    options: [String; 4],
    answer: String,
}

impl QuizQuestion {
    /// Returns `None` when `answer` is not among `options`
    pub fn new(question: String, options: [String; 4], answer: String) -> Option<Self> {
        if !options.contains(&answer) {
            return None;
        }
        Some(Self {
            question,
            options,
            answer,
        })
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn options(&self) -> &[String; 4] {
        &self.options
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn is_correct(&self, option: &str) -> bool {
        self.answer == option
    }
}

/// Result of selecting an option
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectOutcome {
    Correct,
    Incorrect,
    /// The question already has an answer; the new selection was ignored
    Locked,
    UnknownOption,
    UnknownQuestion,
}

/// A generated quiz plus the user's selections
///
/// The question list never changes after construction; only the selection
/// slots are mutable, and each slot can be written once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSession {
    topic: String,
    questions: Vec<QuizQuestion>,
    selections: Vec<Option<String>>,
}

impl QuizSession {
    pub fn new(topic: String, questions: Vec<QuizQuestion>) -> Self {
        let selections = vec![None; questions.len()];
        Self {
            topic,
            questions,
            selections,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn questions(&self) -> &[QuizQuestion] {
        &self.questions
    }

    pub fn selection(&self, index: usize) -> Option<&str> {
        self.selections.get(index).and_then(|s| s.as_deref())
    }

    pub fn is_locked(&self, index: usize) -> bool {
        self.selection(index).is_some()
    }

    /// Records the user's choice for a question and locks it
    pub fn select(&mut self, index: usize, option: &str) -> SelectOutcome {
        let Some(question) = self.questions.get(index) else {
            return SelectOutcome::UnknownQuestion;
        };
        if self.selections[index].is_some() {
            return SelectOutcome::Locked;
        }
        if !question.options().iter().any(|o| o == option) {
            return SelectOutcome::UnknownOption;
        }

        self.selections[index] = Some(option.to_string());
        if question.is_correct(option) {
            SelectOutcome::Correct
        } else {
            SelectOutcome::Incorrect
        }
    }

    /// Number of correctly answered questions
    pub fn score(&self) -> usize {
        self.questions
            .iter()
            .zip(&self.selections)
            .filter(|(q, s)| s.as_deref().is_some_and(|s| q.is_correct(s)))
            .count()
    }

    pub fn answered(&self) -> usize {
        self.selections.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.answered() == self.questions.len()
    }
}
