//! Interaction controller
//!
//! The controller owns the current task snapshot, the active quiz and the
//! latest standalone artifacts. User actions come in as method calls; those
//! that need the model go through the [`Gateway`] with a timeout, and every
//! state change is announced on a broadcast channel.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::gateway::{Gateway, GatewayError};
use crate::countdown::{self, Countdown, DeadlineState};
use crate::models::{NewTask, Progress, Task, TaskId, TaskPatch, TaskStatus, TaskStore};
use crate::normalizer::{self, ParseFailure};
use crate::prompts::{self, Purpose};
use crate::quiz::{QuizSession, SelectOutcome};

/// Process-unique id of a generation request
pub type RequestId = u64;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Upper bound for a single gateway call
    pub request_timeout: Duration,
    /// Period of [`Event::Tick`]
    pub tick_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            tick_interval: Duration::from_secs(60),
        }
    }
}

/// Notifications for the rendering layer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    /// Controller state changed
    Changed,
    /// Countdowns should be recomputed
    Tick,
}

/// What a generation request updates when it resolves
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Target {
    Task(TaskId),
    Standalone,
}

/// An outstanding model call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    id: RequestId,
    prompt: String,
    target: Target,
    purpose: Purpose,
}

impl GenerationRequest {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn purpose(&self) -> Purpose {
        self.purpose
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPath {
    pub course: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageExplanation {
    pub image_ref: String,
    pub prompt: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub source: String,
    pub text: String,
}

/// Latest result of each standalone generation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    pub learning_path: Option<LearningPath>,
    pub explanation: Option<ImageExplanation>,
    pub summary: Option<Summary>,
}

/// Pending edits for a single task, applied on save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditDraft {
    pub task_id: TaskId,
    pub patch: TaskPatch,
}

/// Countdown of one task at the time of the call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCountdown {
    pub id: TaskId,
    pub title: String,
    pub countdown: Countdown,
    pub state: DeadlineState,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("input is empty")]
    EmptyInput,

    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    #[error("a request for this item is already in flight")]
    Busy,

    #[error("task has no content to summarize")]
    NothingToSummarize,

    #[error("no edit in progress")]
    NoDraft,

    #[error("result discarded because its target is gone")]
    Discarded,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Parse(#[from] ParseFailure),
}

impl ActionError {
    /// Text shown to the user in place of the missing result
    pub fn user_message(&self) -> &'static str {
        match self {
            ActionError::EmptyInput => "Please enter some text first.",
            ActionError::UnknownTask(_) => "That task no longer exists.",
            ActionError::Busy => "Still working on the previous request. Please wait.",
            ActionError::NothingToSummarize => "Analyze the task before summarizing it.",
            ActionError::NoDraft => "Nothing is being edited.",
            ActionError::Discarded => "The task was removed before the response arrived.",
            ActionError::Gateway(_) => "Error fetching AI response. Please try again.",
            ActionError::Parse(_) => "Failed to parse the AI response. Try again.",
        }
    }
}

#[derive(Default)]
struct State {
    store: TaskStore,
    quiz: Option<QuizSession>,
    artifacts: Artifacts,
    draft: Option<EditDraft>,
    in_flight: HashMap<TaskId, RequestId>,
    standalone: HashSet<Purpose>,
    last_request: RequestId,
}

impl State {
    fn issue(&mut self, prompt: String, target: Target, purpose: Purpose) -> GenerationRequest {
        self.last_request += 1;
        GenerationRequest {
            id: self.last_request,
            prompt,
            target,
            purpose,
        }
    }

    /// Drops every registration that points at a task no longer in the store
    fn forget_missing(&mut self) {
        let store = &self.store;
        self.in_flight.retain(|id, _| store.contains(*id));
        if let Some(draft) = &self.draft {
            if !store.contains(draft.task_id) {
                self.draft = None;
            }
        }
    }

    fn task(&self, id: TaskId) -> Result<Task, ActionError> {
        self.store
            .get(id)
            .cloned()
            .ok_or(ActionError::UnknownTask(id))
    }
}

#[derive(Clone)]
pub struct Controller {
    inner: Arc<Mutex<State>>,
    gateway: Arc<dyn Gateway>,
    config: ControllerConfig,
    update_tx: Arc<broadcast::Sender<Event>>,
}

impl Controller {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self::with_config(gateway, ControllerConfig::default())
    }

    pub fn with_config(gateway: Arc<dyn Gateway>, config: ControllerConfig) -> Self {
        let (tx, _rx) = broadcast::channel(100);

        Self {
            inner: Arc::new(Mutex::new(State::default())),
            gateway,
            config,
            update_tx: Arc::new(tx),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn notify(&self, event: Event) {
        // No receivers is fine
        let _ = self.update_tx.send(event);
    }

    /// Runs `f` against the state and announces a change when it reports one
    fn with_state<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut State) -> (bool, R),
    {
        let (changed, result) = {
            let mut state = self.lock();
            f(&mut state)
        };
        if changed {
            self.notify(Event::Changed);
        }
        result
    }

    /// Applies a store mutation to an existing task and returns the task after it
    fn update_existing<F>(&self, id: TaskId, f: F) -> Result<Task, ActionError>
    where
        F: FnOnce(&TaskStore) -> TaskStore,
    {
        self.with_state(|state| {
            if !state.store.contains(id) {
                return (false, Err(ActionError::UnknownTask(id)));
            }
            let next = f(&state.store);
            let changed = next.changed_from(&state.store);
            state.store = next;
            (changed, state.task(id))
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.update_tx.subscribe()
    }

    /// Starts the periodic [`Event::Tick`] broadcast. The first tick fires one
    /// interval after the call.
    pub fn spawn_ticker(&self) -> JoinHandle<()> {
        let tx = self.update_tx.clone();
        let period = self.config.tick_interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                let _ = tx.send(Event::Tick);
            }
        })
    }

    // ---- reads ----

    pub fn snapshot(&self) -> TaskStore {
        self.lock().store.clone()
    }

    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.lock().store.get(id).cloned()
    }

    pub fn quiz(&self) -> Option<QuizSession> {
        self.lock().quiz.clone()
    }

    pub fn artifacts(&self) -> Artifacts {
        self.lock().artifacts.clone()
    }

    pub fn draft(&self) -> Option<EditDraft> {
        self.lock().draft.clone()
    }

    /// True while a standalone request of the given purpose is outstanding
    pub fn is_pending(&self, purpose: Purpose) -> bool {
        self.lock().standalone.contains(&purpose)
    }

    pub fn progress(&self) -> Progress {
        self.lock().store.progress()
    }

    pub fn countdowns(&self, now: DateTime<Utc>) -> Vec<TaskCountdown> {
        let store = self.snapshot();
        store
            .iter()
            .map(|task| {
                let countdown = countdown::remaining(task, now);
                TaskCountdown {
                    id: task.id(),
                    title: task.title().to_string(),
                    countdown,
                    state: countdown.state(),
                    label: countdown.to_string(),
                }
            })
            .collect()
    }

    // ---- task records ----

    pub fn add_task(&self, new_task: NewTask) -> Result<TaskId, ActionError> {
        let id = self.with_state(|state| {
            let (next, id) = state.store.add(new_task);
            state.store = next;
            (id.is_some(), id)
        });

        match id {
            Some(id) => {
                tracing::info!(task = %id, "Added task");
                Ok(id)
            }
            None => Err(ActionError::EmptyInput),
        }
    }

    /// Deletes a task together with its in-flight registration and any edit
    /// draft targeting it. Returns whether a task was removed.
    pub fn remove_task(&self, id: TaskId) -> bool {
        let removed = self.with_state(|state| {
            let next = state.store.remove(id);
            let changed = next.changed_from(&state.store);
            state.store = next;
            state.forget_missing();
            (changed, changed)
        });
        if removed {
            tracing::info!(task = %id, "Removed task");
        }
        removed
    }

    pub fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, ActionError> {
        self.update_existing(id, |store| store.update(id, patch))
    }

    pub fn toggle_complete(&self, id: TaskId) -> Result<Task, ActionError> {
        self.update_existing(id, |store| store.toggle_complete(id))
    }

    pub fn add_subtask(&self, id: TaskId, name: &str) -> Result<Task, ActionError> {
        if name.trim().is_empty() {
            return Err(ActionError::EmptyInput);
        }
        self.update_existing(id, |store| store.add_subtask(id, name))
    }

    pub fn toggle_subtask(&self, id: TaskId, index: usize) -> Result<Task, ActionError> {
        self.update_existing(id, |store| store.toggle_subtask(id, index))
    }

    /// Removes every completed task, returning how many were removed
    pub fn clear_completed(&self) -> usize {
        self.with_state(|state| {
            let before = state.store.len();
            state.store = state.store.clear_completed();
            state.forget_missing();
            let removed = before - state.store.len();
            (removed > 0, removed)
        })
    }

    // ---- edit in place ----

    /// Starts editing a task, replacing any draft for another task
    pub fn begin_edit(&self, id: TaskId) -> Result<EditDraft, ActionError> {
        self.with_state(|state| match state.task(id) {
            Ok(task) => {
                let draft = EditDraft {
                    task_id: id,
                    patch: TaskPatch::from_task(&task),
                };
                state.draft = Some(draft.clone());
                (true, Ok(draft))
            }
            Err(e) => (false, Err(e)),
        })
    }

    /// Layers `patch` onto the current draft
    pub fn edit_draft(&self, patch: TaskPatch) -> Result<EditDraft, ActionError> {
        self.with_state(|state| match state.draft.as_mut() {
            Some(draft) => {
                draft.patch.merge(patch);
                (true, Ok(draft.clone()))
            }
            None => (false, Err(ActionError::NoDraft)),
        })
    }

    /// Applies the draft to its task and clears it
    pub fn save_edit(&self) -> Result<Task, ActionError> {
        let draft = self
            .with_state(|state| (false, state.draft.take()))
            .ok_or(ActionError::NoDraft)?;
        let result = self.update_task(draft.task_id, &draft.patch);
        // Clearing the draft is a change even when the patch was not
        self.notify(Event::Changed);
        result
    }

    pub fn cancel_edit(&self) -> bool {
        self.with_state(|state| {
            let had_draft = state.draft.take().is_some();
            (had_draft, had_draft)
        })
    }

    // ---- per-task generation ----

    /// Asks the model about a task and stores the cleaned answer as its AI
    /// content.
    pub async fn analyze_task(&self, id: TaskId) -> Result<String, ActionError> {
        self.run_task_request(id, Purpose::Analyze, TaskStatus::Querying, |task| {
            Ok(prompts::analyze_prompt(task))
        })
        .await
    }

    /// Replaces a task's AI content with a summary of it
    pub async fn summarize_task(&self, id: TaskId) -> Result<String, ActionError> {
        self.run_task_request(id, Purpose::Summarize, TaskStatus::Summarizing, |task| {
            if task.ai_content().trim().is_empty() {
                Err(ActionError::NothingToSummarize)
            } else {
                Ok(prompts::summarize_prompt(task.ai_content()))
            }
        })
        .await
    }

    async fn run_task_request<F>(
        &self,
        id: TaskId,
        purpose: Purpose,
        status: TaskStatus,
        build_prompt: F,
    ) -> Result<String, ActionError>
    where
        F: FnOnce(&Task) -> Result<String, ActionError>,
    {
        let request = self.with_state(|state| {
            let task = match state.task(id) {
                Ok(task) => task,
                Err(e) => return (false, Err(e)),
            };
            if task.status().is_pending() || state.in_flight.contains_key(&id) {
                return (false, Err(ActionError::Busy));
            }
            let prompt = match build_prompt(&task) {
                Ok(prompt) => prompt,
                Err(e) => return (false, Err(e)),
            };

            let request = state.issue(prompt, Target::Task(id), purpose);
            state.in_flight.insert(id, request.id());
            state.store = state.store.set_status(id, status);
            (true, Ok(request))
        })?;

        tracing::debug!(task = %id, request = request.id(), %purpose, "Task request started");

        // Resolution runs to completion even if the caller stops waiting
        let request_id = request.id();
        let this = self.clone();
        match tokio::spawn(async move {
            let outcome = this.dispatch(&request).await;
            this.resolve_task_request(id, &request, outcome)
        })
        .await
        {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(task = %id, request = request_id, error = %e, "Task request aborted");
                self.abandon_task_request(id, request_id);
                Err(ActionError::Discarded)
            }
        }
    }

    /// Releases a task whose request never resolved so it can be retried
    fn abandon_task_request(&self, id: TaskId, request_id: RequestId) {
        self.with_state(|state| {
            if state.in_flight.get(&id) != Some(&request_id) {
                return (false, ());
            }
            state.in_flight.remove(&id);
            state.store = state.store.set_status(id, TaskStatus::Error);
            (true, ())
        });
    }

    fn resolve_task_request(
        &self,
        id: TaskId,
        request: &GenerationRequest,
        outcome: Result<String, GatewayError>,
    ) -> Result<String, ActionError> {
        self.with_state(|state| {
            let registered = state.in_flight.get(&id).copied();
            if registered != Some(request.id()) || !state.store.contains(id) {
                tracing::warn!(task = %id, request = request.id(), "Discarding result for removed task");
                return (false, Err(ActionError::Discarded));
            }
            state.in_flight.remove(&id);

            match outcome {
                Ok(raw) => {
                    let text = normalizer::cleanup_prose(&raw);
                    state.store = state
                        .store
                        .set_ai_content(id, text.clone())
                        .set_status(id, TaskStatus::Idle);
                    tracing::info!(task = %id, purpose = %request.purpose(), "Task request completed");
                    (true, Ok(text))
                }
                Err(e) => {
                    tracing::warn!(task = %id, purpose = %request.purpose(), error = %e, "Task request failed");
                    state.store = state.store.set_status(id, TaskStatus::Error);
                    (true, Err(e.into()))
                }
            }
        })
    }

    // ---- standalone generation ----

    pub async fn generate_learning_path(&self, course: &str) -> Result<LearningPath, ActionError> {
        let course = non_blank(course)?;
        let prompt = prompts::learning_path_prompt(&course);

        self.run_standalone(Purpose::Path, prompt, move |state, raw| {
            let path = LearningPath {
                course,
                text: normalizer::cleanup_prose(&raw),
            };
            state.artifacts.learning_path = Some(path.clone());
            Ok(path)
        })
        .await
    }

    /// Generates a new quiz. A malformed response keeps the previous quiz.
    pub async fn generate_quiz(&self, topic: &str, count: usize) -> Result<QuizSession, ActionError> {
        let topic = non_blank(topic)?;
        let count = if count == 0 {
            prompts::DEFAULT_QUIZ_QUESTIONS
        } else {
            count
        };
        let prompt = prompts::quiz_prompt(&topic, count);

        self.run_standalone(Purpose::Quiz, prompt, move |state, raw| {
            let questions = normalizer::extract_quiz(&raw)?;
            let session = QuizSession::new(topic, questions);
            state.quiz = Some(session.clone());
            Ok(session)
        })
        .await
    }

    pub fn answer_quiz(&self, question: usize, option: &str) -> SelectOutcome {
        self.with_state(|state| {
            let outcome = match state.quiz.as_mut() {
                Some(quiz) => quiz.select(question, option),
                None => SelectOutcome::UnknownQuestion,
            };
            let changed = matches!(outcome, SelectOutcome::Correct | SelectOutcome::Incorrect);
            (changed, outcome)
        })
    }

    /// Explains an image. A blank instruction falls back to the default prompt.
    pub async fn explain_image(
        &self,
        image_ref: &str,
        instruction: Option<&str>,
    ) -> Result<ImageExplanation, ActionError> {
        let image_ref = non_blank(image_ref)?;
        let instruction = instruction
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(prompts::DEFAULT_IMAGE_PROMPT)
            .to_string();
        let prompt = prompts::explain_image_prompt(&image_ref, &instruction);

        self.run_standalone(Purpose::Explain, prompt, move |state, raw| {
            let explanation = ImageExplanation {
                image_ref,
                prompt: instruction,
                text: normalizer::cleanup_prose(&raw),
            };
            state.artifacts.explanation = Some(explanation.clone());
            Ok(explanation)
        })
        .await
    }

    pub async fn summarize_text(&self, text: &str) -> Result<Summary, ActionError> {
        let source = non_blank(text)?;
        let prompt = prompts::summarize_prompt(&source);

        self.run_standalone(Purpose::Summarize, prompt, move |state, raw| {
            let summary = Summary {
                source,
                text: normalizer::cleanup_prose(&raw),
            };
            state.artifacts.summary = Some(summary.clone());
            Ok(summary)
        })
        .await
    }

    /// Issues a request that is not tied to a task. At most one request per
    /// purpose is outstanding; `apply` runs under the state lock.
    async fn run_standalone<T, F>(
        &self,
        purpose: Purpose,
        prompt: String,
        apply: F,
    ) -> Result<T, ActionError>
    where
        T: Send + 'static,
        F: FnOnce(&mut State, String) -> Result<T, ActionError> + Send + 'static,
    {
        let request = self.with_state(|state| {
            if !state.standalone.insert(purpose) {
                return (false, Err(ActionError::Busy));
            }
            (true, Ok(state.issue(prompt, Target::Standalone, purpose)))
        })?;

        tracing::debug!(request = request.id(), %purpose, "Standalone request started");

        let this = self.clone();
        match tokio::spawn(async move {
            let outcome = this.dispatch(&request).await;
            this.with_state(|state| {
                state.standalone.remove(&purpose);
                let result = outcome
                    .map_err(ActionError::from)
                    .and_then(|raw| apply(state, raw));
                match &result {
                    Ok(_) => tracing::info!(%purpose, "Standalone request completed"),
                    Err(e) => tracing::warn!(%purpose, error = %e, "Standalone request failed"),
                }
                (true, result)
            })
        })
        .await
        {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(%purpose, error = %e, "Standalone request aborted");
                self.with_state(|state| (state.standalone.remove(&purpose), ()));
                Err(ActionError::Discarded)
            }
        }
    }

    /// The single suspension point: one gateway call bounded by the timeout
    async fn dispatch(&self, request: &GenerationRequest) -> Result<String, GatewayError> {
        self.gateway
            .submit_within(request.prompt(), self.config.request_timeout)
            .await
    }
}

fn non_blank(input: &str) -> Result<String, ActionError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        Err(ActionError::EmptyInput)
    } else {
        Ok(trimmed.to_string())
    }
}
