//! CLI module
//!
//! This module provides the command-line interface functionality for studyhub.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;

use crate::{
    api::{
        gateway::{GatewayConfig, DEFAULT_GEMINI_ENDPOINT, DEFAULT_GEMINI_MODEL},
        server::AddTaskRequest,
        serve, Client, ClientConfig, Gateway, GeminiConfig, GeminiGateway, HttpGateway,
        ServerConfig,
    },
    controller::{Controller, ControllerConfig},
    countdown::{self, Countdown},
    models::{parse_due_date, Filter, Priority, Task, TaskId, TaskPatch, TaskStatus},
    normalizer::{normalize, Normalized},
    prompts::{Purpose, DEFAULT_QUIZ_QUESTIONS},
    quiz::{QuizQuestion, SelectOutcome},
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API server URL
    #[arg(
        short,
        long,
        global = true,
        env = "STUDYHUB_SERVER",
        default_value = "http://localhost:3000"
    )]
    server: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the studyhub API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 3000)]
        port: u16,

        /// Gemini API key
        #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Gemini model name
        #[arg(long, default_value = DEFAULT_GEMINI_MODEL)]
        model: String,

        /// Base URL of the Generative Language API
        #[arg(long, default_value = DEFAULT_GEMINI_ENDPOINT)]
        endpoint: String,

        /// Seconds before a model call is abandoned
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,

        /// Seconds between countdown refresh events
        #[arg(long, default_value_t = 60)]
        tick_secs: u64,
    },

    /// Send a raw prompt through the server's /generate endpoint
    Generate {
        prompt: String,

        /// Clean the output the way results of this kind are cleaned
        /// (path, quiz, analyze, summarize, explain)
        #[arg(long, value_parser = parse_purpose)]
        purpose: Option<Purpose>,
    },

    /// Task management commands
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Generate a multiple-choice quiz on a topic
    Quiz {
        topic: String,

        /// Number of questions
        #[arg(short, long, default_value_t = DEFAULT_QUIZ_QUESTIONS)]
        count: usize,
    },

    /// Answer a question of the active quiz (questions are numbered from 1)
    Answer { question: usize, option: String },

    /// Generate a step-by-step learning path for a course
    Path { course: String },

    /// Explain an image given by URL or path
    Explain {
        image: String,

        /// Instruction for the explanation
        #[arg(short, long)]
        prompt: Option<String>,
    },

    /// Summarize a piece of text
    Summarize { text: String },

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Add a new task
    Add {
        /// Task title
        title: String,

        /// Question for the AI analysis
        #[arg(short, long)]
        query: Option<String>,

        /// Image URL or path the task refers to
        #[arg(long)]
        image: Option<String>,

        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(short, long)]
        due: Option<String>,

        /// Priority (high, medium, low)
        #[arg(short, long, default_value = "medium")]
        priority: Priority,
    },

    /// List tasks
    List {
        /// all, completed, pending or high
        #[arg(short, long, default_value = "all")]
        filter: Filter,

        /// Only tasks whose title contains this text
        #[arg(long, default_value = "")]
        search: String,
    },

    /// Edit a task
    Edit {
        id: u64,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        query: Option<String>,

        /// New due date, or "none" to clear it
        #[arg(short, long)]
        due: Option<String>,

        #[arg(short, long)]
        priority: Option<Priority>,
    },

    /// Toggle a task's completion
    Done { id: u64 },

    /// Remove a task
    Rm { id: u64 },

    /// Add a subtask
    Sub { id: u64, name: String },

    /// Toggle a subtask's completion (subtasks are numbered from 1)
    #[command(name = "sub-done")]
    SubDone { id: u64, index: usize },

    /// Ask the AI about a task
    Analyze { id: u64 },

    /// Summarize a task's AI content
    Summarize { id: u64 },

    /// Remove all completed tasks
    Clear,
}

fn parse_purpose(s: &str) -> Result<Purpose, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "path" => Ok(Purpose::Path),
        "quiz" => Ok(Purpose::Quiz),
        "analyze" => Ok(Purpose::Analyze),
        "summarize" => Ok(Purpose::Summarize),
        "explain" => Ok(Purpose::Explain),
        other => Err(format!("unknown purpose '{}'", other)),
    }
}

/// Run the CLI application
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve {
            port,
            api_key,
            model,
            endpoint,
            timeout_secs,
            tick_secs,
        } => {
            println!("Starting studyhub API server on port {}...", port);

            let gateway: Arc<dyn Gateway> = Arc::new(GeminiGateway::new(GeminiConfig {
                endpoint: endpoint.clone(),
                model: model.clone(),
                api_key: api_key.clone(),
            }));
            let controller = Controller::with_config(
                gateway.clone(),
                ControllerConfig {
                    request_timeout: Duration::from_secs(*timeout_secs),
                    tick_interval: Duration::from_secs(*tick_secs),
                },
            );

            // Create a server configuration with the specified port
            let config = ServerConfig {
                address: ([127, 0, 0, 1], *port).into(),
            };

            serve(controller, gateway, config).await?;
            Ok(())
        }

        Commands::Generate { prompt, purpose } => {
            let gateway = HttpGateway::with_config(GatewayConfig {
                base_url: cli.server.clone(),
                ..Default::default()
            });
            let raw = gateway.submit(prompt).await?;

            match purpose {
                None => println!("{}", raw),
                Some(purpose) => match normalize(*purpose, &raw)? {
                    Normalized::Prose(text) => println!("{}", text),
                    Normalized::Quiz(questions) => print_questions(&questions),
                },
            }
            Ok(())
        }

        Commands::Task { command } => run_task_command(create_client(&cli.server), command).await,

        Commands::Quiz { topic, count } => {
            let client = create_client(&cli.server);
            let quiz = client.generate_quiz(topic, *count).await?;

            println!("{} {}", "Quiz:".bold(), quiz.topic());
            print_questions(quiz.questions());
            println!("\nAnswer with 'studyhub answer <question> <option>'");
            Ok(())
        }

        Commands::Answer { question, option } => {
            let client = create_client(&cli.server);
            let index = question.checked_sub(1).ok_or("questions are numbered from 1")?;

            // Accept either the option text or its letter
            let option = match client.quiz().await? {
                Some(quiz) => resolve_option(quiz.questions().get(index), option),
                None => return Err("no quiz yet; run 'studyhub quiz <topic>' first".into()),
            };

            let answer = client.answer_quiz(index, &option).await?;
            match answer.outcome {
                SelectOutcome::Correct => println!("{}", "Correct!".green().bold()),
                SelectOutcome::Incorrect => {
                    let correct = answer
                        .quiz
                        .as_ref()
                        .and_then(|q| q.questions().get(index))
                        .map(|q| q.answer().to_string())
                        .unwrap_or_default();
                    println!("{} The answer is: {}", "Incorrect.".red().bold(), correct);
                }
                SelectOutcome::Locked => println!("{}", "That question is already answered.".yellow()),
                SelectOutcome::UnknownOption => println!("{}", "That is not one of the options.".yellow()),
                SelectOutcome::UnknownQuestion => println!("{}", "No such question.".yellow()),
            }

            if let Some(quiz) = answer.quiz {
                println!(
                    "Score: {}/{}{}",
                    quiz.score(),
                    quiz.questions().len(),
                    if quiz.is_complete() { " (complete)" } else { "" }
                );
            }
            Ok(())
        }

        Commands::Path { course } => {
            let client = create_client(&cli.server);
            let path = client.learning_path(course).await?;
            println!("{} {}\n", "Learning path:".bold(), path.course);
            println!("{}", path.text);
            Ok(())
        }

        Commands::Explain { image, prompt } => {
            let client = create_client(&cli.server);
            let explanation = client.explain_image(image, prompt.as_deref()).await?;
            println!("{} {}\n", "Image:".bold(), explanation.image_ref);
            println!("{}", explanation.text);
            Ok(())
        }

        Commands::Summarize { text } => {
            let client = create_client(&cli.server);
            let summary = client.summarize_text(text).await?;
            println!("{}", summary.text);
            Ok(())
        }

        Commands::Completions { shell } => {
            // Generate completions for the specified shell
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, bin_name, &mut io::stdout());
            Ok(())
        }
    }
}

async fn run_task_command(
    client: Client,
    command: &TaskCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        TaskCommands::Add {
            title,
            query,
            image,
            due,
            priority,
        } => {
            let due_date = due.as_deref().map(parse_due_date).transpose()?;
            let request = AddTaskRequest {
                title: title.clone(),
                query: query.clone().unwrap_or_default(),
                image_ref: image.clone(),
                due_date,
                priority: Some(*priority),
            };
            let task = client.add_task(&request).await?;
            println!("Added task {} with id {}", task.title().bold(), task.id());
        }

        TaskCommands::List { filter, search } => {
            let tasks = client.list_tasks(*filter, search).await?;
            if tasks.is_empty() {
                println!("No tasks yet. Add some with 'studyhub task add'");
            }
            for task in &tasks {
                print_task(task);
            }

            let progress = client.progress().await?;
            println!(
                "\nProgress: {}/{} completed ({:.0}%)",
                progress.completed, progress.total, progress.percent
            );
        }

        TaskCommands::Edit {
            id,
            title,
            query,
            due,
            priority,
        } => {
            let due_date = match due.as_deref() {
                None => None,
                Some("none") => Some(None),
                Some(due) => Some(Some(parse_due_date(due)?)),
            };
            let patch = TaskPatch {
                title: title.clone(),
                query: query.clone(),
                image_ref: None,
                due_date,
                priority: *priority,
            };
            if patch.is_empty() {
                return Err("nothing to change".into());
            }
            let task = client.update_task(TaskId::new(*id), &patch).await?;
            print_task(&task);
        }

        TaskCommands::Done { id } => {
            let task = client.toggle_task(TaskId::new(*id)).await?;
            let state = if task.is_completed() {
                "completed".green()
            } else {
                "reopened".yellow()
            };
            println!("Task {} {}", task.title().bold(), state);
        }

        TaskCommands::Rm { id } => {
            let id = client.remove_task(TaskId::new(*id)).await?;
            println!("Removed task {}", id);
        }

        TaskCommands::Sub { id, name } => {
            let task = client.add_subtask(TaskId::new(*id), name).await?;
            print_task(&task);
        }

        TaskCommands::SubDone { id, index } => {
            let index = index.checked_sub(1).ok_or("subtasks are numbered from 1")?;
            let task = client.toggle_subtask(TaskId::new(*id), index).await?;
            print_task(&task);
        }

        TaskCommands::Analyze { id } => {
            println!("Asking the AI...");
            let task = client.analyze_task(TaskId::new(*id)).await?;
            print_task(&task);
        }

        TaskCommands::Summarize { id } => {
            println!("Summarizing...");
            let task = client.summarize_task(TaskId::new(*id)).await?;
            print_task(&task);
        }

        TaskCommands::Clear => {
            let removed = client.clear_completed().await?;
            println!("Removed {} completed task(s)", removed);
        }
    }

    Ok(())
}

fn create_client(server_url: &str) -> Client {
    let config = ClientConfig {
        base_url: server_url.to_string(),
    };

    Client::with_config(config)
}

/// Maps an option letter (a-d) to the option text; anything else passes through
fn resolve_option(question: Option<&QuizQuestion>, input: &str) -> String {
    let letter_index = match input.trim().to_ascii_lowercase().as_str() {
        "a" => Some(0),
        "b" => Some(1),
        "c" => Some(2),
        "d" => Some(3),
        _ => None,
    };

    match (question, letter_index) {
        (Some(question), Some(i)) if !question.options().iter().any(|o| o == input) => {
            question.options()[i].clone()
        }
        _ => input.to_string(),
    }
}

fn print_questions(questions: &[QuizQuestion]) {
    for (i, question) in questions.iter().enumerate() {
        println!("\n{}. {}", i + 1, question.question());
        for (letter, option) in ['a', 'b', 'c', 'd'].iter().zip(question.options()) {
            println!("   {}) {}", letter, option);
        }
    }
}

fn print_task(task: &Task) {
    let check = if task.is_completed() {
        "[x]".green()
    } else {
        "[ ]".normal()
    };
    let priority = match task.priority() {
        Priority::High => task.priority().to_string().red(),
        Priority::Medium => task.priority().to_string().yellow(),
        Priority::Low => task.priority().to_string().blue(),
    };
    let remaining = countdown::remaining(task, Utc::now());
    let deadline = match remaining {
        Countdown::NoDeadline => remaining.to_string().dimmed(),
        Countdown::Overdue => remaining.to_string().red().bold(),
        Countdown::Remaining { .. } => remaining.to_string().cyan(),
    };

    println!(
        "{} {} {} [{}] {}",
        check,
        task.id().to_string().dimmed(),
        task.title().bold(),
        priority,
        deadline
    );

    match task.status() {
        TaskStatus::Idle => {}
        TaskStatus::Error => println!("    {}", "last AI request failed".red()),
        status => println!("    {}", status.to_string().yellow()),
    }

    let (done, total) = task.subtask_progress();
    if total > 0 {
        println!("    Subtasks {}/{}", done, total);
        for (i, subtask) in task.subtasks().iter().enumerate() {
            let mark = if subtask.is_completed() { "x" } else { " " };
            println!("      {}. [{}] {}", i + 1, mark, subtask.name());
        }
    }

    for line in task.ai_content().lines() {
        println!("    {}", line);
    }
}
