//! Interaction Adapter
//!
//! The boundary between the engine and whoever is answering questions.
//! The conflict resolver and generator prompting both go through this trait,
//! so tests can script a session while the terminal implementation drives
//! real prompts.

use crate::error::EngineError;
use async_trait::async_trait;
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};

/// Answers keyed by question name.
pub type Answers = BTreeMap<String, Value>;

/// One selectable entry of a `Select` question.
#[derive(Debug, Clone)]
pub struct Choice {
    pub key: char,
    pub name: String,
    pub value: String,
}

impl Choice {
    pub fn new(key: char, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A question descriptor handed to the adapter.
///
/// Questions marked `remember` participate in answer caching: the generator
/// prefills their default from stored answers and stores the new answer back
/// after the prompt round.
#[derive(Debug, Clone)]
pub enum Question {
    Input {
        name: String,
        message: String,
        default: Option<String>,
        remember: bool,
    },
    Confirm {
        name: String,
        message: String,
        default: bool,
        remember: bool,
    },
    Select {
        name: String,
        message: String,
        choices: Vec<Choice>,
        default: usize,
        remember: bool,
    },
}

impl Question {
    pub fn input(name: impl Into<String>, message: impl Into<String>) -> Self {
        Question::Input {
            name: name.into(),
            message: message.into(),
            default: None,
            remember: false,
        }
    }

    pub fn confirm(name: impl Into<String>, message: impl Into<String>) -> Self {
        Question::Confirm {
            name: name.into(),
            message: message.into(),
            default: true,
            remember: false,
        }
    }

    pub fn select(
        name: impl Into<String>,
        message: impl Into<String>,
        choices: Vec<Choice>,
    ) -> Self {
        Question::Select {
            name: name.into(),
            message: message.into(),
            choices,
            default: 0,
            remember: false,
        }
    }

    pub fn remember(mut self) -> Self {
        match &mut self {
            Question::Input { remember, .. }
            | Question::Confirm { remember, .. }
            | Question::Select { remember, .. } => *remember = true,
        }
        self
    }

    pub fn name(&self) -> &str {
        match self {
            Question::Input { name, .. }
            | Question::Confirm { name, .. }
            | Question::Select { name, .. } => name,
        }
    }

    pub fn is_remembered(&self) -> bool {
        match self {
            Question::Input { remember, .. }
            | Question::Confirm { remember, .. }
            | Question::Select { remember, .. } => *remember,
        }
    }

    /// Override the question's default with a previously stored answer.
    pub fn prefill(&mut self, stored: &Value) {
        match self {
            Question::Input { default, .. } => {
                if let Some(s) = stored.as_str() {
                    *default = Some(s.to_string());
                }
            }
            Question::Confirm { default, .. } => {
                if let Some(b) = stored.as_bool() {
                    *default = b;
                }
            }
            Question::Select {
                choices, default, ..
            } => {
                if let Some(s) = stored.as_str() {
                    if let Some(index) = choices.iter().position(|c| c.value == s) {
                        *default = index;
                    }
                }
            }
        }
    }
}

/// Per-file status line kinds the resolver reports through the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Create,
    Force,
    Identical,
    Conflict,
    Skip,
}

impl StatusKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusKind::Create => "create",
            StatusKind::Force => "force",
            StatusKind::Identical => "identical",
            StatusKind::Conflict => "conflict",
            StatusKind::Skip => "skip",
        }
    }
}

/// Renders questions, collects answers, and reports per-file status.
///
/// `prompt` is one round; the conflict resolver's asking loop may invoke it
/// repeatedly for the same file.
#[async_trait]
pub trait InteractionAdapter: Send + Sync {
    async fn prompt(&self, questions: Vec<Question>) -> Result<Answers, EngineError>;

    /// Render a textual diff between the on-disk and proposed contents.
    fn diff(&self, old: &str, new: &str);

    /// One-line status report for a file.
    fn status(&self, kind: StatusKind, path: &str);

    fn writeln(&self, line: &str);
}

/// Terminal implementation backed by dialoguer.
#[derive(Debug, Default)]
pub struct TerminalAdapter;

impl TerminalAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl InteractionAdapter for TerminalAdapter {
    async fn prompt(&self, questions: Vec<Question>) -> Result<Answers, EngineError> {
        // dialoguer blocks on the tty; keep it off the async executor.
        tokio::task::spawn_blocking(move || {
            use dialoguer::{Confirm, Input, Select};

            let mut answers = Answers::new();
            for question in questions {
                match question {
                    Question::Input {
                        name,
                        message,
                        default,
                        ..
                    } => {
                        let mut input = Input::<String>::new().with_prompt(message);
                        if let Some(default) = default {
                            input = input.default(default);
                        }
                        let value = input
                            .interact_text()
                            .map_err(|e| EngineError::Prompt(e.to_string()))?;
                        answers.insert(name, Value::String(value));
                    }
                    Question::Confirm {
                        name,
                        message,
                        default,
                        ..
                    } => {
                        let value = Confirm::new()
                            .with_prompt(message)
                            .default(default)
                            .interact()
                            .map_err(|e| EngineError::Prompt(e.to_string()))?;
                        answers.insert(name, Value::Bool(value));
                    }
                    Question::Select {
                        name,
                        message,
                        choices,
                        default,
                        ..
                    } => {
                        let items: Vec<String> = choices
                            .iter()
                            .map(|c| format!("{}: {}", c.key, c.name))
                            .collect();
                        let index = Select::new()
                            .with_prompt(message)
                            .items(&items)
                            .default(default)
                            .interact()
                            .map_err(|e| EngineError::Prompt(e.to_string()))?;
                        answers.insert(name, Value::String(choices[index].value.clone()));
                    }
                }
            }
            Ok(answers)
        })
        .await
        .map_err(|e| EngineError::Prompt(format!("prompt task failed: {e}")))?
    }

    fn diff(&self, old: &str, new: &str) {
        for line in crate::diff::text_diff(old, new).lines() {
            if line.starts_with('+') {
                println!("{}", line.green());
            } else if line.starts_with('-') {
                println!("{}", line.red());
            } else {
                println!("{line}");
            }
        }
    }

    fn status(&self, kind: StatusKind, path: &str) {
        let label = format!("{:>12}", kind.as_str());
        match kind {
            StatusKind::Create => println!("{} {}", label.green(), path),
            StatusKind::Force | StatusKind::Skip => println!("{} {}", label.yellow(), path),
            StatusKind::Identical => println!("{} {}", label.cyan(), path),
            StatusKind::Conflict => println!("{} {}", label.red(), path),
        }
    }

    fn writeln(&self, line: &str) {
        println!("{line}");
    }
}

/// Scripted implementation for tests: answers are queued ahead of time and
/// everything written through the adapter is captured.
#[derive(Debug, Default)]
pub struct ScriptedAdapter {
    answers: Mutex<VecDeque<Answers>>,
    statuses: Mutex<Vec<(StatusKind, String)>>,
    lines: Mutex<Vec<String>>,
    prompt_calls: Mutex<usize>,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the answers for one future prompt round.
    pub fn push_answers(&self, answers: Answers) {
        self.answers.lock().push_back(answers);
    }

    /// Convenience for a single-question round.
    pub fn push_answer(&self, name: &str, value: Value) {
        let mut answers = Answers::new();
        answers.insert(name.to_string(), value);
        self.push_answers(answers);
    }

    pub fn prompt_calls(&self) -> usize {
        *self.prompt_calls.lock()
    }

    pub fn statuses(&self) -> Vec<(StatusKind, String)> {
        self.statuses.lock().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

#[async_trait]
impl InteractionAdapter for ScriptedAdapter {
    async fn prompt(&self, _questions: Vec<Question>) -> Result<Answers, EngineError> {
        *self.prompt_calls.lock() += 1;
        self.answers
            .lock()
            .pop_front()
            .ok_or_else(|| EngineError::Prompt("no scripted answer queued".to_string()))
    }

    fn diff(&self, old: &str, new: &str) {
        self.lines
            .lock()
            .push(crate::diff::text_diff(old, new));
    }

    fn status(&self, kind: StatusKind, path: &str) {
        self.statuses.lock().push((kind, path.to_string()));
    }

    fn writeln(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}
