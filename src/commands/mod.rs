//! Slash-command parsing and the router that turns submitted input into
//! thought-list changes and board effects.

use std::path::PathBuf;

use chrono::Utc;

use crate::{
    config::Settings,
    error::WhiteboardError,
    history::HistoryStack,
    types::{PositionMap, Thought, ThoughtId, ThoughtIdGen},
};

/// Commands with a defined effect, in help order.
const COMMANDS: &[&str] = &["shake", "clear", "export", "undo", "help"];

#[must_use]
pub fn command_help_summary() -> String {
    format!("Commands: /{}", COMMANDS.join(", /"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Shake,
    Clear,
    Export,
    Undo,
    Help,
    Unknown(&'a str),
    Empty,
}

/// A command token plus whatever followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation<'a> {
    pub command: Command<'a>,
    pub args: Vec<&'a str>,
}

impl<'a> Invocation<'a> {
    /// Parse the text after the leading `/`.
    pub fn parse(raw: &'a str) -> Self {
        let mut parts = raw.split_whitespace();
        let command = match parts.next() {
            Some("shake") => Command::Shake,
            Some("clear") => Command::Clear,
            Some("export") => Command::Export,
            Some("undo") => Command::Undo,
            Some("help") => Command::Help,
            Some(cmd) => Command::Unknown(cmd),
            None => Command::Empty,
        };
        Self {
            command,
            args: parts.collect(),
        }
    }
}

/// The authoritative ordered thought list. Every mutation bumps `revision`
/// so observers can tell a new list from one they already synced.
#[derive(Debug, Clone, Default)]
pub struct ThoughtList {
    items: Vec<Thought>,
    revision: u64,
}

impl ThoughtList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[Thought] {
        &self.items
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ThoughtId> + '_ {
        self.items.iter().map(|t| t.id)
    }

    pub fn push(&mut self, thought: Thought) {
        self.items.push(thought);
        self.revision += 1;
    }

    pub fn replace(&mut self, items: Vec<Thought>) {
        self.items = items;
        self.revision += 1;
    }

    pub fn clear(&mut self) {
        self.replace(Vec::new());
    }
}

/// What the router needs from the simulation side. Implemented by the
/// whiteboard; tests use a fake.
pub trait BoardPort {
    /// Reconcile bodies with `thoughts`. Implementations skip lists whose
    /// revision they have already seen.
    fn sync(&mut self, thoughts: &ThoughtList);
    fn snapshot_positions(&self) -> PositionMap;
    /// Returns how many bodies were moved.
    fn restore_positions(&mut self, positions: &PositionMap) -> usize;
    fn shake(&mut self);
    fn export(&mut self) -> Result<PathBuf, WhiteboardError>;
}

#[derive(Debug)]
pub enum Outcome {
    ThoughtAdded(ThoughtId),
    Shaken,
    Cleared,
    Exported(PathBuf),
    ExportFailed(WhiteboardError),
    Undone,
    NothingToUndo,
    Help(String),
    Rejected,
    UnknownCommand(String),
}

impl Outcome {
    /// Short line for a status bar. Silent outcomes return `None`.
    pub fn status(&self) -> Option<String> {
        match self {
            Outcome::ThoughtAdded(_) | Outcome::Rejected | Outcome::UnknownCommand(_) => None,
            Outcome::Shaken => Some("Shaken".to_string()),
            Outcome::Cleared => Some("Cleared".to_string()),
            Outcome::Exported(path) => Some(format!("Exported to {}", path.display())),
            Outcome::ExportFailed(_) => Some("Export failed".to_string()),
            Outcome::Undone => Some("Undone".to_string()),
            Outcome::NothingToUndo => Some("Nothing to undo".to_string()),
            Outcome::Help(text) => Some(text.clone()),
        }
    }
}

#[derive(Debug, Default)]
pub struct CommandRouter {
    thoughts: ThoughtList,
    history: HistoryStack,
    ids: ThoughtIdGen,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let history = match settings.history_limit {
            Some(limit) => HistoryStack::with_limit(limit),
            None => HistoryStack::new(),
        };
        Self {
            history,
            ..Self::default()
        }
    }

    pub fn thoughts(&self) -> &ThoughtList {
        &self.thoughts
    }

    pub fn history(&self) -> &HistoryStack {
        &self.history
    }

    pub fn submit(&mut self, input: &str, board: &mut dyn BoardPort) -> Outcome {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        self.submit_at(input, now, board)
    }

    /// Same as [`CommandRouter::submit`] with an explicit clock reading for
    /// the id of a new thought.
    pub fn submit_at(
        &mut self,
        input: &str,
        now_millis: u64,
        board: &mut dyn BoardPort,
    ) -> Outcome {
        if input.trim().is_empty() {
            tracing::debug!("blank input rejected");
            return Outcome::Rejected;
        }

        // Only a leading slash makes a command; thought text is kept verbatim.
        let Some(raw) = input.strip_prefix('/') else {
            let id = self.ids.next(now_millis);
            self.thoughts.push(Thought::new(id, input));
            board.sync(&self.thoughts);
            tracing::info!(id = %id, "thought added");
            return Outcome::ThoughtAdded(id);
        };

        let invocation = Invocation::parse(raw);
        match invocation.command {
            Command::Shake => {
                self.checkpoint(board);
                board.shake();
                tracing::info!(bodies = self.thoughts.len(), "shake");
                Outcome::Shaken
            }
            Command::Clear => {
                self.checkpoint(board);
                self.thoughts.clear();
                board.sync(&self.thoughts);
                tracing::info!("clear");
                Outcome::Cleared
            }
            Command::Export => match board.export() {
                Ok(path) => {
                    tracing::info!(path = %path.display(), "exported");
                    Outcome::Exported(path)
                }
                Err(err) => {
                    tracing::warn!(error = %err, "export failed");
                    Outcome::ExportFailed(err)
                }
            },
            Command::Undo => self.undo(board),
            Command::Help => Outcome::Help(command_help_summary()),
            Command::Unknown(name) => {
                tracing::debug!(command = name, args = ?invocation.args, "unknown command");
                Outcome::UnknownCommand(name.to_string())
            }
            Command::Empty => {
                tracing::debug!("empty command rejected");
                Outcome::Rejected
            }
        }
    }

    fn checkpoint(&mut self, board: &mut dyn BoardPort) {
        board.sync(&self.thoughts);
        let positions = board.snapshot_positions();
        self.history.push(self.thoughts.items().to_vec(), positions);
    }

    fn undo(&mut self, board: &mut dyn BoardPort) -> Outcome {
        let Some(snapshot) = self.history.pop() else {
            tracing::debug!("undo with empty history");
            return Outcome::NothingToUndo;
        };
        self.thoughts.replace(snapshot.thoughts);
        board.sync(&self.thoughts);
        let restored = board.restore_positions(&snapshot.positions);
        tracing::info!(thoughts = self.thoughts.len(), restored, "undo");
        Outcome::Undone
    }
}
