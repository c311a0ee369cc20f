//! A whiteboard where short text thoughts live as rigid bodies: they drift,
//! collide, can be dragged and shaken, and every destructive command can be
//! undone.

pub mod commands;
pub mod config;
pub mod error;
pub mod export;
pub mod format;
pub mod history;
pub mod physics;
pub mod registry;
pub mod render;
pub mod spatial;
pub mod types;
pub mod ui;
pub mod whiteboard;

pub use commands::{BoardPort, CommandRouter, Outcome, ThoughtList};
pub use error::{ExportError, WhiteboardError};
pub use whiteboard::Whiteboard;
