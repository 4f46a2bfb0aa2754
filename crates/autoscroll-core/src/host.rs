//! Notebook host abstraction.
//!
//! Everything the session needs from the embedding notebook environment sits
//! behind the [`NotebookHost`] trait: the per-notebook metadata store, read
//! access to each cell's rendered output scroll extent, the ability to set
//! its scroll offset, and the pressed state of the toolbar toggle. The
//! embedding layer implements it against the real document/view model; tests
//! substitute recording doubles.
//!
//! Cells are identified by [`CellId`], the identifier of the cell *model*.
//! A cell's view can be torn down and recreated while the model persists, so
//! the model id is the only key stable enough for the executing set and the
//! height cache.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stable identifier of a cell model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(String);

impl CellId {
    /// Create a cell id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CellId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CellId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Kind of a notebook cell.
///
/// Only code cells produce execution output; signals for other kinds are
/// ignored by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    /// Executable code cell with an output area
    Code,
    /// Markdown cell
    Markdown,
    /// Raw cell
    Raw,
}

impl CellKind {
    /// Whether this cell participates in auto-scroll.
    #[must_use]
    pub fn is_code(self) -> bool {
        matches!(self, Self::Code)
    }
}

/// Execution state of a code cell.
///
/// Hosts report a scheduled/pending phase before a cell actually runs; for
/// scroll tracking both count as busy, so `Running` covers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Not executing
    Idle,
    /// Scheduled or actively running
    Running,
}

impl ExecutionState {
    /// Whether the cell is busy (scheduled or running).
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Running => f.write_str("running"),
        }
    }
}

impl FromStr for ExecutionState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(Self::Idle),
            "running" | "scheduled" | "pending" => Ok(Self::Running),
            _ => Err(format!(
                "unknown execution state: {s}. Expected one of: idle, scheduled, running"
            )),
        }
    }
}

/// A cell as reported by lifecycle signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellInfo {
    /// Model identifier
    pub id: CellId,
    /// Cell kind
    pub kind: CellKind,
}

impl CellInfo {
    /// Convenience constructor for a code cell.
    #[must_use]
    pub fn code(id: impl Into<CellId>) -> Self {
        Self {
            id: id.into(),
            kind: CellKind::Code,
        }
    }
}

/// Host-side surface of one open notebook panel.
///
/// Implementations are expected to be cheap, synchronous views over the
/// document/widget model. None of the methods may block. All conditions the
/// host cannot satisfy are expressed in-band: a missing metadata key is
/// `None`, a disposed cell view is `None` from [`output_scroll_extent`].
///
/// [`output_scroll_extent`]: NotebookHost::output_scroll_extent
pub trait NotebookHost: Send + Sync {
    /// Read a metadata value from the notebook document.
    ///
    /// Returns `None` when the key was never written.
    fn metadata(&self, key: &str) -> Option<serde_json::Value>;

    /// Write a metadata value into the notebook document.
    ///
    /// The value round-trips with the document on save.
    fn set_metadata(&self, key: &str, value: serde_json::Value);

    /// Total scroll height of a cell's rendered output container, including
    /// content not currently visible.
    ///
    /// Returns `None` when the cell's view is not mounted (disposed, or not
    /// a code cell).
    fn output_scroll_extent(&self, cell: &CellId) -> Option<u64>;

    /// Set the scroll offset of a cell's output container.
    ///
    /// Ignored by the host when the cell's view is gone; never an error.
    fn set_output_scroll_offset(&self, cell: &CellId, offset: u64);

    /// Update the pressed state of the toolbar toggle button.
    fn set_button_pressed(&self, pressed: bool);

    /// Detach the toolbar toggle button from the panel.
    ///
    /// Called exactly once, from session teardown.
    fn detach_button(&self);
}

/// Read a boolean metadata flag, treating absent or non-boolean values as
/// false.
#[must_use]
pub fn metadata_flag(host: &dyn NotebookHost, key: &str) -> bool {
    host.metadata(key)
        .and_then(|value| value.as_bool())
        .unwrap_or(false)
}
