//! Execution tracking for notebook cells.
//!
//! Maintains the set of cells currently producing output, despite cells
//! being created, activated, deactivated, and completing out of order. The
//! tracker is a pure state machine: signals go in, [`TrackerEffect`]s come
//! out, and the session applies the effects against the scroll controller.
//!
//! The shipped strategy is execution-event based: it follows the host's
//! scheduled/finished signals, which cover cells executed while not active.
//! Per-cell state-change signals are folded in for hosts that emit those
//! instead, and an idle sweep on active-cell changes bounds the watched set.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::host::CellId;
use crate::signals::NotebookSignal;

/// Shared tracking state for one notebook session.
#[derive(Debug, Default)]
pub struct TrackedCells {
    /// Cells currently scheduled or running
    executing: HashSet<CellId>,
    /// Cells under observation (executing cells plus the active code cell)
    watched: HashSet<CellId>,
    /// The currently active cell, if any
    active: Option<CellId>,
}

impl TrackedCells {
    /// Snapshot of the executing cells.
    #[must_use]
    pub fn executing_cells(&self) -> Vec<CellId> {
        self.executing.iter().cloned().collect()
    }

    /// Whether the given cell is currently executing.
    #[must_use]
    pub fn is_executing(&self, cell: &CellId) -> bool {
        self.executing.contains(cell)
    }

    /// Number of executing cells.
    #[must_use]
    pub fn executing_count(&self) -> usize {
        self.executing.len()
    }

    /// Number of watched cells.
    #[must_use]
    pub fn watched_count(&self) -> usize {
        self.watched.len()
    }

    /// Drop watched cells that are neither active nor executing.
    ///
    /// Returns the number of cells unwatched.
    fn sweep_inactive_idle(&mut self) -> usize {
        let Self {
            executing,
            watched,
            active,
        } = self;
        let before = watched.len();
        watched.retain(|id| active.as_ref() == Some(id) || executing.contains(id));
        before - watched.len()
    }

    /// Clear all tracking state.
    pub(crate) fn clear(&mut self) {
        self.executing.clear();
        self.watched.clear();
        self.active = None;
    }
}

/// What the session must do in response to a tracked signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEffect {
    /// Ensure the poll task is running
    StartPolling,
    /// Stop the poll task (and wipe the height cache)
    StopPolling,
    /// Deliver one height-gated scroll for this cell right now
    ScrollNow(CellId),
    /// Drop cached per-cell bookkeeping for a removed cell
    Forget(CellId),
}

/// Strategy seam for execution tracking.
///
/// One implementation ships ([`ExecutionEventTracker`]); the seam exists so
/// hosts with a different signal vocabulary can substitute their own mapping
/// without touching the controller.
pub trait TrackingStrategy: Send {
    /// Strategy name for logging
    fn name(&self) -> &'static str;

    /// Fold one signal into the tracking state, returning effects in the
    /// order they must be applied.
    fn apply(&mut self, cells: &mut TrackedCells, signal: &NotebookSignal) -> Vec<TrackerEffect>;
}

/// Counters kept by the execution-event tracker.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrackerMetrics {
    /// Cells that entered the executing set
    pub cells_tracked: u64,
    /// Cells that left the executing set via completion
    pub cells_completed: u64,
    /// Watched cells dropped by the idle sweep
    pub cells_swept: u64,
}

/// Execution-event based tracking.
///
/// Scheduled/finished signals drive the executing set directly; state-change
/// signals map onto the same transitions, so double delivery from a host
/// that emits both is harmless (set membership is idempotent).
#[derive(Debug, Default)]
pub struct ExecutionEventTracker {
    metrics: TrackerMetrics,
}

impl ExecutionEventTracker {
    /// Create a tracker with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn metrics(&self) -> TrackerMetrics {
        self.metrics
    }

    /// A cell became busy (scheduled or observed running).
    fn on_busy(&mut self, cells: &mut TrackedCells, cell: &CellId) -> Vec<TrackerEffect> {
        if !cells.executing.insert(cell.clone()) {
            // already tracked; scheduled and state-change signals may both fire
            return Vec::new();
        }
        cells.watched.insert(cell.clone());
        self.metrics.cells_tracked += 1;
        debug!(cell_id = %cell, executing = cells.executing.len(), "Cell began executing");
        vec![TrackerEffect::StartPolling]
    }

    /// A cell went idle (finished, or observed idle).
    fn on_idle(&mut self, cells: &mut TrackedCells, cell: &CellId) -> Vec<TrackerEffect> {
        if !cells.executing.remove(cell) {
            return Vec::new();
        }
        self.metrics.cells_completed += 1;

        // One last scroll so the final output is visible after polling stops.
        let mut effects = vec![TrackerEffect::ScrollNow(cell.clone())];

        if cells.active.as_ref() != Some(cell) {
            cells.watched.remove(cell);
        }
        if cells.executing.is_empty() {
            debug!(cell_id = %cell, "Last executing cell finished; stopping poll");
            effects.push(TrackerEffect::StopPolling);
        } else {
            debug!(cell_id = %cell, executing = cells.executing.len(), "Cell finished executing");
        }
        effects
    }

    fn on_active_cell_changed(
        &mut self,
        cells: &mut TrackedCells,
        cell: Option<&crate::host::CellInfo>,
    ) -> Vec<TrackerEffect> {
        cells.active = cell.map(|info| info.id.clone());
        if let Some(info) = cell {
            if info.kind.is_code() {
                cells.watched.insert(info.id.clone());
            }
        }

        let swept = cells.sweep_inactive_idle();
        if swept > 0 {
            self.metrics.cells_swept += u64::try_from(swept).unwrap_or(0);
            trace!(swept, watched = cells.watched.len(), "Swept idle inactive cells");
        }
        Vec::new()
    }

    fn on_cells_removed(
        &mut self,
        cells: &mut TrackedCells,
        removed: &[CellId],
    ) -> Vec<TrackerEffect> {
        let mut effects = Vec::new();
        for cell in removed {
            let was_executing = cells.executing.remove(cell);
            cells.watched.remove(cell);
            if cells.active.as_ref() == Some(cell) {
                cells.active = None;
            }
            // Height-cache entry must not outlive the cell
            effects.push(TrackerEffect::Forget(cell.clone()));

            if was_executing {
                debug!(cell_id = %cell, "Executing cell removed from notebook");
                if cells.executing.is_empty() {
                    effects.push(TrackerEffect::StopPolling);
                }
            }
        }
        effects
    }
}

impl TrackingStrategy for ExecutionEventTracker {
    fn name(&self) -> &'static str {
        "execution-event"
    }

    fn apply(&mut self, cells: &mut TrackedCells, signal: &NotebookSignal) -> Vec<TrackerEffect> {
        match signal {
            NotebookSignal::ExecutionScheduled { cell } => self.on_busy(cells, cell),
            NotebookSignal::ExecutionFinished { cell } => self.on_idle(cells, cell),
            NotebookSignal::ExecutionStateChanged { cell, to, .. } => {
                if to.is_running() {
                    self.on_busy(cells, cell)
                } else {
                    self.on_idle(cells, cell)
                }
            }
            NotebookSignal::ActiveCellChanged { cell } => {
                self.on_active_cell_changed(cells, cell.as_ref())
            }
            NotebookSignal::CellsChanged { removed, .. } => self.on_cells_removed(cells, removed),
            // Output changes are the observer's concern, not tracking state
            NotebookSignal::OutputChanged { .. } => Vec::new(),
        }
    }
}
