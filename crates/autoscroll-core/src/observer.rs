//! Output observer: re-arms polling when output grows outside the poll
//! window.
//!
//! Output-collection changes (append, clear, replace) only re-ignite the
//! tick; they never scroll directly. An output event does not always change
//! rendered height (a clear followed by identical content, for instance), so
//! the decision is deferred to the next tick's height comparison.

use std::sync::Arc;

use tracing::trace;

use crate::controller::ScrollController;
use crate::host::CellId;
use crate::session::SessionMetrics;
use crate::signals::OutputChange;

/// Re-arm handler for output-collection change signals.
pub struct OutputObserver {
    controller: ScrollController,
    metrics: Arc<SessionMetrics>,
}

impl OutputObserver {
    pub(crate) fn new(controller: ScrollController, metrics: Arc<SessionMetrics>) -> Self {
        Self {
            controller,
            metrics,
        }
    }

    /// Handle one output-collection change for a cell.
    ///
    /// With the toggle enabled this guarantees a live poll task within one
    /// event-loop turn; with it disabled nothing happens.
    pub fn on_output_changed(&self, cell: &CellId, change: OutputChange) {
        if !self.controller.enabled() {
            return;
        }

        self.metrics.record_rearm();
        trace!(cell_id = %cell, change = ?change, "Output changed; re-arming poll");
        self.controller.start_polling();
    }
}

impl std::fmt::Debug for OutputObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputObserver").finish_non_exhaustive()
    }
}
