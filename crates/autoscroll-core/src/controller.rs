//! Scroll controller: the poll tick and the on/off switch.
//!
//! Owns the single periodic tick that performs the actual scrolling. The
//! enabled flag lives in the notebook's persisted metadata, not in memory, so
//! a toggle from anywhere (including another client editing the document) is
//! picked up by the very next tick.
//!
//! Poll lifecycle: `start_polling` spawns the tick task if none is live;
//! `tick` shuts the task down from inside once the toggle is off or no cell
//! is executing; `stop_polling` shuts it down from outside. Both stop paths
//! wipe the height cache: once polling stops, cached heights are stale
//! baselines, and the next poll session must treat every cell as unseen.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

use crate::config::AutoScrollConfig;
use crate::host::{CellId, NotebookHost, metadata_flag};
use crate::session::{SessionMetrics, SessionState, lock};

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    /// The tick decided to stop polling
    pub stopped: bool,
    /// Number of cells whose scroll offset was moved
    pub scrolled: usize,
}

/// Controller for one notebook session's polling and scrolling.
///
/// Cheap to clone; clones share the same state, poll slot, and metrics.
#[derive(Clone)]
pub struct ScrollController {
    panel_id: String,
    host: Arc<dyn NotebookHost>,
    metadata_key: String,
    poll_interval: Duration,
    state: Arc<Mutex<SessionState>>,
    poll: Arc<Mutex<Option<JoinHandle<()>>>>,
    metrics: Arc<SessionMetrics>,
}

impl ScrollController {
    pub(crate) fn new(
        panel_id: String,
        host: Arc<dyn NotebookHost>,
        config: &AutoScrollConfig,
        state: Arc<Mutex<SessionState>>,
        metrics: Arc<SessionMetrics>,
    ) -> Self {
        Self {
            panel_id,
            host,
            metadata_key: config.metadata_key.clone(),
            poll_interval: config.poll_interval(),
            state,
            poll: Arc::new(Mutex::new(None)),
            metrics,
        }
    }

    /// Whether auto-scroll is enabled, read from persisted metadata.
    ///
    /// A key that was never written (or holds a non-boolean) reads as false.
    #[must_use]
    pub fn enabled(&self) -> bool {
        metadata_flag(self.host.as_ref(), &self.metadata_key)
    }

    /// Write the enabled flag into metadata and the button pressed state.
    pub fn set_enabled(&self, enabled: bool) {
        self.host.set_button_pressed(enabled);
        self.host
            .set_metadata(&self.metadata_key, serde_json::Value::Bool(enabled));
        info!(
            panel_id = %self.panel_id,
            enabled,
            "Auto-scroll {} for notebook",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    /// Flip the enabled flag. Always succeeds; returns the new state.
    pub fn toggle(&self) -> bool {
        let next = !self.enabled();
        self.set_enabled(next);
        next
    }

    /// Whether the poll task is currently live.
    #[must_use]
    pub fn polling_active(&self) -> bool {
        lock(&self.poll)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Start the periodic tick if it is not already running.
    ///
    /// Idempotent; safe to call from any signal callback. Must be called
    /// from within a Tokio runtime.
    pub fn start_polling(&self) {
        let mut slot = lock(&self.poll);
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let ctrl = self.clone();
        let interval = self.poll_interval;
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if ctrl.tick().stopped {
                    break;
                }
            }
        }));
        drop(slot);

        self.metrics.record_poll_started();
        debug!(panel_id = %self.panel_id, interval_ms = self.poll_interval.as_millis() as u64, "Started scroll polling");
    }

    /// Stop the periodic tick and wipe the height cache.
    ///
    /// Idempotent; the cache is wiped even when no task was live, so stale
    /// heights never gate the next poll session.
    pub fn stop_polling(&self) {
        let handle = lock(&self.poll).take();
        if let Some(handle) = handle {
            handle.abort();
            self.metrics.record_poll_stopped();
            debug!(panel_id = %self.panel_id, "Stopped scroll polling");
        }

        lock(&self.state).heights.clear();
    }

    /// One poll pass over the executing cells.
    ///
    /// Reads the enabled flag from metadata each time; when it is off, or no
    /// cell is executing, polling is stopped and the cache wiped.
    pub fn tick(&self) -> TickOutcome {
        self.metrics.record_tick();

        let executing = lock(&self.state).cells.executing_cells();
        if !self.enabled() || executing.is_empty() {
            trace!(
                panel_id = %self.panel_id,
                executing = executing.len(),
                "Tick found nothing to follow; stopping poll"
            );
            self.stop_polling();
            return TickOutcome {
                stopped: true,
                scrolled: 0,
            };
        }

        let mut scrolled = 0;
        for cell in &executing {
            if self.scroll_cell_if_changed(cell) {
                scrolled += 1;
            }
        }
        TickOutcome {
            stopped: false,
            scrolled,
        }
    }

    /// Snap a cell's output to the bottom if its scroll extent changed.
    ///
    /// Unchanged extents are never re-scrolled, so a user who scrolled up
    /// through a paused output stream is not fought over. Returns true when
    /// the offset was moved.
    pub fn scroll_cell_if_changed(&self, cell: &CellId) -> bool {
        let Some(extent) = self.host.output_scroll_extent(cell) else {
            // View is gone (cell disposed between scheduling and this tick);
            // lifecycle signals clean the tracking sets up separately.
            trace!(panel_id = %self.panel_id, cell_id = %cell, "Skipping scroll for unmounted cell");
            return false;
        };

        let last = lock(&self.state).heights.get(cell).copied().unwrap_or(0);
        if extent == last {
            return false;
        }

        self.host.set_output_scroll_offset(cell, extent);
        lock(&self.state).heights.insert(cell.clone(), extent);
        self.metrics.record_cell_scrolled();
        debug!(
            panel_id = %self.panel_id,
            cell_id = %cell,
            from = last,
            to = extent,
            "Scrolled cell output"
        );
        true
    }

    /// Cached height for a cell, if any.
    #[must_use]
    pub fn cached_height(&self, cell: &CellId) -> Option<u64> {
        lock(&self.state).heights.get(cell).copied()
    }
}

impl std::fmt::Debug for ScrollController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrollController")
            .field("panel_id", &self.panel_id)
            .field("metadata_key", &self.metadata_key)
            .field("poll_interval", &self.poll_interval)
            .field("polling_active", &self.polling_active())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::Ordering;

    /// Recording host double: metadata map, per-cell extents, offset log.
    #[derive(Default)]
    struct RecordingHost {
        meta: StdMutex<HashMap<String, Value>>,
        extents: StdMutex<HashMap<CellId, u64>>,
        offsets: StdMutex<Vec<(CellId, u64)>>,
        pressed: StdMutex<Vec<bool>>,
    }

    impl RecordingHost {
        fn set_extent(&self, cell: &CellId, extent: u64) {
            self.extents.lock().unwrap().insert(cell.clone(), extent);
        }

        fn offsets(&self) -> Vec<(CellId, u64)> {
            self.offsets.lock().unwrap().clone()
        }
    }

    impl NotebookHost for RecordingHost {
        fn metadata(&self, key: &str) -> Option<Value> {
            self.meta.lock().unwrap().get(key).cloned()
        }

        fn set_metadata(&self, key: &str, value: Value) {
            self.meta.lock().unwrap().insert(key.to_string(), value);
        }

        fn output_scroll_extent(&self, cell: &CellId) -> Option<u64> {
            self.extents.lock().unwrap().get(cell).copied()
        }

        fn set_output_scroll_offset(&self, cell: &CellId, offset: u64) {
            self.offsets.lock().unwrap().push((cell.clone(), offset));
        }

        fn set_button_pressed(&self, pressed: bool) {
            self.pressed.lock().unwrap().push(pressed);
        }

        fn detach_button(&self) {}
    }

    type Fixture = (
        ScrollController,
        Arc<RecordingHost>,
        Arc<Mutex<SessionState>>,
        Arc<SessionMetrics>,
    );

    fn make_controller() -> Fixture {
        let host = Arc::new(RecordingHost::default());
        let state = Arc::new(Mutex::new(SessionState::default()));
        let metrics = Arc::new(SessionMetrics::default());
        let ctrl = ScrollController::new(
            "panel-test".to_string(),
            Arc::clone(&host) as Arc<dyn NotebookHost>,
            &AutoScrollConfig::default(),
            Arc::clone(&state),
            Arc::clone(&metrics),
        );
        (ctrl, host, state, metrics)
    }

    fn begin_executing(state: &Arc<Mutex<SessionState>>, id: &str) {
        use crate::signals::NotebookSignal;
        use crate::tracker::{ExecutionEventTracker, TrackingStrategy};
        let mut tracker = ExecutionEventTracker::new();
        let _ = tracker.apply(
            &mut state.lock().unwrap().cells,
            &NotebookSignal::ExecutionScheduled {
                cell: CellId::new(id),
            },
        );
    }

    #[test]
    fn missing_metadata_reads_as_disabled() {
        let (ctrl, _host, _state, _metrics) = make_controller();
        assert!(!ctrl.enabled());
    }

    #[test]
    fn toggle_writes_metadata_and_pressed_state() {
        let (ctrl, host, _state, _metrics) = make_controller();

        assert!(ctrl.toggle());
        assert!(ctrl.enabled());
        assert_eq!(
            host.meta.lock().unwrap().get("autoscrollcelloutput"),
            Some(&Value::Bool(true))
        );
        assert_eq!(*host.pressed.lock().unwrap(), vec![true]);

        assert!(!ctrl.toggle());
        assert!(!ctrl.enabled());
        assert_eq!(*host.pressed.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test]
    async fn start_polling_twice_spawns_one_task() {
        let (ctrl, _host, _state, metrics) = make_controller();

        ctrl.start_polling();
        ctrl.start_polling();

        assert!(ctrl.polling_active());
        assert_eq!(metrics.polls_started.load(Ordering::Relaxed), 1);
        ctrl.stop_polling();
    }

    #[test]
    fn stop_polling_without_a_task_still_clears_the_cache() {
        let (ctrl, host, _state, metrics) = make_controller();
        let cell = CellId::new("a");
        host.set_extent(&cell, 100);
        ctrl.set_enabled(true);

        // Seed the cache through a real scroll
        assert!(ctrl.scroll_cell_if_changed(&cell));
        assert_eq!(ctrl.cached_height(&cell), Some(100));

        ctrl.stop_polling();
        assert_eq!(ctrl.cached_height(&cell), None);
        assert_eq!(metrics.polls_stopped.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn unchanged_extent_is_not_rescrolled() {
        let (ctrl, host, _state, _metrics) = make_controller();
        let cell = CellId::new("a");
        host.set_extent(&cell, 500);

        assert!(ctrl.scroll_cell_if_changed(&cell));
        assert!(!ctrl.scroll_cell_if_changed(&cell));
        assert_eq!(host.offsets(), vec![(cell.clone(), 500)]);

        host.set_extent(&cell, 750);
        assert!(ctrl.scroll_cell_if_changed(&cell));
        assert_eq!(ctrl.cached_height(&cell), Some(750));
    }

    #[test]
    fn unmounted_cell_is_skipped_without_panic() {
        let (ctrl, _host, _state, _metrics) = make_controller();
        assert!(!ctrl.scroll_cell_if_changed(&CellId::new("ghost")));
    }

    #[tokio::test]
    async fn tick_stops_when_disabled_even_with_executing_cells() {
        let (ctrl, host, state, _metrics) = make_controller();
        begin_executing(&state, "a");
        host.set_extent(&CellId::new("a"), 100);
        // enabled flag never written: reads as false

        let outcome = ctrl.tick();
        assert!(outcome.stopped);
        assert_eq!(outcome.scrolled, 0);
        assert!(host.offsets().is_empty());
    }

    #[tokio::test]
    async fn tick_stops_when_no_cells_execute_and_clears_cache() {
        let (ctrl, host, _state, _metrics) = make_controller();
        ctrl.set_enabled(true);
        let cell = CellId::new("a");
        host.set_extent(&cell, 300);
        ctrl.scroll_cell_if_changed(&cell);

        let outcome = ctrl.tick();
        assert!(outcome.stopped);
        assert_eq!(ctrl.cached_height(&cell), None);
    }

    #[tokio::test]
    async fn tick_scrolls_every_grown_executing_cell() {
        let (ctrl, host, state, _metrics) = make_controller();
        ctrl.set_enabled(true);
        begin_executing(&state, "a");
        begin_executing(&state, "b");
        host.set_extent(&CellId::new("a"), 120);
        host.set_extent(&CellId::new("b"), 80);

        let outcome = ctrl.tick();
        assert!(!outcome.stopped);
        assert_eq!(outcome.scrolled, 2);

        // Second tick with unchanged extents scrolls nothing
        let outcome = ctrl.tick();
        assert_eq!(outcome.scrolled, 0);
    }
}
