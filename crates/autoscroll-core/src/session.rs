//! Per-notebook auto-scroll session.
//!
//! One [`NotebookSession`] exists per open notebook panel and owns all of its
//! mutable state: the tracked-cell sets, the height cache, the poll task, and
//! the tracking strategy. Host signals are folded in through
//! [`NotebookSession::handle_signal`]; nothing in here is ambient or global,
//! so two open notebooks never share state.
//!
//! # Architecture
//!
//! ```text
//! host signals ──► TrackingStrategy ──► TrackerEffects ─┐
//!        │                                              ▼
//!        └──► OutputObserver (re-arm) ──► ScrollController
//!                                          │  tick (1s)
//!                                          ▼
//!                                  NotebookHost scroll offsets
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AutoScrollConfig;
use crate::controller::ScrollController;
use crate::host::{CellId, NotebookHost};
use crate::observer::OutputObserver;
use crate::signals::NotebookSignal;
use crate::toggle::ToggleSurface;
use crate::tracker::{ExecutionEventTracker, TrackedCells, TrackerEffect, TrackingStrategy};

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// The state behind these locks stays consistent across panics (plain maps
/// and sets, mutated in place), so poisoning is not propagated.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Mutable state shared between the controller and the tracker.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Last observed output scroll extent per cell
    pub(crate) heights: HashMap<CellId, u64>,
    /// Execution tracking sets
    pub(crate) cells: TrackedCells,
}

/// Counters for one session, usable from any callback.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    /// Ticks executed
    pub ticks: AtomicU64,
    /// Cells whose scroll offset was moved
    pub cells_scrolled: AtomicU64,
    /// Poll tasks spawned
    pub polls_started: AtomicU64,
    /// Poll tasks stopped from outside (tick self-stops count too)
    pub polls_stopped: AtomicU64,
    /// Output-change re-arms
    pub rearms: AtomicU64,
    /// Signals folded into the session
    pub signals_handled: AtomicU64,
}

impl SessionMetrics {
    pub(crate) fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cell_scrolled(&self) {
        self.cells_scrolled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_poll_started(&self) {
        self.polls_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_poll_stopped(&self) {
        self.polls_stopped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rearm(&self) {
        self.rearms.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_signal(&self) {
        self.signals_handled.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time snapshot for diagnostics.
    #[must_use]
    pub fn snapshot(&self) -> SessionMetricsSnapshot {
        SessionMetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            cells_scrolled: self.cells_scrolled.load(Ordering::Relaxed),
            polls_started: self.polls_started.load(Ordering::Relaxed),
            polls_stopped: self.polls_stopped.load(Ordering::Relaxed),
            rearms: self.rearms.load(Ordering::Relaxed),
            signals_handled: self.signals_handled.load(Ordering::Relaxed),
        }
    }
}

/// Serializable snapshot of [`SessionMetrics`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetricsSnapshot {
    /// Ticks executed
    pub ticks: u64,
    /// Cells scrolled
    pub cells_scrolled: u64,
    /// Poll tasks spawned
    pub polls_started: u64,
    /// Poll tasks stopped
    pub polls_stopped: u64,
    /// Output-change re-arms
    pub rearms: u64,
    /// Signals handled
    pub signals_handled: u64,
}

/// Auto-scroll session for one notebook panel.
pub struct NotebookSession {
    panel_id: String,
    controller: ScrollController,
    toggle: ToggleSurface,
    observer: OutputObserver,
    strategy: Mutex<Box<dyn TrackingStrategy>>,
    state: Arc<Mutex<SessionState>>,
    metrics: Arc<SessionMetrics>,
}

impl NotebookSession {
    /// Create a session with the default execution-event strategy.
    #[must_use]
    pub fn new(
        panel_id: impl Into<String>,
        config: &AutoScrollConfig,
        host: Arc<dyn NotebookHost>,
    ) -> Self {
        Self::with_strategy(panel_id, config, host, Box::new(ExecutionEventTracker::new()))
    }

    /// Create a session with a custom tracking strategy.
    #[must_use]
    pub fn with_strategy(
        panel_id: impl Into<String>,
        config: &AutoScrollConfig,
        host: Arc<dyn NotebookHost>,
        strategy: Box<dyn TrackingStrategy>,
    ) -> Self {
        let panel_id = panel_id.into();
        let state = Arc::new(Mutex::new(SessionState::default()));
        let metrics = Arc::new(SessionMetrics::default());
        let controller = ScrollController::new(
            panel_id.clone(),
            host,
            config,
            Arc::clone(&state),
            Arc::clone(&metrics),
        );
        let toggle = ToggleSurface::new(controller.clone(), config.enabled_by_default);
        let observer = OutputObserver::new(controller.clone(), Arc::clone(&metrics));

        debug!(
            panel_id = %panel_id,
            strategy = strategy.name(),
            "Notebook session created"
        );
        Self {
            panel_id,
            controller,
            toggle,
            observer,
            strategy: Mutex::new(strategy),
            state,
            metrics,
        }
    }

    /// Panel identifier this session is attached to.
    #[must_use]
    pub fn panel_id(&self) -> &str {
        &self.panel_id
    }

    /// The scroll controller.
    #[must_use]
    pub fn controller(&self) -> &ScrollController {
        &self.controller
    }

    /// The toggle surface bound to the toolbar button.
    #[must_use]
    pub fn toggle_surface(&self) -> &ToggleSurface {
        &self.toggle
    }

    /// Shared metrics handle.
    #[must_use]
    pub fn metrics(&self) -> Arc<SessionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Whether auto-scroll is enabled for this notebook.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.controller.enabled()
    }

    /// Flip the toggle (the toolbar click handler).
    pub fn toggle(&self) -> bool {
        self.toggle.press()
    }

    /// Snapshot of the executing cells.
    #[must_use]
    pub fn executing_cells(&self) -> Vec<CellId> {
        lock(&self.state).cells.executing_cells()
    }

    /// Fold one host signal into the session.
    ///
    /// Safe to call at any time, including while the poll task runs; the
    /// effects are applied in order so a finishing cell's final scroll lands
    /// before the cache is wiped.
    pub fn handle_signal(&self, signal: &NotebookSignal) {
        self.metrics.record_signal();

        if let NotebookSignal::OutputChanged { cell, change } = signal {
            self.observer.on_output_changed(cell, *change);
        }

        let effects = {
            let mut strategy = lock(&self.strategy);
            let mut state = lock(&self.state);
            strategy.apply(&mut state.cells, signal)
        };

        for effect in effects {
            match effect {
                TrackerEffect::StartPolling => self.controller.start_polling(),
                TrackerEffect::StopPolling => self.controller.stop_polling(),
                TrackerEffect::ScrollNow(cell) => {
                    let _ = self.controller.scroll_cell_if_changed(&cell);
                }
                TrackerEffect::Forget(cell) => {
                    lock(&self.state).heights.remove(&cell);
                }
            }
        }
    }

    /// Tear the session down: stop polling and drop all per-cell state.
    ///
    /// Idempotent; called from the disposable handle when the panel closes.
    pub fn teardown(&self) {
        self.controller.stop_polling();
        let mut state = lock(&self.state);
        state.heights.clear();
        state.cells.clear();
        debug!(panel_id = %self.panel_id, "Notebook session torn down");
    }
}

impl std::fmt::Debug for NotebookSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotebookSession")
            .field("panel_id", &self.panel_id)
            .field("enabled", &self.enabled())
            .field("executing", &lock(&self.state).cells.executing_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::OutputChange;
    use serde_json::Value;
    use std::collections::HashMap as StdHashMap;

    #[derive(Default)]
    struct RecordingHost {
        meta: Mutex<StdHashMap<String, Value>>,
        extents: Mutex<StdHashMap<CellId, u64>>,
        offsets: Mutex<Vec<(CellId, u64)>>,
    }

    impl RecordingHost {
        fn set_extent(&self, id: &str, extent: u64) {
            self.extents
                .lock()
                .unwrap()
                .insert(CellId::new(id), extent);
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

        fn set_button_pressed(&self, _pressed: bool) {}

        fn detach_button(&self) {}
    }

    fn make_session() -> (NotebookSession, Arc<RecordingHost>) {
        let host = Arc::new(RecordingHost::default());
        let session = NotebookSession::new(
            "panel-1",
            &AutoScrollConfig::default(),
            Arc::clone(&host) as Arc<dyn NotebookHost>,
        );
        (session, host)
    }

    fn scheduled(id: &str) -> NotebookSignal {
        NotebookSignal::ExecutionScheduled {
            cell: CellId::new(id),
        }
    }

    fn finished(id: &str) -> NotebookSignal {
        NotebookSignal::ExecutionFinished {
            cell: CellId::new(id),
        }
    }

    #[tokio::test]
    async fn scheduled_signal_starts_polling() {
        let (session, _host) = make_session();
        session.toggle_surface().initialize();

        session.handle_signal(&scheduled("a"));

        assert_eq!(session.executing_cells(), vec![CellId::new("a")]);
        assert!(session.controller().polling_active());
        session.teardown();
    }

    #[tokio::test]
    async fn finished_signal_delivers_final_scroll_and_stops() {
        let (session, host) = make_session();
        session.toggle_surface().initialize();
        host.set_extent("a", 240);

        session.handle_signal(&scheduled("a"));
        session.handle_signal(&finished("a"));

        // The final height-gated scroll landed before the stop wiped the cache
        assert_eq!(
            *host.offsets.lock().unwrap(),
            vec![(CellId::new("a"), 240)]
        );
        assert!(session.executing_cells().is_empty());
        assert_eq!(session.controller().cached_height(&CellId::new("a")), None);
        session.teardown();
    }

    #[tokio::test]
    async fn output_change_rearms_polling_when_enabled() {
        let (session, _host) = make_session();
        session.toggle_surface().initialize();

        session.handle_signal(&NotebookSignal::OutputChanged {
            cell: CellId::new("a"),
            change: OutputChange::Append,
        });

        assert!(session.controller().polling_active());
        assert_eq!(session.metrics().rearms.load(Ordering::Relaxed), 1);
        session.teardown();
    }

    #[tokio::test]
    async fn output_change_is_ignored_when_disabled() {
        let (session, _host) = make_session();
        // toggle never initialized: metadata missing, reads as disabled

        session.handle_signal(&NotebookSignal::OutputChanged {
            cell: CellId::new("a"),
            change: OutputChange::Clear,
        });

        assert!(!session.controller().polling_active());
        assert_eq!(session.metrics().rearms.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn removed_cell_is_forgotten_entirely() {
        let (session, host) = make_session();
        session.toggle_surface().initialize();
        host.set_extent("a", 100);

        session.handle_signal(&scheduled("a"));
        let _ = session.controller().scroll_cell_if_changed(&CellId::new("a"));
        assert_eq!(
            session.controller().cached_height(&CellId::new("a")),
            Some(100)
        );

        session.handle_signal(&NotebookSignal::CellsChanged {
            added: vec![],
            removed: vec![CellId::new("a")],
        });

        assert!(session.executing_cells().is_empty());
        assert_eq!(session.controller().cached_height(&CellId::new("a")), None);
        session.teardown();
    }

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let (session, _host) = make_session();
        session.toggle_surface().initialize();
        session.handle_signal(&scheduled("a"));

        session.teardown();
        assert!(!session.controller().polling_active());
        assert!(session.executing_cells().is_empty());
        session.teardown();
    }

    #[test]
    fn metrics_snapshot_roundtrips_as_json() {
        let metrics = SessionMetrics::default();
        metrics.record_tick();
        metrics.record_cell_scrolled();

        let snapshot = metrics.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: SessionMetricsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ticks, 1);
        assert_eq!(back.cells_scrolled, 1);
    }
}
