//! Notebook signal hub.
//!
//! The host environment publishes cell lifecycle and output signals onto a
//! bounded broadcast hub; each attached session holds one subscription and
//! dispatches from it. Subscribing replaces the per-cell listener wiring of
//! widget toolkits: one subscription covers cells present at attach time and
//! every cell added later, and dropping it detaches everything at once.
//!
//! # Example
//!
//! ```no_run
//! use autoscroll_core::signals::{NotebookSignal, SignalHub};
//! use autoscroll_core::host::CellId;
//!
//! #[tokio::main]
//! async fn main() {
//!     let hub = SignalHub::new(1024);
//!     let mut subscriber = hub.subscribe();
//!
//!     let _ = hub.publish(NotebookSignal::ExecutionScheduled {
//!         cell: CellId::new("cell-1"),
//!     });
//!
//!     while let Ok(signal) = subscriber.recv().await {
//!         println!("got signal: {}", signal.type_name());
//!     }
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::host::{CellId, CellInfo, ExecutionState};

/// Kind of change observed on a cell's output collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputChange {
    /// An output item was appended
    Append,
    /// The output collection was cleared
    Clear,
    /// The whole collection was replaced
    Replace,
}

/// Signals delivered by the host notebook environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotebookSignal {
    /// The cell list changed
    CellsChanged {
        /// Cells added to the notebook
        added: Vec<CellInfo>,
        /// Cells removed from the notebook
        removed: Vec<CellId>,
    },

    /// The active cell changed (None when no cell is active)
    ActiveCellChanged { cell: Option<CellInfo> },

    /// A cell's execution state changed
    ExecutionStateChanged {
        cell: CellId,
        from: ExecutionState,
        to: ExecutionState,
    },

    /// An execution was scheduled for a cell
    ExecutionScheduled { cell: CellId },

    /// A cell's execution finished
    ExecutionFinished { cell: CellId },

    /// A cell's output collection changed
    OutputChanged { cell: CellId, change: OutputChange },
}

impl NotebookSignal {
    /// Returns the signal type name for logging/metrics
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::CellsChanged { .. } => "cells_changed",
            Self::ActiveCellChanged { .. } => "active_cell_changed",
            Self::ExecutionStateChanged { .. } => "execution_state_changed",
            Self::ExecutionScheduled { .. } => "execution_scheduled",
            Self::ExecutionFinished { .. } => "execution_finished",
            Self::OutputChanged { .. } => "output_changed",
        }
    }

    /// Returns the cell id if this signal is about a single cell
    #[must_use]
    pub fn cell_id(&self) -> Option<&CellId> {
        match self {
            Self::ExecutionStateChanged { cell, .. }
            | Self::ExecutionScheduled { cell }
            | Self::ExecutionFinished { cell }
            | Self::OutputChanged { cell, .. } => Some(cell),
            Self::ActiveCellChanged { cell } => cell.as_ref().map(|info| &info.id),
            Self::CellsChanged { .. } => None,
        }
    }
}

/// Metrics for monitoring hub health
#[derive(Debug, Default)]
pub struct HubMetrics {
    /// Total signals published since hub creation
    pub signals_published: AtomicU64,
    /// Signals published that had no subscribers
    pub signals_dropped_no_subscribers: AtomicU64,
    /// Number of currently active subscribers
    pub active_subscribers: AtomicU64,
    /// Total lag events (slow subscriber missed signals)
    pub subscriber_lag_events: AtomicU64,
}

/// Error returned when receiving signals
#[derive(Debug, Clone, thiserror::Error)]
pub enum SignalRecvError {
    /// The hub was closed (all senders dropped)
    #[error("signal hub closed")]
    Closed,
    /// Subscriber fell behind and missed signals
    #[error("subscriber lagged, missed {missed_count} signals")]
    Lagged { missed_count: u64 },
}

/// Bounded broadcast hub for notebook signals.
///
/// Publishing is non-blocking; with no subscribers the signal is dropped and
/// counted. A slow subscriber receives a lag error and misses intermediate
/// signals rather than stalling the publisher.
pub struct SignalHub {
    sender: broadcast::Sender<NotebookSignal>,
    capacity: usize,
    metrics: Arc<HubMetrics>,
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl SignalHub {
    /// Create a hub with the given buffer capacity (clamped to at least 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            capacity,
            metrics: Arc::new(HubMetrics::default()),
        }
    }

    /// Buffer capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Shared reference to hub metrics.
    #[must_use]
    pub fn metrics(&self) -> Arc<HubMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Publish a signal to all subscribers.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, signal: NotebookSignal) -> usize {
        self.metrics
            .signals_published
            .fetch_add(1, Ordering::Relaxed);

        let delivered = self.sender.send(signal).unwrap_or(0);
        if delivered == 0 {
            self.metrics
                .signals_dropped_no_subscribers
                .fetch_add(1, Ordering::Relaxed);
        }
        delivered
    }

    /// Create a subscriber receiving every signal published after this call.
    #[must_use]
    pub fn subscribe(&self) -> SignalSubscriber {
        self.metrics
            .active_subscribers
            .fetch_add(1, Ordering::Relaxed);
        SignalSubscriber {
            receiver: self.sender.subscribe(),
            metrics: Arc::clone(&self.metrics),
            lagged_count: 0,
        }
    }
}

/// Subscriber handle for receiving signals from the hub.
///
/// Dropping the subscriber unsubscribes and decrements metrics.
pub struct SignalSubscriber {
    receiver: broadcast::Receiver<NotebookSignal>,
    metrics: Arc<HubMetrics>,
    lagged_count: u64,
}

impl SignalSubscriber {
    /// Receive the next signal.
    ///
    /// # Errors
    /// - `SignalRecvError::Closed` when the hub was dropped
    /// - `SignalRecvError::Lagged` when this subscriber fell behind
    pub async fn recv(&mut self) -> Result<NotebookSignal, SignalRecvError> {
        match self.receiver.recv().await {
            Ok(signal) => Ok(signal),
            Err(broadcast::error::RecvError::Closed) => Err(SignalRecvError::Closed),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                self.lagged_count += n;
                self.metrics
                    .subscriber_lag_events
                    .fetch_add(n, Ordering::Relaxed);
                Err(SignalRecvError::Lagged { missed_count: n })
            }
        }
    }

    /// Total signals this subscriber missed due to lag.
    #[must_use]
    pub fn lagged_count(&self) -> u64 {
        self.lagged_count
    }
}

impl Drop for SignalSubscriber {
    fn drop(&mut self) {
        self.metrics
            .active_subscribers
            .fetch_sub(1, Ordering::Relaxed);
    }
}

/// Teardown callbacks collected during attach and released together.
///
/// Everything a session registers against the host (button, subscription,
/// tasks) contributes one callback; disposing runs each exactly once, in
/// reverse registration order. Disposing twice is a no-op.
#[derive(Default)]
pub struct DisposableSet {
    callbacks: Vec<Box<dyn FnOnce() + Send>>,
}

impl DisposableSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a teardown callback.
    pub fn push(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    /// Number of pending callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Whether there are no pending callbacks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Run all callbacks in reverse registration order and clear the set.
    pub fn dispose(&mut self) {
        while let Some(callback) = self.callbacks.pop() {
            callback();
        }
    }
}

impl std::fmt::Debug for DisposableSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposableSet")
            .field("pending", &self.callbacks.len())
            .finish()
    }
}
