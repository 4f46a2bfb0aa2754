//! autoscroll-core: execution-tracked auto-scroll for notebook cell output
//!
//! This crate follows newly produced output in executing notebook cells by
//! snapping each cell's output panel to the bottom whenever its rendered
//! height grows, gated by a per-notebook toggle persisted in the document's
//! metadata.
//!
//! # Architecture
//!
//! ```text
//! Host signals ──► SignalHub ──► NotebookSession
//!                                  ├─ TrackingStrategy (executing set)
//!                                  ├─ OutputObserver   (poll re-arm)
//!                                  └─ ScrollController (1s tick, height cache)
//!                                         │
//!                                         ▼
//!                                 NotebookHost (scroll offsets, metadata)
//! ```
//!
//! # Modules
//!
//! - `host`: host abstraction (`NotebookHost`, cell identity and states)
//! - `signals`: signal enum, broadcast hub, teardown disposables
//! - `tracker`: execution tracking strategy over host signals
//! - `controller`: poll task, tick, height-gated scrolling, the toggle flag
//! - `observer`: poll re-arm on output-collection changes
//! - `toggle`: toolbar toggle behavior
//! - `session`: per-notebook session tying the pieces together
//! - `extension`: panel attach/teardown entry point
//! - `config`: configuration management
//! - `logging`: structured logging setup
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod config;
pub mod controller;
pub mod error;
pub mod extension;
pub mod host;
pub mod logging;
pub mod observer;
pub mod session;
pub mod signals;
pub mod toggle;
pub mod tracker;

pub use config::AutoScrollConfig;
pub use error::{Error, Result};
pub use extension::{AutoScrollExtension, SessionHandle};
pub use host::{CellId, NotebookHost};
pub use session::NotebookSession;
pub use signals::{NotebookSignal, SignalHub};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
