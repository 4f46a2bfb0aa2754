//! Panel attachment and teardown.
//!
//! [`AutoScrollExtension`] is the piece the embedding layer registers with
//! its notebook widget factory: one `attach` call per opened panel, one
//! [`SessionHandle`] back. The handle is the disposable the host keeps; when
//! the panel closes, disposing it stops the poll task, aborts signal
//! dispatch, clears all per-cell state, and detaches the toolbar button.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::AutoScrollConfig;
use crate::host::NotebookHost;
use crate::session::NotebookSession;
use crate::signals::{DisposableSet, SignalHub, SignalRecvError};

/// Factory for per-panel auto-scroll sessions.
#[derive(Debug, Clone)]
pub struct AutoScrollExtension {
    config: AutoScrollConfig,
}

impl AutoScrollExtension {
    /// Create an extension sharing one config across all panels.
    #[must_use]
    pub fn new(config: AutoScrollConfig) -> Self {
        Self { config }
    }

    /// Create an extension from a TOML config file.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read, parsed, or fails
    /// validation.
    pub fn from_config_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let config = AutoScrollConfig::load(path)?;
        Ok(Self::new(config))
    }

    /// Install the global logging subscriber per this extension's config.
    ///
    /// # Errors
    /// Returns an error when a subscriber is already installed or the log
    /// file cannot be created.
    pub fn init_logging(&self) -> crate::Result<()> {
        crate::logging::init_logging(&self.config.log)?;
        Ok(())
    }

    /// The shared configuration.
    #[must_use]
    pub fn config(&self) -> &AutoScrollConfig {
        &self.config
    }

    /// Create a signal hub sized per this extension's config.
    ///
    /// The embedding layer owns one hub per notebook panel and publishes the
    /// host's lifecycle signals onto it.
    #[must_use]
    pub fn make_hub(&self) -> SignalHub {
        SignalHub::new(self.config.signal_buffer)
    }

    /// Attach a session to an opened notebook panel.
    ///
    /// Initializes the toggle (writing the default enabled state into
    /// metadata), subscribes to the panel's signal hub, and spawns the
    /// dispatch task. Must be called from within a Tokio runtime.
    pub fn attach(
        &self,
        panel_id: impl Into<String>,
        host: Arc<dyn NotebookHost>,
        hub: &SignalHub,
    ) -> SessionHandle {
        let panel_id = panel_id.into();
        let session = Arc::new(NotebookSession::new(
            panel_id.clone(),
            &self.config,
            Arc::clone(&host),
        ));

        // First tick must read a defined flag, so this precedes dispatch.
        session.toggle_surface().initialize();

        let mut subscriber = hub.subscribe();
        let dispatch = tokio::spawn({
            let session = Arc::clone(&session);
            async move {
                loop {
                    match subscriber.recv().await {
                        Ok(signal) => session.handle_signal(&signal),
                        Err(SignalRecvError::Lagged { missed_count }) => {
                            // Tracking state self-corrects from later signals;
                            // worst case is a missed re-arm until the next one.
                            warn!(
                                panel_id = %session.panel_id(),
                                missed_count,
                                "Signal subscriber lagged"
                            );
                        }
                        Err(SignalRecvError::Closed) => break,
                    }
                }
            }
        });

        let mut disposables = DisposableSet::new();
        {
            let host = Arc::clone(&host);
            disposables.push(move || host.detach_button());
        }

        info!(panel_id = %panel_id, "Auto-scroll session attached");
        SessionHandle {
            session,
            dispatch: Some(dispatch),
            disposables,
            disposed: false,
        }
    }
}

/// Disposable handle for one attached panel.
///
/// Dropping the handle disposes it.
pub struct SessionHandle {
    session: Arc<NotebookSession>,
    dispatch: Option<JoinHandle<()>>,
    disposables: DisposableSet,
    disposed: bool,
}

impl SessionHandle {
    /// The session behind this handle.
    #[must_use]
    pub fn session(&self) -> &Arc<NotebookSession> {
        &self.session
    }

    /// Whether the handle has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Tear the session down. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        if let Some(dispatch) = self.dispatch.take() {
            dispatch.abort();
        }
        self.session.teardown();
        self.disposables.dispose();
        info!(panel_id = %self.session.panel_id(), "Auto-scroll session detached");
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("panel_id", &self.session.panel_id())
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}
