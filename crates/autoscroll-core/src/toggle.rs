//! Toggle surface: the toolbar button bound to the enabled flag.
//!
//! The button itself is inserted by the embedding layer (presentation comes
//! from [`crate::config::ButtonConfig`]); this module owns its behavior. The
//! flag and the pressed state move together, and the initial value is written
//! into metadata at attach time so the first tick reads a defined value
//! rather than an absent key.

use tracing::debug;

use crate::controller::ScrollController;

/// Behavior of the per-notebook toggle button.
pub struct ToggleSurface {
    controller: ScrollController,
    default_enabled: bool,
}

impl ToggleSurface {
    pub(crate) fn new(controller: ScrollController, default_enabled: bool) -> Self {
        Self {
            controller,
            default_enabled,
        }
    }

    /// Write the initial enabled state into metadata and the button.
    ///
    /// Called once at panel attach, before any signal is dispatched.
    pub fn initialize(&self) {
        debug!(enabled = self.default_enabled, "Initializing toggle state");
        self.controller.set_enabled(self.default_enabled);
    }

    /// The button click handler. Returns the new enabled state.
    pub fn press(&self) -> bool {
        self.controller.toggle()
    }

    /// Current enabled state.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.controller.enabled()
    }
}

impl std::fmt::Debug for ToggleSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToggleSurface")
            .field("default_enabled", &self.default_enabled)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
