//! Canonical event names used at the module boundary.
//!
//! External collaborators (control widgets, preview panes, palette
//! libraries) subscribe to these; the sync client publishes the
//! lifecycle subset around every persistence call.

/// A settings value changed locally.
pub const SETTINGS_CHANGED: &str = "settings:changed";
/// A settings document was persisted.
pub const SETTINGS_SAVED: &str = "settings:saved";
/// Settings were reset to their defaults.
pub const SETTINGS_RESET: &str = "settings:reset";

/// The live preview should re-render.
pub const PREVIEW_UPDATE: &str = "preview:update";

/// The user picked a color in a control.
pub const COLOR_SELECTED: &str = "color:selected";

/// A template was applied server-side.
pub const TEMPLATE_APPLIED: &str = "template:applied";
/// A palette was applied server-side.
pub const PALETTE_APPLIED: &str = "palette:applied";

/// A persistence request was dispatched.
pub const SAVE_STARTED: &str = "save:started";
/// A persistence request settled successfully.
pub const SAVE_COMPLETED: &str = "save:completed";
/// A persistence request settled with a terminal error.
pub const SAVE_FAILED: &str = "save:failed";

/// A subscriber or persistence call failed; payload carries the error.
pub const ERROR_OCCURRED: &str = "error:occurred";
