//! The agent's capability seam over the live page.
//!
//! The agent never touches a DOM directly; it sees the page as a set of
//! clickable controls with rendered text and nearest-container text,
//! plus an optional open dialog. The browser crate implements this over
//! CDP; tests implement it with scripted fakes.

use async_trait::async_trait;
use deskbot_core::Result;

/// A clickable element on the target page. `handle` stays valid as long
/// as the element is attached; `refresh_control` re-reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub handle: String,
    /// Rendered text of the element itself.
    pub text: String,
    pub enabled: bool,
    /// Text of the nearest enclosing container (day cell, card, row).
    pub container_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogButton {
    pub handle: String,
    pub text: String,
    pub enabled: bool,
}

/// A dialog-like element currently shown on the page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dialog {
    pub buttons: Vec<DialogButton>,
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn current_url(&self) -> Result<String>;

    async fn navigate(&self, url: &str) -> Result<()>;

    /// All clickable candidates currently on the page, with text and
    /// container text. Label filtering happens in the agent, not here.
    async fn scan_controls(&self) -> Result<Vec<Control>>;

    /// Re-read one control. None when it is no longer attached.
    async fn refresh_control(&self, handle: &str) -> Result<Option<Control>>;

    async fn scroll_into_view(&self, handle: &str) -> Result<()>;

    async fn click(&self, handle: &str) -> Result<()>;

    /// The currently open dialog-like element, if any.
    async fn find_dialog(&self) -> Result<Option<Dialog>>;

    async fn click_dialog_button(&self, handle: &str) -> Result<()>;

    /// Fresh container text for a control, read after the page settles.
    async fn container_text(&self, handle: &str) -> Result<String>;
}
