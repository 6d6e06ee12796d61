//! Typed event stream for the front-end render targets.
//!
//! The daemon never blocks on the UI consumer; events queue unbounded
//! and a detached consumer is not an error.

use bantam_content::Concept;
use tokio::sync::mpsc;

/// Events the front-end renders.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// Transient speech-bubble message.
    Message(String),
    /// Clear the transient message.
    ClearMessage,
    /// Topic overview text (kept on screen across the turn).
    Overview(String),
    /// Concept cards; illustrations may still be loading client-side.
    Concepts(Vec<Concept>),
    /// Synthetic page-level key input from a gesture.
    KeyDown(char),
    KeyUp(char),
    /// Capture has been (re)armed.
    ListeningStarted,
    /// The tracking subsystem failed; hide camera-dependent widgets.
    CameraDisabled,
}

/// Clone-safe sender for UI events.
#[derive(Clone)]
pub struct UiHandle {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl UiHandle {
    pub fn send(&self, event: UiEvent) {
        let _ = self.tx.send(event);
    }
}

/// Create the UI seam.
pub fn ui_channel() -> (UiHandle, mpsc::UnboundedReceiver<UiEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UiHandle { tx }, rx)
}
