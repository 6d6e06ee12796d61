//! Conversation orchestrator: one user turn at a time, end to end.
//!
//! Owns the single `Phase` value that gates capture, generation, and
//! synthesis. A turn is: utterance in → "thinking" acknowledgment →
//! overview + concepts generated concurrently → overview spoken →
//! concepts spoken strictly in order → closing prompt. Every error path
//! restores the phase so the next turn can start.

#![allow(async_fn_in_trait)]

use crate::ui::{UiEvent, UiHandle};
use bantam_content::{Concept, ContentClient, ContentError};
use bantam_speech::{Recognizer, SpeechError, SpeechHandle};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Idle window before capture is (re)armed.
const IDLE_REARM: Duration = Duration::from_secs(2);

const GREETING_LINE: &str =
    "Hi! I'm Bantam, your learning buddy. Let's explore something amazing together!";
const LISTENING_LINE: &str = "I'm listening...";
const THINKING_LINE: &str = "Thinking...";
const CLOSING_LINE: &str = "What would you like to learn about next?";
const APOLOGY_LINE: &str = "Oops! I'm having trouble understanding. Could you try again?";
const RETRY_LINE: &str = "Sorry, I couldn't hear you clearly. Can you try again?";

/// Stock introductions, one chosen uniformly per concept.
const INTRODUCTIONS: [&str; 5] = [
    "Let's explore this fascinating idea:",
    "Here's an incredible insight:",
    "Check out this amazing discovery:",
    "Prepare to be amazed:",
    "Here's something really interesting:",
];

/// Orchestrator state. Exactly one of these at a time, transitions
/// validated centrally in [`Orchestrator::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Listening,
    Processing,
    Speaking,
}

/// Content generation seam.
pub trait ContentProvider {
    /// Fail-soft overview text.
    async fn overview(&self, topic: &str) -> String;
    /// Fixed-count concept batch; errors propagate.
    async fn concepts(&self, topic: &str) -> Result<Vec<Concept>, ContentError>;
}

impl ContentProvider for ContentClient {
    async fn overview(&self, topic: &str) -> String {
        self.generate_overview(topic).await
    }

    async fn concepts(&self, topic: &str) -> Result<Vec<Concept>, ContentError> {
        self.concepts_with_illustrations(topic).await
    }
}

/// Speech output seam.
pub trait Speaker {
    async fn speak(&self, text: &str) -> Result<(), SpeechError>;
}

impl Speaker for SpeechHandle {
    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        SpeechHandle::speak(self, text).await
    }
}

/// Speech input seam: one call, one final transcript or an error.
pub trait Listener {
    async fn listen_once(&self) -> Result<String, SpeechError>;
}

/// Runs the blocking recognizer off the async runtime.
pub struct BlockingListener {
    recognizer: Arc<Recognizer>,
}

impl BlockingListener {
    pub fn new(recognizer: Arc<Recognizer>) -> Self {
        Self { recognizer }
    }
}

impl Listener for BlockingListener {
    async fn listen_once(&self) -> Result<String, SpeechError> {
        let recognizer = Arc::clone(&self.recognizer);
        tokio::task::spawn_blocking(move || recognizer.recognize_once())
            .await
            .map_err(|_| SpeechError::ChannelClosed)?
    }
}

pub struct Orchestrator<C, S, L> {
    content: C,
    speaker: S,
    listener: L,
    ui: UiHandle,
    phase: Phase,
}

impl<C, S, L> Orchestrator<C, S, L>
where
    C: ContentProvider,
    S: Speaker,
    L: Listener,
{
    pub fn new(content: C, speaker: S, listener: L, ui: UiHandle) -> Self {
        Self {
            content,
            speaker,
            listener,
            ui,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Central transition check. An unexpected edge is a bug in the
    /// caller; it is logged and applied rather than wedging the session.
    fn transition(&mut self, to: Phase) {
        use Phase::*;
        let valid = matches!(
            (self.phase, to),
            (Idle, Listening)
                | (Idle, Speaking)
                | (Listening, Processing)
                | (Listening, Idle)
                | (Processing, Speaking)
                | (Processing, Idle)
                | (Speaking, Processing)
                | (Speaking, Idle)
        );
        if !valid {
            tracing::warn!(from = ?self.phase, to = ?to, "unexpected phase transition");
        }
        tracing::debug!(from = ?self.phase, to = ?to, "phase");
        self.phase = to;
    }

    /// Speak one utterance with the phase held at `Speaking` for its
    /// whole duration, then restore the surrounding phase. Synthesis
    /// errors are logged, never propagated.
    async fn say(&mut self, text: &str) {
        let surrounding = self.phase;
        self.transition(Phase::Speaking);
        if let Err(e) = self.speaker.speak(text).await {
            tracing::warn!(error = %e, "utterance failed");
        }
        self.transition(surrounding);
    }

    /// One-time startup greeting. Independent of camera health.
    pub async fn greet(&mut self) {
        self.ui.send(UiEvent::Message(GREETING_LINE.to_string()));
        self.say(GREETING_LINE).await;
    }

    /// Main loop: wait out the idle window, run one turn, repeat until
    /// shutdown. Capture only ever starts from `Idle`.
    pub async fn run(&mut self, shutdown: &mut watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep(IDLE_REARM) => {
                    self.run_turn().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// Arm capture, wait for one utterance, process it.
    pub async fn run_turn(&mut self) {
        self.transition(Phase::Listening);
        self.ui.send(UiEvent::ListeningStarted);
        self.ui.send(UiEvent::Message(LISTENING_LINE.to_string()));

        match self.listener.listen_once().await {
            Ok(utterance) => {
                tracing::info!(%utterance, "utterance recognized");
                self.transition(Phase::Processing);
                self.handle_utterance(&utterance).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "recognition failed");
                self.ui.send(UiEvent::Message(RETRY_LINE.to_string()));
                self.transition(Phase::Idle);
            }
        }
    }

    /// One full turn, phase `Processing` on entry and `Idle` on exit —
    /// on every path.
    async fn handle_utterance(&mut self, topic: &str) {
        self.say(THINKING_LINE).await;

        // Both generation requests run concurrently and are joined; the
        // overview fails soft inside the client.
        let (overview, concepts) = tokio::join!(
            self.content.overview(topic),
            self.content.concepts(topic)
        );

        let concepts = match concepts {
            Ok(concepts) => concepts,
            Err(e) => {
                tracing::warn!(error = %e, "concept generation failed, ending turn");
                self.ui.send(UiEvent::Message(APOLOGY_LINE.to_string()));
                self.say(APOLOGY_LINE).await;
                self.transition(Phase::Idle);
                return;
            }
        };

        self.ui.send(UiEvent::Overview(overview.clone()));
        self.say(&overview).await;

        // Publish concepts now so illustrations start loading while the
        // explanations are spoken.
        self.ui.send(UiEvent::Concepts(concepts.clone()));

        for concept in &concepts {
            let intro = INTRODUCTIONS[rand::thread_rng().gen_range(0..INTRODUCTIONS.len())];
            let line = format!("{intro} {}", concept.explanation);
            self.ui.send(UiEvent::Message(line.clone()));
            self.say(&line).await;
        }

        self.say(CLOSING_LINE).await;
        self.transition(Phase::Idle);
    }
}
