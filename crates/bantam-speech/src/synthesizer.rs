//! Sentence-chunked speech synthesis with an exclusive playback sink.
//!
//! Synthesis and playback run on a dedicated OS thread (the audio stack
//! is not thread-movable); callers hold a clone-safe [`SpeechHandle`].
//! Starting a new utterance stops anything still pending, and each
//! sentence chunk is spoken to completion before the next begins.

use crate::error::SpeechError;
use rodio::{Decoder, OutputStream, Sink};
use serde::Serialize;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

/// One entry in a backend's voice catalog.
#[derive(Debug, Clone)]
pub struct VoiceInfo {
    pub name: String,
    /// BCP-47-ish language tag, e.g. "en-US".
    pub lang: String,
    /// Free-form label, e.g. "female".
    pub label: String,
}

/// Utterance parameters.
#[derive(Debug, Clone)]
pub struct VoiceSpec {
    pub voice: Option<String>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for VoiceSpec {
    fn default() -> Self {
        Self {
            voice: None,
            rate: 0.8,
            pitch: 1.0,
            volume: 0.8,
        }
    }
}

/// Backend that turns text into audio bytes (WAV/MP3).
pub trait TtsBackend: Send {
    fn synthesize(&self, text: &str, spec: &VoiceSpec) -> Result<Vec<u8>, SpeechError>;

    /// Available voices. May be a static catalog.
    fn voices(&self) -> Vec<VoiceInfo>;
}

/// Prefer an English-tagged, female-labeled voice; None means the
/// backend default.
pub fn pick_voice(voices: &[VoiceInfo]) -> Option<&VoiceInfo> {
    voices.iter().find(|v| {
        let lang = v.lang.to_lowercase();
        (lang.starts_with("en-") || lang.starts_with("en_") || lang == "en")
            && v.label.eq_ignore_ascii_case("female")
    })
}

/// Split text into sentence-like chunks on `.`, `!`, `?`.
///
/// Runs of terminators stay attached to their sentence; text without a
/// terminator is one chunk. Never yields an empty chunk.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut iter = text.chars().peekable();

    while let Some(ch) = iter.next() {
        current.push(ch);
        let terminator = matches!(ch, '.' | '!' | '?');
        let next_terminator = matches!(iter.peek(), Some(&('.' | '!' | '?')));
        if terminator && !next_terminator {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }
            current.clear();
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
    chunks
}

enum SpeechRequest {
    Speak {
        text: String,
        reply: oneshot::Sender<Result<(), SpeechError>>,
    },
}

/// Clone-safe handle to the synthesis thread.
#[derive(Clone)]
pub struct SpeechHandle {
    tx: mpsc::Sender<SpeechRequest>,
    current: Arc<Mutex<Option<Arc<Sink>>>>,
    cancelled: Arc<AtomicBool>,
}

impl SpeechHandle {
    /// Spawn the synthesis thread: open the default output stream,
    /// select a voice from the backend catalog, then serve requests.
    pub fn spawn(backend: Box<dyn TtsBackend>) -> Result<Self, SpeechError> {
        let (tx, mut rx) = mpsc::channel::<SpeechRequest>(4);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), SpeechError>>();

        let current: Arc<Mutex<Option<Arc<Sink>>>> = Arc::new(Mutex::new(None));
        let cancelled = Arc::new(AtomicBool::new(false));

        let thread_current = Arc::clone(&current);
        let thread_cancelled = Arc::clone(&cancelled);

        std::thread::Builder::new()
            .name("bantam-speech".into())
            .spawn(move || {
                // The output stream must live on this thread.
                let (stream, handle) = match OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = ready_tx.send(Err(SpeechError::Playback(e.to_string())));
                        return;
                    }
                };
                let _stream = stream;

                let mut spec = VoiceSpec::default();
                let catalog = backend.voices();
                match pick_voice(&catalog) {
                    Some(voice) => {
                        tracing::info!(voice = %voice.name, lang = %voice.lang, "selected voice");
                        spec.voice = Some(voice.name.clone());
                    }
                    None => tracing::info!("no english female voice in catalog, using default"),
                }

                let _ = ready_tx.send(Ok(()));
                tracing::info!("speech thread started");

                while let Some(req) = rx.blocking_recv() {
                    match req {
                        SpeechRequest::Speak { text, reply } => {
                            thread_cancelled.store(false, Ordering::SeqCst);
                            let result = speak_text(
                                &handle,
                                backend.as_ref(),
                                &spec,
                                &text,
                                &thread_current,
                                &thread_cancelled,
                            );
                            let _ = reply.send(result);
                        }
                    }
                }
                tracing::info!("speech thread exiting");
            })
            .map_err(|e| SpeechError::Playback(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|_| SpeechError::ChannelClosed)??;

        Ok(Self {
            tx,
            current,
            cancelled,
        })
    }

    /// Speak one utterance, chunk by chunk, to completion. Anything
    /// still pending at the sink is stopped first.
    pub async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        self.stop();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SpeechRequest::Speak {
                text: text.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| SpeechError::ChannelClosed)?;
        reply_rx.await.map_err(|_| SpeechError::ChannelClosed)?
    }

    /// Stop current playback and abandon the remaining chunks of the
    /// in-flight utterance.
    pub fn stop(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Ok(guard) = self.current.lock() {
            if let Some(sink) = guard.as_ref() {
                sink.stop();
            }
        }
    }
}

/// Speak one utterance on the synthesis thread.
///
/// Per-chunk synthesis or decode errors are logged and the remaining
/// chunks continue; cancellation abandons the rest of the utterance.
fn speak_text(
    handle: &rodio::OutputStreamHandle,
    backend: &dyn TtsBackend,
    spec: &VoiceSpec,
    text: &str,
    current: &Arc<Mutex<Option<Arc<Sink>>>>,
    cancelled: &Arc<AtomicBool>,
) -> Result<(), SpeechError> {
    for chunk in split_sentences(text) {
        if cancelled.load(Ordering::SeqCst) {
            tracing::debug!("utterance cancelled, abandoning remaining chunks");
            break;
        }

        let bytes = match backend.synthesize(&chunk, spec) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "chunk synthesis failed, continuing");
                continue;
            }
        };
        if bytes.is_empty() {
            continue;
        }

        let source = match Decoder::new(Cursor::new(bytes)) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(error = %e, "chunk decode failed, continuing");
                continue;
            }
        };

        let sink = Sink::try_new(handle).map_err(|e| SpeechError::Playback(e.to_string()))?;
        sink.set_volume(spec.volume);
        sink.set_speed(spec.pitch);
        sink.append(source);

        // Publish the sink so stop() can preempt it, then wait for the
        // chunk outside the lock.
        let sink = Arc::new(sink);
        if let Ok(mut guard) = current.lock() {
            *guard = Some(Arc::clone(&sink));
        }
        sink.sleep_until_end();
    }

    if let Ok(mut guard) = current.lock() {
        *guard = None;
    }
    Ok(())
}

/// Synthesis over an OpenAI-compatible `/audio/speech` endpoint.
pub struct HttpTts {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct SpeechRequestBody<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
}

impl HttpTts {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

impl TtsBackend for HttpTts {
    fn synthesize(&self, text: &str, spec: &VoiceSpec) -> Result<Vec<u8>, SpeechError> {
        let voice = spec.voice.as_deref().unwrap_or("alloy");
        let body = SpeechRequestBody {
            model: &self.model,
            input: text,
            voice,
            speed: spec.rate,
        };

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpeechError::Tts(format!("status {status}")));
        }

        let bytes = response.bytes().map_err(SpeechError::Transport)?;
        Ok(bytes.to_vec())
    }

    /// The endpoint's published voice set with coarse labels.
    fn voices(&self) -> Vec<VoiceInfo> {
        let voice = |name: &str, label: &str| VoiceInfo {
            name: name.to_string(),
            lang: "en-US".to_string(),
            label: label.to_string(),
        };
        vec![
            voice("alloy", ""),
            voice("echo", "male"),
            voice("fable", ""),
            voice("onyx", "male"),
            voice("nova", "female"),
            voice("shimmer", "female"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sentences_basic() {
        let chunks = split_sentences("Hello there. How are you? Great!");
        assert_eq!(chunks, vec!["Hello there.", "How are you?", "Great!"]);
    }

    #[test]
    fn test_split_sentences_no_terminator() {
        let chunks = split_sentences("no punctuation at all");
        assert_eq!(chunks, vec!["no punctuation at all"]);
    }

    #[test]
    fn test_split_sentences_terminator_runs() {
        let chunks = split_sentences("Wow!! Really?!");
        assert_eq!(chunks, vec!["Wow!!", "Really?!"]);
    }

    #[test]
    fn test_split_sentences_trailing_fragment() {
        let chunks = split_sentences("First. and then some");
        assert_eq!(chunks, vec!["First.", "and then some"]);
    }

    #[test]
    fn test_split_sentences_empty() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn test_split_sentences_covers_all_text() {
        let text = "One. Two! Three? Four";
        let joined = split_sentences(text).join(" ");
        assert_eq!(joined, text);
    }

    fn voice(name: &str, lang: &str, label: &str) -> VoiceInfo {
        VoiceInfo {
            name: name.to_string(),
            lang: lang.to_string(),
            label: label.to_string(),
        }
    }

    #[test]
    fn test_pick_voice_prefers_english_female() {
        let voices = vec![
            voice("hans", "de-DE", "male"),
            voice("amy", "en-GB", "female"),
            voice("joan", "en-US", "female"),
        ];
        assert_eq!(pick_voice(&voices).unwrap().name, "amy");
    }

    #[test]
    fn test_pick_voice_requires_both_tags() {
        let voices = vec![
            voice("amy", "fr-FR", "female"),
            voice("bob", "en-US", "male"),
        ];
        assert!(pick_voice(&voices).is_none());
    }

    #[test]
    fn test_pick_voice_underscore_lang_tag() {
        let voices = vec![voice("amy", "en_GB", "female")];
        assert!(pick_voice(&voices).is_some());
    }

    #[test]
    fn test_pick_voice_empty() {
        assert!(pick_voice(&[]).is_none());
    }

    #[test]
    fn test_default_voice_spec() {
        let spec = VoiceSpec::default();
        assert!((spec.rate - 0.8).abs() < f32::EPSILON);
        assert!((spec.pitch - 1.0).abs() < f32::EPSILON);
        assert!((spec.volume - 0.8).abs() < f32::EPSILON);
        assert!(spec.voice.is_none());
    }
}
