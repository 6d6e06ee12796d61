//! bantam-speech — Speech input and output.
//!
//! Input is single-utterance: one call captures one utterance from the
//! microphone (energy-based endpointing) and transcribes it over an
//! HTTP backend. Output is sentence-chunked synthesis played through an
//! exclusive audio sink; starting new speech stops anything pending.

pub mod error;
pub mod recognizer;
pub mod synthesizer;

pub use error::SpeechError;
pub use recognizer::{HttpStt, Recognizer, SttBackend};
pub use synthesizer::{
    pick_voice, split_sentences, HttpTts, SpeechHandle, TtsBackend, VoiceInfo, VoiceSpec,
};
