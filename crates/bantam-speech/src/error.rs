use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("no input device available")]
    NoInputDevice,
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("no speech detected")]
    NoSpeech,
    #[error("transcription failed: {0}")]
    Stt(String),
    #[error("synthesis failed: {0}")]
    Tts(String),
    #[error("playback error: {0}")]
    Playback(String),
    #[error("speech thread exited")]
    ChannelClosed,
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}
