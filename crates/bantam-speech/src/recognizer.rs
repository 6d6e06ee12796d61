//! Single-utterance speech recognition.
//!
//! Captures mono 16 kHz audio from the default input device, trims it to
//! one utterance with energy-based endpointing, and sends 16-bit WAV to
//! a transcription backend. One call, one final transcript or an error.

use crate::error::SpeechError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc;
use std::time::{Duration, Instant};

const SAMPLE_RATE: u32 = 16_000;

/// Backend for converting one utterance of WAV audio into text.
pub trait SttBackend: Send + Sync {
    fn transcribe(&self, wav: &[u8]) -> Result<String, SpeechError>;
}

/// Endpointing parameters for one capture.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// RMS level above which a frame counts as speech.
    pub activation_rms: f32,
    /// Silence needed after speech before the utterance is committed.
    pub silence_hold: Duration,
    /// Shorter utterances are discarded as noise.
    pub min_speech: Duration,
    /// Hard cap on one utterance.
    pub max_utterance: Duration,
    /// Give up waiting for speech to start after this long.
    pub listen_timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            activation_rms: 0.01,
            silence_hold: Duration::from_millis(800),
            min_speech: Duration::from_millis(200),
            max_utterance: Duration::from_secs(30),
            listen_timeout: Duration::from_secs(8),
        }
    }
}

/// Single-utterance recognizer over a transcription backend.
pub struct Recognizer {
    backend: Box<dyn SttBackend>,
    config: EndpointConfig,
}

impl Recognizer {
    pub fn new(backend: Box<dyn SttBackend>) -> Self {
        Self {
            backend,
            config: EndpointConfig::default(),
        }
    }

    pub fn with_config(backend: Box<dyn SttBackend>, config: EndpointConfig) -> Self {
        Self { backend, config }
    }

    /// Capture one utterance and return its transcript.
    ///
    /// Blocks for the duration of the capture; run it on a blocking
    /// task. The input stream is created and dropped inside the call, so
    /// the device is released before transcription starts.
    pub fn recognize_once(&self) -> Result<String, SpeechError> {
        let samples = self.capture_utterance()?;

        let speech_len = Duration::from_secs_f32(samples.len() as f32 / SAMPLE_RATE as f32);
        tracing::debug!(samples = samples.len(), ?speech_len, "utterance captured");

        let wav = pcm_to_wav(&samples, SAMPLE_RATE);
        let transcript = self.backend.transcribe(&wav)?;
        let transcript = transcript.trim().to_string();

        if transcript.is_empty() {
            return Err(SpeechError::NoSpeech);
        }
        Ok(transcript)
    }

    fn capture_utterance(&self) -> Result<Vec<f32>, SpeechError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(SpeechError::NoInputDevice)?;

        let stream_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let (tx, rx) = mpsc::channel::<Vec<f32>>();
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _| {
                    // Capture callback must not block; drop frames if the
                    // consumer is gone.
                    let _ = tx.send(data.to_vec());
                },
                |e| tracing::warn!(error = %e, "input stream error"),
                None,
            )
            .map_err(|e| SpeechError::Stream(e.to_string()))?;
        stream
            .play()
            .map_err(|e| SpeechError::Stream(e.to_string()))?;

        let mut endpointer = Endpointer::new(self.config.clone(), SAMPLE_RATE);
        let started = Instant::now();

        loop {
            let frame = rx
                .recv_timeout(Duration::from_secs(1))
                .map_err(|_| SpeechError::Stream("input stream stalled".to_string()))?;

            match endpointer.feed(&frame) {
                Feed::Continue => {}
                Feed::Utterance(samples) => return Ok(samples),
                Feed::NoSpeech => return Err(SpeechError::NoSpeech),
            }

            // Failsafe beyond the endpointer's own limits.
            if started.elapsed() > self.config.listen_timeout + self.config.max_utterance {
                return Err(SpeechError::NoSpeech);
            }
        }
    }
}

enum Feed {
    Continue,
    Utterance(Vec<f32>),
    NoSpeech,
}

/// Energy-based endpointer: waits for a frame above the activation
/// threshold, records until the silence hold expires, then commits.
struct Endpointer {
    config: EndpointConfig,
    sample_rate: u32,
    speaking: bool,
    samples: Vec<f32>,
    waited: Duration,
    silence: Duration,
}

impl Endpointer {
    fn new(config: EndpointConfig, sample_rate: u32) -> Self {
        Self {
            config,
            sample_rate,
            speaking: false,
            samples: Vec::new(),
            waited: Duration::ZERO,
            silence: Duration::ZERO,
        }
    }

    fn frame_len(&self, frame: &[f32]) -> Duration {
        Duration::from_secs_f32(frame.len() as f32 / self.sample_rate as f32)
    }

    fn speech_len(&self) -> Duration {
        Duration::from_secs_f32(self.samples.len() as f32 / self.sample_rate as f32)
    }

    fn feed(&mut self, frame: &[f32]) -> Feed {
        let len = self.frame_len(frame);
        let loud = rms(frame) >= self.config.activation_rms;

        if !self.speaking {
            if loud {
                self.speaking = true;
                self.samples.extend_from_slice(frame);
            } else {
                self.waited += len;
                if self.waited >= self.config.listen_timeout {
                    return Feed::NoSpeech;
                }
            }
            return Feed::Continue;
        }

        self.samples.extend_from_slice(frame);

        if loud {
            self.silence = Duration::ZERO;
        } else {
            self.silence += len;
        }

        let committed =
            self.silence >= self.config.silence_hold || self.speech_len() >= self.config.max_utterance;
        if !committed {
            return Feed::Continue;
        }

        if self.speech_len().saturating_sub(self.silence) < self.config.min_speech {
            return Feed::NoSpeech;
        }
        Feed::Utterance(std::mem::take(&mut self.samples))
    }
}

/// Root-mean-square level of a PCM frame.
fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = frame.iter().map(|s| s * s).sum();
    (sum_sq / frame.len() as f32).sqrt()
}

/// Encode mono f32 PCM as 16-bit little-endian WAV.
pub fn pcm_to_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut buf = Vec::with_capacity(44 + data_len as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_len).to_le_bytes());
    buf.extend_from_slice(b"WAVE");
    // fmt subchunk: PCM, mono, 16-bit
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    buf.extend_from_slice(&2u16.to_le_bytes());
    buf.extend_from_slice(&16u16.to_le_bytes());
    // data subchunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for &s in samples {
        let i = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        buf.extend_from_slice(&i.to_le_bytes());
    }

    buf
}

/// Transcription over an OpenAI-compatible `/audio/transcriptions`
/// endpoint (multipart WAV upload).
pub struct HttpStt {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpStt {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl SttBackend for HttpStt {
    fn transcribe(&self, wav: &[u8]) -> Result<String, SpeechError> {
        let part = reqwest::blocking::multipart::Part::bytes(wav.to_vec())
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| SpeechError::Stt(e.to_string()))?;
        let form = reqwest::blocking::multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", part);

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpeechError::Stt(format!("status {status}")));
        }

        let parsed: TranscriptionResponse =
            response.json().map_err(|e| SpeechError::Stt(e.to_string()))?;
        Ok(parsed.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loud_frame(n: usize) -> Vec<f32> {
        vec![0.5; n]
    }

    fn quiet_frame(n: usize) -> Vec<f32> {
        vec![0.0; n]
    }

    fn config() -> EndpointConfig {
        EndpointConfig {
            activation_rms: 0.01,
            silence_hold: Duration::from_millis(800),
            min_speech: Duration::from_millis(200),
            max_utterance: Duration::from_secs(30),
            listen_timeout: Duration::from_secs(8),
        }
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[0.5, -0.5]) - 0.5).abs() < 1e-6);
        assert!(rms(&quiet_frame(100)) < 1e-6);
    }

    #[test]
    fn test_endpointer_commits_after_silence_hold() {
        let mut ep = Endpointer::new(config(), 16_000);
        // 400 ms of speech
        assert!(matches!(ep.feed(&loud_frame(6400)), Feed::Continue));
        // 400 ms of silence: hold not reached yet
        assert!(matches!(ep.feed(&quiet_frame(6400)), Feed::Continue));
        // another 400 ms of silence crosses the 800 ms hold
        match ep.feed(&quiet_frame(6400)) {
            Feed::Utterance(samples) => {
                // speech + trailing silence are all captured
                assert_eq!(samples.len(), 6400 * 3);
            }
            _ => panic!("expected utterance"),
        }
    }

    #[test]
    fn test_endpointer_too_short_is_no_speech() {
        let mut ep = Endpointer::new(config(), 16_000);
        // 100 ms blip, under the 200 ms minimum
        assert!(matches!(ep.feed(&loud_frame(1600)), Feed::Continue));
        assert!(matches!(ep.feed(&quiet_frame(6400)), Feed::Continue));
        assert!(matches!(ep.feed(&quiet_frame(6400)), Feed::NoSpeech));
    }

    #[test]
    fn test_endpointer_listen_timeout() {
        let mut ep = Endpointer::new(config(), 16_000);
        // 8 s of silence, one second at a time
        for _ in 0..7 {
            assert!(matches!(ep.feed(&quiet_frame(16_000)), Feed::Continue));
        }
        assert!(matches!(ep.feed(&quiet_frame(16_000)), Feed::NoSpeech));
    }

    #[test]
    fn test_endpointer_speech_resets_silence() {
        let mut ep = Endpointer::new(config(), 16_000);
        assert!(matches!(ep.feed(&loud_frame(6400)), Feed::Continue));
        assert!(matches!(ep.feed(&quiet_frame(6400)), Feed::Continue));
        // Speech resumes: silence counter resets
        assert!(matches!(ep.feed(&loud_frame(6400)), Feed::Continue));
        assert!(matches!(ep.feed(&quiet_frame(6400)), Feed::Continue));
        assert!(matches!(ep.feed(&quiet_frame(6400)), Feed::Utterance(_)));
    }

    #[test]
    fn test_pcm_to_wav_header() {
        let wav = pcm_to_wav(&[0.0, 0.5, -0.5], 16_000);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + 6);
        // sample rate field
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 16_000);
        // 0.5 * 32767 = 16383.5 rounds away from zero
        let s1 = i16::from_le_bytes([wav[46], wav[47]]);
        assert_eq!(s1, 16384);
    }

    #[test]
    fn test_pcm_to_wav_clamps() {
        let wav = pcm_to_wav(&[2.0, -2.0], 16_000);
        let hi = i16::from_le_bytes([wav[44], wav[45]]);
        let lo = i16::from_le_bytes([wav[46], wav[47]]);
        assert_eq!(hi, 32767);
        assert_eq!(lo, -32767);
    }
}
