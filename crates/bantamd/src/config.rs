use anyhow::Context;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path; None scans for a user-facing device.
    pub camera_device: Option<String>,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Base URL of the generation API (chat, images, speech).
    pub api_base_url: String,
    /// Bearer key for the generation API.
    pub api_key: String,
    pub chat_model: String,
    pub image_model: String,
    pub tts_model: String,
    pub stt_model: String,
    /// Hand model load attempts before the tracking subsystem fails.
    pub hand_load_attempts: usize,
    /// Backoff between hand model load attempts.
    pub hand_load_backoff: Duration,
}

impl Config {
    /// Load configuration from `BANTAM_*` environment variables.
    ///
    /// Everything has a default except the API key.
    pub fn from_env() -> anyhow::Result<Self> {
        let model_dir = std::env::var("BANTAM_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| bantam_core::default_model_dir());

        let api_key = std::env::var("BANTAM_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .context("BANTAM_API_KEY (or OPENAI_API_KEY) is required")?;

        Ok(Self {
            camera_device: std::env::var("BANTAM_CAMERA_DEVICE").ok(),
            model_dir,
            api_base_url: std::env::var("BANTAM_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key,
            chat_model: env_string("BANTAM_CHAT_MODEL", "gpt-4o-mini"),
            image_model: env_string("BANTAM_IMAGE_MODEL", "dall-e-3"),
            tts_model: env_string("BANTAM_TTS_MODEL", "tts-1"),
            stt_model: env_string("BANTAM_STT_MODEL", "whisper-1"),
            hand_load_attempts: env_usize("BANTAM_HAND_LOAD_ATTEMPTS", 3),
            hand_load_backoff: Duration::from_millis(env_u64("BANTAM_HAND_LOAD_BACKOFF_MS", 500)),
        })
    }

    /// Path to the person detection model.
    pub fn person_model_path(&self) -> String {
        self.model_dir
            .join("ssd_mobilenet_v1.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the hand landmark model.
    pub fn hand_model_path(&self) -> String {
        self.model_dir
            .join("hand_landmark_full.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
