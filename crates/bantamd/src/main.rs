use anyhow::Result;
use bantam_content::ContentClient;
use bantam_speech::{HttpStt, HttpTts, Recognizer, SpeechHandle};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod character;
mod config;
mod engine;
mod orchestrator;
mod ui;

use character::character_channel;
use config::Config;
use orchestrator::{BlockingListener, Orchestrator};
use ui::ui_channel;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("bantamd starting");
    let config = Config::from_env()?;

    let (character, character_view) = character_channel();
    let (ui, ui_rx) = ui_channel();

    // The scene bridge and front-end attach to these streams; until they
    // do, drain and log so the daemon runs headless.
    tokio::spawn(drain_scene(character_view));
    tokio::spawn(drain_ui(ui_rx));

    let tracking = engine::spawn_tracking(
        engine::TrackingConfig {
            camera_device: config.camera_device.clone(),
            person_model: config.person_model_path(),
            hand_model: config.hand_model_path(),
            hand_load_attempts: config.hand_load_attempts,
            hand_load_backoff: config.hand_load_backoff,
        },
        character,
        ui.clone(),
    );

    let content = ContentClient::new(
        &config.api_base_url,
        &config.api_key,
        &config.chat_model,
        &config.image_model,
    );
    let speech = SpeechHandle::spawn(Box::new(HttpTts::new(
        &config.api_base_url,
        &config.api_key,
        &config.tts_model,
    )))?;
    let recognizer = Arc::new(Recognizer::new(Box::new(HttpStt::new(
        &config.api_base_url,
        &config.api_key,
        &config.stt_model,
    ))));
    let listener = BlockingListener::new(recognizer);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let mut orch = Orchestrator::new(content, speech, listener, ui);
    orch.greet().await;
    orch.run(&mut shutdown_rx).await;

    tracking.stop();
    tracing::info!("bantamd shut down");

    Ok(())
}

/// Log scene traffic until a renderer attaches.
async fn drain_scene(mut view: character::CharacterView) {
    loop {
        tokio::select! {
            changed = view.orientation.changed() => {
                if changed.is_err() {
                    break;
                }
                let o = *view.orientation.borrow();
                tracing::trace!(yaw = o.yaw, pitch = o.pitch, "orientation");
            }
            event = view.events.recv() => {
                match event {
                    Some(event) => tracing::debug!(?event, "scene event"),
                    None => break,
                }
            }
        }
    }
}

/// Log UI events until a front-end attaches.
async fn drain_ui(mut rx: tokio::sync::mpsc::UnboundedReceiver<ui::UiEvent>) {
    while let Some(event) = rx.recv().await {
        tracing::debug!(?event, "ui event");
    }
}
