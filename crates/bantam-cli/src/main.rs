use anyhow::{Context, Result};
use bantam_content::ContentClient;
use bantam_hw::Camera;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bantam", about = "Bantam avatar assistant CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available capture devices
    Devices,
    /// Run camera diagnostics: open, capture one frame, report
    Test {
        /// Device path (e.g., /dev/video0); scans when omitted
        #[arg(short, long)]
        device: Option<String>,
    },
    /// One-shot topic query: overview plus three concepts
    Ask {
        /// Topic to explore
        topic: String,
    },
    /// Generate a longer exploration of an interest
    Explore {
        /// Interest to explore
        interest: String,
        /// Desired reading time in minutes
        #[arg(short, long, default_value_t = 1)]
        minutes: usize,
        /// Also list the named entities in the result
        #[arg(long)]
        entities: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("no capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
        Commands::Test { device } => {
            let camera = Camera::open_preferred(device.as_deref())?;
            println!(
                "opened {} at {}x{}",
                camera.device_path, camera.width, camera.height
            );
            let frame = camera.capture_frame()?;
            println!(
                "captured frame seq={} avg brightness={:.1}",
                frame.sequence,
                frame.avg_brightness()
            );
        }
        Commands::Ask { topic } => {
            let client = content_client()?;
            let overview = client.generate_overview(&topic).await;
            println!("{overview}\n");

            let concepts = client.concepts_with_illustrations(&topic).await?;
            for (i, concept) in concepts.iter().enumerate() {
                println!("{}. {}", i + 1, concept.name);
                println!("   {}", concept.explanation);
                match &concept.illustration {
                    Some(url) => println!("   illustration: {url}"),
                    None => println!("   (no illustration)"),
                }
            }
        }
        Commands::Explore {
            interest,
            minutes,
            entities,
        } => {
            let client = content_client()?;
            let exploration = client.generate_exploration(&interest, minutes).await?;
            println!("{exploration}");

            if entities {
                println!();
                for entity in client.extract_entities(&exploration).await? {
                    println!("- {} [{}]: {}", entity.name, entity.category, entity.description);
                }
            }
        }
    }

    Ok(())
}

fn content_client() -> Result<ContentClient> {
    let base_url = std::env::var("BANTAM_API_BASE_URL")
        .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
    let api_key = std::env::var("BANTAM_API_KEY")
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .context("BANTAM_API_KEY (or OPENAI_API_KEY) is required")?;
    let chat_model =
        std::env::var("BANTAM_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
    let image_model =
        std::env::var("BANTAM_IMAGE_MODEL").unwrap_or_else(|_| "dall-e-3".to_string());

    Ok(ContentClient::new(
        &base_url, &api_key, &chat_model, &image_model,
    ))
}
