//! shu-ismak: local lesson service for spoken Palestinian Arabic.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use shu_ismak::api::{self, AppState};
use shu_ismak::config::Config;
use shu_ismak::gemini::GeminiClient;
use shu_ismak::lessons::LessonGraph;
use shu_ismak::progress::ProgressTracker;
use shu_ismak::speech::{playback, AudioCache, PlaybackSlot, SpeechPipeline};
use shu_ismak::store::{FileStore, KvStore};

#[derive(Parser, Debug)]
#[command(name = "shu-ismak", about = "Lesson progress and pronunciation service")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Lesson graph YAML (overrides config)
    #[arg(short, long)]
    lessons: Option<PathBuf>,

    /// API port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Run without an audio device
    #[arg(long)]
    no_audio: bool,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise keep HTTP internals quiet
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if args.verbose {
            EnvFilter::new("debug,hyper=warn,reqwest=warn")
        } else {
            EnvFilter::new("info,hyper=warn,reqwest=warn")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("shu-ismak starting");

    let mut config = Config::load(args.config.as_deref());
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if args.no_audio {
        config.audio.enabled = false;
    }

    let lessons = match args.lessons.as_ref().or(config.lessons.path.as_ref()) {
        Some(path) => LessonGraph::load(path)
            .with_context(|| format!("loading lesson graph from {}", path.display()))?,
        None => {
            info!("No lesson graph configured, using the built-in sample");
            LessonGraph::sample()
        }
    };
    info!("Lesson graph: {} binyans", lessons.binyans().len());

    let store: Arc<dyn KvStore> = Arc::new(FileStore::new(&config.storage.data_dir));
    let progress = Arc::new(ProgressTracker::open(store.clone()).await);

    let tutor = Arc::new(GeminiClient::new(config.gemini.clone()).context("building HTTP client")?);
    if !tutor.has_credential() {
        warn!(
            "No Gemini API key (env {}); speech and tutor calls will fail until one is set",
            config.gemini.api_key_env
        );
    }

    let output = playback::default_output(config.audio.enabled);
    let speech = Arc::new(SpeechPipeline::new(
        AudioCache::new(store.clone(), config.cache.max_bytes),
        tutor.clone(),
        tutor.clone(),
        PlaybackSlot::new(output),
        config.audio.sample_rate,
    ));

    let state = AppState {
        lessons: Arc::new(lessons),
        progress,
        speech: speech.clone(),
        tutor,
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
        info!("Shutting down");
    };

    api::serve(state, &config.api.host, config.api.port, shutdown)
        .await
        .with_context(|| format!("serving on {}:{}", config.api.host, config.api.port))?;

    speech.stop();
    Ok(())
}
