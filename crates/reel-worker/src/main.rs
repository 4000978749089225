//! Worker binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reel_client::FileServerClient;
use reel_media::{detect_encoder, FfmpegRunner};
use reel_queue::QueueConfig;
use reel_storage::StorageConfig;
use reel_worker::config::hostname;
use reel_worker::services::{HttpTtsEngine, ImageChain, NoopNotifier, Notifier, TelegramNotifier, WhisperCli};
use reel_worker::{
    detect_gpu, pipelines, BackendMode, LocalBackend, MediaSettings, PipelineDeps, QueueBackend, RemoteBackend,
    WorkerConfig, WorkerRuntime,
};

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,reel=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn connect_backend(config: &WorkerConfig) -> anyhow::Result<Arc<dyn QueueBackend>> {
    Ok(match config.backend {
        BackendMode::Remote => {
            let client = FileServerClient::from_env().context("invalid file server client configuration")?;
            Arc::new(RemoteBackend::new(client))
        }
        BackendMode::Local => {
            let queue_config = QueueConfig::from_env();
            let backend = LocalBackend::open(&queue_config)
                .await
                .with_context(|| format!("cannot open data directory {}", queue_config.data_dir.display()))?;
            Arc::new(backend)
        }
    })
}

async fn build_deps(config: &WorkerConfig, backend: Arc<dyn QueueBackend>) -> anyhow::Result<PipelineDeps> {
    let mut transcriber = WhisperCli::new(&config.stt_command, &config.stt_model);
    if let Some(language) = &config.stt_language {
        transcriber = transcriber.with_language(language);
    }

    let uploader = StorageConfig::from_env()
        .and_then(|c| c.build())
        .context("invalid upload backend configuration")?;

    Ok(PipelineDeps {
        backend,
        tts: Arc::new(HttpTtsEngine::new(&config.tts_url, config.tts_chunk_size)?),
        transcriber: Arc::new(transcriber),
        images: Arc::new(ImageChain::from_config(config)?),
        uploader: Arc::new(uploader),
        media: MediaSettings {
            runner: FfmpegRunner::new().with_timeout(config.render_timeout.as_secs()),
            encoder: detect_encoder().await,
        },
        http: reqwest::Client::new(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // TLS for reqwest and the S3 client
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("rustls crypto provider was already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::from_env().context("invalid worker configuration")?;
    info!(
        kind = config.kind.as_str(),
        worker_id = %config.worker_id,
        "Starting reel-worker"
    );

    let backend = connect_backend(&config).await?;
    let deps = build_deps(&config, Arc::clone(&backend)).await?;
    let pipeline = pipelines::for_config(&config, deps);

    let notifier: Arc<dyn Notifier> = match TelegramNotifier::from_env() {
        Some(telegram) => Arc::new(telegram),
        None => {
            info!("Telegram not configured, notifications disabled");
            Arc::new(NoopNotifier)
        }
    };

    let runtime = WorkerRuntime::new(&config, backend, pipeline, notifier).with_host(hostname(), detect_gpu().await);

    let shutdown = runtime.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal, finishing current job"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        let _ = shutdown.send(true);
    });

    runtime.run().await?;
    info!("Worker shutdown complete");
    Ok(())
}
