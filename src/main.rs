use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use voice_gateway::{
    create_router, AppState, AsrWorker, Config, Gateway, MemoryBus, MessageBus, NatsBus,
    StubRecognizer, StubSynthesizer, TtsWorker,
};
use voice_gateway::workers::start_local;

#[derive(Parser)]
#[command(name = "voice-gateway")]
#[command(about = "Real-time voice gateway and its pipeline workers")]
struct Cli {
    /// Configuration file (any format the config loader understands)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway and its HTTP API
    Serve,
    /// Consume session audio and publish transcripts
    AsrWorker,
    /// Consume final transcripts and publish synthesized audio
    TtsWorker,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let cfg = Config::load(cli.config.as_deref())?;

    info!("Voice Gateway v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::AsrWorker => run_asr_worker(cfg).await,
        Command::TtsWorker => run_tts_worker(cfg).await,
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let frame_duration = Duration::from_millis(cfg.audio.frame_duration_ms);
    let (bus, local_workers) = if cfg.nats.enabled {
        let bus: Arc<dyn MessageBus> =
            Arc::new(NatsBus::connect(&cfg.nats.url, cfg.subjects(), cfg.bus_max_age()).await?);
        (bus, Vec::new())
    } else {
        warn!("NATS disabled, running the stub workers in-process");
        let bus: Arc<dyn MessageBus> = Arc::new(MemoryBus::new(cfg.subjects(), cfg.bus_max_age()));
        let workers = start_local(Arc::clone(&bus), cfg.audio.sample_rate, frame_duration).await?;
        (bus, workers)
    };

    info!("ICE servers: {:?}", cfg.ice_servers());
    info!(
        "Media UDP ports: {}-{}",
        cfg.webrtc.udp_port_min, cfg.webrtc.udp_port_max
    );
    info!(
        "Services: asr={} tts={} llm={}",
        cfg.services.asr_url, cfg.services.tts_url, cfg.services.llm_url
    );

    let gateway = Arc::new(Gateway::new(cfg.gateway(), Some(bus)));
    let app = create_router(AppState::new(Arc::clone(&gateway)));

    let addr = cfg.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    gateway.shutdown().await;
    for mut subscription in local_workers {
        subscription.cancel();
    }
    info!("Server shutdown complete");

    Ok(())
}

async fn connect_bus(cfg: &Config) -> Result<Arc<NatsBus>> {
    if !cfg.nats.enabled {
        anyhow::bail!("Workers require NATS; set nats.enabled = true");
    }
    let bus = NatsBus::connect(&cfg.nats.url, cfg.subjects(), cfg.bus_max_age()).await?;
    Ok(Arc::new(bus))
}

async fn run_asr_worker(cfg: Config) -> Result<()> {
    let bus = connect_bus(&cfg).await?;
    info!("Recognition service: {}", cfg.services.asr_url);

    let worker = AsrWorker::new(bus.clone(), Arc::new(StubRecognizer::default()));
    let mut subscription = worker.start().await?;

    shutdown_signal().await;

    subscription.cancel();
    bus.close().await?;
    info!("ASR worker stopped");

    Ok(())
}

async fn run_tts_worker(cfg: Config) -> Result<()> {
    let bus = connect_bus(&cfg).await?;
    info!("Synthesis service: {}", cfg.services.tts_url);

    let synthesizer = StubSynthesizer::new(
        cfg.audio.sample_rate,
        Duration::from_millis(cfg.audio.frame_duration_ms),
    );
    let worker = TtsWorker::new(bus.clone(), Arc::new(synthesizer));
    let mut subscription = worker.start().await?;

    shutdown_signal().await;

    subscription.cancel();
    bus.close().await?;
    info!("TTS worker stopped");

    Ok(())
}

/// Wait for Ctrl+C
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
    }
}
