use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::bus::SubjectScheme;
use crate::gateway::{ConsumerSet, GatewayConfig};
use crate::session::PipelineConfig;

/// Environment variable prefix, e.g. `VOICE_GATEWAY__NATS__URL`
pub const ENV_PREFIX: &str = "VOICE_GATEWAY";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub webrtc: WebRtcConfig,
    pub nats: NatsConfig,
    pub services: ServicesConfig,
    pub audio: AudioConfig,
    pub consumers: ConsumerSet,
    pub recording: RecordingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Settings handed to the external media engine
#[derive(Debug, Clone, Deserialize)]
pub struct WebRtcConfig {
    pub stun_server: String,
    pub udp_port_min: u16,
    pub udp_port_max: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// Use NATS JetStream; otherwise an in-process bus is used
    pub enabled: bool,
    pub url: String,
    pub subject_prefix: String,
    pub max_age_secs: u64,
}

/// Addresses of the recognition, synthesis and assistant services
#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    pub asr_url: String,
    pub tts_url: String,
    pub llm_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub frame_duration_ms: u64,
    pub vad_threshold: f64,
    pub min_silence_ms: u64,
    pub consumer_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingConfig {
    pub path: String,
}

impl Config {
    /// Load defaults, then the optional file, then the environment
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("server.host", "localhost")?
            .set_default("server.port", 8080i64)?
            .set_default("webrtc.stun_server", "stun:stun.l.google.com:19302")?
            .set_default("webrtc.udp_port_min", 10000i64)?
            .set_default("webrtc.udp_port_max", 20000i64)?
            .set_default("nats.enabled", true)?
            .set_default("nats.url", "nats://localhost:4222")?
            .set_default("nats.subject_prefix", "voice")?
            .set_default("nats.max_age_secs", 3600i64)?
            .set_default("services.asr_url", "localhost:50051")?
            .set_default("services.tts_url", "localhost:50052")?
            .set_default("services.llm_url", "")?
            .set_default("audio.sample_rate", 16000i64)?
            .set_default("audio.frame_duration_ms", 20i64)?
            .set_default("audio.vad_threshold", 0.02f64)?
            .set_default("audio.min_silence_ms", 300i64)?
            .set_default("audio.consumer_capacity", 100i64)?
            .set_default("consumers.record", true)?
            .set_default("consumers.publish", true)?
            .set_default("consumers.echo", true)?
            .set_default("recording.path", "recordings")?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?;

        let cfg: Self = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        cfg.validate()?;

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.audio.frame_duration_ms, 20 | 40) {
            anyhow::bail!(
                "audio.frame_duration_ms must be 20 or 40, got {}",
                self.audio.frame_duration_ms
            );
        }
        if self.audio.sample_rate == 0 {
            anyhow::bail!("audio.sample_rate must be positive");
        }
        if !(self.audio.vad_threshold > 0.0 && self.audio.vad_threshold < 1.0) {
            anyhow::bail!(
                "audio.vad_threshold must be between 0 and 1, got {}",
                self.audio.vad_threshold
            );
        }
        if self.audio.consumer_capacity == 0 {
            anyhow::bail!("audio.consumer_capacity must be positive");
        }
        if self.webrtc.udp_port_min > self.webrtc.udp_port_max {
            anyhow::bail!(
                "webrtc.udp_port_min ({}) exceeds webrtc.udp_port_max ({})",
                self.webrtc.udp_port_min,
                self.webrtc.udp_port_max
            );
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn ice_servers(&self) -> Vec<String> {
        vec![self.webrtc.stun_server.clone()]
    }

    pub fn subjects(&self) -> SubjectScheme {
        SubjectScheme::new(self.nats.subject_prefix.clone())
    }

    pub fn bus_max_age(&self) -> Duration {
        Duration::from_secs(self.nats.max_age_secs)
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            sample_rate: self.audio.sample_rate,
            frame_duration: Duration::from_millis(self.audio.frame_duration_ms),
            vad_threshold: self.audio.vad_threshold,
            min_silence: Duration::from_millis(self.audio.min_silence_ms),
            consumer_capacity: self.audio.consumer_capacity,
        }
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            pipeline: self.pipeline(),
            consumers: self.consumers,
            recordings_dir: PathBuf::from(&self.recording.path),
        }
    }
}
