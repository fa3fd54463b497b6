// Integration tests for layered configuration loading

use anyhow::Result;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use voice_gateway::bus::StreamCategory;
use voice_gateway::Config;

fn write_config(dir: &TempDir, contents: &str) -> Result<String> {
    let path = dir.path().join("gateway.toml");
    fs::write(&path, contents)?;
    Ok(path.to_string_lossy().into_owned())
}

#[test]
fn test_defaults_without_file() -> Result<()> {
    let cfg = Config::load(None)?;

    assert_eq!(cfg.server.host, "localhost");
    assert_eq!(cfg.audio.sample_rate, 16000);
    assert_eq!(cfg.audio.frame_duration_ms, 20);
    assert_eq!(cfg.audio.consumer_capacity, 100);
    assert_eq!(cfg.nats.subject_prefix, "voice");
    assert_eq!(cfg.ice_servers(), vec!["stun:stun.l.google.com:19302"]);
    assert!(cfg.consumers.record && cfg.consumers.publish && cfg.consumers.echo);

    let pipeline = cfg.pipeline();
    assert_eq!(pipeline.frame_duration, Duration::from_millis(20));
    assert_eq!(pipeline.min_silence, Duration::from_millis(300));
    assert!((pipeline.vad_threshold - 0.02).abs() < f64::EPSILON);

    Ok(())
}

#[test]
fn test_file_overrides_defaults() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(
        &dir,
        r#"
[audio]
frame_duration_ms = 40
consumer_capacity = 8

[nats]
enabled = false
subject_prefix = "calls"

[consumers]
record = false
"#,
    )?;

    let cfg = Config::load(Some(path.as_str()))?;

    assert_eq!(cfg.audio.frame_duration_ms, 40);
    assert_eq!(cfg.audio.consumer_capacity, 8);
    assert!(!cfg.nats.enabled);
    assert!(!cfg.consumers.record);
    assert!(cfg.consumers.publish);

    // Untouched keys keep their defaults
    assert_eq!(cfg.audio.sample_rate, 16000);
    assert_eq!(cfg.nats.url, "nats://localhost:4222");

    let subject = cfg.subjects().subject(StreamCategory::Audio, "abc");
    assert_eq!(subject, "calls.audio.abc");

    Ok(())
}

#[test]
fn test_environment_overrides_file() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(&dir, "[server]\nport = 7000\n")?;

    std::env::set_var("VOICE_GATEWAY__SERVER__PORT", "9123");
    let loaded = Config::load(Some(path.as_str()));
    std::env::remove_var("VOICE_GATEWAY__SERVER__PORT");

    let cfg = loaded?;
    assert_eq!(cfg.server.port, 9123);
    assert_eq!(cfg.bind_addr(), "localhost:9123");

    Ok(())
}

#[test]
fn test_invalid_frame_duration_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(&dir, "[audio]\nframe_duration_ms = 30\n")?;

    let err = Config::load(Some(path.as_str())).unwrap_err();
    assert!(err.to_string().contains("frame_duration_ms"));

    Ok(())
}

#[test]
fn test_invalid_threshold_and_ports_are_rejected() -> Result<()> {
    let dir = TempDir::new()?;

    let path = write_config(&dir, "[audio]\nvad_threshold = 1.5\n")?;
    assert!(Config::load(Some(path.as_str())).is_err());

    let path = write_config(&dir, "[webrtc]\nudp_port_min = 30000\nudp_port_max = 20000\n")?;
    assert!(Config::load(Some(path.as_str())).is_err());

    let path = write_config(&dir, "[audio]\nconsumer_capacity = 0\n")?;
    assert!(Config::load(Some(path.as_str())).is_err());

    Ok(())
}

#[test]
fn test_missing_file_is_an_error() {
    assert!(Config::load(Some("/nonexistent/voice-gateway.toml")).is_err());
}
