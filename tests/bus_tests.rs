// Integration tests for the message bus contract, wire messages, and the
// recognition and synthesis workers

use anyhow::Result;
use base64::Engine;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use voice_gateway::audio::AudioFrame;
use voice_gateway::bus::{
    publish_json, AudioFrameMessage, BusMessage, MemoryBus, MessageBus, MessageHandler,
    StreamCategory, SubjectScheme, TranscriptMessage,
};
use voice_gateway::workers::{AsrWorker, StubRecognizer, StubSynthesizer, TtsWorker};

/// Forwards every message to a channel
struct Collector {
    tx: mpsc::UnboundedSender<BusMessage>,
}

#[async_trait::async_trait]
impl MessageHandler for Collector {
    async fn handle(&self, message: BusMessage) -> Result<()> {
        let _ = self.tx.send(message);
        Ok(())
    }
}

/// Fails the first `failures` deliveries, then forwards
struct Flaky {
    failures: u32,
    calls: AtomicU32,
    tx: mpsc::UnboundedSender<BusMessage>,
}

#[async_trait::async_trait]
impl MessageHandler for Flaky {
    async fn handle(&self, message: BusMessage) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            anyhow::bail!("transient failure {}", call);
        }
        let _ = self.tx.send(message);
        Ok(())
    }
}

fn collector() -> (Arc<Collector>, mpsc::UnboundedReceiver<BusMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(Collector { tx }), rx)
}

async fn next(rx: &mut mpsc::UnboundedReceiver<BusMessage>) -> BusMessage {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("subscription ended")
}

// ============================================================================
// Wire messages
// ============================================================================

#[test]
fn test_audio_frame_serialization() {
    let msg = AudioFrameMessage {
        session_id: "test-session".to_string(),
        sequence: 0,
        pcm: base64::engine::general_purpose::STANDARD.encode([0u8; 100]),
        sample_rate: 16000,
        channels: 1,
        timestamp: "2025-10-27T14:30:00Z".to_string(),
        final_frame: false,
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("test-session"));
    assert!(json.contains("\"final\":false"));
    assert!(json.contains("\"sequence\":0"));

    let deserialized: AudioFrameMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, msg);
}

#[test]
fn test_audio_frame_message_carries_pcm() {
    let frame = AudioFrame::from_samples(3, 16000, 60, &[1, -1, 1000, -1000]);
    let msg = AudioFrameMessage::from_frame("test-session", &frame);

    assert_eq!(msg.sequence, 3);
    assert!(!msg.final_frame);
    assert_eq!(msg.decode_pcm().unwrap(), frame.pcm);

    let decoded = msg.to_frame().unwrap();
    assert_eq!(decoded.pcm, frame.pcm);
    assert_eq!(decoded.sample_rate, 16000);
}

#[test]
fn test_audio_frame_final_marker() {
    let msg = AudioFrameMessage::final_marker("test-session", 10, 16000);

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"final\":true"));

    let deserialized: AudioFrameMessage = serde_json::from_str(&json).unwrap();
    assert!(deserialized.final_frame);
    assert!(deserialized.pcm.is_empty());
    assert_eq!(deserialized.sequence, 10);
}

#[test]
fn test_invalid_pcm_is_an_error() {
    let mut msg = AudioFrameMessage::final_marker("test-session", 0, 16000);
    msg.pcm = "not base64!".to_string();

    assert!(msg.decode_pcm().is_err());
    assert!(msg.to_frame().is_err());
}

#[test]
fn test_transcript_deserialization() {
    let json = r#"{
        "session_id": "test-session",
        "text": "Hello world",
        "is_final": true,
        "timestamp": "2025-10-27T14:30:05Z",
        "confidence": 0.95
    }"#;

    let msg: TranscriptMessage = serde_json::from_str(json).unwrap();
    assert_eq!(msg.session_id, "test-session");
    assert_eq!(msg.text, "Hello world");
    assert!(msg.is_final);
    assert_eq!(msg.confidence, Some(0.95));
    assert_eq!(msg.timestamp, "2025-10-27T14:30:05Z");
}

#[test]
fn test_transcript_without_confidence() {
    let json = r#"{
        "session_id": "test-session",
        "text": "Partial",
        "is_final": false,
        "timestamp": "2025-10-27T14:30:05Z"
    }"#;

    let msg: TranscriptMessage = serde_json::from_str(json).unwrap();
    assert!(!msg.is_final);
    assert_eq!(msg.confidence, None);
}

// ============================================================================
// In-process bus
// ============================================================================

#[tokio::test]
async fn test_publish_then_subscribe_keeps_message() -> Result<()> {
    let bus = MemoryBus::default();
    let subject = bus.subjects().subject(StreamCategory::Audio, "s1");

    bus.publish(&subject, b"hello".to_vec()).await?;
    assert_eq!(bus.pending(), 1);

    let (handler, mut rx) = collector();
    let _sub = bus
        .subscribe(&bus.subjects().wildcard(StreamCategory::Audio), "test", handler)
        .await?;

    let message = next(&mut rx).await;
    assert_eq!(message.subject, "voice.audio.s1");
    assert_eq!(message.payload, b"hello");
    assert_eq!(message.attempt, 1);
    assert_eq!(bus.pending(), 0);

    Ok(())
}

#[tokio::test]
async fn test_filter_only_receives_its_category() -> Result<()> {
    let bus = MemoryBus::default();
    let (handler, mut rx) = collector();
    let _sub = bus.subscribe("voice.text.>", "test", handler).await?;

    bus.publish("voice.audio.s1", b"audio".to_vec()).await?;
    bus.publish("voice.text.s1", b"text".to_vec()).await?;

    let message = next(&mut rx).await;
    assert_eq!(message.subject, "voice.text.s1");

    // The audio message waits for a matching subscriber
    assert_eq!(bus.pending(), 1);

    Ok(())
}

#[tokio::test]
async fn test_each_message_is_delivered_once() -> Result<()> {
    let bus = MemoryBus::default();
    let (first, mut first_rx) = collector();
    let (second, mut second_rx) = collector();
    let _a = bus.subscribe("voice.audio.>", "workers", first).await?;
    let _b = bus.subscribe("voice.audio.>", "workers", second).await?;

    for i in 0..10u8 {
        bus.publish("voice.audio.s1", vec![i]).await?;
    }

    let mut seen = Vec::new();
    while seen.len() < 10 {
        tokio::select! {
            Some(m) = first_rx.recv() => seen.push(m.payload[0]),
            Some(m) = second_rx.recv() => seen.push(m.payload[0]),
            _ = tokio::time::sleep(Duration::from_secs(2)) => break,
        }
    }

    seen.sort_unstable();
    assert_eq!(seen, (0..10u8).collect::<Vec<_>>());

    // Nothing left over for a second delivery
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(first_rx.try_recv().is_err());
    assert!(second_rx.try_recv().is_err());

    Ok(())
}

#[tokio::test]
async fn test_failed_handler_gets_redelivery() -> Result<()> {
    let bus = MemoryBus::default();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handler = Arc::new(Flaky {
        failures: 2,
        calls: AtomicU32::new(0),
        tx,
    });
    let _sub = bus.subscribe("voice.audio.>", "test", handler.clone()).await?;

    bus.publish("voice.audio.s1", b"retry me".to_vec()).await?;

    let message = next(&mut rx).await;
    assert_eq!(message.payload, b"retry me");
    assert_eq!(message.attempt, 3);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 3);

    Ok(())
}

#[tokio::test]
async fn test_persistent_failure_gives_up() -> Result<()> {
    let bus = MemoryBus::default();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handler = Arc::new(Flaky {
        failures: u32::MAX,
        calls: AtomicU32::new(0),
        tx,
    });
    let _sub = bus.subscribe("voice.audio.>", "test", handler.clone()).await?;

    bus.publish("voice.audio.s1", b"poison".to_vec()).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(
        handler.calls.load(Ordering::SeqCst),
        voice_gateway::bus::memory::MAX_DELIVER
    );
    assert!(rx.try_recv().is_err());
    assert_eq!(bus.pending(), 0);

    Ok(())
}

#[tokio::test]
async fn test_pending_messages_expire() -> Result<()> {
    let bus = MemoryBus::new(SubjectScheme::new("voice"), Duration::from_millis(50));

    bus.publish("voice.audio.s1", b"stale".to_vec()).await?;
    assert_eq!(bus.pending(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(bus.pending(), 0);

    Ok(())
}

#[tokio::test]
async fn test_cancelled_subscription_stops_delivery() -> Result<()> {
    let bus = MemoryBus::default();
    let (handler, _rx) = collector();
    let mut sub = bus.subscribe("voice.text.>", "test", handler).await?;

    assert!(sub.is_active());
    sub.cancel();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!sub.is_active());

    // With no live subscriber the message is retained
    bus.publish("voice.text.s1", b"later".to_vec()).await?;
    assert_eq!(bus.pending(), 1);

    Ok(())
}

// ============================================================================
// Workers
// ============================================================================

#[tokio::test]
async fn test_asr_worker_publishes_interim_and_final_transcripts() -> Result<()> {
    let bus = Arc::new(MemoryBus::default());
    let _asr = AsrWorker::new(bus.clone(), Arc::new(StubRecognizer::new(2)))
        .start()
        .await?;

    let (handler, mut rx) = collector();
    let _text = bus.subscribe("voice.text.>", "test", handler).await?;

    let subject = bus.subjects().subject(StreamCategory::Audio, "s1");
    for seq in 0..4 {
        let frame = AudioFrame::from_samples(seq, 16000, seq * 20, &[0i16; 320]);
        publish_json(&*bus, &subject, &AudioFrameMessage::from_frame("s1", &frame)).await?;
    }
    publish_json(
        &*bus,
        &subject,
        &AudioFrameMessage::final_marker("s1", 4, 16000),
    )
    .await?;

    let mut transcripts = Vec::new();
    for _ in 0..3 {
        let message = next(&mut rx).await;
        assert_eq!(message.subject, "voice.text.s1");
        transcripts.push(serde_json::from_slice::<TranscriptMessage>(&message.payload)?);
    }

    let finals: Vec<bool> = transcripts.iter().map(|t| t.is_final).collect();
    assert_eq!(finals, vec![false, false, true]);
    assert!(transcripts.iter().all(|t| t.session_id == "s1"));
    assert!(transcripts.iter().all(|t| t.confidence == Some(0.95)));
    assert_eq!(transcripts[2].text, StubRecognizer::TEXT);

    Ok(())
}

#[tokio::test]
async fn test_tts_worker_speaks_only_final_transcripts() -> Result<()> {
    let bus = Arc::new(MemoryBus::default());
    let _tts = TtsWorker::new(bus.clone(), Arc::new(StubSynthesizer::default()))
        .start()
        .await?;

    let (handler, mut rx) = collector();
    let _audio = bus.subscribe("voice.tts.>", "test", handler).await?;

    let subject = bus.subjects().subject(StreamCategory::Text, "s1");
    for (text, is_final) in [("partial", false), ("", true), ("Hello there", true)] {
        let transcript = TranscriptMessage {
            session_id: "s1".to_string(),
            text: text.to_string(),
            is_final,
            confidence: Some(0.9),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        publish_json(&*bus, &subject, &transcript).await?;
    }

    let frame: AudioFrameMessage = serde_json::from_slice(&next(&mut rx).await.payload)?;
    assert!(!frame.final_frame);
    assert_eq!(frame.session_id, "s1");
    assert_eq!(frame.decode_pcm()?.len(), 640); // 20ms of 16kHz silence

    let marker: AudioFrameMessage = serde_json::from_slice(&next(&mut rx).await.payload)?;
    assert!(marker.final_frame);
    assert_eq!(marker.sequence, 1);

    // Nothing for the interim or empty transcripts
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());

    Ok(())
}

#[tokio::test]
async fn test_audio_flows_through_both_workers() -> Result<()> {
    let bus = Arc::new(MemoryBus::default());
    let _asr = AsrWorker::new(bus.clone(), Arc::new(StubRecognizer::default()))
        .start()
        .await?;
    let _tts = TtsWorker::new(bus.clone(), Arc::new(StubSynthesizer::default()))
        .start()
        .await?;

    let (handler, mut rx) = collector();
    let _out = bus.subscribe("voice.tts.>", "test", handler).await?;

    // Just the end-of-audio marker: one final transcript, one spoken reply
    publish_json(
        &*bus,
        "voice.audio.call-1",
        &AudioFrameMessage::final_marker("call-1", 0, 16000),
    )
    .await?;

    let first = next(&mut rx).await;
    assert_eq!(first.subject, "voice.tts.call-1");
    let second: AudioFrameMessage = serde_json::from_slice(&next(&mut rx).await.payload)?;
    assert!(second.final_frame);

    Ok(())
}
