//! Frame fan-out to independently paced consumers.
//!
//! Every registered destination is a bounded queue. Delivery never waits:
//! when a destination is full the frame is dropped for that destination only,
//! counted, and logged. The hot path driven by network arrival therefore
//! never stalls behind a slow consumer.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use super::frame::AudioFrame;

/// Log every Nth drop on a saturated destination after the first
const DROP_LOG_INTERVAL: u64 = 100;

/// Outcome of delivering one frame to every destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Counters for one destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationStats {
    pub name: String,
    pub delivered: u64,
    pub dropped: u64,
    pub closed: bool,
}

struct Destination {
    name: String,
    tx: Option<mpsc::Sender<AudioFrame>>,
    delivered: u64,
    dropped: u64,
}

/// Delivers an independent copy of every frame to each registered destination
pub struct FanOutDistributor {
    session_id: String,
    destinations: Vec<Destination>,
}

impl FanOutDistributor {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            destinations: Vec::new(),
        }
    }

    /// Register a new destination with a bounded queue
    ///
    /// Returns the receiving end for the consumer. The consumer sees the end
    /// of the stream when its receiver yields `None`.
    pub fn register(&mut self, name: impl Into<String>, capacity: usize) -> mpsc::Receiver<AudioFrame> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.attach(name, tx);
        rx
    }

    /// Register an existing sender as a destination
    pub fn attach(&mut self, name: impl Into<String>, tx: mpsc::Sender<AudioFrame>) {
        let name = name.into();
        debug!("Session {}: registered destination {}", self.session_id, name);
        self.destinations.push(Destination {
            name,
            tx: Some(tx),
            delivered: 0,
            dropped: 0,
        });
    }

    /// Offer one frame to every open destination without waiting
    pub fn dispatch(&mut self, frame: &AudioFrame) -> DispatchReport {
        let mut report = DispatchReport::default();

        for dest in &mut self.destinations {
            let Some(tx) = &dest.tx else {
                continue;
            };

            match tx.try_send(frame.clone()) {
                Ok(()) => {
                    dest.delivered += 1;
                    report.delivered += 1;
                }
                Err(TrySendError::Full(_)) => {
                    dest.dropped += 1;
                    report.dropped += 1;

                    if dest.dropped == 1 || dest.dropped % DROP_LOG_INTERVAL == 0 {
                        warn!(
                            "Session {}: dropping audio frame for {} (queue full, {} dropped so far)",
                            self.session_id, dest.name, dest.dropped
                        );
                    }
                }
                Err(TrySendError::Closed(_)) => {
                    // Consumer went away; stop offering it frames
                    info!(
                        "Session {}: destination {} closed by its consumer",
                        self.session_id, dest.name
                    );
                    dest.tx = None;
                }
            }
        }

        report
    }

    /// Signal end-of-stream to every destination
    ///
    /// Returns how many destinations were newly closed; calling it again is a no-op.
    pub fn close(&mut self) -> usize {
        let mut closed = 0;
        for dest in &mut self.destinations {
            if dest.tx.take().is_some() {
                closed += 1;
            }
        }

        if closed > 0 {
            info!(
                "Session {}: closed {} destination(s)",
                self.session_id, closed
            );
        }

        closed
    }

    /// Distribute an inbound frame sequence until it ends, then close every destination
    pub async fn run(mut self, mut inbound: mpsc::Receiver<AudioFrame>) -> Vec<DestinationStats> {
        while let Some(frame) = inbound.recv().await {
            self.dispatch(&frame);
        }

        self.close();
        self.stats()
    }

    pub fn stats(&self) -> Vec<DestinationStats> {
        self.destinations
            .iter()
            .map(|d| DestinationStats {
                name: d.name.clone(),
                delivered: d.delivered,
                dropped: d.dropped,
                closed: d.tx.is_none(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}

impl Drop for FanOutDistributor {
    fn drop(&mut self) {
        self.close();
    }
}
