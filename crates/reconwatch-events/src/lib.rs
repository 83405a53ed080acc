//! ReconWatch Events
//!
//! The event bus: every component publishes through one `EventBus` facade,
//! which fans events out to bounded per-subscriber broadcast channels and
//! persists an audit row for the subset of kinds worth a durable record.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use reconwatch_core::domain::{RunEvent, RunEventKind, RunId};
use reconwatch_store::RunEventLedger;
use tokio::sync::broadcast;
use tracing::{instrument, warn};

/// Default per-subscriber channel depth (bounded, drop-oldest).
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
    ledger: Arc<dyn RunEventLedger>,
    seq_counters: Mutex<HashMap<RunId, u64>>,
}

impl EventBus {
    pub fn new(ledger: Arc<dyn RunEventLedger>) -> Self {
        Self::with_capacity(ledger, DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(ledger: Arc<dyn RunEventLedger>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            ledger,
            seq_counters: Mutex::new(HashMap::new()),
        }
    }

    /// New subscription. A subscriber that falls behind the bus's capacity
    /// sees `RecvError::Lagged(n)` on its next `recv()` — `broadcast`'s
    /// native drop-oldest-and-count behavior.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }

    /// Assign the next sequence number for `run_id`, broadcast the event to
    /// every live subscriber, and persist an audit row if its kind warrants
    /// one. Never fails: a subscriber-side lag or a ledger write error is
    /// logged, not propagated — publishing must never block pipeline
    /// progress on an observer's behavior.
    #[instrument(skip(self, kind))]
    pub async fn publish(&self, run_id: RunId, kind: RunEventKind) -> RunEvent {
        let seq = self.next_seq(run_id);
        let event = RunEvent::new(run_id, seq, kind);

        // `send` only errors when there are zero subscribers, which is a
        // valid and common state (no one watching this run right now).
        let _ = self.sender.send(event.clone());

        if event.kind.is_audited() {
            if let Err(err) = self.ledger.append_run_event(event.clone()).await {
                warn!(run_id = %run_id, error = %err, "failed to persist audit row for run event");
            }
        }

        event
    }

    fn next_seq(&self, run_id: RunId) -> u64 {
        let mut counters = self.seq_counters.lock().unwrap();
        let counter = counters.entry(run_id).or_insert(0);
        *counter += 1;
        *counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconwatch_store::fakes::MemoryRunEventLedger;

    #[tokio::test]
    async fn publish_assigns_increasing_seq_per_run() {
        let ledger = Arc::new(MemoryRunEventLedger::new());
        let bus = EventBus::new(ledger);
        let run_id = RunId::new();

        let e1 = bus.publish(run_id, RunEventKind::RunStarted).await;
        let e2 = bus.publish(run_id, RunEventKind::RunCompleted).await;
        assert_eq!(e1.seq, 1);
        assert_eq!(e2.seq, 2);
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let ledger = Arc::new(MemoryRunEventLedger::new());
        let bus = EventBus::new(ledger);
        let mut rx = bus.subscribe();
        let run_id = RunId::new();

        bus.publish(run_id, RunEventKind::RunStarted).await;
        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind.label(), "run_started");
    }

    #[tokio::test]
    async fn scan_line_is_broadcast_but_not_audited() {
        let ledger = Arc::new(MemoryRunEventLedger::new());
        let bus = EventBus::new(ledger.clone());
        let run_id = RunId::new();

        bus.publish(
            run_id,
            RunEventKind::ScanLine {
                scan_id: "scan-1".to_string(),
                line: "nmap: host up".to_string(),
            },
        )
        .await;

        let audited = ledger.list_run_events(run_id).await.unwrap();
        assert!(audited.is_empty(), "scan_line must not be persisted as an audit row");
    }

    #[tokio::test]
    async fn run_completed_is_persisted() {
        let ledger = Arc::new(MemoryRunEventLedger::new());
        let bus = EventBus::new(ledger.clone());
        let run_id = RunId::new();

        bus.publish(run_id, RunEventKind::RunCompleted).await;
        let audited = ledger.list_run_events(run_id).await.unwrap();
        assert_eq!(audited.len(), 1);
    }
}
