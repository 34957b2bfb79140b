//! Live fan-out of telemetry snapshots to per-device subscribers.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::sim::types::TelemetrySnapshot;

/// Shared snapshot handed to every subscriber without copying.
pub type SharedSnapshot = Arc<TelemetrySnapshot>;

/// Push channel per device.
///
/// Each device has one bounded broadcast channel. Publishing never blocks:
/// a subscriber that falls more than the channel capacity behind loses the
/// oldest snapshots it has not yet read, and publishing with no subscriber
/// is a no-op.
#[derive(Debug)]
pub struct BroadcastHub {
    capacity: usize,
    channels: RwLock<HashMap<String, broadcast::Sender<SharedSnapshot>>>,
}

impl BroadcastHub {
    /// Creates a hub buffering up to `capacity` snapshots per subscriber.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: RwLock::new(HashMap::new()),
        }
    }

    fn sender(&self, device_id: &str) -> broadcast::Sender<SharedSnapshot> {
        if let Some(tx) = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_id)
        {
            return tx.clone();
        }
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(device_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Offers `snapshot` to every current subscriber of its device.
    ///
    /// Returns the number of subscribers it was offered to.
    pub fn publish(&self, snapshot: SharedSnapshot) -> usize {
        let tx = {
            let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
            match channels.get(&snapshot.device_id) {
                Some(tx) => tx.clone(),
                None => return 0,
            }
        };
        let device_id = snapshot.device_id.clone();
        match tx.send(snapshot) {
            Ok(n) => {
                trace!(device_id = %device_id, subscribers = n, "snapshot published");
                n
            }
            // No live receivers; delivery failures stop here.
            Err(_) => 0,
        }
    }

    /// Opens a subscription to `device_id`'s future snapshots.
    pub fn subscribe(&self, device_id: &str) -> Subscription {
        let rx = self.sender(device_id).subscribe();
        debug!(device_id, "subscriber attached");
        Subscription {
            device_id: device_id.to_string(),
            rx,
            dropped: 0,
        }
    }

    /// Number of live subscribers of `device_id`.
    pub fn subscriber_count(&self, device_id: &str) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

/// Handle yielding one device's snapshots in publish order.
///
/// Dropping the handle (or calling [`Subscription::unsubscribe`]) releases
/// it; other subscribers are unaffected.
#[derive(Debug)]
pub struct Subscription {
    device_id: String,
    rx: broadcast::Receiver<SharedSnapshot>,
    dropped: u64,
}

impl Subscription {
    /// Device this subscription follows.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Snapshots skipped so far because this subscriber lagged.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Waits for the next snapshot, skipping any lost to lag.
    ///
    /// Returns `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<SharedSnapshot> {
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.dropped += n;
                    debug!(device_id = %self.device_id, skipped = n, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next buffered snapshot without waiting.
    pub fn try_recv(&mut self) -> Option<SharedSnapshot> {
        loop {
            match self.rx.try_recv() {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::TryRecvError::Lagged(n)) => self.dropped += n,
                Err(_) => return None,
            }
        }
    }

    /// Releases the subscription.
    pub fn unsubscribe(self) {
        debug!(device_id = %self.device_id, "subscriber detached");
    }
}
