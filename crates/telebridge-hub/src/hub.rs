use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use telebridge_protocol::BusMessage;

use crate::error::{HubError, Result};

/// Default per-subscriber queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Hub tuning.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Messages buffered per subscriber before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Opaque subscriber handle, unique for the life of the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Outcome of one publish call. Misses are counted, never raised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub skipped: usize,
}

struct Slot {
    tx: SyncSender<Arc<str>>,
    open: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

#[derive(Default)]
struct Registry {
    closed: bool,
    slots: BTreeMap<SubscriberId, Slot>,
}

/// Concurrency-safe subscriber registry with best-effort fan-out.
pub struct Hub {
    config: HubConfig,
    next_id: AtomicU64,
    registry: Mutex<Registry>,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(1),
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Register a new subscriber. Fails once the hub is closed.
    pub fn subscribe(&self) -> Result<Subscription> {
        let mut registry = self.lock();
        if registry.closed {
            return Err(HubError::Closed);
        }
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::sync_channel(self.config.queue_capacity.max(1));
        let open = Arc::new(AtomicBool::new(true));
        let dropped = Arc::new(AtomicU64::new(0));
        registry.slots.insert(
            id,
            Slot {
                tx,
                open: Arc::clone(&open),
                dropped: Arc::clone(&dropped),
            },
        );
        tracing::debug!(%id, subscribers = registry.slots.len(), "subscriber joined");
        Ok(Subscription {
            id,
            rx,
            open,
            dropped,
        })
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut registry = self.lock();
        let removed = registry.slots.remove(&id);
        if let Some(slot) = &removed {
            slot.open.store(false, Ordering::Release);
            tracing::debug!(%id, subscribers = registry.slots.len(), "subscriber left");
        }
        removed.is_some()
    }

    /// Serialize once and fan out to every open subscriber.
    pub fn publish(&self, message: &BusMessage) -> PublishReport {
        match message.to_json() {
            Ok(text) => self.publish_text(Arc::from(text)),
            Err(err) => {
                tracing::warn!(error = %err, "dropping unserializable bus message");
                PublishReport::default()
            }
        }
    }

    /// Fan out an already-serialized message.
    ///
    /// The registry lock is held for the whole pass, so every subscriber
    /// sees publishes in the same order and membership cannot change
    /// mid-publish. Each send is non-blocking.
    pub fn publish_text(&self, text: Arc<str>) -> PublishReport {
        let mut registry = self.lock();
        let mut report = PublishReport::default();
        if registry.closed {
            return report;
        }

        let mut gone = Vec::new();
        for (id, slot) in &registry.slots {
            if !slot.open.load(Ordering::Acquire) {
                gone.push(*id);
                report.skipped += 1;
                continue;
            }
            match slot.tx.try_send(Arc::clone(&text)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    let dropped = slot.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::debug!(%id, dropped, "subscriber queue full; dropping message");
                    report.skipped += 1;
                }
                Err(TrySendError::Disconnected(_)) => {
                    gone.push(*id);
                    report.skipped += 1;
                }
            }
        }
        for id in gone {
            registry.slots.remove(&id);
            tracing::debug!(%id, "removed closed subscriber");
        }
        report
    }

    /// Close the hub: drop every subscriber queue and refuse new ones.
    ///
    /// Subscribers can still drain what was already queued.
    pub fn close(&self) {
        let mut registry = self.lock();
        if registry.closed {
            return;
        }
        registry.closed = true;
        for slot in registry.slots.values() {
            slot.open.store(false, Ordering::Release);
        }
        let count = registry.slots.len();
        registry.slots.clear();
        tracing::info!(subscribers = count, "hub closed");
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Registered subscribers, open or not.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.lock();
        f.debug_struct("Hub")
            .field("subscribers", &registry.slots.len())
            .field("closed", &registry.closed)
            .finish()
    }
}

/// Receiving end of one subscriber queue.
///
/// Dropping or closing it marks the subscriber closed; the hub forgets it
/// on the next publish.
pub struct Subscription {
    id: SubscriberId,
    rx: Receiver<Arc<str>>,
    open: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait up to `timeout` for the next message.
    ///
    /// `Ok(None)` on timeout; [`HubError::Closed`] once the hub has closed
    /// and the queue is drained.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Arc<str>>> {
        match self.rx.recv_timeout(timeout) {
            Ok(text) => Ok(Some(text)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(HubError::Closed),
        }
    }

    pub fn try_recv(&self) -> Result<Option<Arc<str>>> {
        match self.rx.try_recv() {
            Ok(text) => Ok(Some(text)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(HubError::Closed),
        }
    }

    /// Stop receiving. Later publishes skip this subscriber.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Messages dropped because this queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}
