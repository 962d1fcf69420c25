//! Flush-cycle notifications.
//!
//! A metrics context announces each completed flush through a
//! [`FlushNotifier`]. Subscribers hold a [`FlushSubscription`] and wait on it;
//! delivery is best-effort. Each subscriber has room for exactly one pending
//! signal, and a signal sent while that slot is full is dropped. Flush cycles
//! recur, so a dropped signal only delays the subscriber until the next one.

use crate::statser::Statser;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

type Subscribers = Mutex<HashMap<u64, mpsc::Sender<()>>>;

/// Registry of flush subscribers.
#[derive(Debug, Default)]
pub struct FlushNotifier {
    subscribers: Arc<Subscribers>,
    next_id: AtomicU64,
}

impl FlushNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> FlushSubscription {
        let (tx, rx) = mpsc::channel(1);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        debug!(subscriber = id, "Registered flush subscriber");

        FlushSubscription {
            id,
            receiver: rx,
            registry: Arc::downgrade(&self.subscribers),
        }
    }

    /// Announces a completed flush cycle to every current subscriber.
    ///
    /// Returns the number of subscribers that received the signal.
    pub fn notify(&self) -> usize {
        let subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut delivered = 0;
        for (id, tx) in subscribers.iter() {
            match tx.try_send(()) {
                Ok(()) => delivered += 1,
                Err(_) => trace!(subscriber = id, "Flush signal dropped"),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Receive side of a flush registration.
///
/// Dropping the subscription removes it from the notifier, so the slot is
/// released exactly once however the holder exits.
#[derive(Debug)]
pub struct FlushSubscription {
    id: u64,
    receiver: mpsc::Receiver<()>,
    registry: Weak<Subscribers>,
}

impl FlushSubscription {
    /// Waits for the next flush signal. Returns `None` once the notifier
    /// that issued this subscription has been dropped.
    pub async fn recv(&mut self) -> Option<()> {
        self.receiver.recv().await
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(self) {
        drop(self);
    }

    /// An already-closed subscription, for contexts that never flush.
    pub fn detached() -> Self {
        let (_tx, rx) = mpsc::channel(1);
        Self {
            id: u64::MAX,
            receiver: rx,
            registry: Weak::new(),
        }
    }
}

impl Drop for FlushSubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.id);
            debug!(subscriber = self.id, "Unregistered flush subscriber");
        }
    }
}

/// Something that can complete a flush cycle on demand.
#[async_trait]
pub trait Flushable: Statser {
    async fn flush(&self);
}

/// Flushes `statser` every `interval` until `token` is cancelled, then
/// performs one final flush.
pub async fn run_flusher<S>(statser: Arc<S>, interval: Duration, token: CancellationToken)
where
    S: Flushable + ?Sized,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => statser.flush().await,
        }
    }

    debug!("Flusher cancelled, performing final flush");
    statser.flush().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[test]
    fn test_notify_wakes_waiting_subscriber() {
        let notifier = FlushNotifier::new();
        let mut subscription = notifier.subscribe();

        let mut recv = task::spawn(subscription.recv());
        assert_pending!(recv.poll());

        assert_eq!(notifier.notify(), 1);
        assert!(recv.is_woken());
        assert_ready_eq!(recv.poll(), Some(()));
    }

    #[tokio::test]
    async fn test_signals_coalesce_when_slot_is_full() {
        let notifier = FlushNotifier::new();
        let mut subscription = notifier.subscribe();

        assert_eq!(notifier.notify(), 1);
        // second signal has nowhere to go until the first is drained
        assert_eq!(notifier.notify(), 0);

        assert_eq!(subscription.recv().await, Some(()));
        assert!(subscription.receiver.try_recv().is_err());
    }

    #[test]
    fn test_drop_unregisters() {
        let notifier = FlushNotifier::new();
        let first = notifier.subscribe();
        let second = notifier.subscribe();
        assert_ne!(first.id(), second.id());
        assert_eq!(notifier.subscriber_count(), 2);

        first.unsubscribe();
        assert_eq!(notifier.subscriber_count(), 1);

        drop(second);
        assert_eq!(notifier.subscriber_count(), 0);
        assert_eq!(notifier.notify(), 0);
    }

    #[tokio::test]
    async fn test_recv_ends_when_notifier_dropped() {
        let notifier = FlushNotifier::new();
        let mut subscription = notifier.subscribe();
        drop(notifier);

        assert_eq!(subscription.recv().await, None);
    }

    #[tokio::test]
    async fn test_detached_subscription_never_fires() {
        let mut subscription = FlushSubscription::detached();
        assert_eq!(subscription.recv().await, None);
    }
}
