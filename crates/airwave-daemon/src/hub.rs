//! Single-producer / multi-consumer fan-out of the live audio stream.
//!
//! ```text
//!   transcoder pump ──publish(Bytes)──► BroadcastHub
//!                                           │  try_send (never awaits)
//!                     ┌─────────────────────┼─────────────────────┐
//!                     ▼                     ▼                     ▼
//!               mpsc(queue)           mpsc(queue)           mpsc(queue)
//!                     │                     │                     │
//!               /stream body          /stream body          /stream body
//! ```
//!
//! Every listener owns a bounded queue. A full queue drops the chunk for that
//! listener only; a closed queue removes the listener. There is no backlog:
//! a new subscriber starts with the next published chunk.

use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

use crate::registry::{ListenerId, ListenerRegistry};

type ListenerTx = mpsc::Sender<Bytes>;

/// Outcome of a single `publish` call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    /// Listeners whose queue was full; they miss this chunk.
    pub dropped: usize,
    /// Listeners found disconnected and unregistered.
    pub removed: usize,
}

pub struct BroadcastHub {
    registry: Arc<ListenerRegistry<ListenerTx>>,
    queue_depth: usize,
    chunks_published: AtomicU64,
    bytes_published: AtomicU64,
}

impl BroadcastHub {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            registry: Arc::new(ListenerRegistry::new()),
            queue_depth: queue_depth.max(1),
            chunks_published: AtomicU64::new(0),
            bytes_published: AtomicU64::new(0),
        }
    }

    /// Register a new listener. It receives every chunk published from now
    /// on until the returned `Subscription` is dropped.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let id = self.registry.register(tx);
        debug!("hub: listener {} registered ({} total)", id, self.registry.len());
        Subscription {
            rx,
            guard: ListenerGuard {
                id,
                registry: Arc::clone(&self.registry),
            },
        }
    }

    /// Hand `chunk` to every registered listener without waiting on any of them.
    pub fn publish(&self, chunk: Bytes) -> PublishReport {
        let mut report = PublishReport::default();

        self.registry.for_each(|id, tx| match tx.try_send(chunk.clone()) {
            Ok(()) => report.delivered += 1,
            Err(TrySendError::Full(_)) => {
                trace!("hub: listener {} queue full, dropping {} bytes", id, chunk.len());
                report.dropped += 1;
            }
            Err(TrySendError::Closed(_)) => {
                if self.registry.unregister(id) {
                    debug!("hub: listener {} gone, unregistered", id);
                    report.removed += 1;
                }
            }
        });

        self.chunks_published.fetch_add(1, Ordering::Relaxed);
        self.bytes_published
            .fetch_add(chunk.len() as u64, Ordering::Relaxed);
        report
    }

    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    pub fn chunks_published(&self) -> u64 {
        self.chunks_published.load(Ordering::Relaxed)
    }

    pub fn bytes_published(&self) -> u64 {
        self.bytes_published.load(Ordering::Relaxed)
    }
}

/// Unregisters its listener when dropped (client disconnect).
struct ListenerGuard {
    id: ListenerId,
    registry: Arc<ListenerRegistry<ListenerTx>>,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if self.registry.unregister(self.id) {
            debug!("hub: listener {} disconnected", self.id);
        }
    }
}

/// Receiving side of one listener.
pub struct Subscription {
    rx: mpsc::Receiver<Bytes>,
    guard: ListenerGuard,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.guard.id
    }

    #[cfg(test)]
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Turn the subscription into a body stream. Dropping the stream
    /// unregisters the listener.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        futures_util::stream::unfold(self, |mut sub| async move {
            let chunk = sub.rx.recv().await?;
            Some((Ok::<_, Infallible>(chunk), sub))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_reaches_every_listener() {
        let hub = BroadcastHub::new(8);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        let report = hub.publish(Bytes::from_static(b"abc"));
        assert_eq!(report.delivered, 2);
        assert_eq!(a.recv().await.unwrap(), Bytes::from_static(b"abc"));
        assert_eq!(b.recv().await.unwrap(), Bytes::from_static(b"abc"));
        assert_eq!(hub.chunks_published(), 1);
        assert_eq!(hub.bytes_published(), 3);
    }

    #[tokio::test]
    async fn test_no_backlog_for_late_listener() {
        let hub = BroadcastHub::new(8);
        hub.publish(Bytes::from_static(b"early"));
        let mut late = hub.subscribe();
        hub.publish(Bytes::from_static(b"live"));
        assert_eq!(late.recv().await.unwrap(), Bytes::from_static(b"live"));
    }

    #[tokio::test]
    async fn test_order_preserved_per_listener() {
        let hub = BroadcastHub::new(16);
        let mut sub = hub.subscribe();
        for i in 0..10u8 {
            hub.publish(Bytes::from(vec![i]));
        }
        for i in 0..10u8 {
            assert_eq!(sub.recv().await.unwrap()[0], i);
        }
    }

    #[tokio::test]
    async fn test_stalled_listener_does_not_block_others() {
        let hub = BroadcastHub::new(2);
        let _stalled = hub.subscribe(); // never read
        let mut healthy = hub.subscribe();

        for i in 0..50u8 {
            let report = tokio::time::timeout(Duration::from_millis(100), async {
                hub.publish(Bytes::from(vec![i]))
            })
            .await
            .expect("publish blocked");
            assert_eq!(report.removed, 0);
            assert_eq!(healthy.recv().await.unwrap()[0], i);
        }
        assert_eq!(hub.listener_count(), 2);
    }

    #[tokio::test]
    async fn test_full_queue_drops_chunks_for_that_listener_only() {
        let hub = BroadcastHub::new(1);
        let mut slow = hub.subscribe();
        hub.publish(Bytes::from_static(b"1"));
        let report = hub.publish(Bytes::from_static(b"2"));
        assert_eq!(report.dropped, 1);
        assert_eq!(slow.recv().await.unwrap(), Bytes::from_static(b"1"));
        hub.publish(Bytes::from_static(b"3"));
        assert_eq!(slow.recv().await.unwrap(), Bytes::from_static(b"3"));
    }

    #[tokio::test]
    async fn test_dropped_subscription_unregisters() {
        let hub = BroadcastHub::new(4);
        let sub = hub.subscribe();
        let id = sub.id();
        assert_eq!(hub.listener_count(), 1);
        drop(sub);
        assert_eq!(hub.listener_count(), 0);
        assert!(!hub.registry.unregister(id));
        let report = hub.publish(Bytes::from_static(b"x"));
        assert_eq!(report, PublishReport::default());
    }

    #[tokio::test]
    async fn test_closed_receiver_is_removed_on_publish() {
        let hub = BroadcastHub::new(4);
        let mut sub = hub.subscribe();
        // Close the queue while keeping the guard alive, as a failed write would.
        sub.rx.close();
        let report = hub.publish(Bytes::from_static(b"x"));
        assert_eq!(report.removed, 1);
        assert_eq!(hub.listener_count(), 0);
        drop(sub);
        assert_eq!(hub.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_yields_chunks_and_unregisters_on_drop() {
        let hub = BroadcastHub::new(4);
        let mut stream = Box::pin(hub.subscribe().into_stream());
        hub.publish(Bytes::from_static(b"on air"));
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, Bytes::from_static(b"on air"));
        assert_eq!(hub.listener_count(), 1);
        drop(stream);
        assert_eq!(hub.listener_count(), 0);
    }
}
