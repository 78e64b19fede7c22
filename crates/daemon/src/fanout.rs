//! Best-effort delivery of observer events.

use chatwatch_core::{ObserverEvent, ObserverHandle};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc, Notify};
use tokio_stream::Stream;

type DirectSenders = HashMap<ObserverHandle, mpsc::UnboundedSender<ObserverEvent>>;

/// Outcome of one [`FanOut::notify`]. Only ever logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Broadcast subscribers that received the event.
    pub broadcast: usize,
    pub direct: DirectDelivery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectDelivery {
    NoTarget,
    NotAttached,
    Sent,
}

/// Broadcast channel for any number of surfaces plus one direct channel per
/// attached observer handle.
#[derive(Clone)]
pub struct FanOut {
    broadcast: broadcast::Sender<ObserverEvent>,
    direct: Arc<Mutex<DirectSenders>>,
    attached: Arc<Notify>,
}

impl FanOut {
    pub fn new(buffer: usize) -> Self {
        let (broadcast, _) = broadcast::channel(buffer.max(1));
        Self {
            broadcast,
            direct: Arc::new(Mutex::new(HashMap::new())),
            attached: Arc::new(Notify::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ObserverEvent> {
        self.broadcast.subscribe()
    }

    /// Open the direct channel for `handle`, replacing any previous one.
    /// The channel is removed when the returned subscription is dropped.
    pub fn attach(&self, handle: ObserverHandle) -> DirectSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders().insert(handle.clone(), tx.clone());
        self.attached.notify_waiters();
        DirectSubscription {
            fanout: self.clone(),
            handle,
            tx,
            rx,
        }
    }

    /// Remove `handle` only while it still maps to the channel of `tx`, so a
    /// newer attach for the same handle survives.
    fn detach(&self, handle: &ObserverHandle, tx: &mpsc::UnboundedSender<ObserverEvent>) {
        let mut senders = self.senders();
        if senders.get(handle).is_some_and(|current| current.same_channel(tx)) {
            senders.remove(handle);
        }
    }

    /// Number of handles with a registered direct channel.
    pub fn direct_count(&self) -> usize {
        self.senders().len()
    }

    pub fn is_attached(&self, handle: &ObserverHandle) -> bool {
        self.senders()
            .get(handle)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Resolves once `handle` has a live direct channel.
    pub async fn wait_attached(&self, handle: &ObserverHandle) -> bool {
        loop {
            let notified = self.attached.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_attached(handle) {
                return true;
            }
            notified.await;
        }
    }

    /// Deliver `event` to every broadcast subscriber and to `target`. Never
    /// fails; a missing or closed receiver is an expected outcome.
    pub fn notify(&self, event: ObserverEvent, target: Option<&ObserverHandle>) -> Delivery {
        let direct = match target {
            None => DirectDelivery::NoTarget,
            Some(handle) => {
                let mut senders = self.senders();
                let sent = senders
                    .get(handle)
                    .map(|tx| tx.send(event.clone()).is_ok());
                match sent {
                    Some(true) => DirectDelivery::Sent,
                    Some(false) => {
                        senders.remove(handle);
                        DirectDelivery::NotAttached
                    }
                    None => DirectDelivery::NotAttached,
                }
            }
        };
        let broadcast = self.broadcast.send(event).unwrap_or(0);
        Delivery { broadcast, direct }
    }

    fn senders(&self) -> MutexGuard<'_, DirectSenders> {
        self.direct.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Receiving end of one observer's direct channel.
pub struct DirectSubscription {
    fanout: FanOut,
    handle: ObserverHandle,
    tx: mpsc::UnboundedSender<ObserverEvent>,
    rx: mpsc::UnboundedReceiver<ObserverEvent>,
}

impl DirectSubscription {
    pub fn handle(&self) -> &ObserverHandle {
        &self.handle
    }

    pub async fn recv(&mut self) -> Option<ObserverEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<ObserverEvent, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }
}

impl Stream for DirectSubscription {
    type Item = ObserverEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ObserverEvent>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for DirectSubscription {
    fn drop(&mut self) {
        self.fanout.detach(&self.handle, &self.tx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn event() -> ObserverEvent {
        ObserverEvent::MonitoringAutoStopped {
            reason: "test".into(),
        }
    }

    #[test]
    fn test_notify_without_receivers_is_fine() {
        let fanout = FanOut::new(8);
        let delivery = fanout.notify(event(), Some(&ObserverHandle::new("tab-1")));
        assert_eq!(delivery.broadcast, 0);
        assert_eq!(delivery.direct, DirectDelivery::NotAttached);

        let delivery = fanout.notify(event(), None);
        assert_eq!(delivery.direct, DirectDelivery::NoTarget);
    }

    #[tokio::test]
    async fn test_broadcast_and_direct() {
        let fanout = FanOut::new(8);
        let mut sub_a = fanout.subscribe();
        let mut sub_b = fanout.subscribe();
        let handle = ObserverHandle::new("tab-1");
        let mut direct = fanout.attach(handle.clone());

        let delivery = fanout.notify(event(), Some(&handle));
        assert_eq!(delivery.broadcast, 2);
        assert_eq!(delivery.direct, DirectDelivery::Sent);

        assert_eq!(sub_a.recv().await.unwrap(), event());
        assert_eq!(sub_b.recv().await.unwrap(), event());
        assert_eq!(direct.recv().await.unwrap(), event());
    }

    #[test]
    fn test_closed_direct_channel_is_pruned() {
        let fanout = FanOut::new(8);
        let handle = ObserverHandle::new("tab-1");
        let rx = fanout.attach(handle.clone());
        assert!(fanout.is_attached(&handle));

        drop(rx);
        assert!(!fanout.is_attached(&handle));
        assert_eq!(fanout.direct_count(), 0);
        let delivery = fanout.notify(event(), Some(&handle));
        assert_eq!(delivery.direct, DirectDelivery::NotAttached);
    }

    #[tokio::test]
    async fn test_reattach_survives_drop_of_older_subscription() {
        let fanout = FanOut::new(8);
        let handle = ObserverHandle::new("tab-1");
        let older = fanout.attach(handle.clone());
        let mut newer = fanout.attach(handle.clone());

        drop(older);
        assert!(fanout.is_attached(&handle));
        assert_eq!(fanout.direct_count(), 1);

        let delivery = fanout.notify(event(), Some(&handle));
        assert_eq!(delivery.direct, DirectDelivery::Sent);
        assert_eq!(newer.recv().await.unwrap(), event());

        drop(newer);
        assert_eq!(fanout.direct_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_attached_wakes_on_attach() {
        let fanout = FanOut::new(8);
        let handle = ObserverHandle::new("tab-1");

        let waiter = {
            let fanout = fanout.clone();
            let handle = handle.clone();
            tokio::spawn(async move { fanout.wait_attached(&handle).await })
        };
        tokio::task::yield_now().await;
        let _rx = fanout.attach(handle);

        let attached = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(attached);
    }
}
